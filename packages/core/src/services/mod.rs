//! Collaborators the care core consumes but does not own.

pub mod directory;
