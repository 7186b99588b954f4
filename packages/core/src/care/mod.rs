//! Postpartum Care Module
//!
//! Schedule state machine and clinical alert evaluation for postpartum
//! monitoring episodes, plus the resolver and service that persist them.

pub mod config;
pub mod error;
pub mod evaluator;
pub mod resolver;
pub mod schedule;
pub mod service;
pub mod types;


pub use config::MonitoringPolicy;
pub use error::CareError;
pub use evaluator::{evaluate, Evaluation};
pub use schedule::{apply_observation, open_plan, ScheduleInput, ScheduleOutcome};
pub use service::CareService;
pub use types::*;
