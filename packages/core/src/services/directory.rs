//! Identity / registration directory.
//!
//! The care core never looks up patients, hospitals or staff itself; it asks
//! an [`IdentityResolver`]. Recorder resolution goes through
//! [`resolve_recorder`], the one place the staff-then-user fallback lives.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::care::error::CareError;
use crate::care::types::{HospitalRef, Identity, IdentityKind, PatientRef, RegistrationRef};

/// Resolves raw identifiers into opaque references.
#[async_trait]
pub trait IdentityResolver {
    async fn resolve_patient(&self, patient_id: i64) -> Result<PatientRef, CareError>;

    async fn resolve_hospital(&self, hospital_id: i64) -> Result<HospitalRef, CareError>;

    async fn resolve_registration(
        &self,
        registration_id: i64,
    ) -> Result<RegistrationRef, CareError>;

    /// Look up a staff member by numeric id or username.
    async fn resolve_staff(&self, raw: &str) -> Result<Identity, CareError>;

    /// Look up an application user by numeric id or username.
    async fn resolve_user(&self, raw: &str) -> Result<Identity, CareError>;
}

/// Resolve the person recording an observation: staff first, then users.
pub async fn resolve_recorder(
    resolver: &(dyn IdentityResolver + Send + Sync),
    raw: &str,
) -> Result<Identity, CareError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CareError::validation("recorded_by is required"));
    }

    match resolver.resolve_staff(raw).await {
        Ok(identity) => Ok(identity),
        Err(err) if err.is_not_found() => resolver
            .resolve_user(raw)
            .await
            .map_err(|err| match err {
                CareError::NotFound { .. } => CareError::not_found("recorder", raw),
                other => other,
            }),
        Err(err) => Err(err),
    }
}

// ---- SQLite-backed directory ----

/// Directory backed by the registration tables in the shared database.
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn lookup_identity(
        &self,
        table: &'static str,
        kind: IdentityKind,
        raw: &str,
    ) -> Result<Identity, CareError> {
        let sql = format!(
            "SELECT id, display_name FROM {} WHERE username = ? OR CAST(id AS TEXT) = ?",
            table
        );
        let row = sqlx::query(&sql)
            .bind(raw)
            .bind(raw)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CareError::not_found(kind.as_str(), raw))?;

        Ok(Identity {
            id: row.try_get("id")?,
            kind,
            display_name: row.try_get("display_name")?,
        })
    }
}

#[async_trait]
impl IdentityResolver for SqliteDirectory {
    async fn resolve_patient(&self, patient_id: i64) -> Result<PatientRef, CareError> {
        let row = sqlx::query("SELECT id, display_name FROM patients WHERE id = ?")
            .bind(patient_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CareError::not_found("patient", patient_id))?;

        Ok(PatientRef {
            id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
        })
    }

    async fn resolve_hospital(&self, hospital_id: i64) -> Result<HospitalRef, CareError> {
        let row = sqlx::query("SELECT id, name FROM hospitals WHERE id = ?")
            .bind(hospital_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CareError::not_found("hospital", hospital_id))?;

        Ok(HospitalRef {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }

    async fn resolve_registration(
        &self,
        registration_id: i64,
    ) -> Result<RegistrationRef, CareError> {
        let row = sqlx::query("SELECT id, patient_id FROM registrations WHERE id = ?")
            .bind(registration_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CareError::not_found("registration", registration_id))?;

        Ok(RegistrationRef {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
        })
    }

    async fn resolve_staff(&self, raw: &str) -> Result<Identity, CareError> {
        self.lookup_identity("staff", IdentityKind::Staff, raw).await
    }

    async fn resolve_user(&self, raw: &str) -> Result<Identity, CareError> {
        self.lookup_identity("users", IdentityKind::User, raw).await
    }
}

// ---- In-memory directory ----

/// Directory held in memory. Used for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    patients: HashMap<i64, PatientRef>,
    hospitals: HashMap<i64, HospitalRef>,
    registrations: HashMap<i64, RegistrationRef>,
    staff: HashMap<String, Identity>,
    users: HashMap<String, Identity>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patient(mut self, id: i64, display_name: &str) -> Self {
        self.patients.insert(
            id,
            PatientRef {
                id,
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn with_hospital(mut self, id: i64, name: &str) -> Self {
        self.hospitals.insert(
            id,
            HospitalRef {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_registration(mut self, id: i64, patient_id: i64) -> Self {
        self.registrations
            .insert(id, RegistrationRef { id, patient_id });
        self
    }

    pub fn with_staff(mut self, id: i64, username: &str, display_name: &str) -> Self {
        self.staff.insert(
            username.to_string(),
            Identity {
                id,
                kind: IdentityKind::Staff,
                display_name: display_name.to_string(),
            },
        );
        self
    }

    pub fn with_user(mut self, id: i64, username: &str, display_name: &str) -> Self {
        self.users.insert(
            username.to_string(),
            Identity {
                id,
                kind: IdentityKind::User,
                display_name: display_name.to_string(),
            },
        );
        self
    }

    fn lookup(map: &HashMap<String, Identity>, raw: &str) -> Option<Identity> {
        map.get(raw)
            .or_else(|| {
                let id: i64 = raw.parse().ok()?;
                map.values().find(|identity| identity.id == id)
            })
            .cloned()
    }
}

#[async_trait]
impl IdentityResolver for InMemoryDirectory {
    async fn resolve_patient(&self, patient_id: i64) -> Result<PatientRef, CareError> {
        self.patients
            .get(&patient_id)
            .cloned()
            .ok_or_else(|| CareError::not_found("patient", patient_id))
    }

    async fn resolve_hospital(&self, hospital_id: i64) -> Result<HospitalRef, CareError> {
        self.hospitals
            .get(&hospital_id)
            .cloned()
            .ok_or_else(|| CareError::not_found("hospital", hospital_id))
    }

    async fn resolve_registration(
        &self,
        registration_id: i64,
    ) -> Result<RegistrationRef, CareError> {
        self.registrations
            .get(&registration_id)
            .cloned()
            .ok_or_else(|| CareError::not_found("registration", registration_id))
    }

    async fn resolve_staff(&self, raw: &str) -> Result<Identity, CareError> {
        Self::lookup(&self.staff, raw).ok_or_else(|| CareError::not_found("staff", raw))
    }

    async fn resolve_user(&self, raw: &str) -> Result<Identity, CareError> {
        Self::lookup(&self.users, raw).ok_or_else(|| CareError::not_found("user", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_patient(1, "Jane Doe")
            .with_hospital(1, "St. Mary")
            .with_staff(7, "nurse.ada", "Nurse Ada")
            .with_user(9, "clerk.bo", "Clerk Bo")
    }

    #[tokio::test]
    async fn recorder_prefers_staff() {
        let dir = directory();
        let identity = resolve_recorder(&dir, "nurse.ada").await.unwrap();
        assert_eq!(identity.kind, IdentityKind::Staff);
        assert_eq!(identity.id, 7);
    }

    #[tokio::test]
    async fn recorder_falls_back_to_user() {
        let dir = directory();
        let identity = resolve_recorder(&dir, "clerk.bo").await.unwrap();
        assert_eq!(identity.kind, IdentityKind::User);
        assert_eq!(identity.display_name, "Clerk Bo");
    }

    #[tokio::test]
    async fn recorder_accepts_numeric_id() {
        let dir = directory();
        let identity = resolve_recorder(&dir, "9").await.unwrap();
        assert_eq!(identity.id, 9);
    }

    #[tokio::test]
    async fn unknown_recorder_is_not_found() {
        let dir = directory();
        let err = resolve_recorder(&dir, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn blank_recorder_is_a_validation_error() {
        let dir = directory();
        let err = resolve_recorder(&dir, "  ").await.unwrap_err();
        assert!(matches!(err, CareError::Validation { .. }));
    }

    #[tokio::test]
    async fn sqlite_directory_resolves_seeded_rows() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        sqlx::query("INSERT INTO patients (id, display_name) VALUES (1, 'Jane Doe')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (id, username, display_name) VALUES (3, 'mw.kai', 'Midwife Kai')")
            .execute(&pool)
            .await
            .unwrap();
        let dir = SqliteDirectory::new(pool);

        assert_eq!(dir.resolve_patient(1).await.unwrap().display_name, "Jane Doe");
        assert!(dir.resolve_patient(2).await.unwrap_err().is_not_found());
        assert!(dir.resolve_hospital(1).await.unwrap_err().is_not_found());

        let recorder = resolve_recorder(&dir, "mw.kai").await.unwrap();
        assert_eq!(recorder.kind, IdentityKind::User);
        assert_eq!(recorder.id, 3);
    }
}
