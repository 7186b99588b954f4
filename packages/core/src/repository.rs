//! Database repository for care-plan persistence.
//!
//! All SQLite read/write logic lives here. Plans and observations are stored
//! as JSON bodies next to the scalar columns the queries filter on.
//!
//! Connection-scoped functions (taking `&mut SqliteConnection`) are meant to
//! run inside the transaction opened by [`CareRepository::begin`]; the
//! `fetch_*` / `list_*` methods are pool-level reads.

use std::ops::{Deref, DerefMut};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use crate::care::types::{CarePlan, Observation};

/// A single alert publish attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Option<i64>,
    pub observation_id: i64,
    pub care_plan_id: i64,
    pub alert_type: String,
    pub severity: String,
    pub code: String,
    pub message: String,
    pub recipient_id: i64,
    pub recipient_kind: String,
    pub delivered: bool,
    pub triggered_at: String,
}

/// Fixed-width UTC timestamp so stored values sort lexicographically.
pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `true` when `err` is the active-plan uniqueness constraint firing.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn encode_body<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value)
        .map_err(|err| sqlx::Error::Protocol(format!("failed to encode row body: {err}")))
}

fn decode_plan(row: &SqliteRow) -> Result<CarePlan, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    let body: String = row.try_get("body")?;
    let mut plan: CarePlan =
        serde_json::from_str(&body).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    plan.id = id;
    Ok(plan)
}

fn decode_observation(row: &SqliteRow) -> Result<Observation, sqlx::Error> {
    let id: i64 = row.try_get("id")?;
    let body: String = row.try_get("body")?;
    let mut observation: Observation =
        serde_json::from_str(&body).map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    observation.id = id;
    Ok(observation)
}

/// A pooled connection holding the SQLite write lock.
///
/// Dereferences to the connection so the connection-scoped statements on
/// [`CareRepository`] run inside it. Dropped without [`commit`] it rolls
/// back before the connection goes back to the pool.
///
/// [`commit`]: WriteTransaction::commit
pub struct WriteTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

const HELD: &str = "connection held until commit or rollback";

impl WriteTransaction {
    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self).await?;
        self.conn = None;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut *self).await?;
        self.conn = None;
        Ok(())
    }
}

impl Deref for WriteTransaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        self.conn.as_deref().expect(HELD)
    }
}

impl DerefMut for WriteTransaction {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        self.conn.as_deref_mut().expect(HELD)
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        tracing::warn!("Rollback of abandoned write transaction failed: {}", err);
                    }
                });
            }
            // Closing the connection makes SQLite discard the transaction.
            Err(_) => drop(conn.detach()),
        }
    }
}

/// Repository for reading and writing care data to SQLite.
pub struct CareRepository {
    pool: SqlitePool,
}

impl CareRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open the write transaction a single `record_observation` call runs in.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so two writers
    /// queue on the busy timeout instead of both reading under a shared lock
    /// and then failing to upgrade it.
    pub async fn begin(&self) -> Result<WriteTransaction, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(WriteTransaction { conn: Some(conn) })
    }

    // ---- Care plans ----

    pub async fn find_active_plan(
        conn: &mut SqliteConnection,
        patient_id: i64,
        hospital_id: i64,
    ) -> Result<Option<CarePlan>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, body FROM care_plans
             WHERE patient_id = ? AND hospital_id = ? AND active = 1",
        )
        .bind(patient_id)
        .bind(hospital_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.as_ref().map(decode_plan).transpose()
    }

    pub async fn find_plan(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<CarePlan>, sqlx::Error> {
        let row = sqlx::query("SELECT id, body FROM care_plans WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(decode_plan).transpose()
    }

    /// Insert a new plan and return its row id.
    ///
    /// Fails with a unique violation (see [`is_unique_violation`]) when the
    /// patient already has an active plan at the hospital.
    pub async fn insert_plan(
        conn: &mut SqliteConnection,
        plan: &CarePlan,
    ) -> Result<i64, sqlx::Error> {
        let body = encode_body(plan)?;
        let active_int: i64 = if plan.active { 1 } else { 0 };
        let now = timestamp(Utc::now());

        let result = sqlx::query(
            "INSERT INTO care_plans
             (patient_id, hospital_id, active, next_due_at, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(plan.patient_id)
        .bind(plan.hospital_id)
        .bind(active_int)
        .bind(plan.next_due_at.map(timestamp))
        .bind(&body)
        .bind(timestamp(plan.created_at))
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite a plan's state. Returns `false` if the id does not exist.
    pub async fn update_plan(
        conn: &mut SqliteConnection,
        plan: &CarePlan,
    ) -> Result<bool, sqlx::Error> {
        let body = encode_body(plan)?;
        let active_int: i64 = if plan.active { 1 } else { 0 };

        let result = sqlx::query(
            "UPDATE care_plans
             SET active = ?, next_due_at = ?, body = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(active_int)
        .bind(plan.next_due_at.map(timestamp))
        .bind(&body)
        .bind(timestamp(Utc::now()))
        .bind(plan.id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- Observations ----

    /// Append an observation and return its row id.
    pub async fn insert_observation(
        conn: &mut SqliteConnection,
        observation: &Observation,
    ) -> Result<i64, sqlx::Error> {
        let body = encode_body(observation)?;

        let result = sqlx::query(
            "INSERT INTO observations
             (care_plan_id, observation_time, documented_at, supersedes_id, body)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(observation.care_plan_id)
        .bind(timestamp(observation.observation_time))
        .bind(timestamp(observation.documented_at))
        .bind(observation.supersedes_observation_id)
        .bind(&body)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_observation(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<Option<Observation>, sqlx::Error> {
        let row = sqlx::query("SELECT id, body FROM observations WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(decode_observation).transpose()
    }

    // ---- Pool-level reads ----

    pub async fn fetch_plan(&self, id: i64) -> Result<Option<CarePlan>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::find_plan(&mut conn, id).await
    }

    pub async fn fetch_active_plan(
        &self,
        patient_id: i64,
        hospital_id: i64,
    ) -> Result<Option<CarePlan>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::find_active_plan(&mut conn, patient_id, hospital_id).await
    }

    pub async fn fetch_observation(&self, id: i64) -> Result<Option<Observation>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::find_observation(&mut conn, id).await
    }

    /// All observations of a plan, oldest observation time first.
    pub async fn list_observations(
        &self,
        care_plan_id: i64,
    ) -> Result<Vec<Observation>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, body FROM observations
             WHERE care_plan_id = ?
             ORDER BY observation_time ASC, id ASC",
        )
        .bind(care_plan_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_observation).collect()
    }

    // ---- Alert event logging ----

    /// Log an alert publish attempt (delivered or not).
    pub async fn log_alert_event(&self, event: &AlertEvent) -> Result<(), sqlx::Error> {
        let delivered_int: i64 = if event.delivered { 1 } else { 0 };

        sqlx::query(
            "INSERT INTO alert_events
             (observation_id, care_plan_id, alert_type, severity, code, message,
              recipient_id, recipient_kind, delivered, triggered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.observation_id)
        .bind(event.care_plan_id)
        .bind(&event.alert_type)
        .bind(&event.severity)
        .bind(&event.code)
        .bind(&event.message)
        .bind(event.recipient_id)
        .bind(&event.recipient_kind)
        .bind(delivered_int)
        .bind(&event.triggered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Query alert history with optional filters. `limit` is clamped to 100.
    pub async fn query_alert_history(
        &self,
        limit: i64,
        alert_type_filter: Option<&str>,
        delivered_filter: Option<bool>,
    ) -> Result<Vec<AlertEvent>, sqlx::Error> {
        let limit = limit.clamp(1, 100);

        let sql = format!(
            "SELECT id, observation_id, care_plan_id, alert_type, severity, code, message,
                    recipient_id, recipient_kind, delivered, triggered_at
             FROM alert_events
             WHERE {}
             ORDER BY triggered_at DESC, id DESC
             LIMIT ?",
            alert_conditions(alert_type_filter, delivered_filter)
        );

        let rows = {
            let mut q = sqlx::query(&sql);
            if let Some(alert_type) = alert_type_filter {
                q = q.bind(alert_type);
            }
            if let Some(delivered) = delivered_filter {
                q = q.bind(if delivered { 1i64 } else { 0i64 });
            }
            q.bind(limit).fetch_all(&self.pool).await?
        };

        rows.iter()
            .map(|row| -> Result<AlertEvent, sqlx::Error> {
                let delivered: i64 = row.try_get("delivered")?;
                Ok(AlertEvent {
                    id: Some(row.try_get("id")?),
                    observation_id: row.try_get("observation_id")?,
                    care_plan_id: row.try_get("care_plan_id")?,
                    alert_type: row.try_get("alert_type")?,
                    severity: row.try_get("severity")?,
                    code: row.try_get("code")?,
                    message: row.try_get("message")?,
                    recipient_id: row.try_get("recipient_id")?,
                    recipient_kind: row.try_get("recipient_kind")?,
                    delivered: delivered != 0,
                    triggered_at: row.try_get("triggered_at")?,
                })
            })
            .collect()
    }

    /// Count alert events matching optional filters (for pagination totals).
    pub async fn count_alert_events(
        &self,
        alert_type_filter: Option<&str>,
        delivered_filter: Option<bool>,
    ) -> Result<i64, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM alert_events WHERE {}",
            alert_conditions(alert_type_filter, delivered_filter)
        );

        let row = {
            let mut q = sqlx::query(&sql);
            if let Some(alert_type) = alert_type_filter {
                q = q.bind(alert_type);
            }
            if let Some(delivered) = delivered_filter {
                q = q.bind(if delivered { 1i64 } else { 0i64 });
            }
            q.fetch_one(&self.pool).await?
        };

        row.try_get("cnt")
    }
}

fn alert_conditions(alert_type_filter: Option<&str>, delivered_filter: Option<bool>) -> String {
    let mut conditions = vec!["1=1"];
    if alert_type_filter.is_some() {
        conditions.push("alert_type = ?");
    }
    if delivered_filter.is_some() {
        conditions.push("delivered = ?");
    }
    conditions.join(" AND ")
}
