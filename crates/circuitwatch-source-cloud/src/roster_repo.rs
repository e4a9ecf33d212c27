//! Roster write path: schema provisioning plus bounded-retry upserts.
//!
//! Schema checks are memoized per repository instance through
//! `schema_ensured`. Any failed write attempt clears the flag, so the next
//! attempt re-verifies the table instead of trusting a schema that may have
//! been dropped underneath us.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use circuitwatch_core::{GroupMemberLocation, RetryDecision, RetryPolicy, WriteOutcome};

use crate::api::{SchemaBackend, UpsertRow};
use crate::error::{CloudError, WriteError};

pub const LOCATIONS_TABLE: &str = "group_locations";

/// Columns provisioned on [`LOCATIONS_TABLE`], with backend types.
pub const LOCATION_COLUMNS: [(&str, &str); 7] = [
    ("group_id", "TEXT"),
    ("user_id", "TEXT"),
    ("display_name", "TEXT"),
    ("latitude", "REAL"),
    ("longitude", "REAL"),
    ("last_updated", "TEXT"),
    ("sharing", "BOOLEAN"),
];

const KEY_COLUMNS: [&str; 2] = ["group_id", "user_id"];

pub struct RosterRepository {
    backend: Arc<dyn SchemaBackend>,
    schema_ensured: AtomicBool,
    policy: RetryPolicy,
}

impl RosterRepository {
    pub fn new(backend: Arc<dyn SchemaBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn SchemaBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            schema_ensured: AtomicBool::new(false),
            policy,
        }
    }

    pub fn is_schema_ensured(&self) -> bool {
        self.schema_ensured.load(Ordering::Acquire)
    }

    /// Create the locations table and its columns if missing. Skipped once it
    /// has succeeded on this instance.
    pub async fn ensure_schema(&self) -> WriteOutcome<(), CloudError> {
        if self.is_schema_ensured() {
            return WriteOutcome::Success(());
        }

        let outcome = self.backend.ensure_table(LOCATIONS_TABLE).await;
        if !outcome.is_success() {
            return outcome;
        }
        for (column, column_type) in LOCATION_COLUMNS {
            let outcome = self
                .backend
                .ensure_column(LOCATIONS_TABLE, column, column_type)
                .await;
            if !outcome.is_success() {
                return outcome;
            }
        }

        if self
            .schema_ensured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!("schema ensured for {LOCATIONS_TABLE}");
        }
        WriteOutcome::Success(())
    }

    /// Announce the member in the group (sharing on, position as given).
    pub async fn register_presence(
        &self,
        group_id: &str,
        member: &GroupMemberLocation,
    ) -> Result<(), WriteError> {
        let mut row = location_row(group_id, member);
        row.data
            .insert("sharing".to_string(), serde_json::Value::Bool(true));
        self.write_with_retry("register_presence", &row).await
    }

    /// Insert or replace the member's location row.
    pub async fn upsert_location(
        &self,
        group_id: &str,
        member: &GroupMemberLocation,
    ) -> Result<(), WriteError> {
        let row = location_row(group_id, member);
        self.write_with_retry("upsert_location", &row).await
    }

    async fn attempt(&self, row: &UpsertRow) -> WriteOutcome<(), CloudError> {
        let outcome = match self.ensure_schema().await {
            WriteOutcome::Success(()) => self.backend.upsert(LOCATIONS_TABLE, row).await,
            failed => failed,
        };
        if !outcome.is_success() {
            self.schema_ensured.store(false, Ordering::Release);
        }
        outcome
    }

    async fn write_with_retry(&self, op: &'static str, row: &UpsertRow) -> Result<(), WriteError> {
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(row).await;
            let decision = self.policy.decide(attempt, &outcome);
            match (outcome, decision) {
                (WriteOutcome::Success(()), _) => return Ok(()),
                (WriteOutcome::Transient(e) | WriteOutcome::Terminal(e), RetryDecision::RetryAfter(delay)) => {
                    tracing::warn!("{op} attempt {attempt} failed, retrying in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                (WriteOutcome::Terminal(source), _) => {
                    tracing::warn!("{op} rejected: {source}");
                    return Err(WriteError::Rejected { op, source });
                }
                (WriteOutcome::Transient(source), _) => {
                    tracing::warn!("{op} failed after {attempt} attempts: {source}");
                    return Err(WriteError::Exhausted {
                        op,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

fn location_row(group_id: &str, member: &GroupMemberLocation) -> UpsertRow {
    let mut data = serde_json::Map::new();
    data.insert("group_id".into(), group_id.into());
    data.insert("user_id".into(), member.user_id.clone().into());
    data.insert(
        "display_name".into(),
        member
            .display_name
            .clone()
            .map_or(serde_json::Value::Null, serde_json::Value::String),
    );
    data.insert("latitude".into(), member.latitude.into());
    data.insert("longitude".into(), member.longitude.into());
    data.insert(
        "last_updated".into(),
        member.last_updated.to_rfc3339().into(),
    );
    data.insert("sharing".into(), member.sharing.into());
    UpsertRow {
        key: KEY_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Ok,
        Transient,
        Terminal,
    }

    /// Fake backend: counts calls and replays scripted upsert outcomes.
    #[derive(Default)]
    struct FakeBackend {
        tables: Mutex<u32>,
        columns: Mutex<u32>,
        upserts: Mutex<Vec<UpsertRow>>,
        upsert_script: Mutex<VecDeque<Step>>,
        table_script: Mutex<VecDeque<Step>>,
    }

    impl FakeBackend {
        fn scripted(upserts: &[Step]) -> Self {
            let fake = Self::default();
            fake.upsert_script
                .lock()
                .expect("lock")
                .extend(upserts.iter().copied());
            fake
        }

        fn table_calls(&self) -> u32 {
            *self.tables.lock().expect("lock")
        }
    }

    fn outcome(step: Step) -> WriteOutcome<(), CloudError> {
        match step {
            Step::Ok => WriteOutcome::Success(()),
            Step::Transient => WriteOutcome::Transient(CloudError::Timeout(300)),
            Step::Terminal => WriteOutcome::Terminal(CloudError::Status {
                status: 422,
                body: "bad row".into(),
            }),
        }
    }

    #[async_trait]
    impl SchemaBackend for FakeBackend {
        async fn ensure_table(&self, _table: &str) -> WriteOutcome<(), CloudError> {
            *self.tables.lock().expect("lock") += 1;
            let step = self
                .table_script
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Step::Ok);
            outcome(step)
        }

        async fn ensure_column(&self, _t: &str, _c: &str, _ty: &str) -> WriteOutcome<(), CloudError> {
            *self.columns.lock().expect("lock") += 1;
            WriteOutcome::Success(())
        }

        async fn upsert(&self, _table: &str, row: &UpsertRow) -> WriteOutcome<(), CloudError> {
            let step = self
                .upsert_script
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Step::Ok);
            if step == Step::Ok {
                self.upserts.lock().expect("lock").push(row.clone());
            }
            outcome(step)
        }
    }

    fn member() -> GroupMemberLocation {
        GroupMemberLocation {
            user_id: "u1".into(),
            display_name: Some("Alex".into()),
            latitude: 41.57,
            longitude: 2.26,
            last_updated: Utc
                .with_ymd_and_hms(2026, 5, 10, 14, 0, 0)
                .single()
                .expect("valid datetime"),
            sharing: false,
        }
    }

    fn repo(backend: &Arc<FakeBackend>) -> RosterRepository {
        RosterRepository::new(Arc::clone(backend) as Arc<dyn SchemaBackend>)
    }

    #[tokio::test]
    async fn schema_is_memoized() {
        let backend = Arc::new(FakeBackend::default());
        let repo = repo(&backend);
        repo.upsert_location("g1", &member()).await.expect("first");
        repo.upsert_location("g1", &member()).await.expect("second");
        assert_eq!(backend.table_calls(), 1);
        assert_eq!(*backend.columns.lock().expect("lock"), 7);
        assert!(repo.is_schema_ensured());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_retries_and_reverifies_schema() {
        let backend = Arc::new(FakeBackend::scripted(&[Step::Transient, Step::Ok]));
        let repo = repo(&backend);
        repo.upsert_location("g1", &member()).await.expect("retried");
        // Failure reset the flag, so the retry provisioned again.
        assert_eq!(backend.table_calls(), 2);
        assert_eq!(backend.upserts.lock().expect("lock").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_typed_error() {
        let backend = Arc::new(FakeBackend::scripted(&[Step::Transient, Step::Transient]));
        let repo = repo(&backend);
        let started = tokio::time::Instant::now();
        let err = repo
            .upsert_location("g1", &member())
            .await
            .expect_err("exhausted");
        assert!(matches!(err, WriteError::Exhausted { attempts: 2, .. }));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(!repo.is_schema_ensured());
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let backend = Arc::new(FakeBackend::scripted(&[Step::Terminal, Step::Ok]));
        let repo = repo(&backend);
        let err = repo
            .register_presence("g1", &member())
            .await
            .expect_err("rejected");
        assert!(matches!(err, WriteError::Rejected { op: "register_presence", .. }));
        assert!(backend.upserts.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn schema_failure_counts_as_attempt() {
        let backend = Arc::new(FakeBackend::default());
        backend
            .table_script
            .lock()
            .expect("lock")
            .push_back(Step::Transient);
        let repo = repo(&backend);
        repo.upsert_location("g1", &member()).await.expect("second attempt");
        assert_eq!(backend.table_calls(), 2);
    }

    #[tokio::test]
    async fn register_presence_forces_sharing() {
        let backend = Arc::new(FakeBackend::default());
        let repo = repo(&backend);
        repo.register_presence("g1", &member()).await.expect("write");
        let rows = backend.upserts.lock().expect("lock");
        assert_eq!(rows[0].data["sharing"], serde_json::Value::Bool(true));
        assert_eq!(rows[0].key, vec!["group_id", "user_id"]);
        assert_eq!(rows[0].data["group_id"], "g1");
    }
}
