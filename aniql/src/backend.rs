//! Execution-backend contract. The engine resolves requests into logical
//! plans; a connected backend executes them and returns rows or counts.
//! Backends must honor unique-constraint and foreign-key-restrict
//! enforcement as the last line of defense against races the engine's
//! pre-checks cannot fully close.

use crate::aggregate::{AggregatePlan, AggregationPlan, GroupRow};
use crate::error::Result;
use crate::filter::PredicatePlan;
use crate::mutation::{MutationOutcome, MutationPlan};
use crate::pagination::WindowPlan;
use crate::types::Record;
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A resolved logical read: predicate + ordered window + distinct fields.
/// Projection and relation loading happen engine-side on the raw rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadPlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub window: WindowPlan,
    pub distinct: Vec<String>,
}

impl ReadPlan {
    pub fn all(entity: impl Into<String>) -> Self {
        ReadPlan {
            entity: entity.into(),
            predicate: PredicatePlan::True,
            window: WindowPlan::unbounded(),
            distinct: Vec::new(),
        }
    }
}

/// Something plans can be executed against: either the backend itself
/// (auto-commit per call) or an open transaction handle. The per-plan
/// calls are the engine's only suspension points; everything before them
/// is pure computation.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn read(&self, plan: &ReadPlan) -> Result<Vec<Record>>;

    async fn count(&self, plan: &ReadPlan) -> Result<u64>;

    /// Whole-set aggregate over the filtered rows; a single bucket.
    async fn aggregate(&self, plan: &AggregatePlan) -> Result<GroupRow>;

    async fn group_by(&self, plan: &AggregationPlan) -> Result<Vec<GroupRow>>;

    /// Execute one mutation plan atomically: partial application (parent
    /// written, nested child failed) must not be observable afterwards.
    async fn mutate(&self, plan: &MutationPlan) -> Result<MutationOutcome>;

    /// Primary keys on the far side of a many-to-many edge for one source
    /// record.
    async fn join_targets(
        &self,
        join_table: &str,
        source_entity: &str,
        source_key: &Value,
    ) -> Result<Vec<Value>>;
}

/// An exclusive transactional session. The handle is owned by the
/// batch/transaction coordinator for its whole lifetime; no two logical
/// operations may interleave writes on it. Dropping a handle without
/// committing must behave like a rollback.
#[async_trait]
pub trait TransactionHandle: Datastore {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A connected storage backend that can open transactional sessions.
#[async_trait]
pub trait StorageBackend: Datastore {
    /// Open a transaction. Resolves once the session is exclusively
    /// acquired; the coordinator bounds the wait (`max_wait`) and the
    /// session lifetime (`timeout`) around this.
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>>;
}
