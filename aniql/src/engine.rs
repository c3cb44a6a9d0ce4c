//! Engine facade: entity-scoped operation handles over a storage backend,
//! plus the two transaction forms (step list and interactive closure).

use crate::backend::{Datastore, StorageBackend, TransactionHandle};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{CreateInput, FieldChange, MutationOutcome};
use crate::query_builders::{
    AggregateQueryBuilder, BatchQuery, BatchResult, CountQueryBuilder, CreateManyQueryBuilder,
    CreateQueryBuilder, DeleteManyQueryBuilder, DeleteQueryBuilder, FirstQueryBuilder,
    GroupByQueryBuilder, ManyQueryBuilder, UniqueQueryBuilder, UpdateManyQueryBuilder,
    UpdateQueryBuilder, UpsertQueryBuilder,
};
use crate::schema::Registry;
use crate::types::{BatchCount, SelectedRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Bounds for a transactional session: how long to wait for exclusive
/// acquisition, and how long the open session may live.
#[derive(Copy, Clone, Debug)]
pub struct TransactionOptions {
    pub max_wait: Duration,
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        TransactionOptions {
            max_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

/// The query engine: schema registry plus a connected storage backend.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    backend: Arc<dyn StorageBackend>,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, backend: Arc<dyn StorageBackend>) -> Self {
        Engine { registry, backend }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Operation handle for one entity, executing in auto-commit mode.
    pub fn entity(&self, name: impl Into<String>) -> EntityOps<'_> {
        EntityOps {
            registry: self.registry.clone(),
            store: self.backend.as_ref(),
            entity: name.into(),
        }
    }

    /// List-form transaction: run pre-compiled mutation steps in order on
    /// one session. The first failing step rolls everything back and is
    /// reported with its position.
    pub async fn batch(
        &self,
        steps: Vec<BatchQuery>,
        options: TransactionOptions,
    ) -> Result<Vec<BatchResult>> {
        // Validate every step before paying for a session.
        let mut plans = Vec::with_capacity(steps.len());
        for step in &steps {
            plans.push(step.compile(&self.registry)?);
        }

        let handle = self.acquire(options.max_wait).await?;
        let work = async {
            let mut results = Vec::with_capacity(plans.len());
            for (i, (plan, step)) in plans.iter().zip(&steps).enumerate() {
                match handle.mutate(plan).await {
                    Ok(MutationOutcome::Record(record)) => {
                        results.push(BatchResult::Record(SelectedRecord {
                            fields: record.fields,
                            relations: Default::default(),
                        }));
                    }
                    Ok(MutationOutcome::Count(count)) => {
                        results.push(BatchResult::Count(BatchCount { count }));
                    }
                    Err(source) => {
                        return Err(Error::TransactionStepFailed {
                            step: i,
                            operation: format!("{} {}", step.operation(), step.entity()),
                            source: Box::new(source),
                        });
                    }
                }
            }
            Ok(results)
        };
        // Bind before matching so the timeout future (and its borrows of
        // the handle) is dropped before commit/rollback moves it.
        let outcome = tokio::time::timeout(options.timeout, work).await;
        match outcome {
            Ok(Ok(results)) => {
                handle.commit().await?;
                Ok(results)
            }
            Ok(Err(err)) => {
                handle.rollback().await?;
                Err(err)
            }
            Err(_) => {
                handle.rollback().await?;
                Err(Error::TransactionTimeout)
            }
        }
    }

    /// Interactive transaction: the closure receives a client bound to the
    /// session and decides commit (Ok) or rollback (Err) by its outcome.
    /// Exceeding the session timeout rolls back and fails.
    pub async fn transaction<T, F>(&self, options: TransactionOptions, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(
            &'c TransactionClient,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
    {
        let handle = self.acquire(options.max_wait).await?;
        let client = TransactionClient {
            registry: self.registry.clone(),
            handle,
        };
        let outcome = tokio::time::timeout(options.timeout, f(&client)).await;
        match outcome {
            Ok(Ok(value)) => {
                client.handle.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                client.handle.rollback().await?;
                Err(err)
            }
            Err(_) => {
                client.handle.rollback().await?;
                Err(Error::TransactionTimeout)
            }
        }
    }

    async fn acquire(&self, max_wait: Duration) -> Result<Box<dyn TransactionHandle>> {
        match tokio::time::timeout(max_wait, self.backend.begin()).await {
            Ok(handle) => handle,
            Err(_) => Err(Error::TransactionAcquireTimeout),
        }
    }
}

/// Entity handles scoped to an open transaction. Every operation started
/// from this client reads and writes the session's view.
pub struct TransactionClient {
    registry: Arc<Registry>,
    handle: Box<dyn TransactionHandle>,
}

impl TransactionClient {
    pub fn entity(&self, name: impl Into<String>) -> EntityOps<'_> {
        EntityOps {
            registry: self.registry.clone(),
            store: self.handle.as_ref(),
            entity: name.into(),
        }
    }
}

/// Per-entity operation surface. Each method returns a builder; nothing
/// touches the backend until `exec`.
pub struct EntityOps<'a> {
    registry: Arc<Registry>,
    store: &'a dyn Datastore,
    entity: String,
}

impl<'a> EntityOps<'a> {
    fn ops(&self) -> crate::query_builders::Ops<'a> {
        crate::query_builders::Ops::new(self.registry.clone(), self.store, self.entity.clone())
    }

    pub fn find_unique(&self, where_: FilterNode) -> UniqueQueryBuilder<'a> {
        UniqueQueryBuilder::new(self.ops(), where_)
    }

    pub fn find_first(&self, filter: Option<FilterNode>) -> FirstQueryBuilder<'a> {
        FirstQueryBuilder::new(self.ops(), filter)
    }

    pub fn find_many(&self, filter: Option<FilterNode>) -> ManyQueryBuilder<'a> {
        ManyQueryBuilder::new(self.ops(), filter)
    }

    pub fn create(&self, input: CreateInput) -> CreateQueryBuilder<'a> {
        CreateQueryBuilder::new(self.ops(), input)
    }

    pub fn create_many(&self, inputs: Vec<CreateInput>) -> CreateManyQueryBuilder<'a> {
        CreateManyQueryBuilder::new(self.ops(), inputs)
    }

    pub fn update(&self, where_: FilterNode, changes: Vec<FieldChange>) -> UpdateQueryBuilder<'a> {
        UpdateQueryBuilder::new(self.ops(), where_, changes)
    }

    pub fn update_many(
        &self,
        filter: Option<FilterNode>,
        changes: Vec<FieldChange>,
    ) -> UpdateManyQueryBuilder<'a> {
        UpdateManyQueryBuilder::new(self.ops(), filter, changes)
    }

    pub fn upsert(
        &self,
        where_: FilterNode,
        create: CreateInput,
        update: Vec<FieldChange>,
    ) -> UpsertQueryBuilder<'a> {
        UpsertQueryBuilder::new(self.ops(), where_, create, update)
    }

    pub fn delete(&self, where_: FilterNode) -> DeleteQueryBuilder<'a> {
        DeleteQueryBuilder::new(self.ops(), where_)
    }

    pub fn delete_many(&self, filter: Option<FilterNode>) -> DeleteManyQueryBuilder<'a> {
        DeleteManyQueryBuilder::new(self.ops(), filter)
    }

    pub fn count(&self, filter: Option<FilterNode>) -> CountQueryBuilder<'a> {
        CountQueryBuilder::new(self.ops(), filter)
    }

    pub fn aggregate(&self, filter: Option<FilterNode>) -> AggregateQueryBuilder<'a> {
        AggregateQueryBuilder::new(self.ops(), filter)
    }

    pub fn group_by(&self, by: Vec<String>) -> GroupByQueryBuilder<'a> {
        GroupByQueryBuilder::new(self.ops(), by)
    }
}
