//! Per-operation query builders. Each builder collects request arguments,
//! compiles them into logical plans, executes against a datastore and
//! shapes the raw rows into `SelectedRecord`s, loading included relations
//! with follow-up reads.

mod aggregate;
mod batch;
mod count;
mod create;
mod create_many;
mod delete;
mod delete_many;
mod first;
mod group_by;
mod many;
mod unique;
mod update;
mod update_many;
mod upsert;

pub use aggregate::AggregateQueryBuilder;
pub use batch::{BatchQuery, BatchResult};
pub use count::CountQueryBuilder;
pub use create::CreateQueryBuilder;
pub use create_many::CreateManyQueryBuilder;
pub use delete::DeleteQueryBuilder;
pub use delete_many::DeleteManyQueryBuilder;
pub use first::FirstQueryBuilder;
pub use group_by::GroupByQueryBuilder;
pub use many::ManyQueryBuilder;
pub use unique::UniqueQueryBuilder;
pub use update::UpdateQueryBuilder;
pub use update_many::UpdateManyQueryBuilder;
pub use upsert::UpsertQueryBuilder;

use crate::backend::{Datastore, ReadPlan};
use crate::error::Result;
use crate::filter::{FieldOp, PredicatePlan, QueryMode};
use crate::hooks::{self, QueryEvent, QueryResultMeta};
use crate::pagination::WindowPlan;
use crate::projection::{RelationShape, ShapePlan};
use crate::schema::{Cardinality, Registry};
use crate::types::{Record, RelationPayload, SelectedRecord};
use crate::value::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Execution context a builder is bound to: the schema, a datastore (the
/// backend itself or an open transaction) and the entity under operation.
pub(crate) struct Ops<'a> {
    pub registry: Arc<Registry>,
    pub store: &'a dyn Datastore,
    pub entity: String,
}

impl<'a> Ops<'a> {
    pub(crate) fn new(
        registry: Arc<Registry>,
        store: &'a dyn Datastore,
        entity: impl Into<String>,
    ) -> Self {
        Ops {
            registry,
            store,
            entity: entity.into(),
        }
    }
}

/// Run `work` between the before/after hooks, timing it and reporting the
/// row count or error.
pub(crate) async fn instrumented<T, F>(
    builder: &'static str,
    operation: &str,
    entity: &str,
    rows: impl Fn(&T) -> Option<usize>,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let event = QueryEvent {
        builder,
        entity: entity.to_string(),
        details: hooks::compose_details(operation, entity),
    };
    let correlation = hooks::correlation_id();
    hooks::emit_before(&correlation, &event);
    let start = Instant::now();
    let res = work.await;
    let meta = match &res {
        Ok(value) => QueryResultMeta {
            row_count: rows(value),
            error: None,
            elapsed_ms: Some(start.elapsed().as_millis()),
        },
        Err(e) => QueryResultMeta {
            row_count: None,
            error: Some(e.to_string()),
            elapsed_ms: Some(start.elapsed().as_millis()),
        },
    };
    hooks::emit_after(&correlation, &event, &meta);
    res
}

fn eq_pk(registry: &Registry, entity: &str, value: Value) -> Result<PredicatePlan> {
    let desc = registry.describe(entity)?;
    let pk = desc.primary_key_field();
    Ok(PredicatePlan::Leaf {
        field: pk.name.clone(),
        kind: pk.kind,
        op: FieldOp::Equals(value),
        mode: QueryMode::Default,
    })
}

/// Shape raw rows into selected records per the plan, issuing follow-up
/// reads for each included relation. Recursion through nested shapes is
/// boxed because the call depth follows the request.
pub(crate) fn shape_rows<'a>(
    registry: &'a Registry,
    store: &'a dyn Datastore,
    plan: &'a ShapePlan,
    rows: Vec<Record>,
) -> Pin<Box<dyn Future<Output = Result<Vec<SelectedRecord>>> + Send + 'a>> {
    Box::pin(async move {
        let desc = registry.describe(&plan.entity)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut shaped = SelectedRecord::default();
            for field in &plan.fields {
                shaped
                    .fields
                    .insert(field.clone(), row.get(field).clone());
            }
            for rel_shape in &plan.relations {
                let payload = load_relation(registry, store, desc, &row, rel_shape).await?;
                shaped
                    .relations
                    .insert(rel_shape.relation.name.clone(), payload);
            }
            out.push(shaped);
        }
        Ok(out)
    })
}

async fn load_relation(
    registry: &Registry,
    store: &dyn Datastore,
    parent: &crate::schema::EntityDescriptor,
    row: &Record,
    shape: &RelationShape,
) -> Result<RelationPayload> {
    let rel = &shape.relation;
    let target_desc = registry.describe(&rel.target)?;

    match rel.cardinality {
        Cardinality::One | Cardinality::OptionalOne => {
            let fk = row.get(&rel.foreign_key);
            if fk.is_null() {
                return Ok(RelationPayload::One(None));
            }
            let predicate = eq_pk(registry, &rel.target, fk.clone())?;
            let read = ReadPlan {
                entity: rel.target.clone(),
                predicate,
                window: WindowPlan::unbounded(),
                distinct: Vec::new(),
            };
            let rows = store.read(&read).await?;
            let shaped = shape_rows(registry, store, &shape.nested, rows).await?;
            Ok(RelationPayload::One(
                shaped.into_iter().next().map(Box::new),
            ))
        }
        Cardinality::Many => {
            let parent_key = row.get(&parent.primary_key).clone();
            let fk_field = target_desc
                .field(&rel.foreign_key)
                .map(|f| (f.name.clone(), f.kind));
            let Some((fk_name, fk_kind)) = fk_field else {
                return Ok(RelationPayload::Many(Vec::new()));
            };
            let link = PredicatePlan::Leaf {
                field: fk_name,
                kind: fk_kind,
                op: FieldOp::Equals(parent_key),
                mode: QueryMode::Default,
            };
            let read = ReadPlan {
                entity: rel.target.clone(),
                predicate: PredicatePlan::And(vec![link, shape.predicate.clone()]),
                window: shape.window.clone(),
                distinct: shape.distinct.clone(),
            };
            let rows = store.read(&read).await?;
            let shaped = shape_rows(registry, store, &shape.nested, rows).await?;
            Ok(RelationPayload::Many(shaped))
        }
        Cardinality::ManyToMany => {
            let parent_key = row.get(&parent.primary_key);
            let join_table = rel.join_table.as_deref().unwrap_or_default();
            let ids = store
                .join_targets(join_table, &parent.name, parent_key)
                .await?;
            let pk = target_desc.primary_key_field();
            let link = PredicatePlan::Leaf {
                field: pk.name.clone(),
                kind: pk.kind,
                op: FieldOp::InVec(ids),
                mode: QueryMode::Default,
            };
            let read = ReadPlan {
                entity: rel.target.clone(),
                predicate: PredicatePlan::And(vec![link, shape.predicate.clone()]),
                window: shape.window.clone(),
                distinct: shape.distinct.clone(),
            };
            let rows = store.read(&read).await?;
            let shaped = shape_rows(registry, store, &shape.nested, rows).await?;
            Ok(RelationPayload::Many(shaped))
        }
    }
}
