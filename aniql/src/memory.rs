//! Reference in-memory storage backend. Implements the full `Datastore`
//! contract over ordered tables with snapshot-based transactions, and
//! enforces unique constraints and foreign-key restrict policy exactly as
//! the backend contract requires.

use crate::aggregate::{self, AggregatePlan, AggregationPlan, GroupRow};
use crate::backend::{Datastore, ReadPlan, StorageBackend, TransactionHandle};
use crate::error::{Error, Result};
use crate::filter::{self, PredicatePlan, Quantifier};
use crate::mutation::{
    self, CreatePlan, DeleteManyPlan, DeletePlan, FieldChange, FkCheck, MutationOutcome,
    MutationPlan, SetOp, UniqueCheck, UpdateManyPlan, UpdatePlan, UpsertPlan,
};
use crate::pagination;
use crate::schema::{Cardinality, EntityDescriptor, Registry};
use crate::types::Record;
use crate::value::{ScalarKind, Value};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Record>,
}

#[derive(Clone, Debug, PartialEq)]
struct JoinRow {
    a_entity: String,
    a_key: Value,
    b_entity: String,
    b_key: Value,
}

#[derive(Clone, Debug, Default)]
struct Store {
    tables: BTreeMap<String, Table>,
    joins: BTreeMap<String, Vec<JoinRow>>,
}

/// In-memory backend. The whole store sits behind one async mutex; a
/// transaction holds the guard for its entire lifetime, which gives the
/// exclusive-session ownership the coordinator contract requires.
pub struct MemoryBackend {
    registry: Arc<Registry>,
    store: Arc<Mutex<Store>>,
}

impl MemoryBackend {
    pub fn new(registry: Arc<Registry>) -> Self {
        let mut store = Store::default();
        for name in registry.entity_names() {
            store.tables.insert(
                name.to_string(),
                Table {
                    next_id: 1,
                    rows: Vec::new(),
                },
            );
        }
        MemoryBackend {
            registry,
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl Datastore for MemoryBackend {
    async fn read(&self, plan: &ReadPlan) -> Result<Vec<Record>> {
        let store = self.store.lock().await;
        exec_read(&self.registry, &store, plan)
    }

    async fn count(&self, plan: &ReadPlan) -> Result<u64> {
        let store = self.store.lock().await;
        Ok(exec_read(&self.registry, &store, plan)?.len() as u64)
    }

    async fn aggregate(&self, plan: &AggregatePlan) -> Result<GroupRow> {
        let store = self.store.lock().await;
        exec_aggregate(&self.registry, &store, plan)
    }

    async fn group_by(&self, plan: &AggregationPlan) -> Result<Vec<GroupRow>> {
        let store = self.store.lock().await;
        exec_group_by(&self.registry, &store, plan)
    }

    async fn mutate(&self, plan: &MutationPlan) -> Result<MutationOutcome> {
        let mut store = self.store.lock().await;
        // Auto-commit calls are atomic too: roll the whole store back if
        // any part of the plan fails.
        let snapshot = store.clone();
        match exec_mutation(&self.registry, &mut store, plan) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                *store = snapshot;
                Err(err)
            }
        }
    }

    async fn join_targets(
        &self,
        join_table: &str,
        source_entity: &str,
        source_key: &Value,
    ) -> Result<Vec<Value>> {
        let store = self.store.lock().await;
        Ok(join_targets_in(&store, join_table, source_entity, source_key))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn TransactionHandle>> {
        let guard = self.store.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTransaction {
            registry: self.registry.clone(),
            inner: Mutex::new(TxnInner {
                guard,
                snapshot,
                finished: false,
            }),
        }))
    }
}

struct TxnInner {
    guard: OwnedMutexGuard<Store>,
    snapshot: Store,
    finished: bool,
}

/// Open transaction over the exclusively-held store. Dropping the handle
/// without commit restores the snapshot, so a cancelled in-flight
/// transaction resolves to fully rolled back.
pub struct MemoryTransaction {
    registry: Arc<Registry>,
    inner: Mutex<TxnInner>,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            if !inner.finished {
                let snapshot = inner.snapshot.clone();
                *inner.guard = snapshot;
            }
        }
    }
}

#[async_trait]
impl Datastore for MemoryTransaction {
    async fn read(&self, plan: &ReadPlan) -> Result<Vec<Record>> {
        let inner = self.inner.lock().await;
        exec_read(&self.registry, &inner.guard, plan)
    }

    async fn count(&self, plan: &ReadPlan) -> Result<u64> {
        let inner = self.inner.lock().await;
        Ok(exec_read(&self.registry, &inner.guard, plan)?.len() as u64)
    }

    async fn aggregate(&self, plan: &AggregatePlan) -> Result<GroupRow> {
        let inner = self.inner.lock().await;
        exec_aggregate(&self.registry, &inner.guard, plan)
    }

    async fn group_by(&self, plan: &AggregationPlan) -> Result<Vec<GroupRow>> {
        let inner = self.inner.lock().await;
        exec_group_by(&self.registry, &inner.guard, plan)
    }

    async fn mutate(&self, plan: &MutationPlan) -> Result<MutationOutcome> {
        let mut inner = self.inner.lock().await;
        exec_mutation(&self.registry, &mut inner.guard, plan)
    }

    async fn join_targets(
        &self,
        join_table: &str,
        source_entity: &str,
        source_key: &Value,
    ) -> Result<Vec<Value>> {
        let inner = self.inner.lock().await;
        Ok(join_targets_in(
            &inner.guard,
            join_table,
            source_entity,
            source_key,
        ))
    }
}

#[async_trait]
impl TransactionHandle for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.finished = true;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let snapshot = inner.snapshot.clone();
        *inner.guard = snapshot;
        inner.finished = true;
        Ok(())
    }
}

// ---- plan execution over the store ----

fn table<'s>(store: &'s Store, entity: &str) -> Result<&'s Table> {
    store.tables.get(entity).ok_or_else(|| Error::UnknownEntity {
        entity: entity.to_string(),
    })
}

fn exec_read(registry: &Registry, store: &Store, plan: &ReadPlan) -> Result<Vec<Record>> {
    let desc = registry.describe(&plan.entity)?;
    let tbl = table(store, &desc.name)?;
    let mut rows: Vec<Record> = tbl
        .rows
        .iter()
        .filter(|r| predicate_matches(registry, store, desc, &plan.predicate, r))
        .cloned()
        .collect();

    let order = if plan.window.order.is_empty() {
        vec![crate::types::OrderBy::asc(desc.primary_key.clone())]
    } else {
        plan.window.order.clone()
    };
    pagination::sort_records(&mut rows, &order, &desc.primary_key);

    if !plan.distinct.is_empty() {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        rows.retain(|r| {
            let key: Vec<Value> = plan.distinct.iter().map(|f| r.get(f).clone()).collect();
            let dup = seen.iter().any(|k| {
                k.iter()
                    .zip(&key)
                    .all(|(a, b)| a.compare(b) == Ordering::Equal)
            });
            if !dup {
                seen.push(key);
            }
            !dup
        });
    }

    Ok(pagination::apply_window(rows, &plan.window, &desc.primary_key))
}

fn exec_aggregate(registry: &Registry, store: &Store, plan: &AggregatePlan) -> Result<GroupRow> {
    let desc = registry.describe(&plan.entity)?;
    let tbl = table(store, &desc.name)?;
    let rows: Vec<Record> = tbl
        .rows
        .iter()
        .filter(|r| predicate_matches(registry, store, desc, &plan.predicate, r))
        .cloned()
        .collect();
    let mut aggregates = BTreeMap::new();
    aggregates.insert(
        "_count".to_string(),
        aggregate::compute(&rows, &aggregate::AggregateSelect::count()),
    );
    for agg in &plan.aggregates {
        aggregates.insert(agg.alias(), aggregate::compute(&rows, agg));
    }
    Ok(GroupRow {
        key: BTreeMap::new(),
        aggregates,
    })
}

fn exec_group_by(
    registry: &Registry,
    store: &Store,
    plan: &AggregationPlan,
) -> Result<Vec<GroupRow>> {
    let desc = registry.describe(&plan.entity)?;
    let tbl = table(store, &desc.name)?;
    let rows: Vec<Record> = tbl
        .rows
        .iter()
        .filter(|r| predicate_matches(registry, store, desc, &plan.predicate, r))
        .cloned()
        .collect();
    Ok(aggregate::evaluate_group_by(&rows, plan))
}

/// Evaluate a compiled predicate against one candidate row, reaching
/// through relations for quantified sub-plans.
fn predicate_matches(
    registry: &Registry,
    store: &Store,
    desc: &EntityDescriptor,
    plan: &PredicatePlan,
    record: &Record,
) -> bool {
    match plan {
        PredicatePlan::True => true,
        PredicatePlan::False => false,
        PredicatePlan::Leaf {
            field, op, mode, ..
        } => filter::leaf_matches(op, *mode, record.get(field)),
        PredicatePlan::And(parts) => parts
            .iter()
            .all(|p| predicate_matches(registry, store, desc, p, record)),
        PredicatePlan::Or(parts) => parts
            .iter()
            .any(|p| predicate_matches(registry, store, desc, p, record)),
        PredicatePlan::Not(inner) => !predicate_matches(registry, store, desc, inner, record),
        PredicatePlan::Relation {
            relation,
            quantifier,
            plan,
        } => {
            let Ok(target_desc) = registry.describe(&relation.target) else {
                return false;
            };
            let Ok(target_tbl) = table(store, &target_desc.name) else {
                return false;
            };
            let related: Vec<&Record> = match relation.cardinality {
                Cardinality::One | Cardinality::OptionalOne => {
                    let fk = record.get(&relation.foreign_key);
                    if fk.is_null() {
                        Vec::new()
                    } else {
                        target_tbl
                            .rows
                            .iter()
                            .filter(|r| {
                                r.get(&target_desc.primary_key).compare(fk) == Ordering::Equal
                            })
                            .collect()
                    }
                }
                Cardinality::Many => {
                    let pk = record.get(&desc.primary_key);
                    target_tbl
                        .rows
                        .iter()
                        .filter(|r| r.get(&relation.foreign_key).compare(pk) == Ordering::Equal)
                        .collect()
                }
                Cardinality::ManyToMany => {
                    let pk = record.get(&desc.primary_key);
                    let join_table = relation.join_table.as_deref().unwrap_or_default();
                    let ids = join_targets_in(store, join_table, &desc.name, pk);
                    target_tbl
                        .rows
                        .iter()
                        .filter(|r| {
                            ids.iter().any(|id| {
                                r.get(&target_desc.primary_key).compare(id) == Ordering::Equal
                            })
                        })
                        .collect()
                }
            };
            let matches =
                |r: &&Record| predicate_matches(registry, store, target_desc, plan, r);
            match quantifier {
                Quantifier::Some => related.iter().any(matches),
                Quantifier::Every => related.iter().all(matches),
                Quantifier::None => !related.iter().any(matches),
            }
        }
    }
}

fn join_targets_in(
    store: &Store,
    join_table: &str,
    source_entity: &str,
    source_key: &Value,
) -> Vec<Value> {
    let Some(rows) = store.joins.get(join_table) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for jr in rows {
        if jr.a_entity == source_entity && jr.a_key.compare(source_key) == Ordering::Equal {
            out.push(jr.b_key.clone());
        } else if jr.b_entity == source_entity && jr.b_key.compare(source_key) == Ordering::Equal {
            out.push(jr.a_key.clone());
        }
    }
    out
}

fn exec_mutation(
    registry: &Registry,
    store: &mut Store,
    plan: &MutationPlan,
) -> Result<MutationOutcome> {
    match plan {
        MutationPlan::Create(create) => {
            exec_create(registry, store, create).map(MutationOutcome::Record)
        }
        MutationPlan::CreateMany {
            plans,
            skip_duplicates,
        } => {
            let mut count = 0;
            for p in plans {
                match exec_create(registry, store, p) {
                    Ok(_) => count += 1,
                    Err(Error::UniqueViolation { .. }) if *skip_duplicates => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(MutationOutcome::Count(count))
        }
        MutationPlan::Update(update) => {
            exec_update(registry, store, update).map(MutationOutcome::Record)
        }
        MutationPlan::UpdateMany(update) => {
            exec_update_many(registry, store, update).map(MutationOutcome::Count)
        }
        MutationPlan::Upsert(upsert) => {
            exec_upsert(registry, store, upsert).map(MutationOutcome::Record)
        }
        MutationPlan::Delete(delete) => {
            exec_delete(registry, store, delete).map(MutationOutcome::Record)
        }
        MutationPlan::DeleteMany(delete) => {
            exec_delete_many(registry, store, delete).map(MutationOutcome::Count)
        }
    }
}

fn find_unique<'s>(
    registry: &Registry,
    store: &'s Store,
    desc: &EntityDescriptor,
    predicate: &PredicatePlan,
) -> Result<Option<&'s Record>> {
    let tbl = table(store, &desc.name)?;
    Ok(tbl
        .rows
        .iter()
        .find(|r| predicate_matches(registry, store, desc, predicate, r)))
}

fn check_unique(
    store: &Store,
    desc: &EntityDescriptor,
    checks: &[UniqueCheck],
    exclude_pk: Option<&Value>,
) -> Result<()> {
    let tbl = table(store, &desc.name)?;
    for check in checks {
        let clash = tbl.rows.iter().any(|r| {
            if let Some(pk) = exclude_pk {
                if r.get(&desc.primary_key).compare(pk) == Ordering::Equal {
                    return false;
                }
            }
            check
                .fields
                .iter()
                .all(|(f, v)| r.get(f).compare(v) == Ordering::Equal)
        });
        if clash {
            return Err(Error::UniqueViolation {
                entity: desc.name.clone(),
                constraint: check.constraint.clone(),
            });
        }
    }
    Ok(())
}

fn check_fks(registry: &Registry, store: &Store, entity: &str, checks: &[FkCheck]) -> Result<()> {
    for check in checks {
        let target = registry.describe(&check.target)?;
        let tbl = table(store, &target.name)?;
        let exists = tbl
            .rows
            .iter()
            .any(|r| r.get(&target.primary_key).compare(&check.value) == Ordering::Equal);
        if !exists {
            return Err(Error::ForeignKeyNotFound {
                entity: entity.to_string(),
                field: check.field.clone(),
                target: check.target.clone(),
            });
        }
    }
    Ok(())
}

fn exec_create(registry: &Registry, store: &mut Store, plan: &CreatePlan) -> Result<Record> {
    let desc = registry.describe(&plan.entity)?.clone();
    let mut values = plan.values.clone();

    // Connect lookups resolve FKs before the parent row exists: this
    // entity owns the FK, so the related record must already be there.
    for lookup in &plan.lookups {
        let target = registry.describe(&lookup.relation.target)?;
        let found = find_unique(registry, store, target, &lookup.predicate)?;
        let Some(found) = found else {
            return Err(Error::RecordNotFound {
                entity: target.name.clone(),
                condition: format!("connect via relation '{}'", lookup.relation.name),
            });
        };
        values.fields.insert(
            lookup.fk_field.clone(),
            found.get(&target.primary_key).clone(),
        );
    }

    check_fks(registry, store, &desc.name, &plan.fk_checks)?;
    // Re-shape unique checks from the final values so connect-resolved FKs
    // participate in composite constraints.
    let checks = mutation::shape_unique_checks(&desc, &values);
    check_unique(store, &desc, &checks, None)?;

    let tbl = store.tables.get_mut(&desc.name).ok_or_else(|| Error::UnknownEntity {
        entity: desc.name.clone(),
    })?;
    if values.get(&desc.primary_key).is_null() {
        let pk_field = desc.primary_key_field();
        if pk_field.kind == ScalarKind::Integer {
            values
                .fields
                .insert(desc.primary_key.clone(), Value::Int(tbl.next_id));
            tbl.next_id += 1;
        }
    } else if let Some(n) = values.get(&desc.primary_key).as_i64() {
        tbl.next_id = tbl.next_id.max(n + 1);
    }
    let parent_pk = values.get(&desc.primary_key).clone();
    tbl.rows.push(values.clone());

    // Parent before children: the children own the FK pointing back here.
    for child in &plan.children {
        for child_plan in &child.plans {
            let mut injected = child_plan.clone();
            injected
                .values
                .fields
                .insert(child.injected_fk.clone(), parent_pk.clone());
            exec_create(registry, store, &injected)?;
        }
    }

    for join in &plan.joins {
        apply_join_edit(registry, store, &desc, &parent_pk, join)?;
    }

    Ok(values)
}

fn apply_join_edit(
    registry: &Registry,
    store: &mut Store,
    desc: &EntityDescriptor,
    pk: &Value,
    edit: &mutation::JoinEdit,
) -> Result<()> {
    let target = registry.describe(&edit.relation.target)?.clone();
    let found = find_unique(registry, store, &target, &edit.predicate)?.cloned();
    let Some(found) = found else {
        return Err(Error::RecordNotFound {
            entity: target.name.clone(),
            condition: format!("connect via relation '{}'", edit.relation.name),
        });
    };
    let target_pk = found.get(&target.primary_key).clone();
    let join_table = edit.relation.join_table.clone().unwrap_or_default();
    let rows = store.joins.entry(join_table).or_default();
    let row = JoinRow {
        a_entity: desc.name.clone(),
        a_key: pk.clone(),
        b_entity: target.name.clone(),
        b_key: target_pk,
    };
    let pos = rows.iter().position(|r| {
        (r.a_entity == row.a_entity
            && r.a_key.compare(&row.a_key) == Ordering::Equal
            && r.b_entity == row.b_entity
            && r.b_key.compare(&row.b_key) == Ordering::Equal)
            || (r.a_entity == row.b_entity
                && r.a_key.compare(&row.b_key) == Ordering::Equal
                && r.b_entity == row.a_entity
                && r.b_key.compare(&row.a_key) == Ordering::Equal)
    });
    if edit.connect {
        if pos.is_none() {
            rows.push(row);
        }
    } else if let Some(pos) = pos {
        rows.remove(pos);
    }
    Ok(())
}

fn apply_changes(
    desc: &EntityDescriptor,
    row: &Record,
    changes: &[FieldChange],
) -> Result<Record> {
    let mut out = row.clone();
    for change in changes {
        let fd = desc
            .field(&change.field)
            .ok_or_else(|| Error::UnknownField {
                entity: desc.name.clone(),
                field: change.field.clone(),
            })?;
        let current = out.get(&change.field).clone();
        let next = match &change.op {
            SetOp::Set(v) => v.clone(),
            SetOp::Increment(v) | SetOp::Decrement(v) | SetOp::Multiply(v) | SetOp::Divide(v) => {
                let sign_op = &change.op;
                if fd.kind == ScalarKind::Integer {
                    let cur = current.as_i64().unwrap_or(0);
                    let delta = v.as_i64().unwrap_or(0);
                    let val = match sign_op {
                        SetOp::Increment(_) => cur + delta,
                        SetOp::Decrement(_) => cur - delta,
                        SetOp::Multiply(_) => cur * delta,
                        // Zero is rejected at compile time; the guard covers
                        // callers handing plans straight to the backend.
                        SetOp::Divide(_) => {
                            cur.checked_div(delta).ok_or_else(|| Error::QueryValidation {
                                entity: desc.name.clone(),
                                message: format!(
                                    "division by zero in update of '{}'",
                                    fd.name
                                ),
                            })?
                        }
                        SetOp::Set(_) => unreachable!(),
                    };
                    Value::Int(val)
                } else {
                    let cur = current.as_f64().unwrap_or(0.0);
                    let delta = v.as_f64().unwrap_or(0.0);
                    let val = match sign_op {
                        SetOp::Increment(_) => cur + delta,
                        SetOp::Decrement(_) => cur - delta,
                        SetOp::Multiply(_) => cur * delta,
                        SetOp::Divide(_) => cur / delta,
                        SetOp::Set(_) => unreachable!(),
                    };
                    Value::Float(val)
                }
            }
        };
        out.fields.insert(change.field.clone(), next);
    }
    Ok(out)
}

fn recheck_constraints(
    store: &Store,
    desc: &EntityDescriptor,
    updated: &Record,
    constraints: &[crate::schema::UniqueConstraint],
) -> Result<()> {
    let checks: Vec<UniqueCheck> = constraints
        .iter()
        .filter_map(|c| {
            let fields: Option<Vec<(String, Value)>> = c
                .fields
                .iter()
                .map(|f| {
                    let v = updated.get(f);
                    if v.is_null() {
                        None
                    } else {
                        Some((f.clone(), v.clone()))
                    }
                })
                .collect();
            fields.map(|fields| UniqueCheck {
                constraint: c.name.clone(),
                fields,
            })
        })
        .collect();
    check_unique(
        store,
        desc,
        &checks,
        Some(updated.get(&desc.primary_key)),
    )
}

fn exec_update(registry: &Registry, store: &mut Store, plan: &UpdatePlan) -> Result<Record> {
    let desc = registry.describe(&plan.entity)?.clone();
    let Some(existing) = find_unique(registry, store, &desc, &plan.predicate)?.cloned() else {
        return Err(Error::RecordNotFound {
            entity: desc.name.clone(),
            condition: plan.condition.clone(),
        });
    };
    let updated = apply_changes(&desc, &existing, &plan.changes)?;
    check_fks(registry, store, &desc.name, &plan.fk_checks)?;
    recheck_constraints(store, &desc, &updated, &plan.recheck_constraints)?;

    let pk = existing.get(&desc.primary_key).clone();
    replace_row(store, &desc, &pk, updated.clone())?;
    for join in &plan.joins {
        apply_join_edit(registry, store, &desc, &pk, join)?;
    }
    Ok(updated)
}

fn exec_update_many(
    registry: &Registry,
    store: &mut Store,
    plan: &UpdateManyPlan,
) -> Result<u64> {
    let desc = registry.describe(&plan.entity)?.clone();
    let tbl = table(store, &desc.name)?;
    let mut matched: Vec<Record> = tbl
        .rows
        .iter()
        .filter(|r| predicate_matches(registry, store, &desc, &plan.predicate, r))
        .cloned()
        .collect();
    pagination::sort_records(
        &mut matched,
        &[crate::types::OrderBy::asc(desc.primary_key.clone())],
        &desc.primary_key,
    );
    if let Some(limit) = plan.limit {
        matched.truncate(limit as usize);
    }
    check_fks(registry, store, &desc.name, &plan.fk_checks)?;
    let mut count = 0;
    for row in matched {
        let updated = apply_changes(&desc, &row, &plan.changes)?;
        recheck_constraints(store, &desc, &updated, &plan.recheck_constraints)?;
        let pk = row.get(&desc.primary_key).clone();
        replace_row(store, &desc, &pk, updated)?;
        count += 1;
    }
    Ok(count)
}

fn exec_upsert(registry: &Registry, store: &mut Store, plan: &UpsertPlan) -> Result<Record> {
    let desc = registry.describe(&plan.entity)?.clone();
    let existing = find_unique(registry, store, &desc, &plan.predicate)?.cloned();
    match existing {
        // Exactly one branch ever applies, never a merge of both.
        Some(row) => {
            let updated = apply_changes(&desc, &row, &plan.update)?;
            recheck_constraints(store, &desc, &updated, &plan.recheck_constraints)?;
            let pk = row.get(&desc.primary_key).clone();
            replace_row(store, &desc, &pk, updated.clone())?;
            Ok(updated)
        }
        None => exec_create(registry, store, &plan.create),
    }
}

fn restrict_check(
    registry: &Registry,
    store: &Store,
    desc: &EntityDescriptor,
    pk: &Value,
) -> Result<()> {
    // Every FK in this schema is non-cascading: a referenced record can
    // not be deleted while a referencing row exists.
    for entity in registry.entity_names() {
        let other = registry.describe(entity)?;
        for rel in &other.relations {
            if !rel.source_owns_fk() || rel.target != desc.name {
                continue;
            }
            let tbl = table(store, &other.name)?;
            let referenced = tbl
                .rows
                .iter()
                .any(|r| r.get(&rel.foreign_key).compare(pk) == Ordering::Equal);
            if referenced {
                return Err(Error::ReferentialIntegrityViolation {
                    entity: desc.name.clone(),
                    referencing_entity: other.name.clone(),
                    relation: rel.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn exec_delete(registry: &Registry, store: &mut Store, plan: &DeletePlan) -> Result<Record> {
    let desc = registry.describe(&plan.entity)?.clone();
    let Some(existing) = find_unique(registry, store, &desc, &plan.predicate)?.cloned() else {
        return Err(Error::RecordNotFound {
            entity: desc.name.clone(),
            condition: plan.condition.clone(),
        });
    };
    let pk = existing.get(&desc.primary_key).clone();
    restrict_check(registry, store, &desc, &pk)?;
    remove_row(store, &desc, &pk)?;
    prune_joins(store, &desc.name, &pk);
    Ok(existing)
}

fn exec_delete_many(
    registry: &Registry,
    store: &mut Store,
    plan: &DeleteManyPlan,
) -> Result<u64> {
    let desc = registry.describe(&plan.entity)?.clone();
    let tbl = table(store, &desc.name)?;
    let mut matched: Vec<Record> = tbl
        .rows
        .iter()
        .filter(|r| predicate_matches(registry, store, &desc, &plan.predicate, r))
        .cloned()
        .collect();
    pagination::sort_records(
        &mut matched,
        &[crate::types::OrderBy::asc(desc.primary_key.clone())],
        &desc.primary_key,
    );
    if let Some(limit) = plan.limit {
        matched.truncate(limit as usize);
    }
    let mut count = 0;
    for row in matched {
        let pk = row.get(&desc.primary_key).clone();
        restrict_check(registry, store, &desc, &pk)?;
        remove_row(store, &desc, &pk)?;
        prune_joins(store, &desc.name, &pk);
        count += 1;
    }
    Ok(count)
}

fn replace_row(
    store: &mut Store,
    desc: &EntityDescriptor,
    pk: &Value,
    updated: Record,
) -> Result<()> {
    let tbl = store
        .tables
        .get_mut(&desc.name)
        .ok_or_else(|| Error::UnknownEntity {
            entity: desc.name.clone(),
        })?;
    if let Some(slot) = tbl
        .rows
        .iter_mut()
        .find(|r| r.get(&desc.primary_key).compare(pk) == Ordering::Equal)
    {
        *slot = updated;
    }
    Ok(())
}

fn remove_row(store: &mut Store, desc: &EntityDescriptor, pk: &Value) -> Result<()> {
    let tbl = store
        .tables
        .get_mut(&desc.name)
        .ok_or_else(|| Error::UnknownEntity {
            entity: desc.name.clone(),
        })?;
    tbl.rows
        .retain(|r| r.get(&desc.primary_key).compare(pk) != Ordering::Equal);
    Ok(())
}

/// The hidden join table cascades with its endpoints even though scalar
/// FKs never do: join rows carry no payload of their own.
fn prune_joins(store: &mut Store, entity: &str, pk: &Value) {
    for rows in store.joins.values_mut() {
        rows.retain(|r| {
            !(r.a_entity == entity && r.a_key.compare(pk) == Ordering::Equal)
                && !(r.b_entity == entity && r.b_key.compare(pk) == Ordering::Equal)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FieldOp, FilterNode};
    use crate::mutation::{compile_create, compile_delete, compile_update, CreateInput};
    use crate::schema::test_schema::library;
    use crate::types::OrderBy;

    fn backend() -> MemoryBackend {
        let _ = env_logger::builder().is_test(true).try_init();
        MemoryBackend::new(library().shared())
    }

    async fn seed_author(be: &MemoryBackend, name: &str) -> Record {
        let input = CreateInput::new(Record::new().with("name", name));
        let plan = compile_create(be.registry(), "Author", &input).unwrap();
        match be.mutate(&MutationPlan::Create(plan)).await.unwrap() {
            MutationOutcome::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        }
    }

    async fn seed_book(be: &MemoryBackend, title: &str, author_id: i64) -> Record {
        let input = CreateInput::new(
            Record::new().with("title", title).with("author_id", author_id),
        );
        let plan = compile_create(be.registry(), "Book", &input).unwrap();
        match be.mutate(&MutationPlan::Create(plan)).await.unwrap() {
            MutationOutcome::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_keys() {
        let be = backend();
        let a = seed_author(&be, "Ann").await;
        let b = seed_author(&be, "Ben").await;
        assert_eq!(a.get("id"), &Value::Int(1));
        assert_eq!(b.get("id"), &Value::Int(2));

        let rows = be.read(&ReadPlan::all("Author")).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn unique_marker_and_composite_are_enforced() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let input = CreateInput::new(Record::new().with("name", "Ann"));
        let plan = compile_create(be.registry(), "Author", &input).unwrap();
        let err = be.mutate(&MutationPlan::Create(plan)).await.unwrap_err();
        assert!(matches!(err, Error::UniqueViolation { ref constraint, .. } if constraint == "name"));

        let author_id = ann.get("id").as_i64().unwrap();
        seed_book(&be, "Dune", author_id).await;
        let dup = CreateInput::new(
            Record::new().with("title", "Dune").with("author_id", author_id),
        );
        let plan = compile_create(be.registry(), "Book", &dup).unwrap();
        let err = be.mutate(&MutationPlan::Create(plan)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UniqueViolation { ref constraint, .. } if constraint == "author_id_title"
        ));
    }

    #[tokio::test]
    async fn create_rejects_dangling_foreign_key() {
        let be = backend();
        let input = CreateInput::new(
            Record::new().with("title", "Ghost").with("author_id", 99),
        );
        let plan = compile_create(be.registry(), "Book", &input).unwrap();
        let err = be.mutate(&MutationPlan::Create(plan)).await.unwrap_err();
        assert!(matches!(err, Error::ForeignKeyNotFound { .. }));
        // Nothing was written.
        assert_eq!(be.count(&ReadPlan::all("Book")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_applies_atomic_increment() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let id = ann.get("id").as_i64().unwrap();
        let book = seed_book(&be, "Dune", id).await;
        let book_id = book.get("id").as_i64().unwrap();

        let set_pages = crate::mutation::FieldChange::set("pages", 100i64);
        let plan = compile_update(
            be.registry(),
            "Book",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(book_id))),
            &[set_pages],
            &[],
        )
        .unwrap();
        be.mutate(&MutationPlan::Update(plan)).await.unwrap();

        let bump = crate::mutation::FieldChange {
            field: "pages".into(),
            op: SetOp::Increment(Value::Int(20)),
        };
        let plan = compile_update(
            be.registry(),
            "Book",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(book_id))),
            &[bump],
            &[],
        )
        .unwrap();
        let updated = match be.mutate(&MutationPlan::Update(plan)).await.unwrap() {
            MutationOutcome::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(updated.get("pages"), &Value::Int(120));
    }

    #[tokio::test]
    async fn divide_honors_negative_divisors() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let id = ann.get("id").as_i64().unwrap();
        let book = seed_book(&be, "Dune", id).await;
        let book_id = book.get("id").as_i64().unwrap();

        let set_pages = crate::mutation::FieldChange::set("pages", 100i64);
        let plan = compile_update(
            be.registry(),
            "Book",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(book_id))),
            &[set_pages],
            &[],
        )
        .unwrap();
        be.mutate(&MutationPlan::Update(plan)).await.unwrap();

        let halve = crate::mutation::FieldChange {
            field: "pages".into(),
            op: SetOp::Divide(Value::Int(-2)),
        };
        let plan = compile_update(
            be.registry(),
            "Book",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(book_id))),
            &[halve],
            &[],
        )
        .unwrap();
        let updated = match be.mutate(&MutationPlan::Update(plan)).await.unwrap() {
            MutationOutcome::Record(r) => r,
            other => panic!("expected record, got {:?}", other),
        };
        assert_eq!(updated.get("pages"), &Value::Int(-50));

        // A zero divisor handed straight to the backend fails rather than
        // silently clamping.
        let mut bad = compile_update(
            be.registry(),
            "Book",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(book_id))),
            &[],
            &[],
        )
        .unwrap();
        bad.changes.push(crate::mutation::FieldChange {
            field: "pages".into(),
            op: SetOp::Divide(Value::Int(0)),
        });
        assert!(matches!(
            be.mutate(&MutationPlan::Update(bad)).await,
            Err(Error::QueryValidation { .. })
        ));
    }

    #[tokio::test]
    async fn delete_is_restricted_while_referenced() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let id = ann.get("id").as_i64().unwrap();
        seed_book(&be, "Dune", id).await;

        let plan = compile_delete(
            be.registry(),
            "Author",
            &FilterNode::leaf("id", FieldOp::Equals(Value::Int(id))),
        )
        .unwrap();
        let err = be.mutate(&MutationPlan::Delete(plan.clone())).await.unwrap_err();
        assert!(matches!(err, Error::ReferentialIntegrityViolation { .. }));
        assert_eq!(be.count(&ReadPlan::all("Author")).await.unwrap(), 1);

        // Removing the referencing row unblocks the delete.
        let del_books = crate::mutation::compile_delete_many(be.registry(), "Book", None, None).unwrap();
        be.mutate(&MutationPlan::DeleteMany(del_books)).await.unwrap();
        be.mutate(&MutationPlan::Delete(plan)).await.unwrap();
        assert_eq!(be.count(&ReadPlan::all("Author")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn relation_quantifiers_reach_through_edges() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let ben = seed_author(&be, "Ben").await;
        let ann_id = ann.get("id").as_i64().unwrap();
        seed_book(&be, "Dune", ann_id).await;

        let node = FilterNode::Relation {
            relation: "books".into(),
            quantifier: Quantifier::Some,
            filter: Box::new(FilterNode::leaf(
                "title",
                FieldOp::Equals(Value::from("Dune")),
            )),
        };
        let predicate = filter::compile(be.registry(), "Author", &node).unwrap();
        let read = ReadPlan {
            entity: "Author".into(),
            predicate,
            window: crate::pagination::WindowPlan::unbounded(),
            distinct: Vec::new(),
        };
        let rows = be.read(&read).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), &Value::from("Ann"));

        // `none` is vacuously true for Ben, who has no books at all.
        let node = FilterNode::Relation {
            relation: "books".into(),
            quantifier: Quantifier::None,
            filter: Box::new(FilterNode::leaf(
                "title",
                FieldOp::Equals(Value::from("Dune")),
            )),
        };
        let predicate = filter::compile(be.registry(), "Author", &node).unwrap();
        let rows = be
            .read(&ReadPlan {
                entity: "Author".into(),
                predicate,
                window: crate::pagination::WindowPlan::unbounded(),
                distinct: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), ben.get("id"));
    }

    #[tokio::test]
    async fn rollback_restores_the_pre_transaction_state() {
        let be = backend();
        seed_author(&be, "Ann").await;

        let txn = be.begin().await.unwrap();
        let input = CreateInput::new(Record::new().with("name", "Ben"));
        let plan = compile_create(be.registry(), "Author", &input).unwrap();
        txn.mutate(&MutationPlan::Create(plan)).await.unwrap();
        assert_eq!(txn.count(&ReadPlan::all("Author")).await.unwrap(), 2);
        txn.rollback().await.unwrap();

        assert_eq!(be.count(&ReadPlan::all("Author")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn commit_publishes_transactional_writes() {
        let be = backend();
        let txn = be.begin().await.unwrap();
        let input = CreateInput::new(Record::new().with("name", "Ann"));
        let plan = compile_create(be.registry(), "Author", &input).unwrap();
        txn.mutate(&MutationPlan::Create(plan)).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(be.count(&ReadPlan::all("Author")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_many_honors_limit_in_key_order() {
        let be = backend();
        let ann = seed_author(&be, "Ann").await;
        let id = ann.get("id").as_i64().unwrap();
        seed_book(&be, "A", id).await;
        seed_book(&be, "B", id).await;
        seed_book(&be, "C", id).await;

        let change = crate::mutation::FieldChange::set("pages", 1i64);
        let plan = crate::mutation::compile_update_many(
            be.registry(),
            "Book",
            None,
            &[change],
            Some(2),
        )
        .unwrap();
        let outcome = be.mutate(&MutationPlan::UpdateMany(plan)).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Count(2));

        let mut rows = be.read(&ReadPlan::all("Book")).await.unwrap();
        crate::pagination::sort_records(&mut rows, &[OrderBy::asc("id")], "id");
        assert_eq!(rows[0].get("pages"), &Value::Int(1));
        assert_eq!(rows[1].get("pages"), &Value::Int(1));
        assert_eq!(rows[2].get("pages"), &Value::Null);
    }
}
