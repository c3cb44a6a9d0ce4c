//! Mutation engine: validates create/update/upsert/delete payloads against
//! the schema and resolves them into referentially-consistent mutation
//! plans. Uniqueness and foreign-key checks are shaped here; the storage
//! backend enforces them as the last line of defense against races.

use crate::error::{Error, Result};
use crate::filter::{self, FieldOp, FilterNode, PredicatePlan};
use crate::schema::{DefaultRule, EntityDescriptor, Registry, RelationDescriptor, UniqueConstraint};
use crate::types::Record;
use crate::value::Value;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single field mutation. Numeric deltas apply atomically relative to the
/// stored value at execution time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SetOp {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
}

impl SetOp {
    fn name(&self) -> &'static str {
        match self {
            SetOp::Set(_) => "set",
            SetOp::Increment(_) => "increment",
            SetOp::Decrement(_) => "decrement",
            SetOp::Multiply(_) => "multiply",
            SetOp::Divide(_) => "divide",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub op: SetOp,
}

impl FieldChange {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldChange {
            field: field.into(),
            op: SetOp::Set(value.into()),
        }
    }
}

/// Nested write attached to a create/update payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NestedWrite {
    /// Link to an existing target record identified by a unique filter.
    /// On an FK-owning relation this resolves the FK before the parent row
    /// is written; on a many-to-many edge it adds a join row afterwards.
    Connect {
        relation: String,
        filter: FilterNode,
    },
    /// Create related records. Valid on collection relations; the parent's
    /// key is injected into the children's FK after the parent exists.
    Create {
        relation: String,
        payloads: Vec<CreateInput>,
    },
    /// Remove a many-to-many join row.
    Disconnect {
        relation: String,
        filter: FilterNode,
    },
}

/// Raw create payload before validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateInput {
    pub values: Record,
    pub nested: Vec<NestedWrite>,
}

impl CreateInput {
    pub fn new(values: Record) -> Self {
        CreateInput {
            values,
            nested: Vec::new(),
        }
    }
}

/// A uniqueness pre-check shaped by the engine: the constraint and the
/// candidate values the new/updated row would hold for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniqueCheck {
    pub constraint: String,
    pub fields: Vec<(String, Value)>,
}

/// Foreign-key existence check for an owned, non-null FK value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FkCheck {
    pub field: String,
    pub relation: String,
    pub target: String,
    pub value: Value,
}

/// FK resolved through `connect` before the parent row is written
/// (the related entity must exist first because this entity owns the FK).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectLookup {
    pub relation: RelationDescriptor,
    pub predicate: PredicatePlan,
    pub fk_field: String,
}

/// Child rows written after the parent exists (the related entity owns the
/// FK, so parent-before-child ordering is fixed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildCreate {
    pub relation: RelationDescriptor,
    /// FK field on the child that receives the parent's primary key.
    pub injected_fk: String,
    pub plans: Vec<CreatePlan>,
}

/// Join-table edit for a many-to-many edge, applied after the parent row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinEdit {
    pub relation: RelationDescriptor,
    pub predicate: PredicatePlan,
    pub connect: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatePlan {
    pub entity: String,
    /// Scalar values with literal/now() defaults applied. Auto-increment
    /// keys stay absent for the backend to assign.
    pub values: Record,
    pub unique_checks: Vec<UniqueCheck>,
    pub fk_checks: Vec<FkCheck>,
    pub lookups: Vec<ConnectLookup>,
    pub children: Vec<ChildCreate>,
    pub joins: Vec<JoinEdit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    /// Human-readable rendering of the identifying filter for errors.
    pub condition: String,
    pub changes: Vec<FieldChange>,
    /// Constraints that touch a changed unique field and must be
    /// re-validated once the new values are known.
    pub recheck_constraints: Vec<UniqueConstraint>,
    pub fk_checks: Vec<FkCheck>,
    pub joins: Vec<JoinEdit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateManyPlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub changes: Vec<FieldChange>,
    pub recheck_constraints: Vec<UniqueConstraint>,
    pub fk_checks: Vec<FkCheck>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpsertPlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub condition: String,
    pub create: CreatePlan,
    pub update: Vec<FieldChange>,
    pub recheck_constraints: Vec<UniqueConstraint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeletePlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub condition: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteManyPlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub limit: Option<u64>,
}

/// A resolved mutation handed to the storage backend. Each plan is atomic
/// at the single-call boundary: partial application must roll back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MutationPlan {
    Create(CreatePlan),
    CreateMany {
        plans: Vec<CreatePlan>,
        skip_duplicates: bool,
    },
    Update(UpdatePlan),
    UpdateMany(UpdateManyPlan),
    Upsert(UpsertPlan),
    Delete(DeletePlan),
    DeleteMany(DeleteManyPlan),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MutationOutcome {
    Record(Record),
    Count(u64),
}

pub fn compile_create(registry: &Registry, entity: &str, input: &CreateInput) -> Result<CreatePlan> {
    compile_create_inner(registry, entity, input, None)
}

fn compile_create_inner(
    registry: &Registry,
    entity: &str,
    input: &CreateInput,
    injected_fk: Option<&str>,
) -> Result<CreatePlan> {
    let desc = registry.describe(entity)?;

    // Reject unknown payload fields up front.
    for name in input.values.fields.keys() {
        if desc.field(name).is_none() {
            return Err(Error::UnknownField {
                entity: desc.name.clone(),
                field: name.clone(),
            });
        }
    }

    let mut values = Record::new();
    for fd in &desc.fields {
        match input.values.fields.get(&fd.name) {
            Some(v) => {
                check_value(&desc.name, fd.name.as_str(), fd.kind, fd.nullable, v)?;
                values.fields.insert(fd.name.clone(), v.clone());
            }
            None => match &fd.default {
                DefaultRule::Literal(v) => {
                    values.fields.insert(fd.name.clone(), v.clone());
                }
                DefaultRule::Now => {
                    values
                        .fields
                        .insert(fd.name.clone(), Value::DateTime(Utc::now()));
                }
                DefaultRule::AutoIncrement => {}
                DefaultRule::None => {
                    if fd.nullable {
                        values.fields.insert(fd.name.clone(), Value::Null);
                    }
                }
            },
        }
    }

    let mut lookups = Vec::new();
    let mut children = Vec::new();
    let mut joins = Vec::new();
    for nested in &input.nested {
        match nested {
            NestedWrite::Connect { relation, filter } => {
                let rel = relation_on(desc, relation)?;
                match rel.cardinality {
                    crate::schema::Cardinality::One | crate::schema::Cardinality::OptionalOne => {
                        if values.fields.get(&rel.foreign_key).is_some_and(|v| !v.is_null()) {
                            return Err(Error::QueryValidation {
                                entity: desc.name.clone(),
                                message: format!(
                                    "cannot both set '{}' and connect relation '{}'",
                                    rel.foreign_key, rel.name
                                ),
                            });
                        }
                        let target = registry.describe(&rel.target)?;
                        let (predicate, _, _) = resolve_unique_where(registry, target, filter)?;
                        lookups.push(ConnectLookup {
                            relation: rel.clone(),
                            predicate,
                            fk_field: rel.foreign_key.clone(),
                        });
                    }
                    crate::schema::Cardinality::ManyToMany => {
                        let target = registry.describe(&rel.target)?;
                        let (predicate, _, _) = resolve_unique_where(registry, target, filter)?;
                        joins.push(JoinEdit {
                            relation: rel.clone(),
                            predicate,
                            connect: true,
                        });
                    }
                    crate::schema::Cardinality::Many => {
                        return Err(Error::QueryValidation {
                            entity: desc.name.clone(),
                            message: format!(
                                "connect on '{}' is not supported; the FK lives on the target",
                                rel.name
                            ),
                        });
                    }
                }
            }
            NestedWrite::Create { relation, payloads } => {
                let rel = relation_on(desc, relation)?;
                if !matches!(rel.cardinality, crate::schema::Cardinality::Many) {
                    return Err(Error::QueryValidation {
                        entity: desc.name.clone(),
                        message: format!(
                            "nested create targets collection relation, '{}' is not one",
                            rel.name
                        ),
                    });
                }
                let plans = payloads
                    .iter()
                    .map(|p| compile_create_inner(registry, &rel.target, p, Some(&rel.foreign_key)))
                    .collect::<Result<Vec<_>>>()?;
                children.push(ChildCreate {
                    relation: rel.clone(),
                    injected_fk: rel.foreign_key.clone(),
                    plans,
                });
            }
            NestedWrite::Disconnect { .. } => {
                return Err(Error::QueryValidation {
                    entity: desc.name.clone(),
                    message: "disconnect is only valid inside update".into(),
                });
            }
        }
    }

    // Required fields must now be present, defaulted, injected by the
    // parent write, or resolved by a connect lookup.
    for fd in &desc.fields {
        if !fd.required_on_create() || matches!(fd.default, DefaultRule::AutoIncrement) {
            continue;
        }
        let satisfied = values.fields.get(&fd.name).is_some_and(|v| !v.is_null())
            || injected_fk == Some(fd.name.as_str())
            || lookups.iter().any(|l| l.fk_field == fd.name);
        if !satisfied {
            return Err(Error::MissingRequiredField {
                entity: desc.name.clone(),
                field: fd.name.clone(),
            });
        }
    }

    let unique_checks = shape_unique_checks(desc, &values);
    let fk_checks = shape_fk_checks(desc, &values, injected_fk);

    Ok(CreatePlan {
        entity: desc.name.clone(),
        values,
        unique_checks,
        fk_checks,
        lookups,
        children,
        joins,
    })
}

pub fn compile_update(
    registry: &Registry,
    entity: &str,
    where_: &FilterNode,
    changes: &[FieldChange],
    nested: &[NestedWrite],
) -> Result<UpdatePlan> {
    let desc = registry.describe(entity)?;
    let (predicate, condition, _) = resolve_unique_where(registry, desc, where_)?;
    let (changes, recheck_constraints, fk_checks) =
        validate_changes(registry, desc, changes)?;

    let mut joins = Vec::new();
    for write in nested {
        match write {
            NestedWrite::Connect { relation, filter }
            | NestedWrite::Disconnect { relation, filter } => {
                let rel = relation_on(desc, relation)?;
                if rel.cardinality != crate::schema::Cardinality::ManyToMany {
                    return Err(Error::QueryValidation {
                        entity: desc.name.clone(),
                        message: format!(
                            "update-time connect/disconnect targets many-to-many relations, '{}' is not one",
                            rel.name
                        ),
                    });
                }
                let target = registry.describe(&rel.target)?;
                let (pred, _, _) = resolve_unique_where(registry, target, filter)?;
                joins.push(JoinEdit {
                    relation: rel.clone(),
                    predicate: pred,
                    connect: matches!(write, NestedWrite::Connect { .. }),
                });
            }
            NestedWrite::Create { .. } => {
                return Err(Error::QueryValidation {
                    entity: desc.name.clone(),
                    message: "nested create inside update is not supported".into(),
                });
            }
        }
    }

    Ok(UpdatePlan {
        entity: desc.name.clone(),
        predicate,
        condition,
        changes,
        recheck_constraints,
        fk_checks,
        joins,
    })
}

pub fn compile_update_many(
    registry: &Registry,
    entity: &str,
    filter_node: Option<&FilterNode>,
    changes: &[FieldChange],
    limit: Option<u64>,
) -> Result<UpdateManyPlan> {
    let desc = registry.describe(entity)?;
    let predicate = compile_optional(registry, entity, filter_node)?;
    let (changes, recheck_constraints, fk_checks) =
        validate_changes(registry, desc, changes)?;
    Ok(UpdateManyPlan {
        entity: desc.name.clone(),
        predicate,
        changes,
        recheck_constraints,
        fk_checks,
        limit,
    })
}

pub fn compile_upsert(
    registry: &Registry,
    entity: &str,
    where_: &FilterNode,
    create: &CreateInput,
    update: &[FieldChange],
) -> Result<UpsertPlan> {
    let desc = registry.describe(entity)?;
    let (predicate, condition, _) = resolve_unique_where(registry, desc, where_)?;
    let create_plan = compile_create(registry, entity, create)?;
    let (update, recheck_constraints, _) = validate_changes(registry, desc, update)?;
    Ok(UpsertPlan {
        entity: desc.name.clone(),
        predicate,
        condition,
        create: create_plan,
        update,
        recheck_constraints,
    })
}

pub fn compile_delete(registry: &Registry, entity: &str, where_: &FilterNode) -> Result<DeletePlan> {
    let desc = registry.describe(entity)?;
    let (predicate, condition, _) = resolve_unique_where(registry, desc, where_)?;
    Ok(DeletePlan {
        entity: desc.name.clone(),
        predicate,
        condition,
    })
}

pub fn compile_delete_many(
    registry: &Registry,
    entity: &str,
    filter_node: Option<&FilterNode>,
    limit: Option<u64>,
) -> Result<DeleteManyPlan> {
    let desc = registry.describe(entity)?;
    let predicate = compile_optional(registry, entity, filter_node)?;
    Ok(DeleteManyPlan {
        entity: desc.name.clone(),
        predicate,
        limit,
    })
}

fn compile_optional(
    registry: &Registry,
    entity: &str,
    node: Option<&FilterNode>,
) -> Result<PredicatePlan> {
    match node {
        Some(n) => filter::compile(registry, entity, n),
        None => Ok(PredicatePlan::True),
    }
}

fn relation_on<'d>(desc: &'d EntityDescriptor, name: &str) -> Result<&'d RelationDescriptor> {
    desc.relation(name).ok_or_else(|| Error::UnknownRelation {
        entity: desc.name.clone(),
        relation: name.to_string(),
    })
}

fn check_value(
    entity: &str,
    field: &str,
    kind: crate::value::ScalarKind,
    nullable: bool,
    value: &Value,
) -> Result<()> {
    if value.is_null() {
        if nullable {
            return Ok(());
        }
        return Err(Error::InvalidFieldValue {
            entity: entity.to_string(),
            field: field.to_string(),
            expected: kind,
            actual: "null".to_string(),
        });
    }
    if !value.fits(kind) {
        return Err(Error::InvalidFieldValue {
            entity: entity.to_string(),
            field: field.to_string(),
            expected: kind,
            actual: value
                .kind()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "null".into()),
        });
    }
    Ok(())
}

fn validate_changes(
    registry: &Registry,
    desc: &EntityDescriptor,
    changes: &[FieldChange],
) -> Result<(Vec<FieldChange>, Vec<UniqueConstraint>, Vec<FkCheck>)> {
    let _ = registry;
    let mut out = Vec::with_capacity(changes.len());
    let mut changed_fields = Vec::new();
    let mut fk_checks = Vec::new();
    for change in changes {
        let fd = desc
            .field(&change.field)
            .ok_or_else(|| Error::UnknownField {
                entity: desc.name.clone(),
                field: change.field.clone(),
            })?;
        match &change.op {
            SetOp::Set(v) => {
                check_value(&desc.name, &fd.name, fd.kind, fd.nullable, v)?;
                if let Some(rel) = desc.relation_for_fk(&fd.name) {
                    if !v.is_null() {
                        fk_checks.push(FkCheck {
                            field: fd.name.clone(),
                            relation: rel.name.clone(),
                            target: rel.target.clone(),
                            value: v.clone(),
                        });
                    }
                }
            }
            op @ (SetOp::Increment(v)
            | SetOp::Decrement(v)
            | SetOp::Multiply(v)
            | SetOp::Divide(v)) => {
                // Atomic deltas are numeric-only, on numeric fields only.
                if !fd.kind.is_numeric() || v.as_f64().is_none() {
                    return Err(Error::InvalidOperator {
                        entity: desc.name.clone(),
                        field: fd.name.clone(),
                        operator: op.name(),
                        kind: fd.kind,
                    });
                }
                if matches!(op, SetOp::Divide(_)) && v.as_f64() == Some(0.0) {
                    return Err(Error::QueryValidation {
                        entity: desc.name.clone(),
                        message: format!("division by zero in update of '{}'", fd.name),
                    });
                }
            }
        }
        changed_fields.push(fd.name.clone());
        out.push(change.clone());
    }
    let recheck = desc
        .all_unique_constraints()
        .into_iter()
        .filter(|c| c.fields.iter().any(|f| changed_fields.contains(f)))
        .collect();
    Ok((out, recheck, fk_checks))
}

pub(crate) fn shape_unique_checks(desc: &EntityDescriptor, values: &Record) -> Vec<UniqueCheck> {
    desc.all_unique_constraints()
        .into_iter()
        .filter_map(|c| {
            let fields: Option<Vec<(String, Value)>> = c
                .fields
                .iter()
                .map(|f| {
                    values
                        .fields
                        .get(f)
                        .filter(|v| !v.is_null())
                        .map(|v| (f.clone(), v.clone()))
                })
                .collect();
            fields.map(|fields| UniqueCheck {
                constraint: c.name,
                fields,
            })
        })
        .collect()
}

fn shape_fk_checks(
    desc: &EntityDescriptor,
    values: &Record,
    injected_fk: Option<&str>,
) -> Vec<FkCheck> {
    desc.relations
        .iter()
        .filter(|r| r.source_owns_fk())
        .filter(|r| injected_fk != Some(r.foreign_key.as_str()))
        .filter_map(|r| {
            values
                .fields
                .get(&r.foreign_key)
                .filter(|v| !v.is_null())
                .map(|v| FkCheck {
                    field: r.foreign_key.clone(),
                    relation: r.name.clone(),
                    target: r.target.clone(),
                    value: v.clone(),
                })
        })
        .collect()
}

/// Resolve an identifying filter down to a unique constraint: the filter's
/// top-level equality conditions must fully determine the primary key, a
/// unique field, or a composite unique constraint. A partial match on a
/// compound key is a validation error rather than a guess at intent.
pub fn resolve_unique_where(
    registry: &Registry,
    desc: &EntityDescriptor,
    node: &FilterNode,
) -> Result<(PredicatePlan, String, Vec<(String, Value)>)> {
    let predicate = filter::compile(registry, &desc.name, node)?;
    let mut eq_fields: Vec<(String, Value)> = Vec::new();
    collect_equalities(node, &mut eq_fields);

    let constraints = desc.all_unique_constraints();
    for c in &constraints {
        let pairs: Option<Vec<(String, Value)>> = c
            .fields
            .iter()
            .map(|f| {
                eq_fields
                    .iter()
                    .find(|(name, _)| name == f)
                    .cloned()
            })
            .collect();
        if let Some(pairs) = pairs {
            let condition = pairs
                .iter()
                .map(|(f, v)| format!("{f}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Ok((predicate, condition, pairs));
        }
    }
    // Partially-determined compound key: reject rather than guess.
    if let Some(partial) = constraints.iter().find(|c| {
        c.fields.len() > 1 && c.fields.iter().any(|f| eq_fields.iter().any(|(n, _)| n == f))
    }) {
        return Err(Error::MalformedCompoundKey {
            entity: desc.name.clone(),
            constraint: partial.name.clone(),
        });
    }
    Err(Error::QueryValidation {
        entity: desc.name.clone(),
        message: "where clause must fully determine a unique constraint".into(),
    })
}

fn collect_equalities(node: &FilterNode, out: &mut Vec<(String, Value)>) {
    match node {
        FilterNode::Leaf {
            field,
            op: FieldOp::Equals(v),
            ..
        } => out.push((field.clone(), v.clone())),
        FilterNode::And(nodes) => {
            for n in nodes {
                collect_equalities(n, out);
            }
        }
        _ => {}
    }
}
