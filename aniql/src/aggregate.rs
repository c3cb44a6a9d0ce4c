//! Aggregation engine: count/avg/sum/min/max and groupBy-with-having,
//! with scope validation over the grouping key.

use crate::error::{Error, Result};
use crate::filter::{self, FieldOp, FilterNode, PredicatePlan, QueryMode};
use crate::schema::Registry;
use crate::types::{Record, SortOrder};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateOp {
    pub fn name(self) -> &'static str {
        match self {
            AggregateOp::Count => "_count",
            AggregateOp::Avg => "_avg",
            AggregateOp::Sum => "_sum",
            AggregateOp::Min => "_min",
            AggregateOp::Max => "_max",
        }
    }
}

/// One requested aggregate. `field` is `None` only for a bare row count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateSelect {
    pub op: AggregateOp,
    pub field: Option<String>,
}

impl AggregateSelect {
    pub fn count() -> Self {
        AggregateSelect {
            op: AggregateOp::Count,
            field: None,
        }
    }

    pub fn over(op: AggregateOp, field: impl Into<String>) -> Self {
        AggregateSelect {
            op,
            field: Some(field.into()),
        }
    }

    /// Output column name, e.g. `_count`, `_avg_score`.
    pub fn alias(&self) -> String {
        match &self.field {
            Some(f) => format!("{}_{}", self.op.name(), f),
            None => self.op.name().to_string(),
        }
    }
}

/// What a having/orderBy entry refers to: a grouping field (which must be
/// part of `by`) or an aggregate expression (exempt from that restriction).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggregateTarget {
    Group(String),
    Aggregate(AggregateSelect),
}

/// Boolean tree over per-bucket values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HavingNode {
    Cond { target: AggregateTarget, op: FieldOp },
    And(Vec<HavingNode>),
    Or(Vec<HavingNode>),
    Not(Box<HavingNode>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateOrderBy {
    pub target: AggregateTarget,
    pub order: SortOrder,
}

/// Request-scoped groupBy spec.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub filter: Option<FilterNode>,
    pub by: Vec<String>,
    pub having: Option<HavingNode>,
    pub aggregates: Vec<AggregateSelect>,
    pub order_by: Vec<AggregateOrderBy>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

/// Compiled, validated groupBy plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationPlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub by: Vec<String>,
    pub having: Option<HavingNode>,
    pub aggregates: Vec<AggregateSelect>,
    pub order_by: Vec<AggregateOrderBy>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

/// One grouped result row: the grouping key values plus requested
/// aggregates keyed by alias.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
    pub key: BTreeMap<String, Value>,
    pub aggregates: BTreeMap<String, Value>,
}

impl GroupRow {
    pub fn count(&self) -> u64 {
        self.aggregates
            .get("_count")
            .and_then(Value::as_i64)
            .unwrap_or(0) as u64
    }
}

/// Validate and compile a groupBy request.
pub fn compile(registry: &Registry, entity: &str, spec: &AggregationSpec) -> Result<AggregationPlan> {
    let desc = registry.describe(entity)?;

    // The empty grouping key is rejected, never silently treated as one
    // global group.
    if spec.by.is_empty() {
        return Err(Error::EmptyGroupKey {
            entity: desc.name.clone(),
        });
    }
    for field in &spec.by {
        if desc.field(field).is_none() {
            return Err(Error::UnknownField {
                entity: desc.name.clone(),
                field: field.clone(),
            });
        }
    }

    for agg in &spec.aggregates {
        validate_aggregate(registry, &desc.name, agg)?;
    }
    if let Some(having) = &spec.having {
        validate_having(registry, &desc.name, &spec.by, having)?;
    }
    for ob in &spec.order_by {
        validate_target(registry, &desc.name, &spec.by, &ob.target, "orderBy")?;
    }
    // Pagination of buckets without a deterministic bucket order is
    // rejected.
    if (spec.take.is_some() || spec.skip.is_some()) && spec.order_by.is_empty() {
        return Err(Error::OrderRequiredForPagination {
            entity: desc.name.clone(),
        });
    }

    let predicate = match &spec.filter {
        Some(node) => filter::compile(registry, entity, node)?,
        None => PredicatePlan::True,
    };

    Ok(AggregationPlan {
        entity: desc.name.clone(),
        predicate,
        by: spec.by.clone(),
        having: spec.having.clone(),
        aggregates: spec.aggregates.clone(),
        order_by: spec.order_by.clone(),
        take: spec.take,
        skip: spec.skip,
    })
}

/// Compiled whole-set aggregate (no grouping): returns a single bucket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatePlan {
    pub entity: String,
    pub predicate: PredicatePlan,
    pub aggregates: Vec<AggregateSelect>,
}

pub fn compile_aggregate(
    registry: &Registry,
    entity: &str,
    filter_node: Option<&FilterNode>,
    aggregates: &[AggregateSelect],
) -> Result<AggregatePlan> {
    let desc = registry.describe(entity)?;
    for agg in aggregates {
        validate_aggregate(registry, &desc.name, agg)?;
    }
    let predicate = match filter_node {
        Some(node) => filter::compile(registry, entity, node)?,
        None => PredicatePlan::True,
    };
    Ok(AggregatePlan {
        entity: desc.name.clone(),
        predicate,
        aggregates: aggregates.to_vec(),
    })
}

fn validate_aggregate(registry: &Registry, entity: &str, agg: &AggregateSelect) -> Result<()> {
    let desc = registry.describe(entity)?;
    if let Some(field) = &agg.field {
        let fd = desc.field(field).ok_or_else(|| Error::UnknownField {
            entity: desc.name.clone(),
            field: field.clone(),
        })?;
        // avg/sum are restricted to numeric fields.
        if matches!(agg.op, AggregateOp::Avg | AggregateOp::Sum) && !fd.kind.is_numeric() {
            return Err(Error::InvalidOperator {
                entity: desc.name.clone(),
                field: field.clone(),
                operator: agg.op.name(),
                kind: fd.kind,
            });
        }
    } else if agg.op != AggregateOp::Count {
        return Err(Error::QueryValidation {
            entity: desc.name.clone(),
            message: format!("{} requires a field", agg.op.name()),
        });
    }
    Ok(())
}

fn validate_having(
    registry: &Registry,
    entity: &str,
    by: &[String],
    node: &HavingNode,
) -> Result<()> {
    match node {
        HavingNode::Cond { target, .. } => validate_target(registry, entity, by, target, "having"),
        HavingNode::And(nodes) | HavingNode::Or(nodes) => {
            for n in nodes {
                validate_having(registry, entity, by, n)?;
            }
            Ok(())
        }
        HavingNode::Not(inner) => validate_having(registry, entity, by, inner),
    }
}

fn validate_target(
    registry: &Registry,
    entity: &str,
    by: &[String],
    target: &AggregateTarget,
    clause: &'static str,
) -> Result<()> {
    match target {
        // A plain field must appear in `by`; aggregate-wrapped fields are
        // exempt from that restriction.
        AggregateTarget::Group(field) => {
            if !by.contains(field) {
                return Err(Error::FieldNotInGroupKey {
                    entity: entity.to_string(),
                    field: field.clone(),
                    clause,
                });
            }
            Ok(())
        }
        AggregateTarget::Aggregate(agg) => validate_aggregate(registry, entity, agg),
    }
}

// ---- bucket evaluation (pure; the reference backend calls into this) ----

/// Compute one aggregate over the rows of a bucket.
pub fn compute(rows: &[Record], agg: &AggregateSelect) -> Value {
    match (&agg.op, &agg.field) {
        (AggregateOp::Count, None) => Value::Int(rows.len() as i64),
        (AggregateOp::Count, Some(field)) => {
            Value::Int(rows.iter().filter(|r| !r.get(field).is_null()).count() as i64)
        }
        (op, Some(field)) => {
            let values: Vec<&Value> = rows
                .iter()
                .map(|r| r.get(field))
                .filter(|v| !v.is_null())
                .collect();
            if values.is_empty() {
                return Value::Null;
            }
            match op {
                AggregateOp::Avg => {
                    let sum: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
                    Value::Float(sum / values.len() as f64)
                }
                AggregateOp::Sum => {
                    if values.iter().all(|v| matches!(v, Value::Int(_))) {
                        Value::Int(values.iter().filter_map(|v| v.as_i64()).sum())
                    } else {
                        Value::Float(values.iter().filter_map(|v| v.as_f64()).sum())
                    }
                }
                AggregateOp::Min => values
                    .iter()
                    .min_by(|a, b| a.compare(b))
                    .map(|v| (*v).clone())
                    .unwrap_or(Value::Null),
                AggregateOp::Max => values
                    .iter()
                    .max_by(|a, b| a.compare(b))
                    .map(|v| (*v).clone())
                    .unwrap_or(Value::Null),
                AggregateOp::Count => unreachable!("handled above"),
            }
        }
        (_, None) => Value::Null,
    }
}

/// Group already-filtered rows into buckets and evaluate aggregates,
/// having, bucket ordering and bucket pagination.
pub fn evaluate_group_by(rows: &[Record], plan: &AggregationPlan) -> Vec<GroupRow> {
    let mut buckets: Vec<(Vec<Value>, Vec<Record>)> = Vec::new();
    for row in rows {
        let key: Vec<Value> = plan.by.iter().map(|f| row.get(f).clone()).collect();
        match buckets.iter_mut().find(|(k, _)| {
            k.iter()
                .zip(&key)
                .all(|(a, b)| a.compare(b) == std::cmp::Ordering::Equal)
        }) {
            Some((_, members)) => members.push(row.clone()),
            None => buckets.push((key, vec![row.clone()])),
        }
    }

    let mut out = Vec::new();
    for (key, members) in buckets {
        // Always materialize _count so having over counts and the
        // GroupRow::count accessor work even when not requested.
        let mut aggregates = BTreeMap::new();
        aggregates.insert("_count".to_string(), compute(&members, &AggregateSelect::count()));
        for agg in &plan.aggregates {
            aggregates.insert(agg.alias(), compute(&members, agg));
        }
        let key_map: BTreeMap<String, Value> =
            plan.by.iter().cloned().zip(key.into_iter()).collect();
        let row = GroupRow {
            key: key_map,
            aggregates,
        };
        let keep = match &plan.having {
            Some(having) => having_matches(having, &row, &members),
            None => true,
        };
        if keep {
            out.push(row);
        }
    }

    // Bucket ordering, then bucket-level pagination.
    for ob in plan.order_by.iter().rev() {
        out.sort_by(|a, b| {
            let (va, vb) = match &ob.target {
                AggregateTarget::Group(f) => (
                    a.key.get(f).cloned().unwrap_or(Value::Null),
                    b.key.get(f).cloned().unwrap_or(Value::Null),
                ),
                AggregateTarget::Aggregate(agg) => (
                    a.aggregates.get(&agg.alias()).cloned().unwrap_or(Value::Null),
                    b.aggregates.get(&agg.alias()).cloned().unwrap_or(Value::Null),
                ),
            };
            let cmp = va.compare(&vb);
            match ob.order {
                SortOrder::Asc => cmp,
                SortOrder::Desc => cmp.reverse(),
            }
        });
    }
    let skip = plan.skip.unwrap_or(0).max(0) as usize;
    let mut out: Vec<GroupRow> = out.into_iter().skip(skip).collect();
    if let Some(take) = plan.take {
        out.truncate(take.max(0) as usize);
    }
    out
}

fn having_matches(node: &HavingNode, row: &GroupRow, members: &[Record]) -> bool {
    match node {
        HavingNode::Cond { target, op } => {
            let value = match target {
                AggregateTarget::Group(f) => row.key.get(f).cloned().unwrap_or(Value::Null),
                AggregateTarget::Aggregate(agg) => row
                    .aggregates
                    .get(&agg.alias())
                    .cloned()
                    .unwrap_or_else(|| compute(members, agg)),
            };
            filter::leaf_matches(op, QueryMode::Default, &value)
        }
        HavingNode::And(nodes) => nodes.iter().all(|n| having_matches(n, row, members)),
        HavingNode::Or(nodes) => nodes.iter().any(|n| having_matches(n, row, members)),
        HavingNode::Not(inner) => !having_matches(inner, row, members),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_schema::library;

    #[test]
    fn empty_by_is_always_rejected() {
        let reg = library();
        let spec = AggregationSpec {
            by: vec![],
            aggregates: vec![AggregateSelect::count()],
            ..Default::default()
        };
        assert!(matches!(
            compile(&reg, "Book", &spec),
            Err(Error::EmptyGroupKey { .. })
        ));
    }

    #[test]
    fn having_field_must_be_in_group_key_unless_aggregated() {
        let reg = library();
        let mut spec = AggregationSpec {
            by: vec!["author_id".into()],
            ..Default::default()
        };
        spec.having = Some(HavingNode::Cond {
            target: AggregateTarget::Group("title".into()),
            op: FieldOp::Equals(Value::String("Dune".into())),
        });
        assert!(matches!(
            compile(&reg, "Book", &spec),
            Err(Error::FieldNotInGroupKey { clause: "having", .. })
        ));
        // Aggregate-wrapped fields are exempt.
        spec.having = Some(HavingNode::Cond {
            target: AggregateTarget::Aggregate(AggregateSelect::over(AggregateOp::Max, "pages")),
            op: FieldOp::Gt(Value::Int(100)),
        });
        assert!(compile(&reg, "Book", &spec).is_ok());
    }

    #[test]
    fn bucket_pagination_requires_order() {
        let reg = library();
        let spec = AggregationSpec {
            by: vec!["author_id".into()],
            take: Some(5),
            ..Default::default()
        };
        assert!(matches!(
            compile(&reg, "Book", &spec),
            Err(Error::OrderRequiredForPagination { .. })
        ));
    }

    #[test]
    fn avg_and_sum_restricted_to_numeric_fields() {
        let reg = library();
        let spec = AggregationSpec {
            by: vec!["author_id".into()],
            aggregates: vec![AggregateSelect::over(AggregateOp::Avg, "title")],
            ..Default::default()
        };
        assert!(matches!(
            compile(&reg, "Book", &spec),
            Err(Error::InvalidOperator { operator: "_avg", .. })
        ));
    }

    #[test]
    fn bucket_evaluation_counts_and_averages() {
        let reg = library();
        let plan = compile(
            &reg,
            "Book",
            &AggregationSpec {
                by: vec!["author_id".into()],
                aggregates: vec![
                    AggregateSelect::count(),
                    AggregateSelect::over(AggregateOp::Avg, "pages"),
                ],
                order_by: vec![AggregateOrderBy {
                    target: AggregateTarget::Group("author_id".into()),
                    order: SortOrder::Asc,
                }],
                ..Default::default()
            },
        )
        .unwrap();
        let rows = vec![
            Record::new().with("id", 1).with("author_id", 1).with("pages", 100),
            Record::new().with("id", 2).with("author_id", 1).with("pages", 200),
            Record::new().with("id", 3).with("author_id", 2).with("pages", Value::Null),
        ];
        let out = evaluate_group_by(&rows, &plan);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].count(), 2);
        assert_eq!(out[0].aggregates["_avg_pages"], Value::Float(150.0));
        // All-null bucket yields a null aggregate, not zero.
        assert_eq!(out[1].aggregates["_avg_pages"], Value::Null);
    }

    #[test]
    fn having_filters_buckets() {
        let reg = library();
        let plan = compile(
            &reg,
            "Book",
            &AggregationSpec {
                by: vec!["author_id".into()],
                having: Some(HavingNode::Cond {
                    target: AggregateTarget::Aggregate(AggregateSelect::count()),
                    op: FieldOp::Gt(Value::Int(1)),
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let rows = vec![
            Record::new().with("id", 1).with("author_id", 1),
            Record::new().with("id", 2).with("author_id", 1),
            Record::new().with("id", 3).with("author_id", 2),
        ];
        let out = evaluate_group_by(&rows, &plan);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key["author_id"], Value::Int(1));
    }
}
