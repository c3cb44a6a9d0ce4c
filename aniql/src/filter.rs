//! Predicate engine: boolean filter trees validated against the schema and
//! compiled into backend-neutral predicate plans.

use crate::error::{Error, Result};
use crate::schema::{RelationDescriptor, Registry};
use crate::value::{ScalarKind, Value};
use serde::{Deserialize, Serialize};

/// String matching mode for contains/startsWith/endsWith.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    Default,
    Insensitive,
}

/// Per-field filter operators.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldOp {
    Equals(Value),
    NotEquals(Value),
    Gt(Value),
    Lt(Value),
    Gte(Value),
    Lte(Value),
    InVec(Vec<Value>),
    NotInVec(Vec<Value>),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    IsNull,
    IsNotNull,
}

impl FieldOp {
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Equals(_) => "equals",
            FieldOp::NotEquals(_) => "not_equals",
            FieldOp::Gt(_) => "gt",
            FieldOp::Lt(_) => "lt",
            FieldOp::Gte(_) => "gte",
            FieldOp::Lte(_) => "lte",
            FieldOp::InVec(_) => "in",
            FieldOp::NotInVec(_) => "not_in",
            FieldOp::Contains(_) => "contains",
            FieldOp::StartsWith(_) => "starts_with",
            FieldOp::EndsWith(_) => "ends_with",
            FieldOp::IsNull => "is_null",
            FieldOp::IsNotNull => "is_not_null",
        }
    }
}

/// How a relation-valued filter quantifies over the related records.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    /// At least one related record matches.
    Some,
    /// All related records match (vacuously true when empty).
    Every,
    /// No related record matches (vacuously true when empty).
    None,
}

/// A request-scoped filter tree. Constructed per request, validated by
/// `compile`, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterNode {
    Leaf {
        field: String,
        op: FieldOp,
        mode: QueryMode,
    },
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Relation {
        relation: String,
        quantifier: Quantifier,
        filter: Box<FilterNode>,
    },
}

impl FilterNode {
    pub fn leaf(field: impl Into<String>, op: FieldOp) -> Self {
        FilterNode::Leaf {
            field: field.into(),
            op,
            mode: QueryMode::Default,
        }
    }

    pub fn insensitive(field: impl Into<String>, op: FieldOp) -> Self {
        FilterNode::Leaf {
            field: field.into(),
            op,
            mode: QueryMode::Insensitive,
        }
    }

    pub fn and(nodes: Vec<FilterNode>) -> Self {
        FilterNode::And(nodes)
    }

    pub fn or(nodes: Vec<FilterNode>) -> Self {
        FilterNode::Or(nodes)
    }

    pub fn not(node: FilterNode) -> Self {
        FilterNode::Not(Box::new(node))
    }
}

/// Compiled, validated predicate ready for backend execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PredicatePlan {
    /// Matches every record (compiled from an empty `And`).
    True,
    /// Matches no record (compiled from an empty `Or`).
    False,
    Leaf {
        field: String,
        kind: ScalarKind,
        op: FieldOp,
        mode: QueryMode,
    },
    And(Vec<PredicatePlan>),
    Or(Vec<PredicatePlan>),
    Not(Box<PredicatePlan>),
    /// Existential/universal sub-plan scoped to the related entity.
    Relation {
        relation: RelationDescriptor,
        quantifier: Quantifier,
        plan: Box<PredicatePlan>,
    },
}

/// Validate a filter tree against the schema and translate it into a
/// predicate plan. Purely a validation + translation step, no side effects.
pub fn compile(registry: &Registry, entity: &str, node: &FilterNode) -> Result<PredicatePlan> {
    let desc = registry.describe(entity)?;
    match node {
        FilterNode::And(nodes) => {
            if nodes.is_empty() {
                // Empty conjunction is vacuously true.
                return Ok(PredicatePlan::True);
            }
            let parts = nodes
                .iter()
                .map(|n| compile(registry, entity, n))
                .collect::<Result<Vec<_>>>()?;
            Ok(PredicatePlan::And(parts))
        }
        FilterNode::Or(nodes) => {
            if nodes.is_empty() {
                // Empty disjunction matches nothing.
                return Ok(PredicatePlan::False);
            }
            let parts = nodes
                .iter()
                .map(|n| compile(registry, entity, n))
                .collect::<Result<Vec<_>>>()?;
            Ok(PredicatePlan::Or(parts))
        }
        FilterNode::Not(inner) => Ok(PredicatePlan::Not(Box::new(compile(
            registry, entity, inner,
        )?))),
        FilterNode::Relation {
            relation,
            quantifier,
            filter,
        } => {
            let rel = desc
                .relation(relation)
                .ok_or_else(|| Error::UnknownRelation {
                    entity: desc.name.clone(),
                    relation: relation.clone(),
                })?;
            let sub = compile(registry, &rel.target, filter)?;
            Ok(PredicatePlan::Relation {
                relation: rel.clone(),
                quantifier: *quantifier,
                plan: Box::new(sub),
            })
        }
        FilterNode::Leaf { field, op, mode } => {
            let fd = desc.field(field).ok_or_else(|| Error::UnknownField {
                entity: desc.name.clone(),
                field: field.clone(),
            })?;
            validate_operator(&desc.name, field, fd.kind, fd.nullable, op, *mode)?;
            Ok(PredicatePlan::Leaf {
                field: field.clone(),
                kind: fd.kind,
                op: op.clone(),
                mode: *mode,
            })
        }
    }
}

fn validate_operator(
    entity: &str,
    field: &str,
    kind: ScalarKind,
    nullable: bool,
    op: &FieldOp,
    mode: QueryMode,
) -> Result<()> {
    let invalid = || Error::InvalidOperator {
        entity: entity.to_string(),
        field: field.to_string(),
        operator: op.name(),
        kind,
    };
    if mode == QueryMode::Insensitive && kind != ScalarKind::String {
        return Err(invalid());
    }
    match op {
        FieldOp::Equals(v) | FieldOp::NotEquals(v) => {
            if v.is_null() {
                if !nullable {
                    return Err(invalid());
                }
            } else if !v.fits(kind) {
                return Err(invalid());
            }
        }
        FieldOp::Gt(v) | FieldOp::Lt(v) | FieldOp::Gte(v) | FieldOp::Lte(v) => {
            if !kind.is_comparable() || !v.fits(kind) || v.is_null() {
                return Err(invalid());
            }
        }
        FieldOp::InVec(vs) | FieldOp::NotInVec(vs) => {
            if vs.iter().any(|v| v.is_null() || !v.fits(kind)) {
                return Err(invalid());
            }
        }
        FieldOp::Contains(_) | FieldOp::StartsWith(_) | FieldOp::EndsWith(_) => {
            if kind != ScalarKind::String {
                return Err(invalid());
            }
        }
        FieldOp::IsNull | FieldOp::IsNotNull => {
            if !nullable {
                return Err(invalid());
            }
        }
    }
    Ok(())
}

/// Evaluate a scalar leaf against a candidate value. Relation sub-plans are
/// evaluated by the backend, which can reach related records.
pub fn leaf_matches(op: &FieldOp, mode: QueryMode, candidate: &Value) -> bool {
    use std::cmp::Ordering;
    let cmp = |other: &Value| candidate.compare(other);
    match op {
        FieldOp::Equals(v) => {
            if v.is_null() {
                candidate.is_null()
            } else {
                !candidate.is_null() && cmp(v) == Ordering::Equal
            }
        }
        FieldOp::NotEquals(v) => {
            if v.is_null() {
                !candidate.is_null()
            } else {
                candidate.is_null() || cmp(v) != Ordering::Equal
            }
        }
        FieldOp::Gt(v) => !candidate.is_null() && cmp(v) == Ordering::Greater,
        FieldOp::Lt(v) => !candidate.is_null() && cmp(v) == Ordering::Less,
        FieldOp::Gte(v) => !candidate.is_null() && cmp(v) != Ordering::Less,
        FieldOp::Lte(v) => !candidate.is_null() && cmp(v) != Ordering::Greater,
        FieldOp::InVec(vs) => {
            !candidate.is_null() && vs.iter().any(|v| cmp(v) == Ordering::Equal)
        }
        FieldOp::NotInVec(vs) => {
            !candidate.is_null() && vs.iter().all(|v| cmp(v) != Ordering::Equal)
        }
        FieldOp::Contains(s) => string_match(candidate, s, mode, |h, n| h.contains(n)),
        FieldOp::StartsWith(s) => string_match(candidate, s, mode, |h, n| h.starts_with(n)),
        FieldOp::EndsWith(s) => string_match(candidate, s, mode, |h, n| h.ends_with(n)),
        FieldOp::IsNull => candidate.is_null(),
        FieldOp::IsNotNull => !candidate.is_null(),
    }
}

fn string_match(
    candidate: &Value,
    needle: &str,
    mode: QueryMode,
    pred: fn(&str, &str) -> bool,
) -> bool {
    match candidate {
        Value::String(s) => match mode {
            QueryMode::Default => pred(s, needle),
            QueryMode::Insensitive => pred(&s.to_lowercase(), &needle.to_lowercase()),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_schema::library;

    fn eq(field: &str, v: impl Into<Value>) -> FilterNode {
        FilterNode::leaf(field, FieldOp::Equals(v.into()))
    }

    #[test]
    fn empty_and_is_true_empty_or_is_false() {
        let reg = library();
        assert_eq!(
            compile(&reg, "Author", &FilterNode::And(vec![])).unwrap(),
            PredicatePlan::True
        );
        assert_eq!(
            compile(&reg, "Author", &FilterNode::Or(vec![])).unwrap(),
            PredicatePlan::False
        );
    }

    #[test]
    fn string_operators_rejected_on_integers() {
        let reg = library();
        let node = FilterNode::leaf("born", FieldOp::Contains("19".into()));
        assert!(matches!(
            compile(&reg, "Author", &node),
            Err(Error::InvalidOperator { operator: "contains", .. })
        ));
    }

    #[test]
    fn insensitive_mode_only_for_strings() {
        let reg = library();
        let node = FilterNode::insensitive("born", FieldOp::Equals(Value::Int(1970)));
        assert!(matches!(
            compile(&reg, "Author", &node),
            Err(Error::InvalidOperator { .. })
        ));
    }

    #[test]
    fn null_operators_require_nullable_field() {
        let reg = library();
        assert!(compile(&reg, "Author", &FilterNode::leaf("born", FieldOp::IsNull)).is_ok());
        assert!(matches!(
            compile(&reg, "Author", &FilterNode::leaf("name", FieldOp::IsNull)),
            Err(Error::InvalidOperator { operator: "is_null", .. })
        ));
    }

    #[test]
    fn relation_filter_compiles_against_target_entity() {
        let reg = library();
        let node = FilterNode::Relation {
            relation: "books".into(),
            quantifier: Quantifier::Some,
            filter: Box::new(eq("title", "Dune")),
        };
        let plan = compile(&reg, "Author", &node).unwrap();
        match plan {
            PredicatePlan::Relation { relation, quantifier, .. } => {
                assert_eq!(relation.target, "Book");
                assert_eq!(quantifier, Quantifier::Some);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        // Relation plans are comparable wholesale, descriptor included.
        let again = FilterNode::Relation {
            relation: "books".into(),
            quantifier: Quantifier::Some,
            filter: Box::new(eq("title", "Dune")),
        };
        assert_eq!(
            compile(&reg, "Author", &again).unwrap(),
            compile(&reg, "Author", &again).unwrap()
        );

        // Field on the wrong side of the relation fails compilation.
        let bad = FilterNode::Relation {
            relation: "books".into(),
            quantifier: Quantifier::Some,
            filter: Box::new(eq("born", 1920)),
        };
        assert!(matches!(
            compile(&reg, "Author", &bad),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn unknown_field_surfaces_entity_context() {
        let reg = library();
        match compile(&reg, "Author", &eq("alias", "x")) {
            Err(Error::UnknownField { entity, field }) => {
                assert_eq!(entity, "Author");
                assert_eq!(field, "alias");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn leaf_matching_semantics() {
        let m = |op: FieldOp, v: Value| leaf_matches(&op, QueryMode::Default, &v);
        assert!(m(FieldOp::Equals(Value::Int(3)), Value::Int(3)));
        assert!(!m(FieldOp::Gt(Value::Int(3)), Value::Null));
        assert!(m(FieldOp::NotEquals(Value::Int(3)), Value::Null));
        assert!(m(
            FieldOp::InVec(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(2)
        ));
        assert!(leaf_matches(
            &FieldOp::Contains("DUNE".into()),
            QueryMode::Insensitive,
            &Value::String("dune messiah".into())
        ));
        assert!(!leaf_matches(
            &FieldOp::Contains("DUNE".into()),
            QueryMode::Default,
            &Value::String("dune messiah".into())
        ));
    }
}
