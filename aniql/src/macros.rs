//! Declarative generators for typed per-field and per-relation modules.
//! A client crate invokes these once per schema field to get the
//! `entity::field::equals(..)` style constructors used by the builders.

/// Comparison and ordering constructors shared by every orderable kind.
#[doc(hidden)]
#[macro_export]
macro_rules! __comparable_ops {
    ($field:expr, $ty:ty) => {
        pub fn gt(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::Gt(v.into()))
        }

        pub fn lt(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::Lt(v.into()))
        }

        pub fn gte(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::Gte(v.into()))
        }

        pub fn lte(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::Lte(v.into()))
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __base_ops {
    ($field:expr, $ty:ty) => {
        pub fn equals(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::Equals(v.into()))
        }

        pub fn not_equals(v: $ty) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::NotEquals(v.into()))
        }

        pub fn in_vec(vs: Vec<$ty>) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf(
                $field,
                $crate::filter::FieldOp::InVec(vs.into_iter().map(Into::into).collect()),
            )
        }

        pub fn not_in_vec(vs: Vec<$ty>) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf(
                $field,
                $crate::filter::FieldOp::NotInVec(vs.into_iter().map(Into::into).collect()),
            )
        }

        pub fn is_null() -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::IsNull)
        }

        pub fn is_not_null() -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::leaf($field, $crate::filter::FieldOp::IsNotNull)
        }

        pub fn order(order: $crate::types::SortOrder) -> $crate::types::OrderBy {
            $crate::types::OrderBy::new($field, order)
        }

        pub fn asc() -> $crate::types::OrderBy {
            $crate::types::OrderBy::asc($field)
        }

        pub fn desc() -> $crate::types::OrderBy {
            $crate::types::OrderBy::desc($field)
        }

        pub fn set(v: impl Into<$crate::value::Value>) -> $crate::mutation::FieldChange {
            $crate::mutation::FieldChange::set($field, v)
        }

        pub const NAME: &str = $field;
    };
}

/// Integer field module: comparisons, ordering and atomic arithmetic.
#[macro_export]
macro_rules! int_field {
    ($name:ident, $field:expr) => {
        pub mod $name {
            $crate::__base_ops!($field, i64);
            $crate::__comparable_ops!($field, i64);

            pub fn increment(v: i64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Increment(v.into()),
                }
            }

            pub fn decrement(v: i64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Decrement(v.into()),
                }
            }

            pub fn multiply(v: i64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Multiply(v.into()),
                }
            }

            pub fn divide(v: i64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Divide(v.into()),
                }
            }
        }
    };
}

/// Float field module: comparisons, ordering and atomic arithmetic.
#[macro_export]
macro_rules! float_field {
    ($name:ident, $field:expr) => {
        pub mod $name {
            $crate::__base_ops!($field, f64);
            $crate::__comparable_ops!($field, f64);

            pub fn increment(v: f64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Increment(v.into()),
                }
            }

            pub fn decrement(v: f64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Decrement(v.into()),
                }
            }

            pub fn multiply(v: f64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Multiply(v.into()),
                }
            }

            pub fn divide(v: f64) -> $crate::mutation::FieldChange {
                $crate::mutation::FieldChange {
                    field: $field.into(),
                    op: $crate::mutation::SetOp::Divide(v.into()),
                }
            }
        }
    };
}

/// String field module: equality and substring matching with an optional
/// case-insensitive mode. No ordering comparisons; `gt`-style operators
/// only exist for numeric and timestamp kinds.
#[macro_export]
macro_rules! string_field {
    ($name:ident, $field:expr) => {
        pub mod $name {
            $crate::__base_ops!($field, &str);

            pub fn contains(v: impl Into<String>) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::leaf(
                    $field,
                    $crate::filter::FieldOp::Contains(v.into()),
                )
            }

            pub fn starts_with(v: impl Into<String>) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::leaf(
                    $field,
                    $crate::filter::FieldOp::StartsWith(v.into()),
                )
            }

            pub fn ends_with(v: impl Into<String>) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::leaf(
                    $field,
                    $crate::filter::FieldOp::EndsWith(v.into()),
                )
            }

            /// Case-insensitive variant of `contains`.
            pub fn contains_insensitive(v: impl Into<String>) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::insensitive(
                    $field,
                    $crate::filter::FieldOp::Contains(v.into()),
                )
            }

            pub fn equals_insensitive(v: impl Into<String>) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::insensitive(
                    $field,
                    $crate::filter::FieldOp::Equals($crate::value::Value::String(v.into())),
                )
            }
        }
    };
}

/// Boolean field module.
#[macro_export]
macro_rules! bool_field {
    ($name:ident, $field:expr) => {
        pub mod $name {
            $crate::__base_ops!($field, bool);
        }
    };
}

/// Timestamp field module.
#[macro_export]
macro_rules! datetime_field {
    ($name:ident, $field:expr) => {
        pub mod $name {
            $crate::__base_ops!($field, $crate::chrono::DateTime<$crate::chrono::Utc>);
            $crate::__comparable_ops!($field, $crate::chrono::DateTime<$crate::chrono::Utc>);
        }
    };
}

/// Singular relation module: inclusion, relation filtering and connect.
#[macro_export]
macro_rules! relation_one {
    ($name:ident, $rel:expr) => {
        pub mod $name {
            /// Include the related record in the result shape.
            pub fn fetch() -> $crate::projection::RelationInclude {
                $crate::projection::RelationInclude::new($rel)
            }

            /// Filter parents by a condition on the related record.
            pub fn is(filter: $crate::filter::FilterNode) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::Relation {
                    relation: $rel.into(),
                    quantifier: $crate::filter::Quantifier::Some,
                    filter: Box::new(filter),
                }
            }

            pub fn is_not(filter: $crate::filter::FilterNode) -> $crate::filter::FilterNode {
                $crate::filter::FilterNode::Relation {
                    relation: $rel.into(),
                    quantifier: $crate::filter::Quantifier::None,
                    filter: Box::new(filter),
                }
            }

            /// Link to an existing record during create/update.
            pub fn connect(filter: $crate::filter::FilterNode) -> $crate::mutation::NestedWrite {
                $crate::mutation::NestedWrite::Connect {
                    relation: $rel.into(),
                    filter,
                }
            }

            pub const NAME: &str = $rel;
        }
    };
}

/// Windowed inclusion and quantified filtering shared by both collection
/// cardinalities.
#[doc(hidden)]
#[macro_export]
macro_rules! __collection_ops {
    ($rel:expr) => {
        /// Include related records, optionally narrowed by a filter.
        pub fn fetch(
            filter: Option<$crate::filter::FilterNode>,
        ) -> $crate::projection::RelationInclude {
            $crate::projection::RelationInclude {
                filter,
                ..$crate::projection::RelationInclude::new($rel)
            }
        }

        pub fn some(filter: $crate::filter::FilterNode) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::Relation {
                relation: $rel.into(),
                quantifier: $crate::filter::Quantifier::Some,
                filter: Box::new(filter),
            }
        }

        pub fn every(filter: $crate::filter::FilterNode) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::Relation {
                relation: $rel.into(),
                quantifier: $crate::filter::Quantifier::Every,
                filter: Box::new(filter),
            }
        }

        pub fn none(filter: $crate::filter::FilterNode) -> $crate::filter::FilterNode {
            $crate::filter::FilterNode::Relation {
                relation: $rel.into(),
                quantifier: $crate::filter::Quantifier::None,
                filter: Box::new(filter),
            }
        }

        pub const NAME: &str = $rel;
    };
}

/// FK-backed collection relation module. Nested writes are creates only:
/// the FK lives on the target, so connect/disconnect have nothing to edit
/// here.
#[macro_export]
macro_rules! relation_many {
    ($name:ident, $rel:expr) => {
        pub mod $name {
            $crate::__collection_ops!($rel);

            /// Create related records nested under the parent write.
            pub fn create(
                payloads: Vec<$crate::mutation::CreateInput>,
            ) -> $crate::mutation::NestedWrite {
                $crate::mutation::NestedWrite::Create {
                    relation: $rel.into(),
                    payloads,
                }
            }
        }
    };
}

/// Many-to-many relation module. Nested writes edit join rows only, so the
/// surface is connect/disconnect rather than create.
#[macro_export]
macro_rules! relation_m2m {
    ($name:ident, $rel:expr) => {
        pub mod $name {
            $crate::__collection_ops!($rel);

            /// Link an existing record through the join table.
            pub fn connect(filter: $crate::filter::FilterNode) -> $crate::mutation::NestedWrite {
                $crate::mutation::NestedWrite::Connect {
                    relation: $rel.into(),
                    filter,
                }
            }

            /// Unlink a record (update only).
            pub fn disconnect(
                filter: $crate::filter::FilterNode,
            ) -> $crate::mutation::NestedWrite {
                $crate::mutation::NestedWrite::Disconnect {
                    relation: $rel.into(),
                    filter,
                }
            }
        }
    };
}
