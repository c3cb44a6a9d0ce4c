//! Projection engine: resolves select/include/omit specs into concrete
//! shape plans, recursively for nested relations.

use crate::error::{Error, Result};
use crate::filter::{self, FilterNode, PredicatePlan};
use crate::pagination::{self, WindowPlan};
use crate::schema::{RelationDescriptor, Registry};
use crate::types::OrderBy;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Inclusion of one relation, carrying its own filter/order/window exactly
/// like a top-level read of the target entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationInclude {
    pub relation: String,
    pub filter: Option<FilterNode>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Value>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub distinct: Vec<String>,
    pub projection: ProjectionSpec,
}

impl RelationInclude {
    pub fn new(relation: impl Into<String>) -> Self {
        RelationInclude {
            relation: relation.into(),
            ..Default::default()
        }
    }

    fn has_collection_options(&self) -> bool {
        self.filter.is_some()
            || !self.order_by.is_empty()
            || self.cursor.is_some()
            || self.take.is_some()
            || self.skip.is_some()
            || !self.distinct.is_empty()
    }
}

/// One entry of a `select` list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    Field(String),
    Relation(RelationInclude),
}

/// Per-request projection. `select` is closed-world and mutually exclusive
/// with both `include` and `omit`; violating that is a request error, never
/// silently resolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSpec {
    pub select: Option<Vec<Selection>>,
    pub include: Vec<RelationInclude>,
    pub omit: Vec<String>,
}

impl ProjectionSpec {
    pub fn is_default(&self) -> bool {
        self.select.is_none() && self.include.is_empty() && self.omit.is_empty()
    }
}

/// Compiled output shape: exactly which scalar fields appear, plus the
/// relation sub-reads to perform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapePlan {
    pub entity: String,
    pub fields: Vec<String>,
    pub relations: Vec<RelationShape>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationShape {
    pub relation: RelationDescriptor,
    pub predicate: PredicatePlan,
    pub window: WindowPlan,
    pub distinct: Vec<String>,
    pub nested: ShapePlan,
}

/// Resolve a projection spec against the schema. The default shape (no
/// spec) includes all scalar fields and no relations.
pub fn resolve(registry: &Registry, entity: &str, spec: &ProjectionSpec) -> Result<ShapePlan> {
    let desc = registry.describe(entity)?;

    if spec.select.is_some() {
        if !spec.include.is_empty() {
            return Err(Error::ConflictingProjection {
                entity: desc.name.clone(),
                other: "include",
            });
        }
        if !spec.omit.is_empty() {
            return Err(Error::ConflictingProjection {
                entity: desc.name.clone(),
                other: "omit",
            });
        }
    }

    let mut fields = Vec::new();
    let mut relations = Vec::new();

    match &spec.select {
        // Closed world: output contains exactly the named fields/relations.
        Some(selections) => {
            for sel in selections {
                match sel {
                    Selection::Field(name) => {
                        if desc.field(name).is_none() {
                            return Err(Error::UnknownField {
                                entity: desc.name.clone(),
                                field: name.clone(),
                            });
                        }
                        fields.push(name.clone());
                    }
                    Selection::Relation(inc) => {
                        relations.push(resolve_relation(registry, &desc.name, inc)?);
                    }
                }
            }
        }
        // Open world: all default scalar fields, plus included relations,
        // minus omitted scalars.
        None => {
            for f in &desc.fields {
                if spec.omit.contains(&f.name) {
                    continue;
                }
                fields.push(f.name.clone());
            }
            for name in &spec.omit {
                if desc.field(name).is_none() {
                    return Err(Error::UnknownField {
                        entity: desc.name.clone(),
                        field: name.clone(),
                    });
                }
            }
            for inc in &spec.include {
                relations.push(resolve_relation(registry, &desc.name, inc)?);
            }
        }
    }

    Ok(ShapePlan {
        entity: desc.name.clone(),
        fields,
        relations,
    })
}

fn resolve_relation(
    registry: &Registry,
    entity: &str,
    inc: &RelationInclude,
) -> Result<RelationShape> {
    let desc = registry.describe(entity)?;
    let rel = desc
        .relation(&inc.relation)
        .ok_or_else(|| Error::UnknownRelation {
            entity: desc.name.clone(),
            relation: inc.relation.clone(),
        })?;

    // Filter/order/window only make sense on collection relations.
    if !rel.is_collection() && inc.has_collection_options() {
        return Err(Error::QueryValidation {
            entity: desc.name.clone(),
            message: format!(
                "relation '{}' is singular and takes no filter, order or window",
                rel.name
            ),
        });
    }

    let predicate = match &inc.filter {
        Some(node) => filter::compile(registry, &rel.target, node)?,
        None => PredicatePlan::True,
    };
    let target_desc = registry.describe(&rel.target)?;
    for field in &inc.distinct {
        if target_desc.field(field).is_none() {
            return Err(Error::UnknownField {
                entity: target_desc.name.clone(),
                field: field.clone(),
            });
        }
    }
    let window = pagination::resolve(
        target_desc,
        inc.order_by.clone(),
        inc.cursor.clone(),
        inc.take,
        inc.skip,
    )?;
    let nested = resolve(registry, &rel.target, &inc.projection)?;

    Ok(RelationShape {
        relation: rel.clone(),
        predicate,
        window,
        distinct: inc.distinct.clone(),
        nested,
    })
}
