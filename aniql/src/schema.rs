//! Schema registry: the single source of truth every other component
//! validates against. Built once at startup, read-only afterwards.

use crate::error::{Error, Result};
use crate::value::{ScalarKind, Value};
use heck::ToUpperCamelCase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default-value rule for a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DefaultRule {
    None,
    Literal(Value),
    /// Current timestamp at apply time.
    Now,
    /// Backend-assigned auto-incrementing integer (primary keys).
    AutoIncrement,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: ScalarKind,
    pub nullable: bool,
    pub unique: bool,
    pub default: DefaultRule,
}

impl FieldDescriptor {
    /// A field must be supplied on create unless nullable or defaulted.
    pub fn required_on_create(&self) -> bool {
        !self.nullable && matches!(self.default, DefaultRule::None)
    }
}

/// Cardinality of a relation edge as seen from the source entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one related record; the source entity owns the FK.
    One,
    /// Zero or one related record; the source entity owns a nullable FK.
    OptionalOne,
    /// Zero or more related records; the target entity owns the FK.
    Many,
    /// Zero or more related records through a hidden join table.
    ManyToMany,
}

/// A typed edge between two entities. Every foreign key in this engine is
/// non-cascading: deletes are restricted while references exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// FK field on the owning side. For `One`/`OptionalOne` this lives on
    /// the source entity; for `Many` it lives on the target entity; unused
    /// for `ManyToMany`.
    pub foreign_key: String,
    /// Hidden join table identity for `ManyToMany` edges. Both sides of
    /// the edge name the same table.
    pub join_table: Option<String>,
    /// Name of the inverse relation on the target entity, when declared.
    pub inverse: Option<String>,
}

impl RelationDescriptor {
    /// Whether the source entity stores the scalar FK field.
    pub fn source_owns_fk(&self) -> bool {
        matches!(self.cardinality, Cardinality::One | Cardinality::OptionalOne)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.cardinality,
            Cardinality::Many | Cardinality::ManyToMany
        )
    }
}

/// Single or composite uniqueness constraint, e.g. `(user_id, anime_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub relations: Vec<RelationDescriptor>,
    pub primary_key: String,
    pub unique_constraints: Vec<UniqueConstraint>,
}

impl EntityDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn primary_key_field(&self) -> &FieldDescriptor {
        self.field(&self.primary_key)
            .expect("primary key names a declared field")
    }

    /// All unique constraints, including single-field `unique` markers and
    /// the primary key itself.
    pub fn all_unique_constraints(&self) -> Vec<UniqueConstraint> {
        let mut out = vec![UniqueConstraint {
            name: self.primary_key.clone(),
            fields: vec![self.primary_key.clone()],
        }];
        for f in &self.fields {
            if f.unique && f.name != self.primary_key {
                out.push(UniqueConstraint {
                    name: f.name.clone(),
                    fields: vec![f.name.clone()],
                });
            }
        }
        out.extend(self.unique_constraints.iter().cloned());
        out
    }

    /// Relations on this entity whose FK field is the given scalar field.
    pub fn relation_for_fk(&self, field: &str) -> Option<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|r| r.source_owns_fk() && r.foreign_key == field)
    }
}

/// Immutable registry of entity descriptors. Single-writer at startup,
/// many-reader forever; shared by `Arc` with no locking.
#[derive(Clone, Debug)]
pub struct Registry {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl Registry {
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Look up an entity descriptor. Accepts the declared PascalCase name
    /// or a snake_case spelling of it.
    pub fn describe(&self, entity: &str) -> Result<&EntityDescriptor> {
        if let Some(desc) = self.entities.get(entity) {
            return Ok(desc);
        }
        let normalized = entity.to_upper_camel_case();
        self.entities
            .get(&normalized)
            .ok_or_else(|| Error::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    /// Walk a dotted path through relations and return the terminal field,
    /// e.g. `resolve_field("Favorite", "anime.title")`.
    pub fn resolve_field(&self, entity: &str, path: &str) -> Result<&FieldDescriptor> {
        let mut current = self.describe(entity)?;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return current.field(segment).ok_or_else(|| Error::UnknownField {
                    entity: current.name.clone(),
                    field: segment.to_string(),
                });
            }
            let relation =
                current
                    .relation(segment)
                    .ok_or_else(|| Error::UnknownRelation {
                        entity: current.name.clone(),
                        relation: segment.to_string(),
                    })?;
            current = self.describe(&relation.target)?;
        }
        Err(Error::UnknownField {
            entity: entity.to_string(),
            field: path.to_string(),
        })
    }

    pub fn shared(self) -> Arc<Registry> {
        Arc::new(self)
    }
}

/// Builder used exactly once at startup; validates cross-entity references
/// when sealed.
#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<EntityDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.entities.push(descriptor);
        self
    }

    /// Seal the registry. Fails if a primary key names an undeclared
    /// field, a relation targets an unknown entity, names an unknown FK
    /// field, or a `Many` edge claims FK ownership.
    pub fn build(self) -> Result<Registry> {
        let mut entities = BTreeMap::new();
        for desc in self.entities {
            entities.insert(desc.name.clone(), desc);
        }
        let registry = Registry { entities };
        for desc in registry.entities.values() {
            if desc.field(&desc.primary_key).is_none() {
                return Err(Error::UnknownField {
                    entity: desc.name.clone(),
                    field: desc.primary_key.clone(),
                });
            }
            for rel in &desc.relations {
                let target = registry.describe(&rel.target)?;
                match rel.cardinality {
                    Cardinality::One | Cardinality::OptionalOne => {
                        let fk = desc.field(&rel.foreign_key).ok_or_else(|| {
                            Error::UnknownField {
                                entity: desc.name.clone(),
                                field: rel.foreign_key.clone(),
                            }
                        })?;
                        if matches!(rel.cardinality, Cardinality::OptionalOne) && !fk.nullable {
                            return Err(Error::QueryValidation {
                                entity: desc.name.clone(),
                                message: format!(
                                    "optional relation '{}' requires nullable FK '{}'",
                                    rel.name, rel.foreign_key
                                ),
                            });
                        }
                    }
                    Cardinality::Many => {
                        // A `many` relation never owns the FK: the field
                        // lives on the target entity.
                        target.field(&rel.foreign_key).ok_or_else(|| {
                            Error::UnknownField {
                                entity: target.name.clone(),
                                field: rel.foreign_key.clone(),
                            }
                        })?;
                    }
                    Cardinality::ManyToMany => {
                        if rel.join_table.is_none() {
                            return Err(Error::QueryValidation {
                                entity: desc.name.clone(),
                                message: format!(
                                    "many-to-many relation '{}' requires a join table",
                                    rel.name
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(registry)
    }
}


#[cfg(test)]
mod tests {
    use super::test_schema::library;
    use super::*;

    #[test]
    fn describe_normalizes_snake_case() {
        let reg = library();
        assert_eq!(reg.describe("Author").unwrap().name, "Author");
        assert_eq!(reg.describe("author").unwrap().name, "Author");
        assert!(matches!(
            reg.describe("Publisher"),
            Err(Error::UnknownEntity { .. })
        ));
    }

    #[test]
    fn resolve_field_walks_relations() {
        let reg = library();
        let f = reg.resolve_field("Book", "author.name").unwrap();
        assert_eq!(f.name, "name");
        assert_eq!(f.kind, ScalarKind::String);

        assert!(matches!(
            reg.resolve_field("Book", "writer.name"),
            Err(Error::UnknownRelation { .. })
        ));
        assert!(matches!(
            reg.resolve_field("Book", "author.alias"),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn build_rejects_undeclared_primary_key() {
        let orphan = EntityDescriptor {
            name: "Orphan".into(),
            fields: vec![test_schema::field("label", ScalarKind::String)],
            relations: vec![],
            primary_key: "id".into(),
            unique_constraints: vec![],
        };
        assert!(matches!(
            RegistryBuilder::new().entity(orphan).build(),
            Err(Error::UnknownField { ref entity, ref field })
                if entity == "Orphan" && field == "id"
        ));
    }

    #[test]
    fn all_unique_constraints_include_pk_and_markers() {
        let reg = library();
        let author = reg.describe("Author").unwrap();
        let names: Vec<_> = author
            .all_unique_constraints()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["id".to_string(), "name".to_string()]);
    }
}
