use crate::error::Result;
use crate::filter::FilterNode;
use crate::mutation::{self, CreateInput, FieldChange, MutationPlan, NestedWrite};
use crate::schema::Registry;
use crate::types::{BatchCount, SelectedRecord};

/// One step of a list-form transaction. Steps are compiled up front, then
/// executed in order on a single transactional session; the first failure
/// rolls the whole batch back.
#[derive(Clone, Debug)]
pub enum BatchQuery {
    Create {
        entity: String,
        input: CreateInput,
    },
    CreateMany {
        entity: String,
        inputs: Vec<CreateInput>,
        skip_duplicates: bool,
    },
    Update {
        entity: String,
        where_: FilterNode,
        changes: Vec<FieldChange>,
        nested: Vec<NestedWrite>,
    },
    UpdateMany {
        entity: String,
        filter: Option<FilterNode>,
        changes: Vec<FieldChange>,
        limit: Option<u64>,
    },
    Upsert {
        entity: String,
        where_: FilterNode,
        create: CreateInput,
        update: Vec<FieldChange>,
    },
    Delete {
        entity: String,
        where_: FilterNode,
    },
    DeleteMany {
        entity: String,
        filter: Option<FilterNode>,
        limit: Option<u64>,
    },
}

impl BatchQuery {
    pub fn entity(&self) -> &str {
        match self {
            BatchQuery::Create { entity, .. }
            | BatchQuery::CreateMany { entity, .. }
            | BatchQuery::Update { entity, .. }
            | BatchQuery::UpdateMany { entity, .. }
            | BatchQuery::Upsert { entity, .. }
            | BatchQuery::Delete { entity, .. }
            | BatchQuery::DeleteMany { entity, .. } => entity,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            BatchQuery::Create { .. } => "create",
            BatchQuery::CreateMany { .. } => "create_many",
            BatchQuery::Update { .. } => "update",
            BatchQuery::UpdateMany { .. } => "update_many",
            BatchQuery::Upsert { .. } => "upsert",
            BatchQuery::Delete { .. } => "delete",
            BatchQuery::DeleteMany { .. } => "delete_many",
        }
    }

    /// Compile this step into a backend plan. All steps are validated
    /// before the transaction opens, so a malformed step never costs a
    /// session.
    pub(crate) fn compile(&self, registry: &Registry) -> Result<MutationPlan> {
        match self {
            BatchQuery::Create { entity, input } => Ok(MutationPlan::Create(
                mutation::compile_create(registry, entity, input)?,
            )),
            BatchQuery::CreateMany {
                entity,
                inputs,
                skip_duplicates,
            } => {
                let mut plans = Vec::with_capacity(inputs.len());
                for input in inputs {
                    plans.push(mutation::compile_create(registry, entity, input)?);
                }
                Ok(MutationPlan::CreateMany {
                    plans,
                    skip_duplicates: *skip_duplicates,
                })
            }
            BatchQuery::Update {
                entity,
                where_,
                changes,
                nested,
            } => Ok(MutationPlan::Update(mutation::compile_update(
                registry, entity, where_, changes, nested,
            )?)),
            BatchQuery::UpdateMany {
                entity,
                filter,
                changes,
                limit,
            } => Ok(MutationPlan::UpdateMany(mutation::compile_update_many(
                registry,
                entity,
                filter.as_ref(),
                changes,
                *limit,
            )?)),
            BatchQuery::Upsert {
                entity,
                where_,
                create,
                update,
            } => Ok(MutationPlan::Upsert(mutation::compile_upsert(
                registry, entity, where_, create, update,
            )?)),
            BatchQuery::Delete { entity, where_ } => Ok(MutationPlan::Delete(
                mutation::compile_delete(registry, entity, where_)?,
            )),
            BatchQuery::DeleteMany {
                entity,
                filter,
                limit,
            } => Ok(MutationPlan::DeleteMany(mutation::compile_delete_many(
                registry,
                entity,
                filter.as_ref(),
                *limit,
            )?)),
        }
    }
}

/// Outcome of one batch step, in step order.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchResult {
    Record(SelectedRecord),
    Count(BatchCount),
}
