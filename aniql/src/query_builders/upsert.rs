use super::{instrumented, shape_rows, Ops};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{self, CreateInput, FieldChange, MutationOutcome, MutationPlan};
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::SelectedRecord;

/// Query builder for upsert: update the uniquely-addressed record if it
/// exists, otherwise create it. Exactly one branch runs.
pub struct UpsertQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    where_: FilterNode,
    create: CreateInput,
    update: Vec<FieldChange>,
    projection: ProjectionSpec,
}

impl<'a> UpsertQueryBuilder<'a> {
    pub(crate) fn new(
        ops: Ops<'a>,
        where_: FilterNode,
        create: CreateInput,
        update: Vec<FieldChange>,
    ) -> Self {
        UpsertQueryBuilder {
            ops,
            where_,
            create,
            update,
            projection: ProjectionSpec::default(),
        }
    }

    pub fn with<T: Into<RelationInclude>>(mut self, relation: T) -> Self {
        self.projection.include.push(relation.into());
        self
    }

    pub fn select(mut self, selections: Vec<Selection>) -> Self {
        self.projection.select = Some(selections);
        self
    }

    pub fn omit(mut self, fields: Vec<String>) -> Self {
        self.projection.omit = fields;
        self
    }

    pub async fn exec(self) -> Result<SelectedRecord> {
        let Self {
            ops,
            where_,
            create,
            update,
            projection,
        } = self;
        instrumented(
            "UpsertQueryBuilder",
            "upsert",
            &ops.entity.clone(),
            |_: &SelectedRecord| Some(1),
            async move {
                let plan = mutation::compile_upsert(
                    &ops.registry,
                    &ops.entity,
                    &where_,
                    &create,
                    &update,
                )?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let outcome = ops.store.mutate(&MutationPlan::Upsert(plan)).await?;
                let MutationOutcome::Record(record) = outcome else {
                    return Err(Error::Backend {
                        operation: "upsert".into(),
                        message: "backend returned a count for a record mutation".into(),
                    });
                };
                let shaped = shape_rows(&ops.registry, ops.store, &shape, vec![record]).await?;
                shaped.into_iter().next().ok_or_else(|| Error::Backend {
                    operation: "upsert".into(),
                    message: "upserted record vanished while shaping".into(),
                })
            },
        )
        .await
    }
}
