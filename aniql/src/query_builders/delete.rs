use super::{instrumented, shape_rows, Ops};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{self, MutationOutcome, MutationPlan};
use crate::projection::{self, ProjectionSpec, Selection};
use crate::types::SelectedRecord;

/// Query builder for deleting one uniquely-addressed record. Returns the
/// record as it was before deletion.
pub struct DeleteQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    where_: FilterNode,
    projection: ProjectionSpec,
}

impl<'a> DeleteQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, where_: FilterNode) -> Self {
        DeleteQueryBuilder {
            ops,
            where_,
            projection: ProjectionSpec::default(),
        }
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
            projection,
        } = self;
        instrumented(
            "DeleteQueryBuilder",
            "delete",
            &ops.entity.clone(),
            |_: &SelectedRecord| Some(1),
            async move {
                let plan = mutation::compile_delete(&ops.registry, &ops.entity, &where_)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let outcome = ops.store.mutate(&MutationPlan::Delete(plan)).await?;
                let MutationOutcome::Record(record) = outcome else {
                    return Err(Error::Backend {
                        operation: "delete".into(),
                        message: "backend returned a count for a record mutation".into(),
                    });
                };
                // Relations are not loaded for a deleted record; only the
                // scalar shape applies.
                let shaped = shape_rows(&ops.registry, ops.store, &shape, vec![record]).await?;
                shaped.into_iter().next().ok_or_else(|| Error::Backend {
                    operation: "delete".into(),
                    message: "deleted record vanished while shaping".into(),
                })
            },
        )
        .await
    }
}
