use super::{instrumented, shape_rows, Ops};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{self, FieldChange, MutationOutcome, MutationPlan, NestedWrite};
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::SelectedRecord;

/// Query builder for updating one uniquely-addressed record. Zero matches
/// is an error; the shaped updated record comes back on success.
pub struct UpdateQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    where_: FilterNode,
    changes: Vec<FieldChange>,
    nested: Vec<NestedWrite>,
    projection: ProjectionSpec,
}

impl<'a> UpdateQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, where_: FilterNode, changes: Vec<FieldChange>) -> Self {
        UpdateQueryBuilder {
            ops,
            where_,
            changes,
            nested: Vec::new(),
            projection: ProjectionSpec::default(),
        }
    }

    /// Attach a nested relation write (connect/disconnect).
    pub fn nested(mut self, write: NestedWrite) -> Self {
        self.nested.push(write);
        self
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
            changes,
            nested,
            projection,
        } = self;
        instrumented(
            "UpdateQueryBuilder",
            "update",
            &ops.entity.clone(),
            |_: &SelectedRecord| Some(1),
            async move {
                let plan =
                    mutation::compile_update(&ops.registry, &ops.entity, &where_, &changes, &nested)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let outcome = ops.store.mutate(&MutationPlan::Update(plan)).await?;
                let MutationOutcome::Record(record) = outcome else {
                    return Err(Error::Backend {
                        operation: "update".into(),
                        message: "backend returned a count for a record mutation".into(),
                    });
                };
                let shaped = shape_rows(&ops.registry, ops.store, &shape, vec![record]).await?;
                shaped.into_iter().next().ok_or_else(|| Error::Backend {
                    operation: "update".into(),
                    message: "updated record vanished while shaping".into(),
                })
            },
        )
        .await
    }
}
