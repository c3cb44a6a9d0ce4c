use super::{instrumented, shape_rows, Ops};
use crate::error::{Error, Result};
use crate::mutation::{self, CreateInput, MutationOutcome, MutationPlan};
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::SelectedRecord;

/// Query builder for creating one record, with nested writes carried in
/// the input payload. Returns the created record shaped by the projection.
pub struct CreateQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    input: CreateInput,
    projection: ProjectionSpec,
}

impl<'a> CreateQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, input: CreateInput) -> Self {
        CreateQueryBuilder {
            ops,
            input,
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
            input,
            projection,
        } = self;
        instrumented(
            "CreateQueryBuilder",
            "create",
            &ops.entity.clone(),
            |_: &SelectedRecord| Some(1),
            async move {
                let plan = mutation::compile_create(&ops.registry, &ops.entity, &input)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let outcome = ops.store.mutate(&MutationPlan::Create(plan)).await?;
                let MutationOutcome::Record(record) = outcome else {
                    return Err(Error::Backend {
                        operation: "create".into(),
                        message: "backend returned a count for a record mutation".into(),
                    });
                };
                let shaped = shape_rows(&ops.registry, ops.store, &shape, vec![record]).await?;
                shaped.into_iter().next().ok_or_else(|| Error::Backend {
                    operation: "create".into(),
                    message: "created record vanished while shaping".into(),
                })
            },
        )
        .await
    }
}
