use super::{instrumented, shape_rows, Ops};
use crate::backend::ReadPlan;
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation;
use crate::pagination::WindowPlan;
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::SelectedRecord;

/// Query builder for a single record addressed by a unique constraint.
/// The where clause must fully determine one constraint; anything looser
/// is rejected at compile time, not narrowed to "first match".
pub struct UniqueQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    where_: FilterNode,
    projection: ProjectionSpec,
}

impl<'a> UniqueQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, where_: FilterNode) -> Self {
        UniqueQueryBuilder {
            ops,
            where_,
            projection: ProjectionSpec::default(),
        }
    }

    /// Add a relation to fetch with the query.
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

    pub async fn exec(self) -> Result<Option<SelectedRecord>> {
        let Self {
            ops,
            where_,
            projection,
        } = self;
        instrumented(
            "UniqueQueryBuilder",
            "find_unique",
            &ops.entity.clone(),
            |row: &Option<SelectedRecord>| Some(usize::from(row.is_some())),
            async move {
                let desc = ops.registry.describe(&ops.entity)?;
                let (predicate, _, _) =
                    mutation::resolve_unique_where(&ops.registry, desc, &where_)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let read = ReadPlan {
                    entity: desc.name.clone(),
                    predicate,
                    window: WindowPlan::unbounded(),
                    distinct: Vec::new(),
                };
                let rows = ops.store.read(&read).await?;
                let shaped = shape_rows(&ops.registry, ops.store, &shape, rows).await?;
                Ok(shaped.into_iter().next())
            },
        )
        .await
    }

    /// Like `exec`, but a missing record is an error instead of `None`.
    pub async fn exec_required(self) -> Result<SelectedRecord> {
        let entity = self.ops.entity.clone();
        let condition = {
            let desc = self.ops.registry.describe(&entity)?;
            mutation::resolve_unique_where(&self.ops.registry, desc, &self.where_)?.1
        };
        match self.exec().await? {
            Some(record) => Ok(record),
            None => Err(Error::RecordNotFound { entity, condition }),
        }
    }
}
