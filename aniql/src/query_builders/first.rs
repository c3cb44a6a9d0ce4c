use super::{instrumented, shape_rows, Ops};
use crate::backend::ReadPlan;
use crate::error::Result;
use crate::filter::{self, FilterNode, PredicatePlan};
use crate::pagination;
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::{OrderBy, SelectedRecord};
use crate::value::Value;

/// Query builder for the first record matching an arbitrary filter, in the
/// requested order. A window of one record over the same read as
/// `find_many`.
pub struct FirstQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
    order: Vec<OrderBy>,
    cursor: Option<Value>,
    skip: Option<i64>,
    projection: ProjectionSpec,
}

impl<'a> FirstQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, filter: Option<FilterNode>) -> Self {
        FirstQueryBuilder {
            ops,
            filter,
            order: Vec::new(),
            cursor: None,
            skip: None,
            projection: ProjectionSpec::default(),
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn cursor(mut self, key: impl Into<Value>) -> Self {
        self.cursor = Some(key.into());
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
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

    pub async fn exec(self) -> Result<Option<SelectedRecord>> {
        let Self {
            ops,
            filter,
            order,
            cursor,
            skip,
            projection,
        } = self;
        instrumented(
            "FirstQueryBuilder",
            "find_first",
            &ops.entity.clone(),
            |row: &Option<SelectedRecord>| Some(usize::from(row.is_some())),
            async move {
                let predicate = match &filter {
                    Some(node) => filter::compile(&ops.registry, &ops.entity, node)?,
                    None => PredicatePlan::True,
                };
                let desc = ops.registry.describe(&ops.entity)?;
                let window = pagination::resolve(desc, order, cursor, Some(1), skip)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let read = ReadPlan {
                    entity: desc.name.clone(),
                    predicate,
                    window,
                    distinct: Vec::new(),
                };
                let rows = ops.store.read(&read).await?;
                let shaped = shape_rows(&ops.registry, ops.store, &shape, rows).await?;
                Ok(shaped.into_iter().next())
            },
        )
        .await
    }
}
