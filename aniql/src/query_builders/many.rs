use super::{instrumented, shape_rows, Ops};
use crate::backend::ReadPlan;
use crate::error::Result;
use crate::filter::{self, FilterNode, PredicatePlan};
use crate::pagination;
use crate::projection::{self, ProjectionSpec, RelationInclude, Selection};
use crate::types::{OrderBy, SelectedRecord};
use crate::value::Value;

/// Query builder for listing records with filter, order, window, distinct
/// and projection.
pub struct ManyQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
    order: Vec<OrderBy>,
    cursor: Option<Value>,
    take: Option<i64>,
    skip: Option<i64>,
    distinct: Vec<String>,
    projection: ProjectionSpec,
}

impl<'a> ManyQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, filter: Option<FilterNode>) -> Self {
        ManyQueryBuilder {
            ops,
            filter,
            order: Vec::new(),
            cursor: None,
            take: None,
            skip: None,
            distinct: Vec::new(),
            projection: ProjectionSpec::default(),
        }
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// Anchor the window at the record whose primary key equals `key`.
    pub fn cursor(mut self, key: impl Into<Value>) -> Self {
        self.cursor = Some(key.into());
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn distinct(mut self, fields: Vec<String>) -> Self {
        self.distinct = fields;
        self
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

    pub async fn exec(self) -> Result<Vec<SelectedRecord>> {
        let Self {
            ops,
            filter,
            order,
            cursor,
            take,
            skip,
            distinct,
            projection,
        } = self;
        instrumented(
            "ManyQueryBuilder",
            "find_many",
            &ops.entity.clone(),
            |rows: &Vec<SelectedRecord>| Some(rows.len()),
            async move {
                let predicate = match &filter {
                    Some(node) => filter::compile(&ops.registry, &ops.entity, node)?,
                    None => PredicatePlan::True,
                };
                let desc = ops.registry.describe(&ops.entity)?;
                for field in &distinct {
                    if desc.field(field).is_none() {
                        return Err(crate::error::Error::UnknownField {
                            entity: desc.name.clone(),
                            field: field.clone(),
                        });
                    }
                }
                let window = pagination::resolve(desc, order, cursor, take, skip)?;
                let shape = projection::resolve(&ops.registry, &ops.entity, &projection)?;
                let read = ReadPlan {
                    entity: desc.name.clone(),
                    predicate,
                    window,
                    distinct,
                };
                let rows = ops.store.read(&read).await?;
                shape_rows(&ops.registry, ops.store, &shape, rows).await
            },
        )
        .await
    }
}
