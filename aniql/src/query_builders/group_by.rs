use super::{instrumented, Ops};
use crate::aggregate::{
    self, AggregateOp, AggregateOrderBy, AggregateSelect, AggregateTarget, GroupRow, HavingNode,
};
use crate::error::Result;
use crate::filter::FilterNode;
use crate::types::SortOrder;

/// Query builder for grouped aggregation. The `by` key is mandatory and
/// non-empty; having and ordering may only reference key fields or
/// aggregate expressions.
pub struct GroupByQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    spec: aggregate::AggregationSpec,
}

impl<'a> GroupByQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, by: Vec<String>) -> Self {
        GroupByQueryBuilder {
            ops,
            spec: aggregate::AggregationSpec {
                by,
                ..Default::default()
            },
        }
    }

    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.spec.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: HavingNode) -> Self {
        self.spec.having = Some(having);
        self
    }

    pub fn avg(mut self, field: impl Into<String>) -> Self {
        self.spec
            .aggregates
            .push(AggregateSelect::over(AggregateOp::Avg, field));
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.spec
            .aggregates
            .push(AggregateSelect::over(AggregateOp::Sum, field));
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.spec
            .aggregates
            .push(AggregateSelect::over(AggregateOp::Min, field));
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.spec
            .aggregates
            .push(AggregateSelect::over(AggregateOp::Max, field));
        self
    }

    /// Order buckets by a grouping-key field.
    pub fn order_by_key(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.spec.order_by.push(AggregateOrderBy {
            target: AggregateTarget::Group(field.into()),
            order,
        });
        self
    }

    /// Order buckets by an aggregate value.
    pub fn order_by_aggregate(mut self, select: AggregateSelect, order: SortOrder) -> Self {
        self.spec.order_by.push(AggregateOrderBy {
            target: AggregateTarget::Aggregate(select),
            order,
        });
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.spec.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.spec.skip = Some(skip);
        self
    }

    pub async fn exec(self) -> Result<Vec<GroupRow>> {
        let Self { ops, spec } = self;
        instrumented(
            "GroupByQueryBuilder",
            "group_by",
            &ops.entity.clone(),
            |rows: &Vec<GroupRow>| Some(rows.len()),
            async move {
                let plan = aggregate::compile(&ops.registry, &ops.entity, &spec)?;
                ops.store.group_by(&plan).await
            },
        )
        .await
    }
}
