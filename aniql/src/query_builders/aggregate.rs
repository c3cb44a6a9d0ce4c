use super::{instrumented, Ops};
use crate::aggregate::{self, AggregateOp, AggregateSelect, GroupRow};
use crate::error::Result;
use crate::filter::FilterNode;

/// Query builder for whole-set aggregates over the filtered records: one
/// result bucket, `_count` always present.
pub struct AggregateQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
    aggregates: Vec<AggregateSelect>,
}

impl<'a> AggregateQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, filter: Option<FilterNode>) -> Self {
        AggregateQueryBuilder {
            ops,
            filter,
            aggregates: Vec::new(),
        }
    }

    pub fn avg(mut self, field: impl Into<String>) -> Self {
        self.aggregates
            .push(AggregateSelect::over(AggregateOp::Avg, field));
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.aggregates
            .push(AggregateSelect::over(AggregateOp::Sum, field));
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.aggregates
            .push(AggregateSelect::over(AggregateOp::Min, field));
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.aggregates
            .push(AggregateSelect::over(AggregateOp::Max, field));
        self
    }

    pub async fn exec(self) -> Result<GroupRow> {
        let Self {
            ops,
            filter,
            aggregates,
        } = self;
        instrumented(
            "AggregateQueryBuilder",
            "aggregate",
            &ops.entity.clone(),
            |_: &GroupRow| Some(1),
            async move {
                let plan = aggregate::compile_aggregate(
                    &ops.registry,
                    &ops.entity,
                    filter.as_ref(),
                    &aggregates,
                )?;
                ops.store.aggregate(&plan).await
            },
        )
        .await
    }
}
