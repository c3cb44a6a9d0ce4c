use super::{instrumented, Ops};
use crate::backend::ReadPlan;
use crate::error::Result;
use crate::filter::{self, FilterNode, PredicatePlan};
use crate::pagination::WindowPlan;

/// Query builder for counting records matching a filter.
pub struct CountQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
}

impl<'a> CountQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, filter: Option<FilterNode>) -> Self {
        CountQueryBuilder { ops, filter }
    }

    pub async fn exec(self) -> Result<u64> {
        let Self { ops, filter } = self;
        instrumented(
            "CountQueryBuilder",
            "count",
            &ops.entity.clone(),
            |n: &u64| Some(*n as usize),
            async move {
                let predicate = match &filter {
                    Some(node) => filter::compile(&ops.registry, &ops.entity, node)?,
                    None => PredicatePlan::True,
                };
                let desc = ops.registry.describe(&ops.entity)?;
                let read = ReadPlan {
                    entity: desc.name.clone(),
                    predicate,
                    window: WindowPlan::unbounded(),
                    distinct: Vec::new(),
                };
                ops.store.count(&read).await
            },
        )
        .await
    }
}
