use super::{instrumented, Ops};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{self, MutationOutcome, MutationPlan};
use crate::types::BatchCount;

/// Query builder for bulk delete. Zero matches is count zero; a referenced
/// record anywhere in the matched set fails the whole call.
pub struct DeleteManyQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
    limit: Option<u64>,
}

impl<'a> DeleteManyQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, filter: Option<FilterNode>) -> Self {
        DeleteManyQueryBuilder {
            ops,
            filter,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn exec(self) -> Result<BatchCount> {
        let Self { ops, filter, limit } = self;
        instrumented(
            "DeleteManyQueryBuilder",
            "delete_many",
            &ops.entity.clone(),
            |count: &BatchCount| Some(count.count as usize),
            async move {
                let plan = mutation::compile_delete_many(
                    &ops.registry,
                    &ops.entity,
                    filter.as_ref(),
                    limit,
                )?;
                let outcome = ops.store.mutate(&MutationPlan::DeleteMany(plan)).await?;
                let MutationOutcome::Count(count) = outcome else {
                    return Err(Error::Backend {
                        operation: "delete_many".into(),
                        message: "backend returned a record for a count mutation".into(),
                    });
                };
                Ok(BatchCount { count })
            },
        )
        .await
    }
}
