use super::{instrumented, Ops};
use crate::error::{Error, Result};
use crate::filter::FilterNode;
use crate::mutation::{self, FieldChange, MutationOutcome, MutationPlan};
use crate::types::BatchCount;

/// Query builder for bulk update. Matching zero records is a success with
/// count zero, never an error. An optional limit caps how many matched
/// records are touched, in primary-key order.
pub struct UpdateManyQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    filter: Option<FilterNode>,
    changes: Vec<FieldChange>,
    limit: Option<u64>,
}

impl<'a> UpdateManyQueryBuilder<'a> {
    pub(crate) fn new(
        ops: Ops<'a>,
        filter: Option<FilterNode>,
        changes: Vec<FieldChange>,
    ) -> Self {
        UpdateManyQueryBuilder {
            ops,
            filter,
            changes,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn exec(self) -> Result<BatchCount> {
        let Self {
            ops,
            filter,
            changes,
            limit,
        } = self;
        instrumented(
            "UpdateManyQueryBuilder",
            "update_many",
            &ops.entity.clone(),
            |count: &BatchCount| Some(count.count as usize),
            async move {
                let plan = mutation::compile_update_many(
                    &ops.registry,
                    &ops.entity,
                    filter.as_ref(),
                    &changes,
                    limit,
                )?;
                let outcome = ops.store.mutate(&MutationPlan::UpdateMany(plan)).await?;
                let MutationOutcome::Count(count) = outcome else {
                    return Err(Error::Backend {
                        operation: "update_many".into(),
                        message: "backend returned a record for a count mutation".into(),
                    });
                };
                Ok(BatchCount { count })
            },
        )
        .await
    }
}
