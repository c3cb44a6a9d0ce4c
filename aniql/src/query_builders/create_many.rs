use super::{instrumented, Ops};
use crate::error::{Error, Result};
use crate::mutation::{self, CreateInput, MutationOutcome, MutationPlan};
use crate::types::BatchCount;

/// Query builder for bulk creation. Returns only the created-row count;
/// `skip_duplicates` turns unique violations into silent skips.
pub struct CreateManyQueryBuilder<'a> {
    pub(crate) ops: Ops<'a>,
    inputs: Vec<CreateInput>,
    skip_duplicates: bool,
}

impl<'a> CreateManyQueryBuilder<'a> {
    pub(crate) fn new(ops: Ops<'a>, inputs: Vec<CreateInput>) -> Self {
        CreateManyQueryBuilder {
            ops,
            inputs,
            skip_duplicates: false,
        }
    }

    pub fn skip_duplicates(mut self) -> Self {
        self.skip_duplicates = true;
        self
    }

    pub async fn exec(self) -> Result<BatchCount> {
        let Self {
            ops,
            inputs,
            skip_duplicates,
        } = self;
        instrumented(
            "CreateManyQueryBuilder",
            "create_many",
            &ops.entity.clone(),
            |count: &BatchCount| Some(count.count as usize),
            async move {
                let mut plans = Vec::with_capacity(inputs.len());
                for input in &inputs {
                    // Nested writes are a single-create feature.
                    if !input.nested.is_empty() {
                        return Err(Error::QueryValidation {
                            entity: ops.entity.clone(),
                            message: "createMany does not accept nested writes".into(),
                        });
                    }
                    plans.push(mutation::compile_create(&ops.registry, &ops.entity, input)?);
                }
                let outcome = ops
                    .store
                    .mutate(&MutationPlan::CreateMany {
                        plans,
                        skip_duplicates,
                    })
                    .await?;
                let MutationOutcome::Count(count) = outcome else {
                    return Err(Error::Backend {
                        operation: "create_many".into(),
                        message: "backend returned a record for a count mutation".into(),
                    });
                };
                Ok(BatchCount { count })
            },
        )
        .await
    }
}
