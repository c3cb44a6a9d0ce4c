use crate::value::ScalarKind;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed engine errors. Every variant carries enough structured context
/// (entity, field, constraint, transaction step) for programmatic handling.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    // Schema errors: reference resolution and operator applicability.
    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },

    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("operator '{operator}' is not applicable to {kind} field '{entity}.{field}'")]
    InvalidOperator {
        entity: String,
        field: String,
        operator: &'static str,
        kind: ScalarKind,
    },

    // Validation errors: malformed requests, rejected before any backend call.
    #[error("projection for '{entity}' sets both `select` and `{other}`; they are mutually exclusive")]
    ConflictingProjection {
        entity: String,
        other: &'static str,
    },

    #[error("groupBy on '{entity}' requires a non-empty `by` list")]
    EmptyGroupKey { entity: String },

    #[error("field '{field}' referenced in {clause} must appear in the groupBy `by` list")]
    FieldNotInGroupKey {
        entity: String,
        field: String,
        clause: &'static str,
    },

    #[error("take/skip on '{entity}' requires an explicit orderBy")]
    OrderRequiredForPagination { entity: String },

    #[error("unique constraint '{constraint}' on '{entity}' is not fully determined by the supplied where clause")]
    MalformedCompoundKey { entity: String, constraint: String },

    #[error("required field '{field}' on '{entity}' is missing and has no default")]
    MissingRequiredField { entity: String, field: String },

    #[error("field '{entity}.{field}' expects {expected}, got {actual}")]
    InvalidFieldValue {
        entity: String,
        field: String,
        expected: ScalarKind,
        actual: String,
    },

    #[error("invalid query against '{entity}': {message}")]
    QueryValidation { entity: String, message: String },

    // Not-found: singular operations targeting zero matching records.
    #[error("no '{entity}' record matches {condition}")]
    RecordNotFound { entity: String, condition: String },

    // Constraint errors: surfaced by the engine's pre-checks or by the
    // backend's own enforcement, never silently skipped.
    #[error("unique constraint '{constraint}' violated on '{entity}'")]
    UniqueViolation { entity: String, constraint: String },

    #[error("delete of '{entity}' blocked: still referenced through non-cascading relation '{referencing_entity}.{relation}'")]
    ReferentialIntegrityViolation {
        entity: String,
        referencing_entity: String,
        relation: String,
    },

    #[error("foreign key '{entity}.{field}' references a missing '{target}' record")]
    ForeignKeyNotFound {
        entity: String,
        field: String,
        target: String,
    },

    // Transaction errors.
    #[error("transaction step {step} ({operation}) failed: {source}")]
    TransactionStepFailed {
        step: usize,
        operation: String,
        #[source]
        source: Box<Error>,
    },

    #[error("transaction exceeded its timeout and was rolled back")]
    TransactionTimeout,

    #[error("timed out waiting to acquire a transactional handle")]
    TransactionAcquireTimeout,

    // Backend faults outside the taxonomy above (I/O, poisoned state).
    #[error("storage backend error during {operation}: {message}")]
    Backend { operation: String, message: String },
}

/// Coarse classification mirroring the error taxonomy: schema and
/// validation errors are deterministic and retry-useless, constraint and
/// not-found errors depend on concurrent state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Validation,
    NotFound,
    Constraint,
    Transaction,
    Backend,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownEntity { .. }
            | Error::UnknownField { .. }
            | Error::UnknownRelation { .. }
            | Error::InvalidOperator { .. } => ErrorKind::Schema,
            Error::ConflictingProjection { .. }
            | Error::EmptyGroupKey { .. }
            | Error::FieldNotInGroupKey { .. }
            | Error::OrderRequiredForPagination { .. }
            | Error::MalformedCompoundKey { .. }
            | Error::MissingRequiredField { .. }
            | Error::InvalidFieldValue { .. }
            | Error::QueryValidation { .. } => ErrorKind::Validation,
            Error::RecordNotFound { .. } => ErrorKind::NotFound,
            Error::UniqueViolation { .. }
            | Error::ReferentialIntegrityViolation { .. }
            | Error::ForeignKeyNotFound { .. } => ErrorKind::Constraint,
            Error::TransactionStepFailed { .. }
            | Error::TransactionTimeout
            | Error::TransactionAcquireTimeout => ErrorKind::Transaction,
            Error::Backend { .. } => ErrorKind::Backend,
        }
    }

    /// Whether retrying the same call after re-checking state can succeed.
    /// Schema and validation failures are deterministic; retrying them is
    /// useless. The engine never retries on the caller's behalf.
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Constraint | ErrorKind::Transaction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_taxonomy() {
        let e = Error::UnknownEntity {
            entity: "Nope".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Schema);
        assert!(!e.is_retry_safe());

        let e = Error::UniqueViolation {
            entity: "User".into(),
            constraint: "email".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Constraint);
        assert!(e.is_retry_safe());

        let e = Error::TransactionStepFailed {
            step: 1,
            operation: "create Favorite".into(),
            source: Box::new(Error::ForeignKeyNotFound {
                entity: "Favorite".into(),
                field: "anime_id".into(),
                target: "Anime".into(),
            }),
        };
        assert_eq!(e.kind(), ErrorKind::Transaction);
    }
}
