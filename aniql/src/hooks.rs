//! Lightweight query lifecycle hooks. Builders emit a before event when
//! execution starts and an after event with result metadata; both go
//! through the `log` facade so any subscriber configuration applies.

use uuid::Uuid;

/// Identity of one query execution as seen by the hooks.
#[derive(Clone, Debug)]
pub struct QueryEvent {
    pub builder: &'static str,
    pub entity: String,
    pub details: String,
}

/// Outcome metadata attached to the after event.
#[derive(Clone, Debug, Default)]
pub struct QueryResultMeta {
    pub row_count: Option<usize>,
    pub error: Option<String>,
    pub elapsed_ms: Option<u128>,
}

pub fn compose_details(operation: &str, entity: &str) -> String {
    format!("{}:{}", operation, entity)
}

/// Fresh correlation id tying a before event to its after event.
pub fn correlation_id() -> Uuid {
    Uuid::new_v4()
}

pub fn emit_before(correlation: &Uuid, event: &QueryEvent) {
    log::debug!(
        target: "aniql::query",
        "[{}] start {} entity={} details={}",
        correlation,
        event.builder,
        event.entity,
        event.details
    );
}

pub fn emit_after(correlation: &Uuid, event: &QueryEvent, meta: &QueryResultMeta) {
    match &meta.error {
        None => log::debug!(
            target: "aniql::query",
            "[{}] done {} entity={} rows={:?} elapsed_ms={:?}",
            correlation,
            event.builder,
            event.entity,
            meta.row_count,
            meta.elapsed_ms
        ),
        Some(err) => log::warn!(
            target: "aniql::query",
            "[{}] failed {} entity={} error={} elapsed_ms={:?}",
            correlation,
            event.builder,
            event.entity,
            err,
            meta.elapsed_ms
        ),
    }
}
