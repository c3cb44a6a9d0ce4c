//! Schema-driven query and mutation engine with a typed, builder-based
//! client surface. Requests are validated against a runtime schema
//! registry, compiled into backend-neutral logical plans and executed by a
//! pluggable storage backend; an in-memory reference backend ships with
//! the crate.
//!
//! ```rust,no_run
//! use aniql::engine::Engine;
//! use aniql::memory::MemoryBackend;
//! use aniql::schema::{
//!     DefaultRule, EntityDescriptor, FieldDescriptor, RegistryBuilder,
//! };
//! use aniql::value::ScalarKind;
//! use std::sync::Arc;
//!
//! # async fn demo() -> aniql::Result<()> {
//! let registry = RegistryBuilder::new()
//!     .entity(EntityDescriptor {
//!         name: "Note".into(),
//!         fields: vec![FieldDescriptor {
//!             name: "id".into(),
//!             kind: ScalarKind::Integer,
//!             nullable: false,
//!             unique: true,
//!             default: DefaultRule::AutoIncrement,
//!         }],
//!         relations: vec![],
//!         primary_key: "id".into(),
//!         unique_constraints: vec![],
//!     })
//!     .build()?
//!     .shared();
//! let backend = Arc::new(MemoryBackend::new(registry.clone()));
//! let engine = Engine::new(registry, backend);
//! let notes = engine.entity("Note").find_many(None).exec().await?;
//! # let _ = notes;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod backend;
pub mod engine;
pub mod error;
pub mod filter;
pub mod hooks;
mod macros;
pub mod memory;
pub mod mutation;
pub mod pagination;
pub mod projection;
pub mod query_builders;
pub mod schema;
pub mod types;
pub mod value;

// Re-exported for the field macros, which name chrono types in client
// crates through `$crate`.
pub use chrono;

pub use engine::{Engine, EntityOps, TransactionClient, TransactionOptions};
pub use error::{Error, ErrorKind, Result};
pub use filter::{FieldOp, FilterNode, Quantifier, QueryMode};
pub use mutation::{CreateInput, FieldChange, NestedWrite, SetOp};
pub use projection::{ProjectionSpec, RelationInclude, Selection};
pub use query_builders::{BatchQuery, BatchResult};
pub use types::{BatchCount, OrderBy, Record, RelationPayload, SelectedRecord, SortOrder};
pub use value::{ScalarKind, Value};
