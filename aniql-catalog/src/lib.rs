//! Typed client for the anime catalog schema. Wraps the `aniql` engine
//! with per-entity accessors and the generated-style field modules from
//! [`entities`], so call sites read
//! `client.user().find_unique(user::email::equals("a@b.c")).exec().await`.

pub mod entities;
pub mod schema;

pub use entities::{
    anime, comment, comment_like, episode, favorite, follow, genre, notification, rating, report,
    season, user, watchlist,
};

pub use aniql::{
    BatchQuery, BatchResult, Error, ErrorKind, FilterNode, OrderBy, Result, SelectedRecord,
    SortOrder, TransactionOptions, Value,
};

use aniql::backend::StorageBackend;
use aniql::engine::{Engine, EntityOps, TransactionClient};
use aniql::memory::MemoryBackend;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Entity-scoped handle factory over a connected engine.
#[derive(Clone)]
pub struct CatalogClient {
    engine: Engine,
}

impl CatalogClient {
    /// Client over the in-memory reference backend, starting empty.
    pub fn in_memory() -> Self {
        let registry = schema::registry();
        let backend = Arc::new(MemoryBackend::new(registry.clone()));
        CatalogClient {
            engine: Engine::new(registry, backend),
        }
    }

    /// Client over an externally-connected backend.
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        CatalogClient {
            engine: Engine::new(schema::registry(), backend),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn user(&self) -> EntityOps<'_> {
        self.engine.entity(user::ENTITY)
    }

    pub fn anime(&self) -> EntityOps<'_> {
        self.engine.entity(anime::ENTITY)
    }

    pub fn season(&self) -> EntityOps<'_> {
        self.engine.entity(season::ENTITY)
    }

    pub fn episode(&self) -> EntityOps<'_> {
        self.engine.entity(episode::ENTITY)
    }

    pub fn genre(&self) -> EntityOps<'_> {
        self.engine.entity(genre::ENTITY)
    }

    pub fn favorite(&self) -> EntityOps<'_> {
        self.engine.entity(favorite::ENTITY)
    }

    pub fn comment(&self) -> EntityOps<'_> {
        self.engine.entity(comment::ENTITY)
    }

    pub fn comment_like(&self) -> EntityOps<'_> {
        self.engine.entity(comment_like::ENTITY)
    }

    pub fn rating(&self) -> EntityOps<'_> {
        self.engine.entity(rating::ENTITY)
    }

    pub fn follow(&self) -> EntityOps<'_> {
        self.engine.entity(follow::ENTITY)
    }

    pub fn notification(&self) -> EntityOps<'_> {
        self.engine.entity(notification::ENTITY)
    }

    pub fn report(&self) -> EntityOps<'_> {
        self.engine.entity(report::ENTITY)
    }

    pub fn watchlist(&self) -> EntityOps<'_> {
        self.engine.entity(watchlist::ENTITY)
    }

    /// List-form transaction over pre-built steps.
    pub async fn batch(
        &self,
        steps: Vec<BatchQuery>,
        options: TransactionOptions,
    ) -> Result<Vec<BatchResult>> {
        self.engine.batch(steps, options).await
    }

    /// Interactive transaction. The closure's result decides commit or
    /// rollback.
    pub async fn transaction<T, F>(&self, options: TransactionOptions, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(
            &'c TransactionClient,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>,
    {
        self.engine.transaction(options, f).await
    }
}
