// Store infrastructure - remote collections, live subscriptions and backends
pub mod subscription;          // Subscription handles, sinks and scope management
pub mod relation_store;        // Edge collection contract
pub mod content_store;         // Posts / Comments collection contract
pub mod memory_store;          // In-memory backend
pub mod sqlite_store;          // SQLite backend (sqlx)
pub mod store_decorators;      // Tracing decorator

pub use content_store::ContentStore;
pub use memory_store::MemoryStore;
pub use relation_store::{EdgeFilter, RelationStore, SocialStore};
pub use sqlite_store::SqliteStore;
pub use store_decorators::{OperationStats, TracedStore};
pub use subscription::{
    ScopeToken, SnapshotSink, SubscriberRegistry, Subscription, SubscriptionId,
    SubscriptionManager,
};
