//! PostgreSQL repositories for caseflow.
//!
//! Each repository implements one of the storage traits from the domain
//! crates against a `sqlx` Postgres pool. Entities are persisted as JSONB
//! payloads alongside denormalized scalar columns for filtering; ids are
//! stored in their prefixed string form. See `schema.sql` for the tables.

pub mod notify;
pub mod task;
pub mod workflow;

pub use notify::{PgNotificationStore, PgSubscriptionStore};
pub use task::PgTaskStore;
pub use workflow::{PgDefinitionStore, PgHistoryStore, PgInstanceStore, PgTimerStore};
