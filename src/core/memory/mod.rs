//! In-memory repository implementations
//!
//! `DashMap`-backed stores used by the replay CLI and by tests. Each one
//! implements the corresponding trait from [`crate::core::traits`].

pub mod account_store;
pub mod event_store;
pub mod order_store;

pub use account_store::InMemoryAccountStore;
pub use event_store::InMemoryEventStore;
pub use order_store::InMemoryOrderStore;
