//! Persistence layer: where assessment state is read from and written to.

pub mod libsql_backend;
pub mod memory;
pub mod remote;
pub mod schema;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;
pub use traits::{LegacyStore, PersistenceAdapter, STORED_STATE_VERSION, StoreKind, StoredState};
