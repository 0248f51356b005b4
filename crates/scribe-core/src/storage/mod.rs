//! Storage layer
//!
//! Local document stores, their secondary index databases, and the platform
//! primitives used to enumerate and destroy them.
//!
//! ## Layout
//!
//! Every database is a SQLite file in the data directory:
//!
//! - `{store}.db` - a primary document store, one per user
//! - `{store}-mrview-{field}.db` - a secondary index derived from `{store}`

pub mod error;
pub mod index;
pub mod local;
pub mod naming;
pub mod platform;
pub mod schema;

pub use error::{StoreError, StoreResult};
pub use index::{SecondaryIndex, DEFAULT_INDEX_FIELDS};
pub use local::LocalStore;
pub use naming::{index_db_name, parse_index_db_name, store_name};
pub use platform::{FsPlatform, Platform, StorageEstimate};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
