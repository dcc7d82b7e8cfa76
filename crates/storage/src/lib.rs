//! Quill Storage - durable storage layer of the Quill engine.
//!
//! - `RowStore`: the authoritative row set of one table, persisted by atomic file replace
//! - `IndexManager`: hash indexes over primary-key and unique columns
//! - `LockManager`: file-marker table locks shared between processes
//! - `TransactionManager`: staging, all-or-nothing commit and rollback
//! - `CommitLog`: the multi-table commit protocol and its crash recovery
//! - `TableCache`: the registry of open stores
//!
//! # Example
//!
//! ```rust
//! use quill_storage::{LockConfig, LockManager, RowStore};
//! use quill_core::schema::TableBuilder;
//! use quill_core::{DataType, Predicate, Value};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int)
//!     .unwrap()
//!     .add_column("name", DataType::Str)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//!
//! let locks = LockManager::new(dir.path(), LockConfig::default());
//! let mut store = RowStore::create(dir.path(), schema).unwrap();
//! {
//!     let _guard = locks.acquire("users").unwrap();
//!     store.insert(vec![Value::Int(1), Value::from("Alice")]).unwrap();
//! }
//!
//! let by_id = Predicate::equals("id", 1i64);
//! assert_eq!(store.scan(Some(&by_id), None).unwrap().count(), 1);
//! ```

pub mod cache;
pub mod commit_log;
pub mod file;
pub mod index_manager;
pub mod journal;
pub mod lock;
pub mod row_store;
pub mod transaction;

pub use cache::TableCache;
pub use commit_log::{CommitId, CommitLog, Recovery};
pub use index_manager::IndexManager;
pub use journal::{Journal, StagedOp};
pub use lock::{LockConfig, LockGuard, LockManager};
pub use row_store::{RowStore, Scan};
pub use transaction::{CommitOutcome, Transaction, TransactionId, TransactionManager, TransactionState};
