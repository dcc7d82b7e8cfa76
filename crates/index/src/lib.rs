//! Quill Index - point-lookup index structures.
//!
//! An index maps a key column's value to the locators of the rows holding
//! it. It is derived state: the owning store can always rebuild it from a
//! full pass over its rows.
//!
//! # Example
//!
//! ```rust
//! use quill_index::{HashIndex, Index};
//!
//! let mut index: HashIndex<i64> = HashIndex::new(true);
//! index.add(10, 100).unwrap();
//! index.add(20, 200).unwrap();
//! assert_eq!(index.get(&10), vec![100]);
//! assert!(index.add(10, 101).is_err());
//! assert!(index.get(&30).is_empty());
//! ```

pub mod hash;
pub mod stats;
pub mod traits;

pub use hash::HashIndex;
pub use stats::IndexStats;
pub use traits::{Index, IndexError};
