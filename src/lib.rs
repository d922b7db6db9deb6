//! # coppice
//!
//! Persistent (immutable) collection types with structural sharing.
//!
//! Every mutation-style operation returns a new collection handle that
//! shares as much internal structure as possible with its predecessor;
//! no operation ever modifies a handle that has already been published.
//!
//! - [`PersistentHashSet`]: unordered set (hash array mapped trie)
//! - [`PersistentTreeSet`]: sorted set (red-black tree, comparator-ordered)
//! - [`PersistentVector`]: ordered sequence (radix balanced tree)
//!
//! Each persistent type has a transient counterpart ([`TransientHashSet`],
//! [`TransientTreeSet`], [`TransientVector`]) for efficient batch
//! construction: accumulate with `&mut self` operations, then finalize
//! with `persistent()` into an immutable handle.
//!
//! # Structural Sharing
//!
//! ```rust
//! use coppice::PersistentHashSet;
//!
//! let set = PersistentHashSet::new().insert(1).insert(2);
//! let updated = set.insert(3);
//!
//! assert_eq!(set.len(), 2);     // Original unchanged
//! assert_eq!(updated.len(), 3); // New version
//! ```
//!
//! # Thread Safety
//!
//! By default, nodes are shared via `Arc`, so a published handle is safe
//! to read from any number of threads without coordination. The `rc`
//! feature swaps in `Rc` for single-threaded use. Transients are never
//! `Send` or `Sync` regardless of feature selection.
//!
//! # Feature Flags
//!
//! - `rc`: use `Rc` instead of `Arc` for structural sharing
//! - `fxhash`: hash the trie with `rustc-hash`'s `FxHasher`
//! - `ahash`: hash the trie with `ahash`'s `AHasher`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// By default this is `std::sync::Arc`, so published handles are
/// `Send + Sync` whenever their elements are.
///
/// With the `rc` feature enabled, this is `std::rc::Rc`, which avoids
/// atomic reference counting but restricts handles to a single thread.
#[cfg(not(feature = "rc"))]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(feature = "rc")]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod hash_set;
mod traits;
mod tree_set;
mod vector;

pub use hash_set::PersistentHashSet;
pub use hash_set::PersistentHashSetIntoIterator;
pub use hash_set::PersistentHashSetIterator;
pub use hash_set::TransientHashSet;
pub use traits::PersistentSequence;
pub use traits::PersistentSet;
pub use tree_set::PersistentTreeSet;
pub use tree_set::PersistentTreeSetIntoIterator;
pub use tree_set::PersistentTreeSetIterator;
pub use tree_set::TransientTreeSet;
pub use vector::PersistentVector;
pub use vector::PersistentVectorIntoIterator;
pub use vector::PersistentVectorIterator;
pub use vector::TransientVector;

/// Prelude module for convenient imports.
///
/// Re-exports the persistent types, their transients, and the capability
/// traits.
///
/// # Usage
///
/// ```rust
/// use coppice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::hash_set::{PersistentHashSet, TransientHashSet};
    pub use crate::traits::{PersistentSequence, PersistentSet};
    pub use crate::tree_set::{PersistentTreeSet, TransientTreeSet};
    pub use crate::vector::{PersistentVector, TransientVector};
}

// =============================================================================
// Tests
// =============================================================================
