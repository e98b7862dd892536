//! Tree Operations
//!
//! Pure algorithms over a flat set of position nodes, plus the caller-side
//! retry wrapper for structural writes:
//!
//! - `OrderIndexer` - dense sibling ranks under insert, removal and reorder
//! - `SubtreeCollector` - every descendant of a node (work-list traversal)
//! - `TreeMaterializer` - flat node set → nested `PositionTree`
//! - `SiblingOperationQueue` - retries structural operations on transient conflicts
//!
//! Nothing here touches storage except the queue, which goes through `TreeEngine`.

pub mod error;
pub mod materialize;
pub mod sibling_order;
pub mod sibling_queue;
pub mod subtree;

pub use error::OperationError;
pub use materialize::TreeMaterializer;
pub use sibling_order::{OrderChange, OrderIndexer};
pub use sibling_queue::SiblingOperationQueue;
pub use subtree::{children_of, ChildIndex, SubtreeCollector};
