// Delta window combination.
//
// A chain of deltas is collapsed into one window before any byte is
// produced:
//
//   pool         NodeId-addressed arena shared by the range index
//   range_index  splay tree + list of already resolved target ranges
//   offsets      prefix sums for locating instructions by target position
//   builder      merging instruction accumulator
//   combiner     the composition algorithm and chain state machine

pub mod builder;
pub mod combiner;
pub mod offsets;
pub mod pool;
pub mod range_index;

pub use combiner::{Combiner, DEFAULT_MAX_DEPTH, combine};
pub use pool::{NodeId, NodePool};
pub use range_index::{RangeIndex, RangeKind, RangeList, RangeListNode, RangeTreeNode};
