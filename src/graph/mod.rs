//! The program graph.
//!
//! # Architecture
//!
//! ```text
//! GraphStore            arena of ProgramNodes, id table, inputs/outputs,
//!   │                   processing order, optimized-out list
//!   ├─ ProgramNode      primitive + edges + flags + layout + implementation
//!   └─ ProcessingOrder  topological order with O(1) position lookup
//!
//! GraphEditor           the only API that changes edges; keeps dependency and
//!                       user edges mirrored and the processing order valid
//!
//! traversal             BFS walks, reachability, ancestor tables
//! traits                GraphBase / Successors / Predecessors / RootedGraph views
//! ```
//!
//! Nodes are addressed by [`NodeId`], a stable arena index. Removing a node empties its
//! slot; indices are never reused, so ids held across edits stay meaningful and simply
//! stop being live.

mod editor;
mod node;
mod order;
mod store;
mod traits;
pub mod traversal;

pub use editor::GraphEditor;
pub use node::{NodeFlags, NodeId, ProgramNode};
pub use order::ProcessingOrder;
pub use store::GraphStore;
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
