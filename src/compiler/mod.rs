//! Graph optimization infrastructure.
//!
//! This module sits between the structural analyses and program finalization:
//!
//! - [`crate::analysis`] - processing order, dominance, layouts, node flags
//! - [`compiler`](self) - graph rewrites and their scheduling
//! - [`crate::program`] - graph initialization, driver, memory analysis, binding
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  PassContext                 What a pass may consult             │
//! │    ├─ BuildOptions            (enabled pass kinds, debug)        │
//! │    ├─ LayoutOptimizer         (preferred input layouts)          │
//! │    ├─ ConstantsPropagator     (compile time evaluation)          │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               2-phase execution, each pass once   │
//! │    ├─ Phase 1: Pre            (trim, reshape, inputs, padding)   │
//! │    └─ Phase 2: Post           (weights, constants, fusing)       │
//! │    After a change: layouts and flags are refreshed               │
//! │                                                                  │
//! │  GraphPass trait             Interface for all passes            │
//! │    ├─ run()                   Rewrite, report whether changed    │
//! │    └─ kind()                  Switch in BuildOptions::passes     │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod events;
mod pass;
mod passes;
mod scheduler;

pub use events::{Event, EventBuilder, EventCategory, EventKind, EventLog, Events};
pub use pass::{GraphPass, PassContext};
pub use passes::{
    BufferFusingPass, DepthwiseFusingPass, DepthwiseMarkingPass, HandleReshapePass,
    ParallelReorderPass, PostOptimizeWeightsPass, PreOptimizeBiasPass, PreparePaddingPass,
    PrimitiveFusingPass, PropagateConstantsPass, RedundantReordersPass, ReorderInputsPass,
    TrimToOutputsPass,
};
pub use scheduler::PassScheduler;
