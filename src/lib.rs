// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # nngraph
//!
//! A graph compiler for neural-network inference. `nngraph` takes a [`Topology`], a
//! user-declared graph of primitives (inputs, weights, convolutions, activations, ...),
//! and turns it into an optimized, executable [`Program`]:
//!
//! - **Graph construction** - one node per primitive, mirrored edges, a deterministic
//!   processing order, split primitives expanded into crops
//! - **Optimization** - two phases of graph rewrites: trimming, reshape handling, input
//!   reorders, padding, weight and bias layouts, constant propagation, primitive and
//!   buffer fusing, depthwise handling
//! - **Memory analysis** - which node outputs must never share a buffer
//! - **Implementation binding** - every surviving node gets a kernel handle
//!
//! Kernels, devices and execution are not part of this crate. Layout preferences,
//! constant evaluation and kernel selection are collaborators behind traits in
//! [`policy`], with device independent reference implementations.
//!
//! ## Quick Start
//!
//! ```rust
//! use nngraph::prelude::*;
//!
//! let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 3, 8, 8));
//! let mut topology = Topology::new();
//! topology.add(Primitive::input("image", layout))?;
//! topology.add(Primitive::activation("relu", "image", ActivationFunction::Relu))?;
//! topology.add(Primitive::softmax("prob", "relu"))?;
//!
//! let program = Program::build(&topology, BuildOptions::default())?;
//! for node in program.processing_order() {
//!     println!("{} -> {:?}", node.id(), node.implementation().map(|h| h.name.as_str()));
//! }
//! # Ok::<(), nngraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`topology`] - primitives, tensors and layouts; the user facing graph description
//! - [`graph`] - the arena graph, its editor and processing order
//! - [`analysis`] - processing order, dominance, layout inference, node flags
//! - [`compiler`] - optimization passes, their scheduler and the event log
//! - [`memory`] - memory dependency policies and analysis
//! - [`policy`] - layout, constant and implementation collaborators
//! - [`program`] - graph initialization, the compile driver and [`Program`]
//! - [`config`] - [`BuildOptions`] and pass switches
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Structural errors abort the compile,
//! lookups fail with [`Error::NotFound`] without side effects, and collaborator
//! refusals are not errors except for a refused implementation binding.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

pub mod analysis;
pub mod compiler;
pub mod config;
pub mod graph;
pub mod memory;
pub mod policy;
pub mod program;
pub mod topology;
pub mod utils;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use nngraph::prelude::*;
///
/// let mut topology = Topology::new();
/// topology.add(Primitive::input(
///     "in",
///     Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 1, 2, 2)),
/// ))?;
/// let program = Program::build(&topology, BuildOptions::default())?;
/// assert!(program.contains("in"));
/// # Ok::<(), nngraph::Error>(())
/// ```
pub mod prelude;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `nngraph` Error type
///
/// # Examples
///
/// ```rust
/// use nngraph::topology::{Primitive, Topology};
/// use nngraph::{BuildOptions, Error, Program};
///
/// let mut topology = Topology::new();
/// topology.add(Primitive::softmax("prob", "missing"))?;
/// match Program::build(&topology, BuildOptions::default()) {
///     Err(Error::UnknownInput { node, input }) => {
///         assert_eq!(node, "prob");
///         assert_eq!(input, "missing");
///     }
///     other => panic!("unexpected {:?}", other.map(|_| ())),
/// }
/// # Ok::<(), nngraph::Error>(())
/// ```
pub use error::Error;

pub use config::BuildOptions;
pub use program::{CompileDriver, Program};
pub use topology::Topology;
