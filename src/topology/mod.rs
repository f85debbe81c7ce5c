//! Declarative network descriptions.
//!
//! A [`Topology`] is the compiler's input: an ordered set of [`Primitive`] descriptors and
//! the identifiers of the primitives whose results the caller wants to read. Declaration
//! order matters, it breaks ties when the compiler computes a processing order.
//!
//! # Examples
//!
//! ```rust
//! use nngraph::topology::{ActivationFunction, DataType, Format, Layout, Primitive, Tensor, Topology};
//!
//! let layout = Layout::new(DataType::F32, Format::Bfyx, Tensor::new(1, 3, 8, 8));
//! let mut topology = Topology::new();
//! topology.add(Primitive::input("input", layout))?;
//! topology.add(Primitive::activation("relu", "input", ActivationFunction::Relu))?;
//! topology.add_output("relu");
//!
//! assert_eq!(topology.len(), 2);
//! assert!(topology.get("relu").is_some());
//! # Ok::<(), nngraph::Error>(())
//! ```

mod layout;
mod primitive;

pub use layout::{DataType, Format, Layout, Padding, Tensor};
pub use primitive::{
    ActivationFunction, ConcatAxis, ConvolutionParams, EltwiseMode, Operation, PoolingMode,
    PoolingParams, Primitive, PrimitiveKind, SplitOutput,
};

use std::{collections::HashMap, sync::Arc};

use crate::{Error, Result};

/// An ordered collection of primitives plus the requested outputs.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    primitives: Vec<Arc<Primitive>>,
    index: HashMap<String, usize>,
    outputs: Vec<String>,
}

impl Topology {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a primitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatePrimitive`] if a primitive with the same identifier exists.
    pub fn add(&mut self, primitive: Primitive) -> Result<&mut Self> {
        if self.index.contains_key(&primitive.id) {
            return Err(Error::DuplicatePrimitive(primitive.id));
        }
        self.index
            .insert(primitive.id.clone(), self.primitives.len());
        self.primitives.push(Arc::new(primitive));
        Ok(self)
    }

    /// Declares `id` as an output. Declaring the same output twice has no effect.
    pub fn add_output(&mut self, id: impl Into<String>) -> &mut Self {
        let id = id.into();
        if !self.outputs.contains(&id) {
            self.outputs.push(id);
        }
        self
    }

    /// Returns the primitive with identifier `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<Primitive>> {
        self.index.get(id).map(|&i| &self.primitives[i])
    }

    /// All primitives in declaration order.
    pub fn primitives(&self) -> impl Iterator<Item = &Arc<Primitive>> {
        self.primitives.iter()
    }

    /// Declared outputs. Empty means every primitive without consumers is an output.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Number of primitives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Returns `true` if the topology has no primitives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}
