//! External collaborators of the compiler.
//!
//! The compiler decides *where* a layout conversion, a constant fold or an implementation
//! binding happens; the collaborators in this module decide *what* the result is:
//!
//! - [`LayoutOptimizer`] - preferred input layouts ([`DeviceLayoutOptimizer`])
//! - [`ConstantsPropagator`] - values of constant subgraphs ([`ReferenceConstantsPropagator`])
//! - [`ImplementationSelector`] - kernels per node ([`ReferenceImplementationSelector`])
//!
//! Custom collaborators are installed on a [`CompileDriver`](crate::CompileDriver).

mod constants;
mod implementation;
mod layout;

pub use constants::{ConstantData, ConstantsPropagator, ReferenceConstantsPropagator};
pub use implementation::{
    ImplementationHandle, ImplementationSelector, ReferenceImplementationSelector,
};
pub use layout::{DeviceLayoutOptimizer, InputRole, LayoutOptimizer};
