use thiserror::Error;

macro_rules! structural_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Structural {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Structural {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into three groups. Structural errors (cycles, invalid dependency indices,
/// identifier collisions, malformed topologies) abort the whole compilation. Lookup errors
/// ([`Error::NotFound`]) are recoverable and never mutate the graph. Collaborator refusals are
/// not errors at all, except for a refused implementation binding which is reported as
/// [`Error::BindFailure`].
///
/// # Error Categories
///
/// ## Topology Errors
/// - [`Error::DuplicatePrimitive`] - Two primitives share an identifier
/// - [`Error::UnknownInput`] - A primitive references an identifier that does not exist
/// - [`Error::InvalidLayout`] - A primitive's input layouts are inconsistent
///
/// ## Graph Errors
/// - [`Error::Structural`] - Broken graph invariant, with source location
/// - [`Error::Cycle`] - The dependency relation contains a cycle
/// - [`Error::InvalidDependencyIndex`] - A dependency index is out of range
/// - [`Error::IdentifierCollision`] - A rename would collide with another node
/// - [`Error::LayoutMismatch`] - A replacement node has a different output layout
///
/// ## Lookup and Compilation Errors
/// - [`Error::NotFound`] - No node with the requested identifier
/// - [`Error::BindFailure`] - No implementation for a surviving node
/// - [`Error::PassFailed`] - An optimization pass failed, wrapping the cause
///
/// # Examples
///
/// ```rust
/// use nngraph::{Error, Program, Topology};
///
/// let program = Program::build(&Topology::new(), Default::default())?;
/// match program.get_node("missing") {
///     Err(Error::NotFound(id)) => assert_eq!(id, "missing"),
///     _ => unreachable!(),
/// }
/// # Ok::<(), nngraph::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A graph invariant was violated.
    ///
    /// Carries the source location where the violation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was violated
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Structural - {file}:{line}: {message}")]
    Structural {
        /// The message to be printed for the Structural error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// No node with the given identifier exists.
    #[error("Node '{0}' not found")]
    NotFound(String),

    /// Two primitives in a topology share the same identifier.
    #[error("Primitive '{0}' is declared more than once")]
    DuplicatePrimitive(String),

    /// A primitive references an input that is not part of the topology.
    #[error("Primitive '{node}' references unknown input '{input}'")]
    UnknownInput {
        /// The primitive holding the reference
        node: String,
        /// The unresolved input identifier
        input: String,
    },

    /// A rename or swap would give two distinct nodes the same identifier.
    #[error("Identifier '{0}' is already used by another node")]
    IdentifierCollision(String),

    /// The dependency relation contains a cycle.
    ///
    /// The payload lists the identifiers along the cycle, starting and ending with the
    /// same node.
    #[error("Cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A dependency index does not address an existing dependency.
    #[error("Dependency index {index} is out of range for '{node}' ({count} dependencies)")]
    InvalidDependencyIndex {
        /// The node whose dependencies were indexed
        node: String,
        /// The requested index
        index: usize,
        /// The number of dependencies the node has
        count: usize,
    },

    /// A replacement node does not produce the same output layout as the node it replaces.
    #[error("Output layout of '{new}' ({new_layout}) differs from '{old}' ({old_layout})")]
    LayoutMismatch {
        /// The node being replaced
        old: String,
        /// The replacement node
        new: String,
        /// Resolved layout of the replaced node
        old_layout: String,
        /// Resolved layout of the replacement
        new_layout: String,
    },

    /// The layout of a node could not be resolved from its inputs.
    #[error("Invalid layout for '{node}': {message}")]
    InvalidLayout {
        /// The node whose layout failed to resolve
        node: String,
        /// Why resolution failed
        message: String,
    },

    /// The implementation selector refused a surviving node.
    #[error("No implementation for '{node}' ({kind} in {format})")]
    BindFailure {
        /// The node that could not be bound
        node: String,
        /// Primitive kind of the node
        kind: String,
        /// Resolved output format of the node
        format: String,
    },

    /// An optimization pass failed.
    #[error("Pass '{pass}' failed: {source}")]
    PassFailed {
        /// Name of the failing pass
        pass: &'static str,
        /// The underlying failure
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps this error with the name of the pass that raised it.
    ///
    /// Already wrapped errors are returned unchanged so the innermost pass name wins.
    #[must_use]
    pub fn in_pass(self, pass: &'static str) -> Self {
        match self {
            Error::PassFailed { .. } => self,
            other => Error::PassFailed {
                pass,
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` for errors that abort compilation.
    ///
    /// Only [`Error::NotFound`] is recoverable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NotFound(_))
    }
}
