//! Primitive descriptors.
//!
//! A [`Primitive`] is the immutable, user supplied description of one operation: its
//! identifier, its [`Operation`] with parameters, and the ordered identifiers of its
//! inputs. The compiler never mutates a primitive in place; passes that need different
//! parameters create a new primitive and swap it into the node.
//!
//! # Dependency conventions
//!
//! | Operation | Inputs |
//! |-----------|--------|
//! | `Convolution` | `input, weights.., biases..` (one weights/bias entry per split, or a single merged entry) |
//! | `FullyConnected` | `input, weights[, bias]` |
//! | `Eltwise`, `Concatenation` | two or more data inputs |
//! | `Input`, `Data` | none |
//! | everything else | exactly one data input |

use std::{fmt, sync::Arc};

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::topology::layout::{DataType, Format, Layout, Padding, Tensor};

/// The kind of a primitive, without parameters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PrimitiveKind {
    /// Runtime fed input
    Input,
    /// Constant buffer
    Data,
    /// Format / data type conversion
    Reorder,
    /// Element-wise activation function
    Activation,
    /// Element-wise binary operation
    Eltwise,
    /// 2D convolution
    Convolution,
    /// Fully connected layer
    FullyConnected,
    /// Spatial pooling
    Pooling,
    /// Concatenation along one axis
    Concatenation,
    /// Sub-region extraction
    Crop,
    /// Size reinterpretation
    Reshape,
    /// Split into several crops
    Split,
    /// Softmax over the feature axis
    Softmax,
}

/// Activation functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationFunction {
    /// `max(0, x)`
    Relu,
    /// `x` if positive, `slope * x` otherwise
    LeakyRelu {
        /// Slope for negative inputs
        slope: f32,
    },
    /// `scale * x + shift`
    Linear {
        /// Multiplier
        scale: f32,
        /// Offset
        shift: f32,
    },
    /// Logistic function
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Absolute value
    Abs,
}

impl ActivationFunction {
    /// Applies the function to a single value.
    #[must_use]
    pub fn apply(self, value: f32) -> f32 {
        match self {
            ActivationFunction::Relu => value.max(0.0),
            ActivationFunction::LeakyRelu { slope } => {
                if value > 0.0 {
                    value
                } else {
                    value * slope
                }
            }
            ActivationFunction::Linear { scale, shift } => value * scale + shift,
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-value).exp()),
            ActivationFunction::Tanh => value.tanh(),
            ActivationFunction::Abs => value.abs(),
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ActivationFunction::Relu => "relu",
            ActivationFunction::LeakyRelu { .. } => "leaky_relu",
            ActivationFunction::Linear { .. } => "linear",
            ActivationFunction::Sigmoid => "sigmoid",
            ActivationFunction::Tanh => "tanh",
            ActivationFunction::Abs => "abs",
        }
    }
}

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EltwiseMode {
    /// Sum of all inputs
    Sum,
    /// First input minus the others
    Sub,
    /// Product of all inputs
    Prod,
    /// Maximum of all inputs
    Max,
}

impl EltwiseMode {
    /// Combines two values.
    #[must_use]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            EltwiseMode::Sum => a + b,
            EltwiseMode::Sub => a - b,
            EltwiseMode::Prod => a * b,
            EltwiseMode::Max => a.max(b),
        }
    }
}

/// Pooling modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PoolingMode {
    /// Window maximum
    Max,
    /// Window average
    Average,
}

/// Axis of a concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConcatAxis {
    /// Batch axis
    Batch,
    /// Feature axis
    Feature,
    /// Horizontal spatial axis
    X,
    /// Vertical spatial axis
    Y,
}

impl ConcatAxis {
    /// Index of this axis in `batch, feature, x, y` order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            ConcatAxis::Batch => 0,
            ConcatAxis::Feature => 1,
            ConcatAxis::X => 2,
            ConcatAxis::Y => 3,
        }
    }
}

/// Parameters of a convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvolutionParams {
    /// Window stride (x, y used)
    pub stride: Tensor,
    /// Offset of the first window into the input; negative values pad the input
    pub input_offset: Tensor,
    /// Kernel dilation (x, y used)
    pub dilation: Tensor,
    /// Number of groups the input features are split into
    pub split: u32,
    /// Whether bias inputs follow the weights
    pub with_bias: bool,
    /// Explicitly requested output size
    pub output_size: Option<Tensor>,
    /// Activation applied to the result
    pub activation: Option<ActivationFunction>,
}

impl Default for ConvolutionParams {
    fn default() -> Self {
        Self {
            stride: Tensor::spatial(1, 1),
            input_offset: Tensor::splat(0),
            dilation: Tensor::spatial(1, 1),
            split: 1,
            with_bias: false,
            output_size: None,
            activation: None,
        }
    }
}

/// Parameters of a pooling window.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolingParams {
    /// Pooling mode
    pub mode: PoolingMode,
    /// Window size (x, y used)
    pub size: Tensor,
    /// Window stride (x, y used)
    pub stride: Tensor,
    /// Offset of the first window into the input; negative values pad the input
    pub input_offset: Tensor,
    /// Explicitly requested output size
    pub output_size: Option<Tensor>,
}

/// One named output of a [`Operation::Split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOutput {
    /// Output name; consumers reference it as `<split>:<name>`
    pub name: String,
    /// Offset of this output in the split input
    pub offset: Tensor,
}

impl SplitOutput {
    /// Creates a split output.
    pub fn new(name: impl Into<String>, offset: Tensor) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }
}

/// An operation with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Runtime fed input with a fixed layout
    Input {
        /// Layout of the fed buffer
        layout: Layout,
    },
    /// Constant buffer
    Data {
        /// Layout of the buffer
        layout: Layout,
        /// Values in logical `batch, feature, y, x` order
        values: Arc<[f32]>,
    },
    /// Conversion to another format, data type or padding
    Reorder {
        /// Target format
        format: Format,
        /// Target data type
        data_type: DataType,
        /// Target padding
        padding: Padding,
    },
    /// Activation function
    Activation {
        /// The function
        function: ActivationFunction,
    },
    /// Element-wise operation over equally sized inputs
    Eltwise {
        /// The operation
        mode: EltwiseMode,
        /// Activation applied to the result
        activation: Option<ActivationFunction>,
    },
    /// Convolution
    Convolution(ConvolutionParams),
    /// Fully connected layer
    FullyConnected {
        /// Whether a bias input follows the weights
        with_bias: bool,
        /// Activation applied to the result
        activation: Option<ActivationFunction>,
    },
    /// Pooling
    Pooling(PoolingParams),
    /// Concatenation
    Concatenation {
        /// Concatenation axis
        axis: ConcatAxis,
    },
    /// Crop of a sub-region
    Crop {
        /// Output size
        reference: Tensor,
        /// Offset of the region in the input
        offset: Tensor,
    },
    /// Reshape to another size with the same element count
    Reshape {
        /// Target size
        size: Tensor,
    },
    /// Split into named crops
    Split {
        /// Outputs ordered by offset
        outputs: Vec<SplitOutput>,
    },
    /// Softmax
    Softmax,
}

impl Operation {
    /// The parameterless kind of this operation.
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Operation::Input { .. } => PrimitiveKind::Input,
            Operation::Data { .. } => PrimitiveKind::Data,
            Operation::Reorder { .. } => PrimitiveKind::Reorder,
            Operation::Activation { .. } => PrimitiveKind::Activation,
            Operation::Eltwise { .. } => PrimitiveKind::Eltwise,
            Operation::Convolution(_) => PrimitiveKind::Convolution,
            Operation::FullyConnected { .. } => PrimitiveKind::FullyConnected,
            Operation::Pooling(_) => PrimitiveKind::Pooling,
            Operation::Concatenation { .. } => PrimitiveKind::Concatenation,
            Operation::Crop { .. } => PrimitiveKind::Crop,
            Operation::Reshape { .. } => PrimitiveKind::Reshape,
            Operation::Split { .. } => PrimitiveKind::Split,
            Operation::Softmax => PrimitiveKind::Softmax,
        }
    }

    /// The activation fused into this operation, if any.
    #[must_use]
    pub fn fused_activation(&self) -> Option<ActivationFunction> {
        match self {
            Operation::Convolution(params) => params.activation,
            Operation::Eltwise { activation, .. }
            | Operation::FullyConnected { activation, .. } => *activation,
            _ => None,
        }
    }

    /// Returns a copy of this operation with `function` fused in, or `None` if the
    /// operation cannot carry an activation or already carries one.
    #[must_use]
    pub fn with_activation(&self, function: ActivationFunction) -> Option<Operation> {
        match self {
            Operation::Convolution(params) if params.activation.is_none() => {
                Some(Operation::Convolution(ConvolutionParams {
                    activation: Some(function),
                    ..params.clone()
                }))
            }
            Operation::Eltwise {
                mode,
                activation: None,
            } => Some(Operation::Eltwise {
                mode: *mode,
                activation: Some(function),
            }),
            Operation::FullyConnected {
                with_bias,
                activation: None,
            } => Some(Operation::FullyConnected {
                with_bias: *with_bias,
                activation: Some(function),
            }),
            _ => None,
        }
    }
}

/// An immutable primitive descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Unique identifier within a topology
    pub id: String,
    /// Operation and parameters
    pub operation: Operation,
    /// Ordered input identifiers
    pub inputs: Vec<String>,
}

impl Primitive {
    /// Creates a primitive.
    pub fn new<I, S>(id: impl Into<String>, operation: Operation, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            operation,
            inputs: inputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a runtime input.
    pub fn input(id: impl Into<String>, layout: Layout) -> Self {
        Self::new(id, Operation::Input { layout }, Vec::<String>::new())
    }

    /// Creates a constant. `values` must hold one value per logical element.
    pub fn data(id: impl Into<String>, layout: Layout, values: impl Into<Arc<[f32]>>) -> Self {
        Self::new(
            id,
            Operation::Data {
                layout,
                values: values.into(),
            },
            Vec::<String>::new(),
        )
    }

    /// Creates a reorder to `format` and `data_type`.
    pub fn reorder(
        id: impl Into<String>,
        input: impl Into<String>,
        format: Format,
        data_type: DataType,
    ) -> Self {
        Self::new(
            id,
            Operation::Reorder {
                format,
                data_type,
                padding: Padding::none(),
            },
            [input.into()],
        )
    }

    /// Creates an activation.
    pub fn activation(
        id: impl Into<String>,
        input: impl Into<String>,
        function: ActivationFunction,
    ) -> Self {
        Self::new(id, Operation::Activation { function }, [input.into()])
    }

    /// Creates an element-wise operation.
    pub fn eltwise<I, S>(id: impl Into<String>, inputs: I, mode: EltwiseMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            Operation::Eltwise {
                mode,
                activation: None,
            },
            inputs,
        )
    }

    /// Creates a convolution with one weights (and optional bias) input per split.
    pub fn convolution<W, B, S, T>(
        id: impl Into<String>,
        input: impl Into<String>,
        weights: W,
        biases: B,
        params: ConvolutionParams,
    ) -> Self
    where
        W: IntoIterator<Item = S>,
        B: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut inputs = vec![input.into()];
        inputs.extend(weights.into_iter().map(Into::into));
        let before = inputs.len();
        inputs.extend(biases.into_iter().map(Into::into));
        let with_bias = inputs.len() > before;
        Self::new(
            id,
            Operation::Convolution(ConvolutionParams {
                with_bias,
                ..params
            }),
            inputs,
        )
    }

    /// Creates a fully connected layer.
    pub fn fully_connected(
        id: impl Into<String>,
        input: impl Into<String>,
        weights: impl Into<String>,
        bias: Option<String>,
    ) -> Self {
        let mut inputs = vec![input.into(), weights.into()];
        let with_bias = bias.is_some();
        inputs.extend(bias);
        Self::new(
            id,
            Operation::FullyConnected {
                with_bias,
                activation: None,
            },
            inputs,
        )
    }

    /// Creates a pooling.
    pub fn pooling(id: impl Into<String>, input: impl Into<String>, params: PoolingParams) -> Self {
        Self::new(id, Operation::Pooling(params), [input.into()])
    }

    /// Creates a concatenation.
    pub fn concatenation<I, S>(id: impl Into<String>, inputs: I, axis: ConcatAxis) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(id, Operation::Concatenation { axis }, inputs)
    }

    /// Creates a crop.
    pub fn crop(
        id: impl Into<String>,
        input: impl Into<String>,
        reference: Tensor,
        offset: Tensor,
    ) -> Self {
        Self::new(id, Operation::Crop { reference, offset }, [input.into()])
    }

    /// Creates a reshape.
    pub fn reshape(id: impl Into<String>, input: impl Into<String>, size: Tensor) -> Self {
        Self::new(id, Operation::Reshape { size }, [input.into()])
    }

    /// Creates a split.
    pub fn split(
        id: impl Into<String>,
        input: impl Into<String>,
        outputs: Vec<SplitOutput>,
    ) -> Self {
        Self::new(id, Operation::Split { outputs }, [input.into()])
    }

    /// Creates a softmax.
    pub fn softmax(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self::new(id, Operation::Softmax, [input.into()])
    }

    /// The parameterless kind of this primitive.
    #[must_use]
    pub const fn kind(&self) -> PrimitiveKind {
        self.operation.kind()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}({})", self.id, self.kind(), self.inputs.join(", "))
    }
}
