//! Memory layouts of node outputs.
//!
//! A [`Layout`] describes how a node's output buffer is organised: the element
//! [`DataType`], the memory [`Format`] (axis ordering, optional blocking), the logical
//! [`Tensor`] size and the [`Padding`] surrounding the data. Two layouts are interchangeable
//! only if all four components are equal.
//!
//! Sizes are always given in logical `batch, feature, x, y` order regardless of the
//! memory format, so format conversions never change a tensor's size.

use std::{
    fmt,
    ops::{Add, Sub},
};

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Element type of a buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DataType {
    /// 32-bit float
    #[default]
    F32,
    /// 16-bit float
    F16,
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
}

impl DataType {
    /// Size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            DataType::F32 => 4,
            DataType::F16 => 2,
            DataType::I8 | DataType::U8 => 1,
        }
    }
}

/// Memory format of a buffer.
///
/// Activation formats name the axis order from outermost to innermost. Weight formats
/// (`oiyx`, `os_iyx_osv16`, `yxio`) interpret the batch axis as output features and the
/// feature axis as input features.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Format {
    /// Plain batch, feature, y, x
    #[default]
    Bfyx,
    /// Plain y, x, feature, batch
    Yxfb,
    /// Plain batch, y, x, feature
    Byxf,
    /// Plain feature, y, x, batch
    Fyxb,
    /// Feature axis blocked by 16
    BfyxF16,
    /// Plain weights
    Oiyx,
    /// Weights with output features blocked by 16
    OsIyxOsv16,
    /// Weights with spatial axes outermost
    Yxio,
}

impl Format {
    /// Returns `true` if this format groups an axis into fixed-size blocks.
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        matches!(self, Format::BfyxF16 | Format::OsIyxOsv16)
    }

    /// Returns `true` if this is a weights format.
    #[must_use]
    pub const fn is_weights(self) -> bool {
        matches!(self, Format::Oiyx | Format::OsIyxOsv16 | Format::Yxio)
    }

    /// Returns `true` for unblocked activation formats.
    #[must_use]
    pub const fn is_plain(self) -> bool {
        !self.is_blocked() && !self.is_weights()
    }
}

/// A four dimensional size, offset or stride in logical `batch, feature, x, y` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tensor {
    /// Batch axis
    pub batch: i32,
    /// Feature axis
    pub feature: i32,
    /// Horizontal spatial axis
    pub x: i32,
    /// Vertical spatial axis
    pub y: i32,
}

impl Tensor {
    /// Creates a tensor from its four axes.
    #[must_use]
    pub const fn new(batch: i32, feature: i32, x: i32, y: i32) -> Self {
        Self {
            batch,
            feature,
            x,
            y,
        }
    }

    /// Creates a tensor with every axis set to `value`.
    #[must_use]
    pub const fn splat(value: i32) -> Self {
        Self::new(value, value, value, value)
    }

    /// Creates a spatial-only tensor (batch and feature set to 1).
    #[must_use]
    pub const fn spatial(x: i32, y: i32) -> Self {
        Self::new(1, 1, x, y)
    }

    /// Number of elements covered by this size. Non-positive axes count as zero.
    #[must_use]
    pub fn count(&self) -> usize {
        self.axes()
            .iter()
            .map(|&a| usize::try_from(a).unwrap_or(0))
            .product()
    }

    /// The axes in `batch, feature, x, y` order.
    #[must_use]
    pub const fn axes(&self) -> [i32; 4] {
        [self.batch, self.feature, self.x, self.y]
    }

    /// Builds a tensor from axes in `batch, feature, x, y` order.
    #[must_use]
    pub const fn from_axes(axes: [i32; 4]) -> Self {
        Self::new(axes[0], axes[1], axes[2], axes[3])
    }

    /// Per-axis maximum.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.batch.max(other.batch),
            self.feature.max(other.feature),
            self.x.max(other.x),
            self.y.max(other.y),
        )
    }

    /// Per-axis clamp to non-negative values.
    #[must_use]
    pub fn clamp_negative(self) -> Self {
        self.max(Self::splat(0))
    }

    /// Returns `true` if every axis is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::splat(0)
    }
}

impl Add for Tensor {
    type Output = Tensor;

    fn add(self, rhs: Self) -> Self::Output {
        Tensor::new(
            self.batch + rhs.batch,
            self.feature + rhs.feature,
            self.x + rhs.x,
            self.y + rhs.y,
        )
    }
}

impl Sub for Tensor {
    type Output = Tensor;

    fn sub(self, rhs: Self) -> Self::Output {
        Tensor::new(
            self.batch - rhs.batch,
            self.feature - rhs.feature,
            self.x - rhs.x,
            self.y - rhs.y,
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{}", self.batch, self.feature, self.x, self.y)
    }
}

/// Padding around the data of a buffer.
///
/// `lower` is the number of padding elements before the data on each axis, `upper` the
/// number after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Padding {
    /// Padding before the data
    pub lower: Tensor,
    /// Padding after the data
    pub upper: Tensor,
}

impl Padding {
    /// Creates a padding from its lower and upper sizes.
    #[must_use]
    pub const fn new(lower: Tensor, upper: Tensor) -> Self {
        Self { lower, upper }
    }

    /// No padding.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(Tensor::splat(0), Tensor::splat(0))
    }

    /// Returns `true` if no axis is padded.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.lower.is_zero() && self.upper.is_zero()
    }

    /// Per-axis maximum of two paddings.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.lower.max(other.lower), self.upper.max(other.upper))
    }

    /// Returns `true` if this padding is at least `other` on every axis.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.max(*other) == *self
    }
}

/// Complete description of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Layout {
    /// Element type
    pub data_type: DataType,
    /// Memory format
    pub format: Format,
    /// Logical size
    pub size: Tensor,
    /// Padding around the data
    pub padding: Padding,
}

impl Layout {
    /// Creates an unpadded layout.
    #[must_use]
    pub const fn new(data_type: DataType, format: Format, size: Tensor) -> Self {
        Self {
            data_type,
            format,
            size,
            padding: Padding::none(),
        }
    }

    /// Returns a copy of this layout with the given padding.
    #[must_use]
    pub const fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Returns a copy of this layout with another format.
    #[must_use]
    pub const fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Returns a copy of this layout with another data type.
    #[must_use]
    pub const fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Number of logical elements.
    #[must_use]
    pub fn count(&self) -> usize {
        self.size.count()
    }

    /// Size of the buffer including padding and block rounding.
    #[must_use]
    pub fn buffer_size(&self) -> Tensor {
        let mut size = self.size + self.padding.lower + self.padding.upper;
        match self.format {
            Format::BfyxF16 => size.feature = round_up(size.feature, 16),
            Format::OsIyxOsv16 => size.batch = round_up(size.batch, 16),
            _ => {}
        }
        size
    }

    /// Number of bytes needed to hold the buffer.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.buffer_size().count() * self.data_type.size()
    }

    /// Returns `true` if both layouts describe the same data ignoring padding.
    #[must_use]
    pub fn same_data(&self, other: &Self) -> bool {
        self.data_type == other.data_type && self.format == other.format && self.size == other.size
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.data_type, self.format, self.size)?;
        if !self.padding.is_zero() {
            write!(f, " pad({}|{})", self.padding.lower, self.padding.upper)?;
        }
        Ok(())
    }
}

fn round_up(value: i32, multiple: i32) -> i32 {
    (value + multiple - 1) / multiple * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names() {
        assert_eq!(Format::Bfyx.to_string(), "bfyx");
        assert_eq!(Format::OsIyxOsv16.to_string(), "os_iyx_osv16");
        assert_eq!(Format::BfyxF16.to_string(), "bfyx_f16");
        assert_eq!(DataType::F16.to_string(), "f16");
    }

    #[test]
    fn test_format_classes() {
        assert!(Format::Bfyx.is_plain());
        assert!(Format::BfyxF16.is_blocked());
        assert!(!Format::BfyxF16.is_plain());
        assert!(Format::Oiyx.is_weights());
        assert!(!Format::Oiyx.is_plain());
    }

    #[test]
    fn test_tensor_arithmetic() {
        let a = Tensor::new(1, 2, 3, 4);
        let b = Tensor::new(1, 1, 1, 1);
        assert_eq!(a + b, Tensor::new(2, 3, 4, 5));
        assert_eq!(a - b, Tensor::new(0, 1, 2, 3));
        assert_eq!(a.count(), 24);
        assert_eq!(Tensor::new(1, -1, 2, 2).count(), 0);
        assert_eq!(Tensor::new(-2, 3, 0, 1).clamp_negative(), Tensor::new(0, 3, 0, 1));
    }

    #[test]
    fn test_padding_covers() {
        let small = Padding::new(Tensor::new(0, 0, 1, 1), Tensor::splat(0));
        let large = Padding::new(Tensor::new(0, 0, 2, 1), Tensor::new(0, 0, 1, 1));
        assert!(large.covers(&small));
        assert!(!small.covers(&large));
        assert!(Padding::none().is_zero());
    }

    #[test]
    fn test_layout_buffer_size() {
        let layout = Layout::new(DataType::F16, Format::BfyxF16, Tensor::new(1, 3, 4, 4))
            .with_padding(Padding::new(Tensor::new(0, 0, 1, 1), Tensor::new(0, 0, 1, 1)));
        assert_eq!(layout.buffer_size(), Tensor::new(1, 16, 6, 6));
        assert_eq!(layout.bytes(), 16 * 36 * 2);
        assert_eq!(layout.to_string(), "f16:bfyx_f16:1x3x4x4 pad(0x0x1x1|0x0x1x1)");
    }
}
