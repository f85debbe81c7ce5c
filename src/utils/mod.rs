//! Small shared data structures.

mod bitset;

pub use bitset::BitSet;
