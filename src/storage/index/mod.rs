//! Retrieval index implementations.

mod vector;

pub use vector::VectorIndex;
