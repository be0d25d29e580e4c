//! Core traits shared by the container and user types.

mod dispose;

pub use dispose::Dispose;
