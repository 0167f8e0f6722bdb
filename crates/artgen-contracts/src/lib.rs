pub mod error;
pub mod events;
pub mod generation;
pub mod storage;

pub use error::{ErrorKind, ImageError};
