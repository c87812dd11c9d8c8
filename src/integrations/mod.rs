//! External service clients.

pub mod mem0;

pub use mem0::{Mem0Client, MemoryMessage, MemoryRecord};
