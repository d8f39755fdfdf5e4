//! File system implementations for sidecar key material

mod local;
mod memory;

pub use local::LocalFileSystem;
pub use memory::InMemoryFileSystem;
