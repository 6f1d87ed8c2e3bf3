//! Document stores
//!
//! The harvester reaches documents only through the `DocumentStore` trait.
//! `FsStore` serves a directory of markdown files; `MemoryStore` keeps
//! everything in memory and is what the tests run against.

mod fs;
mod memory;
mod traits;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use traits::{
    basename_of, DocumentChange, DocumentRef, DocumentStore, StoreError, StoreResult,
};
