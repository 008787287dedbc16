//! # hoststore Storage
//!
//! Append-only byte devices used by the hoststore engine to persist its
//! commit log.
//!
//! Devices are **opaque**: they never interpret what is written to them.
//! The engine in `hoststore_core` owns the record framing, checksums and
//! replay; a device only has to hand back exactly the bytes it was given.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests
//! - [`FileBackend`] - a single file on the local file system
//!
//! ## Example
//!
//! ```rust
//! use hoststore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"commit").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"commit");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
