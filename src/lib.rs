//! # FBOM
//!
//! Self-describing, versioned binary object-model serializer: a container
//! format plus the reader/writer protocol and the marshaling bridge that
//! lets native object graphs be persisted and reloaded, including
//! cross-file references and deduplicated shared data.
//!
//! ## Core Types
//!
//! - [`FbomType`] — chained self-describing type tag
//! - [`FbomData`] — tagged leaf value (inline bytes or pool reference)
//! - [`FbomObject`] — property bag + ordered children, with a memoized
//!   deserialized handle
//! - [`StaticDataPool`] — per-container dedup table for types, objects,
//!   and data cells
//! - [`FbomReader`] / [`FbomWriter`] — streaming decoder and encoder
//! - [`MarshalRegistry`] / [`Marshal`] — pluggable native-value
//!   conversion, with a reflection-driven fallback via
//!   [`ClassRegistry`]
//!
//! ## Quick start
//!
//! ```
//! use fbom::MarshalRegistry;
//!
//! let registry = MarshalRegistry::with_builtins();
//! let bytes = fbom::to_bytes(&registry, &42u32).unwrap();
//! let restored = fbom::from_bytes::<u32>(&registry, &bytes).unwrap();
//! assert_eq!(*restored, 42);
//! ```
//!
//! Decoding and encoding are synchronous and single-threaded; a reader
//! or writer and its pool belong to one decode/encode call. The
//! [`MarshalRegistry`] is read-mostly: register marshalers and class
//! descriptors during startup, then share it by reference.

mod data;
mod error;
pub mod marshal;
mod object;
mod reader;
mod static_pool;
mod type_descriptor;
mod version;
pub mod wire;
mod writer;

pub use data::FbomData;
pub use error::FbomError;
pub use marshal::{
    ClassDescriptor, ClassMember, ClassRegistry, Marshal, MarshalFlags, MarshalRegistry,
    Marshaled, MarshaledRef, Marshaler, MemberKind,
};
pub use object::{ExternalRef, FbomObject, NativeHandle};
pub use reader::{FbomReader, BASE_PATH_PROPERTY, ROOT_TYPE};
pub use static_pool::{PoolEntry, StaticDataPool};
pub use type_descriptor::FbomType;
pub use version::{FbomVersion, VersionMask, CURRENT_VERSION};
pub use writer::FbomWriter;

use std::path::Path;
use std::sync::Arc;

/// Marshal a native value and encode it as a complete container.
pub fn to_bytes<T: Send + Sync + 'static>(
    registry: &MarshalRegistry,
    value: &T,
) -> Result<Vec<u8>, FbomError> {
    FbomWriter::new(registry).write_value(value)
}

/// Decode a container and downcast the root's deserialized value.
pub fn from_bytes<T: Send + Sync + 'static>(
    registry: &MarshalRegistry,
    bytes: &[u8],
) -> Result<Arc<T>, FbomError> {
    FbomReader::new(registry).read_value(bytes)
}

/// Marshal a native value and write it as a container file.
pub fn write_to_path<T: Send + Sync + 'static>(
    registry: &MarshalRegistry,
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), FbomError> {
    let bytes = to_bytes(registry, value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a container file and downcast the root's deserialized value.
pub fn read_from_path<T: Send + Sync + 'static>(
    registry: &MarshalRegistry,
    path: impl AsRef<Path>,
) -> Result<Arc<T>, FbomError> {
    FbomReader::new(registry)
        .read_from_path(path)?
        .decode_into::<T>()
}
