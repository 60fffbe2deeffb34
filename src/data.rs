//! Tagged leaf values.
//!
//! An [`FbomData`] is either an inline payload (raw bytes plus the
//! [`FbomType`] describing them) or a reference into the container's
//! static data pool. The container layer treats payload bytes as opaque;
//! the typed accessors here are conveniences for marshalers, which own
//! the interpretation.

use crate::error::FbomError;
use crate::object::FbomObject;
use crate::type_descriptor::FbomType;

/// Type name used for nested object blobs (see [`FbomData::from_object`]).
pub const OBJECT_BLOB_TYPE: &str = "Object";

/// A serialized leaf value: inline bytes or a pool reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FbomData {
    /// Raw bytes with a self-describing type tag.
    Inline { ty: FbomType, bytes: Vec<u8> },
    /// Offset of a DATA-kind entry in the static data pool.
    StaticRef(u32),
}

impl FbomData {
    pub fn new(ty: FbomType, bytes: Vec<u8>) -> Self {
        Self::Inline { ty, bytes }
    }

    /// The payload type, if this cell is inline.
    pub fn ty(&self) -> Option<&FbomType> {
        match self {
            Self::Inline { ty, .. } => Some(ty),
            Self::StaticRef(_) => None,
        }
    }

    /// The payload bytes, if this cell is inline.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Inline { bytes, .. } => Some(bytes),
            Self::StaticRef(_) => None,
        }
    }

    fn inline(&self, expected: &str) -> Result<(&FbomType, &[u8]), FbomError> {
        match self {
            Self::Inline { ty, bytes } => Ok((ty, bytes)),
            Self::StaticRef(offset) => Err(FbomError::format(format!(
                "expected inline {expected} payload, found unresolved pool reference {offset}"
            ))),
        }
    }

    // -- scalar constructors ------------------------------------------------

    pub fn from_pod<T: bytemuck::Pod>(type_name: &str, value: &T) -> Self {
        let bytes = bytemuck::bytes_of(value).to_vec();
        Self::Inline {
            ty: FbomType::new(type_name, bytes.len() as u64),
            bytes,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self::Inline {
            ty: FbomType::new("bool", 1),
            bytes: vec![value as u8],
        }
    }

    pub fn from_string(value: &str) -> Self {
        Self::Inline {
            ty: FbomType::new("String", value.len() as u64),
            bytes: value.as_bytes().to_vec(),
        }
    }

    /// Encode a full object subtree into an opaque byte payload.
    ///
    /// The bytes use the same wire encoding as a top-level object but
    /// carry no header and no pool; [`to_object`](Self::to_object)
    /// reverses the conversion. The container itself never looks inside.
    pub fn from_object(object: &FbomObject) -> Result<Self, FbomError> {
        let bytes = crate::writer::encode_object_blob(object)?;
        Ok(Self::Inline {
            ty: FbomType::new(OBJECT_BLOB_TYPE, bytes.len() as u64),
            bytes,
        })
    }

    // -- typed accessors ----------------------------------------------------

    pub fn as_pod<T: bytemuck::Pod>(&self, expected: &str) -> Result<T, FbomError> {
        let (ty, bytes) = self.inline(expected)?;
        if bytes.len() != std::mem::size_of::<T>() {
            return Err(FbomError::format(format!(
                "payload size mismatch for {expected}: type '{}' carries {} bytes, need {}",
                ty.name,
                bytes.len(),
                std::mem::size_of::<T>()
            )));
        }
        bytemuck::try_pod_read_unaligned(bytes)
            .map_err(|e| FbomError::format(format!("bad {expected} payload: {e}")))
    }

    pub fn as_bool(&self) -> Result<bool, FbomError> {
        let (_, bytes) = self.inline("bool")?;
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(FbomError::format("bad bool payload")),
        }
    }

    pub fn as_string(&self) -> Result<String, FbomError> {
        let (_, bytes) = self.inline("String")?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| FbomError::format(format!("string payload is not UTF-8: {e}")))
    }

    /// Decode a nested object blob written by [`from_object`](Self::from_object).
    pub fn to_object(&self) -> Result<FbomObject, FbomError> {
        let (ty, bytes) = self.inline("object blob")?;
        if !ty.is_or_extends(OBJECT_BLOB_TYPE) {
            return Err(FbomError::format(format!(
                "expected an object blob, found type '{}'",
                ty.name
            )));
        }
        crate::reader::decode_object_blob(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_round_trip() {
        let cell = FbomData::from_pod("u32", &7u32);
        assert_eq!(cell.as_pod::<u32>("u32").unwrap(), 7);
        assert_eq!(cell.ty().unwrap().name, "u32");
        assert_eq!(cell.ty().unwrap().size, 4);
    }

    #[test]
    fn bool_round_trip() {
        assert!(FbomData::from_bool(true).as_bool().unwrap());
        assert!(!FbomData::from_bool(false).as_bool().unwrap());
    }

    #[test]
    fn string_round_trip() {
        let cell = FbomData::from_string("models/");
        assert_eq!(cell.as_string().unwrap(), "models/");
    }

    #[test]
    fn size_mismatch_rejected() {
        let cell = FbomData::from_pod("u32", &7u32);
        assert!(cell.as_pod::<u64>("u64").is_err());
    }

    #[test]
    fn unresolved_ref_has_no_payload() {
        let cell = FbomData::StaticRef(3);
        assert!(cell.as_pod::<u32>("u32").is_err());
        assert!(cell.bytes().is_none());
    }
}
