//! Per-container deduplication pool.
//!
//! The static data pool maps dense offsets (`0..len`) to deduplicated
//! types, objects, and data cells so repeated structures are written
//! once per file. The pool is owned by a single encode or decode
//! operation; it is never shared across containers. Entries may only
//! reference earlier offsets in the same pool, which the writer
//! guarantees by emitting children before parents.

use crate::data::FbomData;
use crate::error::FbomError;
use crate::object::FbomObject;
use crate::type_descriptor::FbomType;

/// What a pool slot holds.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    None,
    Object(FbomObject),
    Type(FbomType),
    Data(FbomData),
}

impl PoolEntry {
    /// On-wire kind byte.
    pub fn kind(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Object(_) => 1,
            Self::Type(_) => 2,
            Self::Data(_) => 3,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Object(_) => "OBJECT",
            Self::Type(_) => "TYPE",
            Self::Data(_) => "DATA",
        }
    }
}

/// Dense offset -> entry table for one container.
#[derive(Debug, Default)]
pub struct StaticDataPool {
    entries: Vec<PoolEntry>,
}

impl StaticDataPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry, returning its offset.
    pub fn push(&mut self, entry: PoolEntry) -> u32 {
        let offset = self.entries.len() as u32;
        self.entries.push(entry);
        offset
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, &PoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u32, e))
    }

    fn get(&self, offset: u32, expected: &str) -> Result<&PoolEntry, FbomError> {
        self.entries.get(offset as usize).ok_or_else(|| {
            FbomError::format(format!(
                "pool offset {offset} out of range for {expected} (pool has {} entries)",
                self.entries.len()
            ))
        })
    }

    /// Resolve an offset that must hold an OBJECT entry.
    pub fn object_at(&self, offset: u32) -> Result<&FbomObject, FbomError> {
        match self.get(offset, "object")? {
            PoolEntry::Object(obj) => Ok(obj),
            other => Err(FbomError::format(format!(
                "pool entry {offset} is {}, expected OBJECT",
                other.kind_name()
            ))),
        }
    }

    /// Resolve an offset that must hold a TYPE entry.
    pub fn type_at(&self, offset: u32) -> Result<&FbomType, FbomError> {
        match self.get(offset, "type")? {
            PoolEntry::Type(ty) => Ok(ty),
            other => Err(FbomError::format(format!(
                "pool entry {offset} is {}, expected TYPE",
                other.kind_name()
            ))),
        }
    }

    /// Resolve an offset that must hold a DATA entry.
    pub fn data_at(&self, offset: u32) -> Result<&FbomData, FbomError> {
        match self.get(offset, "data")? {
            PoolEntry::Data(data) => Ok(data),
            other => Err(FbomError::format(format!(
                "pool entry {offset} is {}, expected DATA",
                other.kind_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_dense() {
        let mut pool = StaticDataPool::new();
        assert_eq!(pool.push(PoolEntry::Type(FbomType::new("u32", 4))), 0);
        assert_eq!(pool.push(PoolEntry::Data(FbomData::from_bool(true))), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn kind_mismatch_is_error() {
        let mut pool = StaticDataPool::new();
        pool.push(PoolEntry::Type(FbomType::new("u32", 4)));
        assert!(pool.type_at(0).is_ok());
        assert!(pool.object_at(0).is_err());
        assert!(pool.data_at(0).is_err());
    }

    #[test]
    fn out_of_range_offset_is_error() {
        let pool = StaticDataPool::new();
        assert!(matches!(pool.object_at(0), Err(FbomError::Format(_))));
        assert!(matches!(pool.data_at(99), Err(FbomError::Format(_))));
    }
}
