//! Serialized object tree nodes.
//!
//! An [`FbomObject`] is a named property bag plus an ordered list of
//! child objects. Property names are unique within one node (last write
//! wins); children preserve write order. Once a decode pass resolves a
//! node through a marshaler, the native value is memoized in the
//! `deserialized` slot — revisiting the same node (for example through a
//! second static-pool reference) reuses the handle instead of re-running
//! the marshaler.

use std::any::Any;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::data::FbomData;
use crate::error::FbomError;
use crate::type_descriptor::FbomType;

/// Shared opaque handle to a deserialized native value.
pub type NativeHandle = Arc<dyn Any + Send + Sync>;

/// Marker that an object's payload lives in a separate chunk file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalRef {
    /// Chunk name, joined with the root's `base_path` and the fixed
    /// chunk extension to form the file path.
    pub name: String,
    /// Object index inside the chunk. Reserved for multi-object chunks;
    /// currently always 0.
    pub index: u32,
    /// Reserved flags word.
    pub flags: u32,
}

impl ExternalRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: 0,
            flags: 0,
        }
    }
}

/// One serialized instance: a type tag, ordered properties, and children.
#[derive(Debug, Clone, Default)]
pub struct FbomObject {
    pub ty: FbomType,
    properties: Vec<(String, FbomData)>,
    pub children: Vec<FbomObject>,
    /// Memoized native value, set once per node per decode pass.
    pub deserialized: Option<NativeHandle>,
    /// When set, the writer emits this node as an external reference
    /// instead of an inline object.
    pub external: Option<ExternalRef>,
}

impl FbomObject {
    pub fn new(ty: FbomType) -> Self {
        Self {
            ty,
            properties: Vec::new(),
            children: Vec::new(),
            deserialized: None,
            external: None,
        }
    }

    /// Set a property, overwriting any prior value for the same name.
    pub fn set_property(&mut self, name: impl Into<String>, value: FbomData) {
        let name = name.into();
        if let Some(slot) = self.properties.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.properties.push((name, value));
        }
    }

    pub fn property(&self, name: &str) -> Option<&FbomData> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    /// Properties in write order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &FbomData)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn add_child(&mut self, child: FbomObject) {
        self.children.push(child);
    }

    /// Downcast the memoized native handle to a concrete type.
    pub fn decode_into<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, FbomError> {
        let handle = self.deserialized.clone().ok_or_else(|| {
            FbomError::marshal(self.ty.name.clone(), "object has no deserialized value")
        })?;
        handle.downcast::<T>().map_err(|_| {
            FbomError::marshal(
                self.ty.name.clone(),
                format!(
                    "deserialized value is not a {}",
                    std::any::type_name::<T>()
                ),
            )
        })
    }
}

// Structural equality and hashing ignore the memoized native handle; two
// nodes that decode to the same bytes are the same node for dedup
// purposes regardless of resolution state.

impl PartialEq for FbomObject {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
            && self.properties == other.properties
            && self.children == other.children
            && self.external == other.external
    }
}

impl Eq for FbomObject {}

impl Hash for FbomObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        self.properties.hash(state);
        self.children.hash(state);
        self.external.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_property_write_wins() {
        let mut obj = FbomObject::new(FbomType::new("Material", 0));
        obj.set_property("roughness", FbomData::from_pod("f32", &0.5f32));
        obj.set_property("roughness", FbomData::from_pod("f32", &0.9f32));
        assert_eq!(obj.property_count(), 1);
        let value = obj.property("roughness").unwrap();
        assert_eq!(value.as_pod::<f32>("f32").unwrap(), 0.9);
    }

    #[test]
    fn properties_preserve_insertion_order() {
        let mut obj = FbomObject::new(FbomType::new("Transform", 0));
        obj.set_property("z", FbomData::from_pod("f32", &3.0f32));
        obj.set_property("a", FbomData::from_pod("f32", &1.0f32));
        let names: Vec<_> = obj.properties().map(|(n, _)| n).collect();
        assert_eq!(names, ["z", "a"]);
    }

    #[test]
    fn equality_ignores_deserialized_handle() {
        let mut a = FbomObject::new(FbomType::new("Node", 0));
        a.set_property("id", FbomData::from_pod("u32", &1u32));
        let mut b = a.clone();
        b.deserialized = Some(Arc::new(1u32));
        assert_eq!(a, b);
    }

    #[test]
    fn decode_into_downcasts() {
        let mut obj = FbomObject::new(FbomType::new("u32", 4));
        obj.deserialized = Some(Arc::new(42u32));
        assert_eq!(*obj.decode_into::<u32>().unwrap(), 42);
        assert!(obj.decode_into::<String>().is_err());
    }
}
