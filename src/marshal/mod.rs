//! Pluggable conversion between native values and serialized nodes.
//!
//! A [`Marshal`] implementation converts one logical type to and from its
//! [`FbomObject`] / [`FbomData`] representation. The [`MarshalRegistry`]
//! maps type names to marshalers: built-in scalar and string marshalers
//! cover the fast path, custom marshalers can be registered per type, and
//! types with a class descriptor in the registry's [`ClassRegistry`] fall
//! back to the generic reflection-driven marshaler.
//!
//! The registry is an explicit object constructed once at startup and
//! passed by reference into every encoder and decoder. Registration must
//! happen before concurrent encode/decode begins; lookups afterwards are
//! read-only.

mod reflect;

pub use reflect::{ClassDescriptor, ClassMember, ClassRegistry, MemberKind};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::data::FbomData;
use crate::error::FbomError;
use crate::object::{FbomObject, NativeHandle};
use crate::type_descriptor::FbomType;

bitflags::bitflags! {
    /// Flags passed through to [`Marshal::serialize`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MarshalFlags: u32 {
        /// The caller intends to emit the resulting object as an
        /// external chunk.
        const EXTERNAL = 1 << 0;
    }
}

/// A serialized native value: either a full object node or a leaf cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Marshaled {
    Object(FbomObject),
    Data(FbomData),
}

/// Borrowed view of serialized input handed to [`Marshal::deserialize`].
#[derive(Debug, Clone, Copy)]
pub enum MarshaledRef<'a> {
    Object(&'a FbomObject),
    Data(&'a FbomData),
}

/// Converter between a native value and its serialized representation.
///
/// `value` crosses the boundary as `&(dyn Any + Send + Sync)`; concrete
/// implementations downcast to their own type. The registry is passed in
/// so aggregate marshalers can recurse into member marshalers.
pub trait Marshal: Send + Sync {
    /// The logical type name this marshaler handles. Matches the
    /// [`FbomType`] name written to the wire.
    fn type_name(&self) -> &str;

    fn serialize(
        &self,
        registry: &MarshalRegistry,
        value: &(dyn Any + Send + Sync),
        flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError>;

    fn deserialize(
        &self,
        registry: &MarshalRegistry,
        source: MarshaledRef<'_>,
    ) -> Result<NativeHandle, FbomError>;
}

// ---------------------------------------------------------------------------
// Marshaler: closed dispatch over custom + reflection fallback
// ---------------------------------------------------------------------------

/// A resolved marshaler: either a registered custom [`Marshal`] or the
/// generic reflection-driven path bound to a class descriptor.
pub enum Marshaler<'a> {
    Custom(&'a dyn Marshal),
    Reflect(&'a ClassDescriptor),
}

impl Marshaler<'_> {
    pub fn serialize(
        &self,
        registry: &MarshalRegistry,
        value: &(dyn Any + Send + Sync),
        flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError> {
        match self {
            Self::Custom(marshal) => marshal.serialize(registry, value, flags),
            Self::Reflect(class) => reflect::serialize_reflected(class, registry, value, flags),
        }
    }

    pub fn deserialize(
        &self,
        registry: &MarshalRegistry,
        source: MarshaledRef<'_>,
    ) -> Result<NativeHandle, FbomError> {
        match self {
            Self::Custom(marshal) => marshal.deserialize(registry, source),
            Self::Reflect(class) => reflect::deserialize_reflected(class, registry, source),
        }
    }
}

// ---------------------------------------------------------------------------
// MarshalRegistry
// ---------------------------------------------------------------------------

/// Table from logical type identity to marshaler.
///
/// Lookup order: exact registered marshaler, then (when fallback is
/// allowed) the generic reflection marshaler for types with a class
/// descriptor. Types with neither are "plain data": their object nodes
/// decode without native reconstruction.
#[derive(Default)]
pub struct MarshalRegistry {
    table: HashMap<String, Box<dyn Marshal>>,
    names_by_id: HashMap<TypeId, String>,
    classes: ClassRegistry,
}

impl MarshalRegistry {
    /// An empty registry with no marshalers at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in scalar, bool, and
    /// string marshalers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<u8>(Box::new(PodMarshal::<u8>::new("u8")));
        registry.register::<u16>(Box::new(PodMarshal::<u16>::new("u16")));
        registry.register::<u32>(Box::new(PodMarshal::<u32>::new("u32")));
        registry.register::<u64>(Box::new(PodMarshal::<u64>::new("u64")));
        registry.register::<i8>(Box::new(PodMarshal::<i8>::new("i8")));
        registry.register::<i16>(Box::new(PodMarshal::<i16>::new("i16")));
        registry.register::<i32>(Box::new(PodMarshal::<i32>::new("i32")));
        registry.register::<i64>(Box::new(PodMarshal::<i64>::new("i64")));
        registry.register::<f32>(Box::new(PodMarshal::<f32>::new("f32")));
        registry.register::<f64>(Box::new(PodMarshal::<f64>::new("f64")));
        registry.register::<bool>(Box::new(BoolMarshal));
        registry.register::<String>(Box::new(StringMarshal));
        registry
    }

    /// Register a custom marshaler for native type `T`.
    ///
    /// Replaces any previous marshaler for the same type name.
    pub fn register<T: Send + Sync + 'static>(&mut self, marshal: Box<dyn Marshal>) {
        let name = marshal.type_name().to_owned();
        self.names_by_id.insert(TypeId::of::<T>(), name.clone());
        self.table.insert(name, marshal);
    }

    /// Register a class descriptor for the reflection fallback.
    pub fn register_class(&mut self, class: ClassDescriptor) {
        self.names_by_id
            .insert(class.type_id(), class.name().to_owned());
        self.classes.insert(class);
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Resolve a marshaler for a type name.
    ///
    /// Returns the registered custom marshaler if present; otherwise,
    /// when `allow_fallback` is set and the type has a class descriptor,
    /// the generic reflection marshaler. `None` means the type is
    /// unmarshalable and must be treated as plain data.
    pub fn get(&self, type_name: &str, allow_fallback: bool) -> Option<Marshaler<'_>> {
        if let Some(marshal) = self.table.get(type_name) {
            return Some(Marshaler::Custom(marshal.as_ref()));
        }
        if allow_fallback {
            if let Some(class) = self.classes.get(type_name) {
                return Some(Marshaler::Reflect(class));
            }
        }
        None
    }

    /// Resolve a marshaler by native type.
    pub fn get_for<T: Send + Sync + 'static>(&self) -> Option<Marshaler<'_>> {
        let name = self.names_by_id.get(&TypeId::of::<T>())?;
        self.get(name, true)
    }

    /// Serialize a native value through its resolved marshaler.
    pub fn serialize_value<T: Send + Sync + 'static>(
        &self,
        value: &T,
        flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError> {
        let marshaler = self.get_for::<T>().ok_or_else(|| {
            FbomError::marshal(
                std::any::type_name::<T>(),
                "no marshaler registered and no class descriptor available",
            )
        })?;
        marshaler.serialize(self, value, flags)
    }
}

// ---------------------------------------------------------------------------
// Built-in marshalers
// ---------------------------------------------------------------------------

/// Property name under which leaf values are stored when a scalar is
/// promoted to a root object.
pub(crate) const SCALAR_VALUE_KEY: &str = "value";

fn data_of<'a>(
    source: MarshaledRef<'a>,
    type_name: &str,
) -> Result<&'a FbomData, FbomError> {
    match source {
        MarshaledRef::Data(data) => Ok(data),
        MarshaledRef::Object(object) => object.property(SCALAR_VALUE_KEY).ok_or_else(|| {
            FbomError::marshal(
                type_name,
                format!("object has no '{SCALAR_VALUE_KEY}' property"),
            )
        }),
    }
}

/// Marshaler for fixed-width Pod scalars.
struct PodMarshal<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PodMarshal<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }
}

impl<T: bytemuck::Pod + Send + Sync + 'static> Marshal for PodMarshal<T> {
    fn type_name(&self) -> &str {
        self.name
    }

    fn serialize(
        &self,
        _registry: &MarshalRegistry,
        value: &(dyn Any + Send + Sync),
        _flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| FbomError::marshal(self.name, "value is not the expected type"))?;
        Ok(Marshaled::Data(FbomData::from_pod(self.name, value)))
    }

    fn deserialize(
        &self,
        _registry: &MarshalRegistry,
        source: MarshaledRef<'_>,
    ) -> Result<NativeHandle, FbomError> {
        let data = data_of(source, self.name)?;
        let value: T = data.as_pod(self.name)?;
        Ok(Arc::new(value))
    }
}

struct BoolMarshal;

impl Marshal for BoolMarshal {
    fn type_name(&self) -> &str {
        "bool"
    }

    fn serialize(
        &self,
        _registry: &MarshalRegistry,
        value: &(dyn Any + Send + Sync),
        _flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError> {
        let value = value
            .downcast_ref::<bool>()
            .ok_or_else(|| FbomError::marshal("bool", "value is not a bool"))?;
        Ok(Marshaled::Data(FbomData::from_bool(*value)))
    }

    fn deserialize(
        &self,
        _registry: &MarshalRegistry,
        source: MarshaledRef<'_>,
    ) -> Result<NativeHandle, FbomError> {
        Ok(Arc::new(data_of(source, "bool")?.as_bool()?))
    }
}

struct StringMarshal;

impl Marshal for StringMarshal {
    fn type_name(&self) -> &str {
        "String"
    }

    fn serialize(
        &self,
        _registry: &MarshalRegistry,
        value: &(dyn Any + Send + Sync),
        _flags: MarshalFlags,
    ) -> Result<Marshaled, FbomError> {
        let value = value
            .downcast_ref::<String>()
            .ok_or_else(|| FbomError::marshal("String", "value is not a String"))?;
        Ok(Marshaled::Data(FbomData::from_string(value)))
    }

    fn deserialize(
        &self,
        _registry: &MarshalRegistry,
        source: MarshaledRef<'_>,
    ) -> Result<NativeHandle, FbomError> {
        Ok(Arc::new(data_of(source, "String")?.as_string()?))
    }
}

/// Promote a marshaled value to an object node suitable as a container
/// root: leaf cells are wrapped in an object carrying the cell under the
/// `"value"` property.
pub fn into_root_object(marshaled: Marshaled) -> FbomObject {
    match marshaled {
        Marshaled::Object(object) => object,
        Marshaled::Data(data) => {
            let ty = data.ty().cloned().unwrap_or_else(FbomType::unset);
            let mut object = FbomObject::new(ty);
            object.set_property(SCALAR_VALUE_KEY, data);
            object
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scalar_round_trip() {
        let registry = MarshalRegistry::with_builtins();
        let marshaled = registry
            .serialize_value(&42u32, MarshalFlags::empty())
            .unwrap();
        let marshaler = registry.get("u32", true).unwrap();
        let source = match &marshaled {
            Marshaled::Data(data) => MarshaledRef::Data(data),
            Marshaled::Object(object) => MarshaledRef::Object(object),
        };
        let handle = marshaler.deserialize(&registry, source).unwrap();
        assert_eq!(*handle.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn string_round_trip() {
        let registry = MarshalRegistry::with_builtins();
        let marshaled = registry
            .serialize_value(&"hello".to_string(), MarshalFlags::empty())
            .unwrap();
        let Marshaled::Data(data) = &marshaled else {
            panic!("expected leaf cell");
        };
        let marshaler = registry.get("String", true).unwrap();
        let handle = marshaler
            .deserialize(&registry, MarshaledRef::Data(data))
            .unwrap();
        assert_eq!(*handle.downcast::<String>().unwrap(), "hello");
    }

    #[test]
    fn unknown_type_has_no_marshaler() {
        let registry = MarshalRegistry::with_builtins();
        assert!(registry.get("Mesh", true).is_none());
        assert!(registry.get("Mesh", false).is_none());
    }

    #[test]
    fn fallback_can_be_disabled() {
        let mut registry = MarshalRegistry::with_builtins();
        let class = ClassDescriptor::new::<UnitProbe>("UnitProbe");
        registry.register_class(class);
        assert!(registry.get("UnitProbe", true).is_some());
        assert!(registry.get("UnitProbe", false).is_none());
    }

    #[test]
    fn scalar_promotes_to_root_object() {
        let object = into_root_object(Marshaled::Data(FbomData::from_pod("u32", &7u32)));
        assert_eq!(object.ty.name, "u32");
        assert!(object.has_property(SCALAR_VALUE_KEY));
    }

    #[derive(Default)]
    struct UnitProbe;
}
