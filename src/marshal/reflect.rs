//! Reflection bridge and the generic reflection-driven marshaler.
//!
//! The serializer does not own an introspection system; it consumes one
//! through the contract defined here. A [`ClassDescriptor`] exposes a
//! stable-ordered list of [`ClassMember`]s, each with a name, a kind, a
//! getter, an optional setter, and a small attribute lookup. The generic
//! marshaler ([`serialize_reflected`] / [`deserialize_reflected`]) walks
//! the members, honoring two attributes:
//!
//! - `ignore = "true"` — exclude the member from serialization
//! - `path = "a.b"` — nest the member under a dotted sub-path instead of
//!   a flat key
//!
//! Members recurse through their own marshaler, resolved by type name.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::data::{FbomData, OBJECT_BLOB_TYPE};
use crate::error::FbomError;
use crate::object::{FbomObject, NativeHandle};
use crate::type_descriptor::FbomType;

use super::{Marshaled, MarshaledRef, MarshalFlags, MarshalRegistry};

/// Kind of a reflected class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
    Constant,
    Method,
}

type Getter = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Option<NativeHandle> + Send + Sync>;
type Setter =
    Box<dyn Fn(&mut (dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool + Send + Sync>;

/// One reflected member of a class.
pub struct ClassMember {
    name: String,
    kind: MemberKind,
    type_name: String,
    getter: Getter,
    setter: Option<Setter>,
    attributes: HashMap<String, String>,
}

impl ClassMember {
    fn new(name: impl Into<String>, kind: MemberKind, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            type_name: type_name.into(),
            getter: Box::new(|_| None),
            setter: None,
            attributes: HashMap::new(),
        }
    }

    /// A field member with typed getter and setter.
    pub fn field<C, T>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        get: impl Fn(&C) -> T + Send + Sync + 'static,
        set: impl Fn(&mut C, T) + Send + Sync + 'static,
    ) -> Self
    where
        C: Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let mut member = Self::new(name, MemberKind::Field, type_name);
        member.getter = Box::new(move |instance| {
            instance
                .downcast_ref::<C>()
                .map(|c| std::sync::Arc::new(get(c)) as NativeHandle)
        });
        member.setter = Some(Box::new(move |instance, value| {
            match (instance.downcast_mut::<C>(), value.downcast_ref::<T>()) {
                (Some(c), Some(v)) => {
                    set(c, v.clone());
                    true
                }
                _ => false,
            }
        }));
        member
    }

    /// A property member. Same shape as a field; the kind is kept
    /// distinct for introspection consumers.
    pub fn property<C, T>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        get: impl Fn(&C) -> T + Send + Sync + 'static,
        set: impl Fn(&mut C, T) + Send + Sync + 'static,
    ) -> Self
    where
        C: Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let mut member = Self::field(name, type_name, get, set);
        member.kind = MemberKind::Property;
        member
    }

    /// A constant member: serialized through its getter, never written
    /// back (constants have no setter).
    pub fn constant<C, T>(
        name: impl Into<String>,
        type_name: impl Into<String>,
        get: impl Fn(&C) -> T + Send + Sync + 'static,
    ) -> Self
    where
        C: Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let mut member = Self::new(name, MemberKind::Constant, type_name);
        member.getter = Box::new(move |instance| {
            instance
                .downcast_ref::<C>()
                .map(|c| std::sync::Arc::new(get(c)) as NativeHandle)
        });
        member
    }

    /// A method member. Methods carry no value and are skipped by the
    /// serializer; the entry exists so introspection consumers see the
    /// full member list.
    pub fn method(name: impl Into<String>) -> Self {
        Self::new(name, MemberKind::Method, "")
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_ignored(&self) -> bool {
        self.attribute("ignore") == Some("true")
    }

    /// Dotted nesting override for the serialized key.
    pub fn path(&self) -> Option<&str> {
        self.attribute("path")
    }

    /// The key this member is stored under in the serialized node.
    fn serialized_key(&self) -> String {
        match self.path() {
            Some(path) => format!("{path}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Introspection metadata for one reflectable class.
pub struct ClassDescriptor {
    name: String,
    type_id: TypeId,
    construct: Box<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>,
    members: Vec<ClassMember>,
}

impl ClassDescriptor {
    /// Describe class `C`, constructible via `Default` during decode.
    pub fn new<C: Default + Send + Sync + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<C>(),
            construct: Box::new(|| Box::new(C::default())),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: ClassMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[ClassMember] {
        &self.members
    }

    fn construct(&self) -> Box<dyn Any + Send + Sync> {
        (self.construct)()
    }
}

/// Name-keyed store of class descriptors.
#[derive(Default)]
pub struct ClassRegistry {
    by_name: HashMap<String, ClassDescriptor>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: ClassDescriptor) {
        self.by_name.insert(class.name.clone(), class);
    }

    pub fn get(&self, name: &str) -> Option<&ClassDescriptor> {
        self.by_name.get(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Generic reflection-driven marshaling
// ---------------------------------------------------------------------------

pub(crate) fn serialize_reflected(
    class: &ClassDescriptor,
    registry: &MarshalRegistry,
    value: &(dyn Any + Send + Sync),
    _flags: MarshalFlags,
) -> Result<Marshaled, FbomError> {
    let mut node = FbomObject::new(FbomType::new(class.name(), 0));
    for member in class.members() {
        if member.kind() == MemberKind::Method || member.is_ignored() {
            continue;
        }
        let handle = (member.getter)(value).ok_or_else(|| {
            FbomError::marshal(
                class.name(),
                format!("getter for member '{}' failed", member.name()),
            )
        })?;
        let marshaler = registry.get(member.type_name(), true).ok_or_else(|| {
            FbomError::marshal(
                class.name(),
                format!(
                    "no marshaler for member '{}' of type '{}'",
                    member.name(),
                    member.type_name()
                ),
            )
        })?;
        let cell = match marshaler.serialize(registry, handle.as_ref(), MarshalFlags::empty())? {
            Marshaled::Data(data) => data,
            Marshaled::Object(object) => FbomData::from_object(&object)?,
        };
        node.set_property(member.serialized_key(), cell);
    }
    Ok(Marshaled::Object(node))
}

pub(crate) fn deserialize_reflected(
    class: &ClassDescriptor,
    registry: &MarshalRegistry,
    source: MarshaledRef<'_>,
) -> Result<NativeHandle, FbomError> {
    let decoded_blob;
    let node: &FbomObject = match source {
        MarshaledRef::Object(object) => object,
        MarshaledRef::Data(data) => {
            decoded_blob = data.to_object()?;
            &decoded_blob
        }
    };

    let mut instance = class.construct();
    for member in class.members() {
        if member.kind() == MemberKind::Method
            || member.kind() == MemberKind::Constant
            || member.is_ignored()
        {
            continue;
        }
        let key = member.serialized_key();
        let cell = node.property(&key).ok_or_else(|| {
            FbomError::marshal(
                class.name(),
                format!("serialized node is missing member '{key}'"),
            )
        })?;
        let marshaler = registry.get(member.type_name(), true).ok_or_else(|| {
            FbomError::marshal(
                class.name(),
                format!(
                    "no marshaler for member '{}' of type '{}'",
                    member.name(),
                    member.type_name()
                ),
            )
        })?;

        let nested;
        let member_source = if cell
            .ty()
            .is_some_and(|ty| ty.is_or_extends(OBJECT_BLOB_TYPE))
        {
            nested = cell.to_object()?;
            MarshaledRef::Object(&nested)
        } else {
            MarshaledRef::Data(cell)
        };
        let handle = marshaler.deserialize(registry, member_source)?;

        let setter = member.setter.as_ref().ok_or_else(|| {
            FbomError::marshal(
                class.name(),
                format!("member '{}' has no setter", member.name()),
            )
        })?;
        if !setter(instance.as_mut(), handle.as_ref()) {
            return Err(FbomError::marshal(
                class.name(),
                format!("setter for member '{}' rejected the value", member.name()),
            ));
        }
    }
    Ok(NativeHandle::from(instance))
}
