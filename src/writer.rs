//! Container encoder.
//!
//! [`FbomWriter`] produces the mirror image of the decoder's wire
//! contract: a fixed header, an optional static data pool block, then the
//! root object. Before emission it builds a [`DedupPlan`]: every type,
//! data cell, and object subtree that occurs more than once (by
//! structural equality) is assigned a pool slot and referenced with
//! STATIC locations everywhere it appears. Pool entries are ordered
//! types, then data, then objects in post-order, so an entry only ever
//! references offsets written earlier in the same block.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, trace};

use crate::data::FbomData;
use crate::error::FbomError;
use crate::marshal::{into_root_object, MarshalFlags, MarshalRegistry};
use crate::object::FbomObject;
use crate::type_descriptor::FbomType;
use crate::version::CURRENT_VERSION;
use crate::wire::{self, ByteWriter, Command, Location};

/// Encoder for one or more containers sharing a marshal registry.
pub struct FbomWriter<'r> {
    registry: &'r MarshalRegistry,
}

impl<'r> FbomWriter<'r> {
    pub fn new(registry: &'r MarshalRegistry) -> Self {
        Self { registry }
    }

    /// Encode an object tree into a complete container byte stream.
    pub fn write_object(&self, object: &FbomObject) -> Result<Vec<u8>, FbomError> {
        let mut out = ByteWriter::new();
        wire::write_header(&mut out, CURRENT_VERSION);

        let plan = DedupPlan::build(object)?;
        debug!(
            "writing container: root type '{}', {} pool entries",
            object.ty.name,
            plan.entries.len()
        );
        plan.emit_pool(&mut out)?;
        emit_object(&mut out, object, &plan)?;
        out.write_command(Command::None);
        Ok(out.into_bytes())
    }

    /// Marshal a native value and encode it as a container.
    pub fn write_value<T: Send + Sync + 'static>(&self, value: &T) -> Result<Vec<u8>, FbomError> {
        let marshaled = self.registry.serialize_value(value, MarshalFlags::empty())?;
        self.write_object(&into_root_object(marshaled))
    }

    /// Encode an object tree and write it to a file.
    pub fn write_to_path(
        &self,
        path: impl AsRef<Path>,
        object: &FbomObject,
    ) -> Result<(), FbomError> {
        let bytes = self.write_object(object)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dedup planning
// ---------------------------------------------------------------------------

enum PlannedEntry {
    Type(FbomType),
    Data(FbomData),
    Object(FbomObject),
}

/// Assignment of pool offsets to structures that repeat in one container.
#[derive(Default)]
struct DedupPlan {
    entries: Vec<PlannedEntry>,
    type_offsets: HashMap<FbomType, u32>,
    data_offsets: HashMap<FbomData, u32>,
    object_offsets: HashMap<FbomObject, u32>,
}

#[derive(Default)]
struct Census {
    type_counts: HashMap<FbomType, usize>,
    type_order: Vec<FbomType>,
    data_counts: HashMap<FbomData, usize>,
    data_order: Vec<FbomData>,
    object_counts: HashMap<FbomObject, usize>,
    /// Post-order of first completion; guarantees every pooled object is
    /// recorded after all of its pooled descendants.
    object_order: Vec<FbomObject>,
}

impl Census {
    fn count_type(&mut self, ty: &FbomType) {
        if ty.is_unset() {
            return;
        }
        let count = self.type_counts.entry(ty.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.type_order.push(ty.clone());
        }
    }

    fn count_data(&mut self, data: &FbomData) -> Result<(), FbomError> {
        match data {
            FbomData::StaticRef(offset) => Err(FbomError::format(format!(
                "cannot encode an unresolved static reference (offset {offset})"
            ))),
            FbomData::Inline { ty, .. } => {
                self.count_type(ty);
                let count = self.data_counts.entry(data.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.data_order.push(data.clone());
                }
                Ok(())
            }
        }
    }

    fn walk(&mut self, object: &FbomObject, is_root: bool) -> Result<(), FbomError> {
        // External nodes carry no inline payload; nothing to count.
        if object.external.is_some() {
            return Ok(());
        }
        self.count_type(&object.ty);
        for (_, data) in object.properties() {
            self.count_data(data)?;
        }
        for child in &object.children {
            self.walk(child, false)?;
        }
        // The root is always emitted inline; only subtrees dedup.
        if !is_root {
            let count = self.object_counts.entry(object.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.object_order.push(object.clone());
            }
        }
        Ok(())
    }
}

impl DedupPlan {
    /// Plan with no pool at all (used for nested object blobs).
    fn empty() -> Self {
        Self::default()
    }

    fn build(root: &FbomObject) -> Result<Self, FbomError> {
        let mut census = Census::default();
        census.walk(root, true)?;

        let mut plan = Self::default();
        for ty in census.type_order {
            if census.type_counts[&ty] >= 2 {
                let offset = plan.entries.len() as u32;
                plan.type_offsets.insert(ty.clone(), offset);
                plan.entries.push(PlannedEntry::Type(ty));
            }
        }
        for data in census.data_order {
            if census.data_counts[&data] >= 2 {
                let offset = plan.entries.len() as u32;
                plan.data_offsets.insert(data.clone(), offset);
                plan.entries.push(PlannedEntry::Data(data));
            }
        }
        for object in census.object_order {
            if census.object_counts[&object] >= 2 {
                let offset = plan.entries.len() as u32;
                plan.object_offsets.insert(object.clone(), offset);
                plan.entries.push(PlannedEntry::Object(object));
            }
        }
        Ok(plan)
    }

    fn emit_pool(&self, out: &mut ByteWriter) -> Result<(), FbomError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        out.write_command(Command::StaticDataStart);
        out.write_u32(self.entries.len() as u32);
        out.write_raw(&[0u8; 8]);
        for (offset, entry) in self.entries.iter().enumerate() {
            out.write_u32(offset as u32);
            match entry {
                PlannedEntry::Type(ty) => {
                    out.write_u8(2);
                    emit_type_inplace(out, ty)?;
                }
                PlannedEntry::Data(data) => {
                    out.write_u8(3);
                    emit_data_inplace(out, data, self)?;
                }
                PlannedEntry::Object(object) => {
                    out.write_u8(1);
                    trace!("pool entry {offset}: object '{}'", object.ty.name);
                    emit_object_inplace(out, object, self)?;
                }
            }
        }
        out.write_command(Command::StaticDataEnd);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire emission
// ---------------------------------------------------------------------------

fn emit_type(out: &mut ByteWriter, ty: &FbomType, plan: &DedupPlan) -> Result<(), FbomError> {
    if ty.is_unset() {
        out.write_location(Location::None);
        return Ok(());
    }
    if let Some(&offset) = plan.type_offsets.get(ty) {
        out.write_location(Location::Static);
        out.write_u32(offset);
        return Ok(());
    }
    emit_type_inplace(out, ty)
}

fn emit_type_inplace(out: &mut ByteWriter, ty: &FbomType) -> Result<(), FbomError> {
    let chain = ty.chain();
    if chain.len() > u8::MAX as usize {
        return Err(FbomError::format(format!(
            "type chain too long to encode: {} links",
            chain.len()
        )));
    }
    out.write_location(Location::Inplace);
    out.write_u8(chain.len() as u8);
    // Base first; the last pair read is the most-derived link.
    for link in chain.iter().rev() {
        out.write_string(&link.name);
        out.write_u64(link.size);
    }
    Ok(())
}

fn emit_data(out: &mut ByteWriter, data: &FbomData, plan: &DedupPlan) -> Result<(), FbomError> {
    if let Some(&offset) = plan.data_offsets.get(data) {
        out.write_location(Location::Static);
        out.write_u32(offset);
        return Ok(());
    }
    emit_data_inplace(out, data, plan)
}

fn emit_data_inplace(
    out: &mut ByteWriter,
    data: &FbomData,
    plan: &DedupPlan,
) -> Result<(), FbomError> {
    match data {
        FbomData::StaticRef(offset) => Err(FbomError::format(format!(
            "cannot encode an unresolved static reference (offset {offset})"
        ))),
        FbomData::Inline { ty, bytes } => {
            out.write_location(Location::Inplace);
            emit_type(out, ty, plan)?;
            out.write_bytes(bytes);
            Ok(())
        }
    }
}

fn emit_object(out: &mut ByteWriter, object: &FbomObject, plan: &DedupPlan) -> Result<(), FbomError> {
    if let Some(ext) = &object.external {
        out.write_command(Command::ObjectStart);
        out.write_location(Location::ExtRef);
        out.write_string(&ext.name);
        out.write_u32(ext.index);
        out.write_u32(ext.flags);
        return Ok(());
    }
    if let Some(&offset) = plan.object_offsets.get(object) {
        out.write_command(Command::ObjectStart);
        out.write_location(Location::Static);
        out.write_u32(offset);
        return Ok(());
    }
    emit_object_inplace(out, object, plan)
}

fn emit_object_inplace(
    out: &mut ByteWriter,
    object: &FbomObject,
    plan: &DedupPlan,
) -> Result<(), FbomError> {
    out.write_command(Command::ObjectStart);
    out.write_location(Location::Inplace);
    emit_type(out, &object.ty, plan)?;
    for (name, data) in object.properties() {
        out.write_command(Command::DefineProperty);
        out.write_string(name);
        emit_data(out, data, plan)?;
    }
    for child in &object.children {
        emit_object(out, child, plan)?;
    }
    out.write_command(Command::ObjectEnd);
    Ok(())
}

/// Encode an object subtree as a standalone blob: same wire encoding as
/// an inline object, no header and no pool. External references cannot
/// appear inside a blob (there is no file context to resolve them in).
pub(crate) fn encode_object_blob(object: &FbomObject) -> Result<Vec<u8>, FbomError> {
    fn reject_external(object: &FbomObject) -> Result<(), FbomError> {
        if let Some(ext) = &object.external {
            return Err(FbomError::format(format!(
                "external reference '{}' not allowed inside an object blob",
                ext.name
            )));
        }
        object.children.iter().try_for_each(reject_external)
    }
    reject_external(object)?;

    let mut out = ByteWriter::new();
    emit_object_inplace(&mut out, object, &DedupPlan::empty())?;
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ByteReader, HEADER_SIZE};

    fn leaf(name: &str, id: u32) -> FbomObject {
        let mut obj = FbomObject::new(FbomType::new(name, 0));
        obj.set_property("id", FbomData::from_pod("u32", &id));
        obj
    }

    #[test]
    fn container_starts_with_header() {
        let registry = MarshalRegistry::with_builtins();
        let writer = FbomWriter::new(&registry);
        let bytes = writer.write_object(&leaf("Node", 1)).unwrap();
        assert!(bytes.len() > HEADER_SIZE);
        assert_eq!(&bytes[..4], b"HYP\0");
    }

    #[test]
    fn unique_tree_emits_no_pool() {
        let registry = MarshalRegistry::with_builtins();
        let writer = FbomWriter::new(&registry);
        let bytes = writer.write_object(&leaf("Node", 1)).unwrap();
        // First command after the header must be the root object, not a
        // pool block.
        let mut input = ByteReader::new(&bytes);
        wire::read_header(&mut input).unwrap();
        assert_eq!(input.read_command().unwrap(), Command::ObjectStart);
    }

    #[test]
    fn duplicate_subtree_gets_one_pool_entry() {
        let mut root = FbomObject::new(FbomType::new("Scene", 0));
        root.add_child(leaf("Mesh", 7));
        root.add_child(leaf("Mesh", 7));
        let plan = DedupPlan::build(&root).unwrap();
        let pooled_objects = plan
            .entries
            .iter()
            .filter(|e| matches!(e, PlannedEntry::Object(_)))
            .count();
        assert_eq!(pooled_objects, 1);
    }

    #[test]
    fn pooled_child_precedes_pooled_parent() {
        // Parent subtree repeats, and so does its inner leaf.
        let mut parent = FbomObject::new(FbomType::new("Group", 0));
        parent.add_child(leaf("Mesh", 7));
        let mut root = FbomObject::new(FbomType::new("Scene", 0));
        root.add_child(parent.clone());
        root.add_child(parent.clone());
        root.add_child(leaf("Mesh", 7));

        let plan = DedupPlan::build(&root).unwrap();
        let leaf_offset = plan.object_offsets[&leaf("Mesh", 7)];
        let parent_offset = plan.object_offsets[&parent];
        assert!(leaf_offset < parent_offset);
    }

    #[test]
    fn static_ref_in_tree_is_rejected() {
        let mut root = FbomObject::new(FbomType::new("Node", 0));
        root.set_property("dangling", FbomData::StaticRef(3));
        let registry = MarshalRegistry::with_builtins();
        let writer = FbomWriter::new(&registry);
        assert!(matches!(
            writer.write_object(&root),
            Err(FbomError::Format(_))
        ));
    }

    #[test]
    fn blob_rejects_external_nodes() {
        let mut root = FbomObject::new(FbomType::new("Node", 0));
        let mut child = FbomObject::new(FbomType::new("Mesh", 0));
        child.external = Some(crate::object::ExternalRef::new("mesh0"));
        root.add_child(child);
        assert!(matches!(
            encode_object_blob(&root),
            Err(FbomError::Format(_))
        ));
    }
}
