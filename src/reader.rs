//! Container decoder.
//!
//! [`FbomReader`] turns a byte stream of tagged commands into an
//! [`FbomObject`] tree. Decoding is synchronous, single-threaded, and
//! depth-first; it either completes or fails with a terminal
//! [`FbomError`]. Each decode operation owns its own
//! [`StaticDataPool`](crate::static_pool::StaticDataPool) — external
//! references spawn an independent decode with a fresh pool, sharing
//! only the in-flight path stack used for cycle detection.

use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::data::FbomData;
use crate::error::FbomError;
use crate::marshal::{MarshaledRef, MarshalRegistry};
use crate::object::FbomObject;
use crate::static_pool::{PoolEntry, StaticDataPool};
use crate::type_descriptor::FbomType;
use crate::version::{VersionMask, CURRENT_VERSION};
use crate::wire::{self, ByteReader, Command, Location, CHUNK_EXTENSION, MAX_DEPTH};

/// Type name whose objects may carry a `base_path` property inherited by
/// descendant external references.
pub const ROOT_TYPE: &str = "ROOT";

/// Property on ROOT-typed objects that prefixes external chunk paths.
pub const BASE_PATH_PROPERTY: &str = "base_path";

/// Decoder for containers sharing a marshal registry.
pub struct FbomReader<'r> {
    registry: &'r MarshalRegistry,
    base_dir: Option<PathBuf>,
}

impl<'r> FbomReader<'r> {
    pub fn new(registry: &'r MarshalRegistry) -> Self {
        Self {
            registry,
            base_dir: None,
        }
    }

    /// Directory external references resolve against when decoding from
    /// an in-memory buffer. Reading from a file path uses the file's own
    /// directory instead.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Decode a container from an in-memory byte stream.
    pub fn read_bytes(&self, bytes: &[u8]) -> Result<FbomObject, FbomError> {
        let mut decoder = Decoder {
            registry: Some(self.registry),
            path_stack: Vec::new(),
            allow_external: true,
        };
        decoder.decode_container(bytes, self.base_dir.as_deref())
    }

    /// Read and decode a container file.
    pub fn read_from_path(&self, path: impl AsRef<Path>) -> Result<FbomObject, FbomError> {
        let canonical = std::fs::canonicalize(path.as_ref())?;
        let bytes = std::fs::read(&canonical)?;
        debug!("reading container {}", canonical.display());
        let base_dir = canonical.parent().map(Path::to_path_buf);
        let mut decoder = Decoder {
            registry: Some(self.registry),
            path_stack: vec![canonical],
            allow_external: true,
        };
        decoder.decode_container(&bytes, base_dir.as_deref())
    }

    /// Decode a container and downcast the root's deserialized value.
    pub fn read_value<T: Send + Sync + 'static>(
        &self,
        bytes: &[u8],
    ) -> Result<std::sync::Arc<T>, FbomError> {
        self.read_bytes(bytes)?.decode_into::<T>()
    }
}

// ---------------------------------------------------------------------------
// Decoder state machine
// ---------------------------------------------------------------------------

struct Decoder<'a> {
    registry: Option<&'a MarshalRegistry>,
    /// Canonicalized paths of containers currently being decoded, outermost
    /// first. Re-entering one is an external-reference cycle.
    path_stack: Vec<PathBuf>,
    allow_external: bool,
}

/// Per-container decode state; never shared across files.
struct DecodeState {
    pool: StaticDataPool,
    in_static_data: bool,
    pool_populated: bool,
    base_dir: Option<PathBuf>,
}

impl DecodeState {
    fn new(base_dir: Option<&Path>) -> Self {
        Self {
            pool: StaticDataPool::new(),
            in_static_data: false,
            pool_populated: false,
            base_dir: base_dir.map(Path::to_path_buf),
        }
    }
}

fn expect_command(input: &mut ByteReader<'_>, expected: Command) -> Result<(), FbomError> {
    let found = input.read_command()?;
    if found != expected {
        return Err(FbomError::format(format!(
            "expected {expected:?}, found {found:?}"
        )));
    }
    Ok(())
}

impl Decoder<'_> {
    fn decode_container(
        &mut self,
        bytes: &[u8],
        base_dir: Option<&Path>,
    ) -> Result<FbomObject, FbomError> {
        let mut input = ByteReader::new(bytes);
        let file_version = wire::read_header(&mut input)?;
        if file_version.compare(CURRENT_VERSION, VersionMask::DEFAULT) != std::cmp::Ordering::Equal
        {
            warn!("refusing container version {file_version} (reader supports {CURRENT_VERSION})");
            return Err(FbomError::Version {
                found: file_version,
                supported: CURRENT_VERSION,
            });
        }

        let mut st = DecodeState::new(base_dir);
        let mut root: Option<FbomObject> = None;
        loop {
            if input.is_at_end() {
                break;
            }
            match input.peek_command()? {
                Command::None => {
                    input.read_command()?;
                    break;
                }
                Command::ObjectStart => {
                    if root.is_some() {
                        return Err(FbomError::format("container has multiple root objects"));
                    }
                    root = Some(self.decode_object(&mut input, &mut st, 0, None)?);
                }
                Command::StaticDataStart => {
                    input.read_command()?;
                    self.decode_pool(&mut input, &mut st)?;
                }
                Command::StaticDataEnd => {
                    return Err(FbomError::format(
                        "static data block closed but none was open",
                    ));
                }
                other => {
                    return Err(FbomError::format(format!(
                        "unexpected top-level command {other:?}"
                    )));
                }
            }
        }
        root.ok_or_else(|| FbomError::format("container has no root object"))
    }

    /// Decode one object, start-marker included: start command, location
    /// byte, then the location-specific payload.
    fn decode_object(
        &mut self,
        input: &mut ByteReader<'_>,
        st: &mut DecodeState,
        depth: usize,
        inherited_base: Option<String>,
    ) -> Result<FbomObject, FbomError> {
        if depth > MAX_DEPTH {
            return Err(FbomError::format(format!(
                "object nesting exceeds maximum depth {MAX_DEPTH}"
            )));
        }
        expect_command(input, Command::ObjectStart)?;
        match input.read_location()? {
            Location::Static => {
                let offset = input.read_u32("object pool offset")?;
                // Dedup fast path: the clone shares the pool entry's
                // deserialized handle, so both references resolve to the
                // same native instance.
                Ok(st.pool.object_at(offset)?.clone())
            }
            Location::Inplace => {
                let ty = decode_type(input, st)?;
                trace!("object '{ty}' at depth {depth}");
                let mut node = FbomObject::new(ty);
                let mut base = inherited_base;
                loop {
                    match input.peek_command()? {
                        Command::ObjectStart => {
                            let child = self.decode_object(input, st, depth + 1, base.clone())?;
                            node.add_child(child);
                        }
                        Command::ObjectEnd => break,
                        Command::DefineProperty => {
                            input.read_command()?;
                            let name = input.read_string("property name")?;
                            let data = decode_data(input, st)?;
                            if node.ty.is_or_extends(ROOT_TYPE) && name == BASE_PATH_PROPERTY {
                                if let Ok(path) = data.as_string() {
                                    base = Some(path);
                                }
                            }
                            node.set_property(name, data);
                        }
                        Command::None => {
                            return Err(FbomError::format(
                                "unbalanced framing: object not closed before end of stream",
                            ));
                        }
                        other => {
                            return Err(FbomError::format(format!(
                                "unexpected command {other:?} while reading object"
                            )));
                        }
                    }
                }
                expect_command(input, Command::ObjectEnd)?;
                self.finish_object(&mut node)?;
                Ok(node)
            }
            Location::ExtRef => {
                let name = input.read_string("external reference name")?;
                let index = input.read_u32("external object index")?;
                let _flags = input.read_u32("external reference flags")?;
                let dir = st.base_dir.clone();
                self.resolve_external(&name, index, inherited_base.as_deref(), dir.as_deref())
            }
            Location::None => Err(FbomError::format("unknown object location type: NONE")),
        }
    }

    fn decode_pool(
        &mut self,
        input: &mut ByteReader<'_>,
        st: &mut DecodeState,
    ) -> Result<(), FbomError> {
        if st.in_static_data {
            return Err(FbomError::format("nested static data block"));
        }
        if st.pool_populated {
            return Err(FbomError::format("container has multiple static data blocks"));
        }
        st.in_static_data = true;

        let count = input.read_u32("pool size")? as usize;
        input.skip(8, "pool reserved bytes")?;
        if count > input.remaining() {
            return Err(FbomError::format(format!(
                "declared pool size {count} exceeds remaining stream length {}",
                input.remaining()
            )));
        }
        trace!("static data pool: {count} entries");

        for index in 0..count {
            let offset = input.read_u32("pool entry offset")? as usize;
            if offset >= count {
                return Err(FbomError::format(format!(
                    "pool entry offset {offset} out of range (pool size {count})"
                )));
            }
            if offset != index {
                return Err(FbomError::format(format!(
                    "pool entry offsets must be dense: expected {index}, found {offset}"
                )));
            }
            let kind = input.read_u8("pool entry kind")?;
            let entry = match kind {
                0 => PoolEntry::None,
                1 => PoolEntry::Object(self.decode_object(input, st, 0, None)?),
                2 => PoolEntry::Type(decode_type(input, st)?),
                3 => PoolEntry::Data(decode_data(input, st)?),
                other => {
                    return Err(FbomError::format(format!(
                        "unknown pool entry kind {other}"
                    )));
                }
            };
            st.pool.push(entry);
        }

        expect_command(input, Command::StaticDataEnd)
            .map_err(|_| FbomError::format("unterminated static data block"))?;
        st.in_static_data = false;
        st.pool_populated = true;
        Ok(())
    }

    /// Run the marshaler hook for a fully accumulated node, memoizing the
    /// native value. Types without a marshaler or class descriptor stay
    /// plain data.
    fn finish_object(&self, node: &mut FbomObject) -> Result<(), FbomError> {
        if node.deserialized.is_some() {
            return Ok(());
        }
        let Some(registry) = self.registry else {
            return Ok(());
        };
        if node.ty.is_unset() {
            return Ok(());
        }
        if let Some(marshaler) = registry.get(&node.ty.name, true) {
            let handle = marshaler.deserialize(registry, MarshaledRef::Object(node))?;
            node.deserialized = Some(handle);
        }
        Ok(())
    }

    /// Resolve an external reference by decoding the referenced chunk
    /// file as an independent container, substituting its root object.
    fn resolve_external(
        &mut self,
        name: &str,
        index: u32,
        base_path: Option<&str>,
        dir: Option<&Path>,
    ) -> Result<FbomObject, FbomError> {
        if !self.allow_external {
            return Err(FbomError::format(format!(
                "external reference '{name}' not allowed inside an object blob"
            )));
        }
        if index != 0 {
            return Err(FbomError::ExternalReference {
                name: name.to_owned(),
                message: format!("multi-object chunks not supported (index {index})"),
            });
        }

        let file_name = format!("{name}.{CHUNK_EXTENSION}");
        let relative = match base_path {
            Some(base) => Path::new(base).join(file_name),
            None => PathBuf::from(file_name),
        };
        let full = match dir {
            Some(dir) => dir.join(&relative),
            None => relative,
        };
        debug!("resolving external reference '{name}' -> {}", full.display());

        let canonical = std::fs::canonicalize(&full).map_err(|e| FbomError::ExternalReference {
            name: name.to_owned(),
            message: format!("cannot resolve '{}': {e}", full.display()),
        })?;
        if self.path_stack.contains(&canonical) {
            return Err(FbomError::ExternalReference {
                name: name.to_owned(),
                message: format!(
                    "reference cycle detected through {}",
                    canonical.display()
                ),
            });
        }
        let bytes = std::fs::read(&canonical).map_err(|e| FbomError::ExternalReference {
            name: name.to_owned(),
            message: format!("cannot read '{}': {e}", canonical.display()),
        })?;

        let base_dir = canonical.parent().map(Path::to_path_buf);
        self.path_stack.push(canonical);
        let result = self.decode_container(&bytes, base_dir.as_deref());
        self.path_stack.pop();
        result
    }
}

fn decode_type(input: &mut ByteReader<'_>, st: &DecodeState) -> Result<FbomType, FbomError> {
    match input.read_location()? {
        Location::None => Ok(FbomType::unset()),
        Location::Static => {
            let offset = input.read_u32("type pool offset")?;
            Ok(st.pool.type_at(offset)?.clone())
        }
        Location::Inplace => {
            let links = input.read_u8("type chain length")?;
            let mut ty: Option<FbomType> = None;
            for _ in 0..links {
                let name = input.read_string("type name")?;
                let size = input.read_u64("type size")?;
                ty = Some(match ty {
                    None => FbomType::new(name, size),
                    Some(base) => base.extend(name, size),
                });
            }
            Ok(ty.unwrap_or_else(FbomType::unset))
        }
        Location::ExtRef => Err(FbomError::format("unknown type location: EXT_REF")),
    }
}

fn decode_data(input: &mut ByteReader<'_>, st: &DecodeState) -> Result<FbomData, FbomError> {
    match input.read_location()? {
        Location::None => Ok(FbomData::new(FbomType::unset(), Vec::new())),
        Location::Static => {
            let offset = input.read_u32("data pool offset")?;
            // A STATIC cell is a copy of the pool entry's payload; the
            // in-memory tree never keeps unresolved references.
            Ok(st.pool.data_at(offset)?.clone())
        }
        Location::Inplace => {
            let ty = decode_type(input, st)?;
            let bytes = input.read_bytes("data payload")?.to_vec();
            Ok(FbomData::new(ty, bytes))
        }
        Location::ExtRef => Err(FbomError::format("unknown data location: EXT_REF")),
    }
}

/// Decode an object blob written by
/// [`encode_object_blob`](crate::writer::encode_object_blob): a bare
/// inline object with no header, no pool, and no external references.
pub(crate) fn decode_object_blob(bytes: &[u8]) -> Result<FbomObject, FbomError> {
    let mut decoder = Decoder {
        registry: None,
        path_stack: Vec::new(),
        allow_external: false,
    };
    let mut st = DecodeState::new(None);
    let mut input = ByteReader::new(bytes);
    let object = decoder.decode_object(&mut input, &mut st, 0, None)?;
    if !input.is_at_end() {
        return Err(FbomError::format("trailing bytes after object blob"));
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::FbomVersion;
    use crate::wire::ByteWriter;

    fn empty_registry() -> MarshalRegistry {
        MarshalRegistry::new()
    }

    fn header_bytes(version: FbomVersion) -> ByteWriter {
        let mut out = ByteWriter::new();
        wire::write_header(&mut out, version);
        out
    }

    #[test]
    fn incompatible_version_refused() {
        let registry = empty_registry();
        let out = header_bytes(FbomVersion::new(2, 0, 0));
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Version { .. })));
    }

    #[test]
    fn patch_difference_accepted() {
        let registry = empty_registry();
        let mut out = header_bytes(FbomVersion::new(
            CURRENT_VERSION.major,
            CURRENT_VERSION.minor,
            CURRENT_VERSION.patch + 1,
        ));
        // Minimal root object: INPLACE, unset type, immediate end.
        out.write_command(Command::ObjectStart);
        out.write_location(Location::Inplace);
        out.write_location(Location::None);
        out.write_command(Command::ObjectEnd);
        let root = FbomReader::new(&registry)
            .read_bytes(&out.into_bytes())
            .unwrap();
        assert!(root.ty.is_unset());
    }

    #[test]
    fn empty_container_has_no_root() {
        let registry = empty_registry();
        let out = header_bytes(CURRENT_VERSION);
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn unclosed_object_is_format_error() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        out.write_command(Command::ObjectStart);
        out.write_location(Location::Inplace);
        out.write_location(Location::None);
        // No ObjectEnd.
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn static_data_end_without_start() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        out.write_command(Command::StaticDataEnd);
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn pool_size_beyond_stream_rejected() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        out.write_command(Command::StaticDataStart);
        out.write_u32(u32::MAX);
        out.write_raw(&[0u8; 8]);
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn dangling_data_pool_offset_rejected() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        // Object with a property whose cell points at pool offset 9 in an
        // empty pool.
        out.write_command(Command::ObjectStart);
        out.write_location(Location::Inplace);
        out.write_location(Location::None);
        out.write_command(Command::DefineProperty);
        out.write_string("payload");
        out.write_location(Location::Static);
        out.write_u32(9);
        out.write_command(Command::ObjectEnd);
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn depth_bomb_rejected() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        for _ in 0..(MAX_DEPTH + 2) {
            out.write_command(Command::ObjectStart);
            out.write_location(Location::Inplace);
            out.write_location(Location::None);
        }
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn unknown_command_at_top_level_rejected() {
        let registry = empty_registry();
        let mut out = header_bytes(CURRENT_VERSION);
        out.write_u8(0x3f);
        let result = FbomReader::new(&registry).read_bytes(&out.into_bytes());
        assert!(matches!(result, Err(FbomError::Format(_))));
    }

    #[test]
    fn type_chain_decodes_most_derived_last() {
        let st = DecodeState::new(None);
        let mut out = ByteWriter::new();
        out.write_location(Location::Inplace);
        out.write_u8(2);
        out.write_string("Node");
        out.write_u64(0);
        out.write_string("Mesh");
        out.write_u64(0);
        let bytes = out.into_bytes();
        let mut input = ByteReader::new(&bytes);
        let ty = decode_type(&mut input, &st).unwrap();
        assert_eq!(ty.name, "Mesh");
        assert!(ty.is_or_extends("Node"));
    }
}
