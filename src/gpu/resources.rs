//! Resource objects: an immutable descriptor paired with the owned native
//! id, plus the device-specific metadata reflected at creation time.

use rustc_hash::FxHashMap;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

use crate::utils::Handle;

use super::driver::{AttributeInfo, RawId, UniformInfo, UniformKind};
use super::error::ContractViolation;
use super::structs::{
    AttributeKind, BindScope, IndexType, PixelFormat, VertexAttribute, VECTOR_REGISTER_SIZE,
};

/// Reflected const block for one binding scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeBlock {
    pub location: u32,
    pub byte_size: u32,
}

/// Uniform names that map scopes onto reflected const blocks.
const SCOPE_UNIFORM_NAMES: [&str; BindScope::COUNT] = ["u_pass", "u_material", "u_draw"];

/// A linked shader program with its reflection maps.
///
/// Immutable after construction; lookups for names the program does not
/// declare resolve to silent no-ops so callers need not branch on shader
/// variants.
pub struct Shader {
    pub(crate) raw: RawId,
    uniforms: FxHashMap<String, UniformInfo>,
    attributes: FxHashMap<String, AttributeInfo>,
    scope_blocks: [Option<ScopeBlock>; BindScope::COUNT],
}

impl Shader {
    pub(crate) fn new(
        raw: RawId,
        uniforms: Vec<UniformInfo>,
        attributes: Vec<AttributeInfo>,
    ) -> Self {
        let mut scope_blocks = [None; BindScope::COUNT];
        for (index, scope_name) in SCOPE_UNIFORM_NAMES.iter().enumerate() {
            scope_blocks[index] = uniforms.iter().find_map(|u| match u.kind {
                UniformKind::Vec4Array { count } if u.name == *scope_name => Some(ScopeBlock {
                    location: u.location,
                    byte_size: count * VECTOR_REGISTER_SIZE as u32,
                }),
                _ => None,
            });
        }

        Self {
            raw,
            uniforms: uniforms.into_iter().map(|u| (u.name.clone(), u)).collect(),
            attributes: attributes
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
            scope_blocks,
        }
    }

    /// Invoke `f` with the reflected uniform, or do nothing if the program
    /// does not declare `name`.
    pub fn with_uniform<F: FnOnce(&UniformInfo)>(&self, name: &str, f: F) {
        if let Some(info) = self.uniforms.get(name) {
            f(info);
        }
    }

    /// Invoke `f` with the reflected attribute, or do nothing if the
    /// program does not declare `name`.
    pub fn with_attribute<F: FnOnce(&AttributeInfo)>(&self, name: &str, f: F) {
        if let Some(info) = self.attributes.get(name) {
            f(info);
        }
    }

    pub(crate) fn uniform(&self, name: &str) -> Option<&UniformInfo> {
        self.uniforms.get(name)
    }

    pub(crate) fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.get(name)
    }

    pub fn scope_block(&self, scope: BindScope) -> Option<ScopeBlock> {
        self.scope_blocks[scope.index()]
    }

    /// Whether `buffer` can feed this program: the program must declare a
    /// const block for the buffer's scope, with a matching byte size.
    pub fn accepts(&self, buffer: &ConstBuffer) -> bool {
        self.scope_block(buffer.scope())
            .is_some_and(|block| block.byte_size == buffer.byte_size())
    }
}

/// Tracks the single-content-update-per-frame contract shared by buffers
/// and textures.
#[derive(Debug, Default)]
pub(crate) struct UpdateGuard {
    last_update_frame: u32,
}

impl UpdateGuard {
    pub(crate) fn note_update(
        &mut self,
        frame_id: u32,
        resource: &'static str,
    ) -> Result<(), ContractViolation> {
        if frame_id <= self.last_update_frame {
            return Err(ContractViolation::FrameContract { resource });
        }
        self.last_update_frame = frame_id;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Texture {
    pub(crate) raw: RawId,
    size: [u32; 2],
    format: PixelFormat,
    pub(crate) guard: UpdateGuard,
}

impl Texture {
    pub(crate) fn new(raw: RawId, size: [u32; 2], format: PixelFormat) -> Self {
        Self {
            raw,
            size,
            format,
            guard: UpdateGuard::default(),
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

#[derive(Debug)]
pub struct VertexBuffer {
    pub(crate) raw: RawId,
    byte_size: u32,
    pub(crate) guard: UpdateGuard,
}

impl VertexBuffer {
    pub(crate) fn new(raw: RawId, byte_size: u32) -> Self {
        Self {
            raw,
            byte_size,
            guard: UpdateGuard::default(),
        }
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }
}

#[derive(Debug)]
pub struct IndexBuffer {
    pub(crate) raw: RawId,
    byte_size: u32,
    index_type: IndexType,
    pub(crate) guard: UpdateGuard,
}

impl IndexBuffer {
    pub(crate) fn new(raw: RawId, byte_size: u32, index_type: IndexType) -> Self {
        Self {
            raw,
            byte_size,
            index_type,
            guard: UpdateGuard::default(),
        }
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }
}

/// Shader constant storage kept on the CPU and uploaded as vec4 registers
/// when a draw commits.
///
/// The version counter is bumped on every content update; commits compare
/// it against the last uploaded version to skip redundant uploads when the
/// same buffer is rebound unchanged.
#[derive(Debug)]
pub struct ConstBuffer {
    content: Vec<[f32; 4]>,
    byte_size: u32,
    scope: BindScope,
    version: u32,
    pub(crate) guard: UpdateGuard,
}

impl ConstBuffer {
    pub(crate) fn new(byte_size: u32, scope: BindScope) -> Self {
        Self {
            content: vec![[0.0; 4]; byte_size as usize / VECTOR_REGISTER_SIZE],
            byte_size,
            scope,
            version: 0,
            guard: UpdateGuard::default(),
        }
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    pub fn scope(&self) -> BindScope {
        self.scope
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn registers(&self) -> &[[f32; 4]] {
        &self.content
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) {
        for (register, chunk) in self
            .content
            .iter_mut()
            .zip(bytes.chunks_exact(VECTOR_REGISTER_SIZE))
        {
            *register = bytemuck::pod_read_unaligned::<[f32; 4]>(chunk);
        }
        self.version = self.version.wrapping_add(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutAttribute {
    pub name: String,
    pub kind: AttributeKind,
    pub rows: u8,
    pub columns: u8,
    pub byte_offset: u32,
    pub normalized: bool,
}

impl LayoutAttribute {
    pub fn row_size(&self) -> u32 {
        u32::from(self.columns) * self.kind.byte_size()
    }
}

/// Structural description of how vertex bytes map to shader inputs.
///
/// Deduplicated by the context's layout cache: equal declarations always
/// resolve to the same handle.
#[derive(Debug)]
pub struct VertexLayout {
    attributes: Vec<LayoutAttribute>,
    bytes_per_vertex: u32,
    hash: u64,
}

impl VertexLayout {
    pub(crate) fn new(attributes: &[VertexAttribute], bytes_per_vertex: u32) -> Self {
        let attributes: Vec<LayoutAttribute> = attributes
            .iter()
            .map(|a| LayoutAttribute {
                name: a.name.to_string(),
                kind: a.kind,
                rows: a.rows,
                columns: a.columns,
                byte_offset: a.byte_offset,
                normalized: a.normalized,
            })
            .collect();
        let hash = Self::structural_hash(&attributes, bytes_per_vertex);
        Self {
            attributes,
            bytes_per_vertex,
            hash,
        }
    }

    fn structural_hash(attributes: &[LayoutAttribute], bytes_per_vertex: u32) -> u64 {
        let mut hasher = Xxh3::new();
        attributes.len().hash(&mut hasher);
        for attribute in attributes {
            attribute.hash(&mut hasher);
        }
        bytes_per_vertex.hash(&mut hasher);
        hasher.finish()
    }

    pub fn attributes(&self) -> &[LayoutAttribute] {
        &self.attributes
    }

    pub fn bytes_per_vertex(&self) -> u32 {
        self.bytes_per_vertex
    }

    pub fn structural_hash_value(&self) -> u64 {
        self.hash
    }

    pub(crate) fn matches(&self, attributes: &[VertexAttribute], bytes_per_vertex: u32) -> bool {
        self.bytes_per_vertex == bytes_per_vertex
            && self.attributes.len() == attributes.len()
            && self.attributes.iter().zip(attributes).all(|(own, other)| {
                own.name == other.name
                    && own.kind == other.kind
                    && own.rows == other.rows
                    && own.columns == other.columns
                    && own.byte_offset == other.byte_offset
                    && own.normalized == other.normalized
            })
    }
}

impl PartialEq for VertexLayout {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.bytes_per_vertex == other.bytes_per_vertex
            && self.attributes == other.attributes
    }
}

impl Eq for VertexLayout {}

/// Framebuffer plus its attachments. Texture attachments are shared with
/// whoever else holds the handle; renderbuffer ids are owned here.
#[derive(Debug)]
pub struct RenderTarget {
    pub(crate) raw: RawId,
    size: [u32; 2],
    pub(crate) color: Option<Handle<Texture>>,
    pub(crate) depth: Option<Handle<Texture>>,
    pub(crate) color_rb: Option<RawId>,
    pub(crate) depth_rb: Option<RawId>,
}

impl RenderTarget {
    pub(crate) fn new(
        raw: RawId,
        size: [u32; 2],
        color: Option<Handle<Texture>>,
        depth: Option<Handle<Texture>>,
        color_rb: Option<RawId>,
        depth_rb: Option<RawId>,
    ) -> Self {
        Self {
            raw,
            size,
            color,
            depth,
            color_rb,
            depth_rb,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn color_texture(&self) -> Option<Handle<Texture>> {
        self.color
    }

    pub fn depth_texture(&self) -> Option<Handle<Texture>> {
        self.depth
    }
}
