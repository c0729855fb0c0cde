//! Recording software device.
//!
//! Interprets the native call surface without real GPU work: ids are
//! allocated from a counter, program reflection is simulated by scanning
//! GLSL-style declarations, and every call is appended to a shared
//! [`CallLog`]. This is the headless backend and the reference device for
//! integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::driver::{
    AttachmentPoint, AttributeInfo, BufferTarget, ClearRequest, DebugHook, DebugMessage, Device,
    DeviceCaps, DeviceFault, FramebufferAttachments, RawId, UniformInfo, UniformKind,
};
use super::structs::{
    AttributeKind, BlendingState, DepthState, IndexType, PixelFormat, RasterizationState, Rect2D,
    StencilState, Topology,
};

/// One recorded native call with its argument context.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    CreateProgram(u32),
    DeleteProgram(u32),
    CreateTexture(u32),
    UpdateTexture(u32),
    DeleteTexture(u32),
    CreateBuffer { id: u32, target: BufferTarget },
    UpdateBuffer { id: u32, byte_offset: u32, len: usize },
    DeleteBuffer(u32),
    CreateRenderbuffer(u32),
    DeleteRenderbuffer(u32),
    CreateFramebuffer(u32),
    DeleteFramebuffer(u32),
    BindFramebuffer(u32),
    UseProgram(u32),
    SetViewport(Rect2D),
    SetDepthRange { near: f32, far: f32 },
    SetScissor(Rect2D),
    ApplyDepthState(DepthState),
    ApplyStencilState(StencilState),
    ApplyRasterizationState(RasterizationState),
    ApplyBlendingState(BlendingState),
    Clear(ClearRequest),
    BindBuffer { target: BufferTarget, id: Option<u32> },
    AttributePointer {
        location: u32,
        columns: u32,
        kind: AttributeKind,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    },
    EnableAttribute(u32),
    DisableAttribute(u32),
    UploadVec4Array { location: u32, registers: usize },
    SetSamplerUnit { location: u32, unit: u32 },
    BindTextureUnit { unit: u32, id: Option<u32> },
    DrawArrays { topology: Topology, first: u32, count: u32 },
    DrawElements {
        topology: Topology,
        count: u32,
        index: IndexType,
        byte_offset: u32,
    },
    InvalidateAttachments(Vec<AttachmentPoint>),
    DiscardAttachments(Vec<AttachmentPoint>),
}

/// Shared view into the calls a [`NullDevice`] has issued.
#[derive(Clone, Default)]
pub struct CallLog {
    inner: Rc<RefCell<Vec<NativeCall>>>,
}

impl CallLog {
    fn push(&self, call: NativeCall) {
        self.inner.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<NativeCall> {
        self.inner.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&NativeCall) -> bool) -> usize {
        self.inner.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn contains(&self, pred: impl Fn(&NativeCall) -> bool) -> bool {
        self.count(pred) > 0
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

struct ProgramRecord {
    uniforms: Vec<UniformInfo>,
    attributes: Vec<AttributeInfo>,
}

/// Software implementation of [`Device`].
pub struct NullDevice {
    caps: DeviceCaps,
    next_id: u32,
    programs: FxHashMap<u32, ProgramRecord>,
    buffers: FxHashMap<u32, Vec<u8>>,
    textures: FxHashMap<u32, ([u32; 2], PixelFormat)>,
    renderbuffers: FxHashMap<u32, ([u32; 2], PixelFormat)>,
    framebuffers: Vec<u32>,
    log: CallLog,
    hook: Option<DebugHook>,
}

impl NullDevice {
    pub fn new(caps: DeviceCaps) -> Self {
        Self {
            caps,
            next_id: 1,
            programs: FxHashMap::default(),
            buffers: FxHashMap::default(),
            textures: FxHashMap::default(),
            renderbuffers: FxHashMap::default(),
            framebuffers: Vec::new(),
            log: CallLog::default(),
            hook: None,
        }
    }

    /// A cloned handle onto this device's call log.
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Feed a diagnostic through the installed debug hook, as a native
    /// device would.
    pub fn emit_debug(&mut self, message: DebugMessage) {
        if let Some(hook) = self.hook.as_mut() {
            hook(&message);
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new(DeviceCaps::default())
    }
}

impl Device for NullDevice {
    fn caps(&self) -> DeviceCaps {
        self.caps
    }

    fn set_debug_hook(&mut self, hook: Option<DebugHook>) {
        self.hook = hook;
    }

    fn current_framebuffer(&mut self) -> RawId {
        RawId::new(0)
    }

    fn current_program(&mut self) -> RawId {
        RawId::new(0)
    }

    fn create_program(
        &mut self,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<RawId, DeviceFault> {
        if vertex_src.trim().is_empty() || fragment_src.trim().is_empty() {
            return Err(DeviceFault::new("create_program", "empty shader source"));
        }
        for (stage, src) in [("vertex", vertex_src), ("fragment", fragment_src)] {
            if src.contains("#error") {
                return Err(DeviceFault::new(
                    "create_program",
                    format!("{stage} shader failed to compile"),
                ));
            }
        }

        let (attributes, locations) = reflect_attributes(vertex_src);
        if locations > self.caps.max_vertex_attributes {
            return Err(DeviceFault::new(
                "create_program",
                format!(
                    "program needs {locations} attribute locations, device supports {}",
                    self.caps.max_vertex_attributes
                ),
            ));
        }
        let uniforms = reflect_uniforms(&[vertex_src, fragment_src]);

        let id = self.alloc_id();
        self.programs.insert(
            id,
            ProgramRecord {
                uniforms,
                attributes,
            },
        );
        self.log.push(NativeCall::CreateProgram(id));
        Ok(RawId::new(id))
    }

    fn delete_program(&mut self, id: RawId) {
        self.programs.remove(&id.id());
        self.log.push(NativeCall::DeleteProgram(id.id()));
    }

    fn program_uniforms(&mut self, id: &RawId) -> Vec<UniformInfo> {
        self.programs
            .get(&id.id())
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn program_attributes(&mut self, id: &RawId) -> Vec<AttributeInfo> {
        self.programs
            .get(&id.id())
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn create_texture(
        &mut self,
        size: [u32; 2],
        format: PixelFormat,
        pixels: Option<&[u8]>,
    ) -> Result<RawId, DeviceFault> {
        if size[0] == 0 || size[1] == 0 {
            return Err(DeviceFault::new("create_texture", "zero-sized texture"));
        }
        if let Some(pixels) = pixels {
            let expected = size[0] as usize * size[1] as usize * format.bytes_per_pixel();
            if pixels.len() != expected {
                return Err(DeviceFault::new(
                    "create_texture",
                    format!("pixel data is {} bytes, expected {expected}", pixels.len()),
                ));
            }
        }
        let id = self.alloc_id();
        self.textures.insert(id, (size, format));
        self.log.push(NativeCall::CreateTexture(id));
        Ok(RawId::new(id))
    }

    fn update_texture(&mut self, id: &RawId, _size: [u32; 2], _format: PixelFormat, _pixels: &[u8]) {
        self.log.push(NativeCall::UpdateTexture(id.id()));
    }

    fn delete_texture(&mut self, id: RawId) {
        self.textures.remove(&id.id());
        self.log.push(NativeCall::DeleteTexture(id.id()));
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        byte_size: u32,
        initial_data: Option<&[u8]>,
    ) -> Result<RawId, DeviceFault> {
        if byte_size == 0 {
            return Err(DeviceFault::new("create_buffer", "zero-sized buffer"));
        }
        if let Some(data) = initial_data {
            if data.len() > byte_size as usize {
                return Err(DeviceFault::new(
                    "create_buffer",
                    "initial data exceeds buffer size",
                ));
            }
        }
        let id = self.alloc_id();
        let mut content = vec![0u8; byte_size as usize];
        if let Some(data) = initial_data {
            content[..data.len()].copy_from_slice(data);
        }
        self.buffers.insert(id, content);
        self.log.push(NativeCall::CreateBuffer { id, target });
        Ok(RawId::with_target(id, target))
    }

    fn update_buffer(&mut self, id: &RawId, byte_offset: u32, bytes: &[u8]) {
        if let Some(content) = self.buffers.get_mut(&id.id()) {
            let start = byte_offset as usize;
            let end = (start + bytes.len()).min(content.len());
            if start < end {
                content[start..end].copy_from_slice(&bytes[..end - start]);
            }
        }
        self.log.push(NativeCall::UpdateBuffer {
            id: id.id(),
            byte_offset,
            len: bytes.len(),
        });
    }

    fn delete_buffer(&mut self, id: RawId) {
        self.buffers.remove(&id.id());
        self.log.push(NativeCall::DeleteBuffer(id.id()));
    }

    fn create_renderbuffer(
        &mut self,
        size: [u32; 2],
        format: PixelFormat,
    ) -> Result<RawId, DeviceFault> {
        if size[0] == 0 || size[1] == 0 {
            return Err(DeviceFault::new(
                "create_renderbuffer",
                "zero-sized renderbuffer",
            ));
        }
        let id = self.alloc_id();
        self.renderbuffers.insert(id, (size, format));
        self.log.push(NativeCall::CreateRenderbuffer(id));
        Ok(RawId::new(id))
    }

    fn delete_renderbuffer(&mut self, id: RawId) {
        self.renderbuffers.remove(&id.id());
        self.log.push(NativeCall::DeleteRenderbuffer(id.id()));
    }

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<RawId, DeviceFault> {
        let any = attachments.color_texture.is_some()
            || attachments.depth_texture.is_some()
            || attachments.color_renderbuffer.is_some()
            || attachments.depth_renderbuffer.is_some();
        if !any {
            return Err(DeviceFault::new(
                "create_framebuffer",
                "framebuffer without attachments is incomplete",
            ));
        }
        let id = self.alloc_id();
        self.framebuffers.push(id);
        self.log.push(NativeCall::CreateFramebuffer(id));
        Ok(RawId::new(id))
    }

    fn delete_framebuffer(&mut self, id: RawId) {
        self.framebuffers.retain(|fb| *fb != id.id());
        self.log.push(NativeCall::DeleteFramebuffer(id.id()));
    }

    fn bind_framebuffer(&mut self, id: &RawId) {
        self.log.push(NativeCall::BindFramebuffer(id.id()));
    }

    fn use_program(&mut self, id: &RawId) {
        self.log.push(NativeCall::UseProgram(id.id()));
    }

    fn set_viewport(&mut self, rect: Rect2D) {
        self.log.push(NativeCall::SetViewport(rect));
    }

    fn set_depth_range(&mut self, near: f32, far: f32) {
        self.log.push(NativeCall::SetDepthRange { near, far });
    }

    fn set_scissor(&mut self, rect: Rect2D) {
        self.log.push(NativeCall::SetScissor(rect));
    }

    fn apply_depth_state(&mut self, state: &DepthState) {
        self.log.push(NativeCall::ApplyDepthState(*state));
    }

    fn apply_stencil_state(&mut self, state: &StencilState) {
        self.log.push(NativeCall::ApplyStencilState(*state));
    }

    fn apply_rasterization_state(&mut self, state: &RasterizationState) {
        self.log.push(NativeCall::ApplyRasterizationState(*state));
    }

    fn apply_blending_state(&mut self, state: &BlendingState) {
        self.log.push(NativeCall::ApplyBlendingState(*state));
    }

    fn clear(&mut self, request: &ClearRequest) {
        self.log.push(NativeCall::Clear(*request));
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<&RawId>) {
        self.log.push(NativeCall::BindBuffer {
            target,
            id: id.map(RawId::id),
        });
    }

    fn attribute_pointer(
        &mut self,
        location: u32,
        columns: u32,
        kind: AttributeKind,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    ) {
        self.log.push(NativeCall::AttributePointer {
            location,
            columns,
            kind,
            normalized,
            stride,
            byte_offset,
        });
    }

    fn enable_attribute(&mut self, location: u32) {
        self.log.push(NativeCall::EnableAttribute(location));
    }

    fn disable_attribute(&mut self, location: u32) {
        self.log.push(NativeCall::DisableAttribute(location));
    }

    fn upload_vec4_array(&mut self, location: u32, registers: &[[f32; 4]]) {
        self.log.push(NativeCall::UploadVec4Array {
            location,
            registers: registers.len(),
        });
    }

    fn set_sampler_unit(&mut self, location: u32, unit: u32) {
        self.log.push(NativeCall::SetSamplerUnit { location, unit });
    }

    fn bind_texture_unit(&mut self, unit: u32, id: Option<&RawId>) {
        self.log.push(NativeCall::BindTextureUnit {
            unit,
            id: id.map(RawId::id),
        });
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        self.log.push(NativeCall::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn draw_elements(
        &mut self,
        topology: Topology,
        count: u32,
        index: IndexType,
        byte_offset: u32,
    ) {
        self.log.push(NativeCall::DrawElements {
            topology,
            count,
            index,
            byte_offset,
        });
    }

    fn invalidate_attachments(&mut self, attachments: &[AttachmentPoint], _area: Rect2D) {
        self.log
            .push(NativeCall::InvalidateAttachments(attachments.to_vec()));
    }

    fn discard_attachments(&mut self, attachments: &[AttachmentPoint]) {
        self.log
            .push(NativeCall::DiscardAttachments(attachments.to_vec()));
    }
}

/// Locations consumed by a GLSL type keyword; matrices span several.
fn type_rows(type_name: &str) -> u32 {
    match type_name {
        "mat2" => 2,
        "mat3" => 3,
        "mat4" => 4,
        _ => 1,
    }
}

/// Registers per element for a uniform type keyword.
fn type_registers(type_name: &str) -> Option<u32> {
    match type_name {
        "float" | "vec2" | "vec3" | "vec4" => Some(1),
        "mat2" => Some(2),
        "mat3" => Some(3),
        "mat4" => Some(4),
        _ => None,
    }
}

fn split_array_suffix(name: &str) -> (&str, u32) {
    if let Some(open) = name.find('[') {
        let count = name[open + 1..]
            .trim_end_matches(']')
            .parse::<u32>()
            .unwrap_or(1);
        (&name[..open], count)
    } else {
        (name, 1)
    }
}

/// Yields `(type, name)` for declarations starting with `keyword`,
/// skipping comments and precision qualifiers.
fn declarations<'a>(source: &'a str, keywords: &'a [&str]) -> impl Iterator<Item = (&'a str, &'a str)> {
    source.lines().filter_map(move |line| {
        let line = line.trim().trim_end_matches(';');
        if line.starts_with("//") {
            return None;
        }
        let mut tokens = line
            .split_whitespace()
            .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"));
        let first = tokens.next()?;
        if !keywords.contains(&first) {
            return None;
        }
        let ty = tokens.next()?;
        let name = tokens.next()?;
        Some((ty, name))
    })
}

/// Returns the reflected attributes and the total locations they consume.
fn reflect_attributes(vertex_src: &str) -> (Vec<AttributeInfo>, u32) {
    let mut attributes = Vec::new();
    let mut location = 0u32;
    for (ty, name) in declarations(vertex_src, &["attribute", "in"]) {
        let (name, _) = split_array_suffix(name);
        attributes.push(AttributeInfo {
            name: name.to_string(),
            location,
        });
        location += type_rows(ty);
    }
    (attributes, location)
}

fn reflect_uniforms(sources: &[&str]) -> Vec<UniformInfo> {
    let mut uniforms: Vec<UniformInfo> = Vec::new();
    let mut location = 0u32;
    for source in sources {
        for (ty, name) in declarations(source, &["uniform"]) {
            let (name, array_len) = split_array_suffix(name);
            if uniforms.iter().any(|u| u.name == name) {
                continue;
            }
            let kind = if ty.starts_with("sampler") {
                UniformKind::Sampler2D
            } else if let Some(registers) = type_registers(ty) {
                UniformKind::Vec4Array {
                    count: registers * array_len,
                }
            } else {
                continue;
            };
            uniforms.push(UniformInfo {
                name: name.to_string(),
                location,
                kind,
            });
            location += 1;
        }
    }
    uniforms
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r"
        attribute vec2 a_position;
        attribute vec4 a_color;
        attribute mat4 a_model;
        uniform vec4 u_pass[4];
        void main() {}
    ";

    const FS: &str = r"
        uniform sampler2D u_tex;
        uniform vec4 u_material[2];
        void main() {}
    ";

    #[test]
    fn attribute_locations_respect_matrix_rows() {
        let (attrs, locations) = reflect_attributes(VS);
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[0].name, "a_position");
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[1].location, 1);
        // mat4 sits at 2..=5
        assert_eq!(attrs[2].location, 2);
        assert_eq!(locations, 6);
    }

    #[test]
    fn uniforms_are_merged_across_stages() {
        let uniforms = reflect_uniforms(&[VS, FS]);
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms[0].name, "u_pass");
        assert_eq!(uniforms[0].kind, UniformKind::Vec4Array { count: 4 });
        assert_eq!(uniforms[1].kind, UniformKind::Sampler2D);
        assert_eq!(uniforms[2].name, "u_material");
        assert_eq!(uniforms[2].kind, UniformKind::Vec4Array { count: 2 });
    }

    #[test]
    fn bad_programs_are_rejected() {
        let mut device = NullDevice::default();
        assert!(device.create_program("", FS).is_err());
        let fault = device
            .create_program("#error broken\nvoid main() {}", FS)
            .unwrap_err();
        assert_eq!(fault.call, "create_program");
    }
}
