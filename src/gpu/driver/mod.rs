//! Native call surface implemented by each device backend.
//!
//! The [`Device`] trait models the raw immediate-mode graphics API the
//! tracker drives: object creation and deletion, program introspection,
//! fixed-function state application, attribute/buffer plumbing and draw
//! submission. A backend is selected once at context creation and never
//! per call.

use super::structs::{
    AttributeKind, BlendingState, DepthState, IndexType, PixelFormat, RasterizationState, Rect2D,
    StencilState, Topology,
};

/// Native buffer binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

/// Semantic attachment points for pass store/discard hints. Backends
/// translate these to default-framebuffer or FBO specific names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentPoint {
    Color,
    Depth,
    Stencil,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClearMask: u8 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearRequest {
    pub mask: ClearMask,
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

/// Owned native object id plus an optional binding-target tag.
///
/// Exclusively owned by one resource object and moved into the backend's
/// delete call exactly once; it is deliberately neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RawId {
    id: u32,
    target: Option<BufferTarget>,
}

impl RawId {
    pub fn new(id: u32) -> Self {
        Self { id, target: None }
    }

    pub fn with_target(id: u32, target: BufferTarget) -> Self {
        Self {
            id,
            target: Some(target),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn target(&self) -> Option<BufferTarget> {
        self.target
    }
}

/// A rejected native call, reported with the originating call name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFault {
    pub call: &'static str,
    pub reason: String,
}

impl DeviceFault {
    pub fn new(call: &'static str, reason: impl Into<String>) -> Self {
        Self {
            call,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.call, self.reason)
    }
}

/// Static capabilities advertised by a backend at context creation.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    pub max_vertex_attributes: u32,
    pub framebuffer_invalidate: bool,
    pub framebuffer_discard: bool,
    pub debug_output: bool,
    pub default_framebuffer_size: [u32; 2],
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            max_vertex_attributes: 16,
            framebuffer_invalidate: true,
            framebuffer_discard: false,
            debug_output: true,
            default_framebuffer_size: [1280, 720],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    High,
    Medium,
    Low,
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSource {
    Api,
    WindowSystem,
    ShaderCompiler,
    ThirdParty,
    Application,
    Other,
}

/// Diagnostic emitted by the native device's debug output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMessage {
    pub severity: DebugSeverity,
    pub source: DebugSource,
    pub kind: &'static str,
    pub text: String,
}

pub type DebugHook = Box<dyn FnMut(&DebugMessage)>;

/// Reflected kind of an active uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    /// `count` vec4 registers.
    Vec4Array { count: u32 },
    Sampler2D,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub location: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    /// First attribute location; matrix attributes occupy consecutive
    /// locations starting here.
    pub location: u32,
}

/// Framebuffer attachment ids passed to [`Device::create_framebuffer`].
#[derive(Debug, Default)]
pub struct FramebufferAttachments<'a> {
    pub color_texture: Option<&'a RawId>,
    pub depth_texture: Option<&'a RawId>,
    pub color_renderbuffer: Option<&'a RawId>,
    pub depth_renderbuffer: Option<&'a RawId>,
}

/// Capability-set interface over one native graphics device.
///
/// All calls are synchronous relative to the CPU and must be issued from a
/// single render thread. Creation calls may fail with a [`DeviceFault`];
/// state-changing calls are infallible at this boundary — a backend checks
/// its own error state and reports through the debug hook.
pub trait Device {
    fn caps(&self) -> DeviceCaps;

    /// Install or clear the diagnostic sink for device-emitted messages.
    fn set_debug_hook(&mut self, hook: Option<DebugHook>);

    // Object ids captured at startup so default bindings can be restored.
    fn current_framebuffer(&mut self) -> RawId;
    fn current_program(&mut self) -> RawId;

    fn create_program(&mut self, vertex_src: &str, fragment_src: &str)
        -> Result<RawId, DeviceFault>;
    fn delete_program(&mut self, id: RawId);
    fn program_uniforms(&mut self, id: &RawId) -> Vec<UniformInfo>;
    fn program_attributes(&mut self, id: &RawId) -> Vec<AttributeInfo>;

    fn create_texture(
        &mut self,
        size: [u32; 2],
        format: PixelFormat,
        pixels: Option<&[u8]>,
    ) -> Result<RawId, DeviceFault>;
    fn update_texture(&mut self, id: &RawId, size: [u32; 2], format: PixelFormat, pixels: &[u8]);
    fn delete_texture(&mut self, id: RawId);

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        byte_size: u32,
        initial_data: Option<&[u8]>,
    ) -> Result<RawId, DeviceFault>;
    fn update_buffer(&mut self, id: &RawId, byte_offset: u32, bytes: &[u8]);
    fn delete_buffer(&mut self, id: RawId);

    fn create_renderbuffer(
        &mut self,
        size: [u32; 2],
        format: PixelFormat,
    ) -> Result<RawId, DeviceFault>;
    fn delete_renderbuffer(&mut self, id: RawId);

    fn create_framebuffer(
        &mut self,
        attachments: &FramebufferAttachments,
    ) -> Result<RawId, DeviceFault>;
    fn delete_framebuffer(&mut self, id: RawId);

    fn bind_framebuffer(&mut self, id: &RawId);
    fn use_program(&mut self, id: &RawId);
    fn set_viewport(&mut self, rect: Rect2D);
    fn set_depth_range(&mut self, near: f32, far: f32);
    fn set_scissor(&mut self, rect: Rect2D);
    fn apply_depth_state(&mut self, state: &DepthState);
    fn apply_stencil_state(&mut self, state: &StencilState);
    fn apply_rasterization_state(&mut self, state: &RasterizationState);
    fn apply_blending_state(&mut self, state: &BlendingState);
    fn clear(&mut self, request: &ClearRequest);

    fn bind_buffer(&mut self, target: BufferTarget, id: Option<&RawId>);
    fn attribute_pointer(
        &mut self,
        location: u32,
        columns: u32,
        kind: AttributeKind,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    );
    fn enable_attribute(&mut self, location: u32);
    fn disable_attribute(&mut self, location: u32);
    fn upload_vec4_array(&mut self, location: u32, registers: &[[f32; 4]]);
    fn set_sampler_unit(&mut self, location: u32, unit: u32);
    fn bind_texture_unit(&mut self, unit: u32, id: Option<&RawId>);

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32);
    fn draw_elements(&mut self, topology: Topology, count: u32, index: IndexType, byte_offset: u32);

    /// Batched store-op hint: the listed attachments may be thrown away.
    /// Best effort, never required for correctness.
    fn invalidate_attachments(&mut self, attachments: &[AttachmentPoint], area: Rect2D);
    fn discard_attachments(&mut self, attachments: &[AttachmentPoint]);
}
