//! Descriptor and pipeline-state value types shared by the whole device layer.

use crate::utils::Handle;
use smallvec::SmallVec;

#[cfg(feature = "kiln-serde")]
use serde::{Deserialize, Serialize};

use super::resources::{RenderTarget, Texture};

/// Number of vertex buffer binding slots tracked per context.
pub const MAX_VERTEX_BUFFERS: usize = 8;

/// Upper bound on vertex attribute locations a backend may report.
pub const MAX_VERTEX_ATTRIBUTES: u32 = 16;

/// Const buffer contents are uploaded as vec4 registers of this width.
pub const VECTOR_REGISTER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect2D {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum PixelFormat {
    R8,
    RGB8,
    #[default]
    RGBA8,
    RGBA32F,
    D24S8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::RGB8 => 3,
            PixelFormat::RGBA8 | PixelFormat::D24S8 => 4,
            PixelFormat::RGBA32F => 16,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(self, PixelFormat::D24S8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum IndexType {
    #[default]
    U16,
    U32,
}

impl IndexType {
    pub fn byte_size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum AttributeKind {
    I8,
    U8,
    I16,
    U16,
    #[default]
    F32,
}

impl AttributeKind {
    pub fn byte_size(self) -> u32 {
        match self {
            AttributeKind::I8 | AttributeKind::U8 => 1,
            AttributeKind::I16 | AttributeKind::U16 => 2,
            AttributeKind::F32 => 4,
        }
    }
}

/// One attribute of a vertex layout declaration.
///
/// `rows` above 1 describes a matrix attribute consuming that many
/// consecutive attribute locations; each row is `columns` components wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute<'a> {
    pub name: &'a str,
    pub kind: AttributeKind,
    pub rows: u8,
    pub columns: u8,
    pub byte_offset: u32,
    pub normalized: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VertexLayoutInfo<'a> {
    pub attributes: &'a [VertexAttribute<'a>],
    pub bytes_per_vertex: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum CompareFunc {
    Never,
    #[default]
    Less,
    LessEqual,
    Equal,
    NotEqual,
    GreaterEqual,
    Greater,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum BlendFactor {
    One,
    Zero,
    SrcColor,
    InvSrcColor,
    #[default]
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    InvSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum CullFace {
    Front,
    Back,
    FrontAndBack,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
    pub struct ColorMask: u8 {
        const R = 0x1;
        const G = 0x2;
        const B = 0x4;
        const A = 0x8;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        ColorMask::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub func: CompareFunc,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: false,
            write: true,
            func: CompareFunc::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct StencilState {
    pub test: bool,
    pub write_mask: u32,
    pub func: CompareFunc,
    pub ref_value: u32,
    pub read_mask: u32,
    pub stencil_fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            test: false,
            write_mask: 0xff,
            func: CompareFunc::Always,
            ref_value: 0,
            read_mask: 0xff,
            stencil_fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct RasterizationState {
    pub cull: Option<CullFace>,
    pub front_face_ccw: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            cull: None,
            front_face_ccw: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct BlendingState {
    pub enabled: bool,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub rgb_op: BlendOp,
    pub alpha_op: BlendOp,
    pub color_mask: ColorMask,
}

impl Default for BlendingState {
    fn default() -> Self {
        Self {
            enabled: false,
            src_rgb: BlendFactor::SrcAlpha,
            dst_rgb: BlendFactor::InvSrcAlpha,
            src_alpha: BlendFactor::SrcAlpha,
            dst_alpha: BlendFactor::InvSrcAlpha,
            rgb_op: BlendOp::Add,
            alpha_op: BlendOp::Add,
            color_mask: ColorMask::all(),
        }
    }
}

/// Full fixed-function pipeline state applied per render pass.
///
/// Field groups are diffed independently against the last applied block, so
/// an unchanged group costs no native calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct StateBlock {
    pub depth: DepthState,
    pub stencil: StencilState,
    pub rasterization: RasterizationState,
    pub blending: BlendingState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum LoadOp {
    Load,
    Clear,
    #[default]
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct AttachmentOps {
    pub load: LoadOp,
    pub store: StoreOp,
}

impl AttachmentOps {
    pub const CLEAR_STORE: AttachmentOps = AttachmentOps {
        load: LoadOp::Clear,
        store: StoreOp::Store,
    };
    pub const DISCARD: AttachmentOps = AttachmentOps {
        load: LoadOp::DontCare,
        store: StoreOp::Discard,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Describes one bounded span of drawing against a single render target.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc<'a> {
    pub debug_name: &'a str,
    /// `None` targets the default framebuffer.
    pub target: Option<Handle<RenderTarget>>,
    pub viewport: Rect2D,
    pub depth_range: [f32; 2],
    pub color: AttachmentOps,
    pub depth: AttachmentOps,
    pub stencil: AttachmentOps,
    pub clear_values: ClearValues,
    pub states: StateBlock,
}

impl Default for RenderPassDesc<'_> {
    fn default() -> Self {
        Self {
            debug_name: "",
            target: None,
            viewport: Rect2D::default(),
            depth_range: [0.0, 1.0],
            color: AttachmentOps::default(),
            depth: AttachmentOps::DISCARD,
            stencil: AttachmentOps::DISCARD,
            clear_values: ClearValues::default(),
            states: StateBlock::default(),
        }
    }
}

/// Granularity at which a const buffer is rebound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum BindScope {
    RenderPass,
    Material,
    #[default]
    DrawCommand,
}

impl BindScope {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            BindScope::RenderPass => 0,
            BindScope::Material => 1,
            BindScope::DrawCommand => 2,
        }
    }
}

/// Scope of a sampler block binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "kiln-serde", derive(Serialize, Deserialize))]
pub enum SamplerScope {
    RenderPass,
    Material,
}

impl SamplerScope {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            SamplerScope::RenderPass => 0,
            SamplerScope::Material => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub texture: Handle<Texture>,
}

/// Ordered set of named textures bound together at one scope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplerBlock {
    pub entries: SmallVec<[SamplerBinding; 4]>,
}

impl SamplerBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, texture: Handle<Texture>) -> Self {
        self.entries.push(SamplerBinding {
            name: name.into(),
            texture,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderInfo<'a> {
    pub debug_name: &'a str,
    pub vertex_src: &'a str,
    pub fragment_src: &'a str,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureInfo<'a> {
    pub debug_name: &'a str,
    pub size: [u32; 2],
    pub format: PixelFormat,
    pub initial_data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferInfo<'a> {
    pub debug_name: &'a str,
    pub byte_size: u32,
    pub initial_data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexBufferInfo<'a> {
    pub debug_name: &'a str,
    pub byte_size: u32,
    pub index_type: IndexType,
    pub initial_data: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstBufferInfo<'a> {
    pub debug_name: &'a str,
    /// Must be a multiple of [`VECTOR_REGISTER_SIZE`].
    pub byte_size: u32,
    pub scope: BindScope,
}

/// Where a render target attachment comes from.
#[derive(Debug, Clone, Copy, Default)]
pub enum AttachmentSource {
    #[default]
    None,
    /// Sampled attachment shared with other holders of the handle.
    Texture(Handle<Texture>),
    /// Non-sampled attachment; the render target owns the renderbuffer.
    Renderbuffer(PixelFormat),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTargetInfo<'a> {
    pub debug_name: &'a str,
    pub size: [u32; 2],
    pub color: AttachmentSource,
    pub depth: AttachmentSource,
}

/// Per-frame counters, double buffered across [`present`] boundaries.
///
/// [`present`]: super::Context::on_present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub render_passes: u32,
    pub draw_calls: u32,
}

/// Context creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct ContextInfo {
    /// Default framebuffer size reported by a headless device.
    pub headless_size: [u32; 2],
    /// Route device diagnostics into the `log` crate. Also forced on by the
    /// `KILN_DEBUG_OUTPUT` environment variable.
    pub debug_output: bool,
}

impl Default for ContextInfo {
    fn default() -> Self {
        Self {
            headless_size: [1280, 720],
            debug_output: false,
        }
    }
}
