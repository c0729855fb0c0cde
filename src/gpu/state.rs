//! CPU-side record of what was last issued to the device.
//!
//! The tracker is pure bookkeeping: it records bindings, diffs them against
//! the incoming ones and maintains the dirty mask. Native calls are driven
//! by the context, which consumes the mask bit by bit at commit time.

use crate::utils::Handle;

use super::resources::{ConstBuffer, IndexBuffer, RenderTarget, Shader, VertexBuffer, VertexLayout};
use super::structs::{
    BindScope, Rect2D, SamplerBlock, SamplerScope, StateBlock, Statistics, StoreOp,
    MAX_VERTEX_BUFFERS,
};

bitflags::bitflags! {
    /// Binding groups that differ from what was last submitted and must be
    /// resubmitted before the next draw.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        const VERTEX_ATTRIBS = 1 << 0;
        const PASS_CBUFFER   = 1 << 1;
        const MTR_CBUFFER    = 1 << 2;
        const DRAW_CBUFFER   = 1 << 3;
        const PASS_TEXTURES  = 1 << 4;
        const MTR_TEXTURES   = 1 << 5;
        /// Program changed; every reflected binding must be re-established.
        const PIPELINE       = 1 << 6;
    }
}

impl DirtyFlags {
    pub fn cbuffer_bit(scope: BindScope) -> DirtyFlags {
        match scope {
            BindScope::RenderPass => DirtyFlags::PASS_CBUFFER,
            BindScope::Material => DirtyFlags::MTR_CBUFFER,
            BindScope::DrawCommand => DirtyFlags::DRAW_CBUFFER,
        }
    }

    pub fn textures_bit(scope: SamplerScope) -> DirtyFlags {
        match scope {
            SamplerScope::RenderPass => DirtyFlags::PASS_TEXTURES,
            SamplerScope::Material => DirtyFlags::MTR_TEXTURES,
        }
    }
}

/// One occupied vertex buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VertexBinding {
    pub buffer: Handle<VertexBuffer>,
    pub layout: Handle<VertexLayout>,
    pub offset: u32,
}

/// Last const-buffer content pushed to the device for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeUpload {
    pub buffer: Handle<ConstBuffer>,
    pub version: u32,
}

pub(crate) struct DeviceState {
    pub state_block: StateBlock,
    pub shader: Option<Handle<Shader>>,

    pub vertex_buffers: [Option<VertexBinding>; MAX_VERTEX_BUFFERS],
    pub cbuffers: [Option<Handle<ConstBuffer>>; BindScope::COUNT],
    pub uploaded: [Option<ScopeUpload>; BindScope::COUNT],
    pub samplers: [SamplerBlock; SamplerScope::COUNT],
    pub index_buffer: Option<Handle<IndexBuffer>>,

    pub render_target: Option<Handle<RenderTarget>>,
    pub render_area: Rect2D,
    /// Store ops for color, depth and stencil, reset to defaults when a
    /// pass ends.
    pub store_ops: [StoreOp; 3],
    pub inside_pass: bool,

    pub dirty: DirtyFlags,
    /// Bitmask of currently enabled attribute locations.
    pub enabled_attribs: u32,
    /// First texture unit the material sampler block was last committed
    /// at; material units sit after the pass block, so a resized pass
    /// block moves them.
    pub material_first_unit: u32,

    pub frame_id: u32,
    pub stats: Statistics,
    pub last_stats: Statistics,
}

pub(crate) const DEFAULT_STORE_OPS: [StoreOp; 3] =
    [StoreOp::Store, StoreOp::Discard, StoreOp::Discard];

impl DeviceState {
    pub fn new() -> Self {
        Self {
            state_block: StateBlock::default(),
            shader: None,
            vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            cbuffers: [None; BindScope::COUNT],
            uploaded: [None; BindScope::COUNT],
            samplers: Default::default(),
            index_buffer: None,
            render_target: None,
            render_area: Rect2D::default(),
            store_ops: DEFAULT_STORE_OPS,
            inside_pass: false,
            dirty: DirtyFlags::empty(),
            enabled_attribs: 0,
            material_first_unit: 0,
            frame_id: 1,
            stats: Statistics::default(),
            last_stats: Statistics::default(),
        }
    }

    /// Record a slot binding; only an actual change marks the slot group
    /// dirty, so rebinding the same tuple is free.
    pub fn record_vertex_buffer(&mut self, slot: usize, binding: Option<VertexBinding>) -> bool {
        if self.vertex_buffers[slot] == binding {
            return false;
        }
        self.vertex_buffers[slot] = binding;
        self.dirty |= DirtyFlags::VERTEX_ATTRIBS;
        true
    }

    pub fn record_const_buffer(&mut self, scope: BindScope, buffer: Handle<ConstBuffer>) -> bool {
        let current = &mut self.cbuffers[scope.index()];
        if *current == Some(buffer) {
            return false;
        }
        *current = Some(buffer);
        self.dirty |= DirtyFlags::cbuffer_bit(scope);
        true
    }

    pub fn record_samplers(&mut self, scope: SamplerScope, block: &SamplerBlock) -> bool {
        let current = &mut self.samplers[scope.index()];
        if current == block {
            return false;
        }
        *current = block.clone();
        self.dirty |= DirtyFlags::textures_bit(scope);
        true
    }

    /// Program change invalidates every reflected binding, including the
    /// per-scope upload cache.
    pub fn record_shader(&mut self, shader: Option<Handle<Shader>>) -> bool {
        if self.shader == shader {
            return false;
        }
        self.shader = shader;
        self.dirty |= DirtyFlags::PIPELINE;
        self.uploaded = [None; BindScope::COUNT];
        true
    }

    pub fn check_and_clear(&mut self, flags: DirtyFlags) -> bool {
        let set = self.dirty.intersects(flags);
        self.dirty -= flags;
        set
    }

    /// Clears everything a pass leaves bound; attribute and buffer-target
    /// unbinds are issued by the caller.
    pub fn reset_pass_bindings(&mut self) {
        self.vertex_buffers = [None; MAX_VERTEX_BUFFERS];
        self.index_buffer = None;
        self.enabled_attribs = 0;
        self.store_ops = DEFAULT_STORE_OPS;
    }

    pub fn on_present(&mut self) {
        self.last_stats = self.stats;
        self.stats = Statistics::default();
        self.frame_id += 1;
    }
}
