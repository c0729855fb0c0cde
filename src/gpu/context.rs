//! Public device context: owns the backend, the resource pools and the
//! state tracker, and sequences render passes and draws on top of them.

use log::{debug, error, trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::utils::{Handle, Pool};

use super::driver::{
    AttachmentPoint, BufferTarget, ClearMask, ClearRequest, DebugMessage, DebugSeverity, Device,
    DeviceCaps, DeviceFault, FramebufferAttachments, RawId, UniformKind,
};
use super::error::{ContractViolation, GPUError, Result};
use super::null::NullDevice;
use super::resources::{
    ConstBuffer, IndexBuffer, RenderTarget, Shader, Texture, VertexBuffer, VertexLayout,
};
use super::state::{DeviceState, DirtyFlags, ScopeUpload, VertexBinding};
use super::structs::{
    AttachmentSource, BindScope, BufferInfo, ConstBufferInfo, ContextInfo, IndexBufferInfo,
    LoadOp, RenderPassDesc, RenderTargetInfo, SamplerBlock, SamplerScope, ShaderInfo, StateBlock,
    Statistics, StoreOp, TextureInfo, Topology, VertexLayoutInfo, MAX_VERTEX_ATTRIBUTES,
    MAX_VERTEX_BUFFERS, VECTOR_REGISTER_SIZE,
};
use super::window::PresentSurface;

fn reject(op: &'static str, fault: DeviceFault) -> GPUError {
    GPUError::DeviceRejected {
        op,
        reason: fault.to_string(),
    }
}

fn route_debug_message(message: &DebugMessage) {
    let text = format!(
        "device [{:?}/{}]: {}",
        message.source, message.kind, message.text
    );
    match message.severity {
        DebugSeverity::High => error!("{text}"),
        DebugSeverity::Medium => warn!("{text}"),
        DebugSeverity::Low => debug!("{text}"),
        DebugSeverity::Notification => trace!("{text}"),
    }
}

/// One render device instance.
///
/// All operations must be issued from a single render thread; asset
/// decoding may happen elsewhere, but the `make_*` calls that upload the
/// decoded data belong here.
pub struct Context {
    device: Box<dyn Device>,
    caps: DeviceCaps,
    default_fb: RawId,
    default_sp: RawId,

    shaders: Pool<Shader>,
    textures: Pool<Texture>,
    vertex_buffers: Pool<VertexBuffer>,
    index_buffers: Pool<IndexBuffer>,
    const_buffers: Pool<ConstBuffer>,
    render_targets: Pool<RenderTarget>,
    vertex_layouts: Pool<VertexLayout>,
    layout_cache: FxHashMap<u64, SmallVec<[Handle<VertexLayout>; 1]>>,

    state: DeviceState,
}

impl Context {
    /// Construct a context over the recording software device.
    pub fn headless(info: &ContextInfo) -> Result<Self> {
        let caps = DeviceCaps {
            default_framebuffer_size: info.headless_size,
            ..DeviceCaps::default()
        };
        Self::with_device(Box::new(NullDevice::new(caps)), info)
    }

    /// Construct a context over an explicit backend, selected once here
    /// and never per call.
    pub fn with_device(mut device: Box<dyn Device>, info: &ContextInfo) -> Result<Self> {
        let mut caps = device.caps();
        // The tracker's enabled-attribute mask covers MAX_VERTEX_ATTRIBUTES
        // locations; a device advertising more is clamped to that.
        caps.max_vertex_attributes = caps.max_vertex_attributes.min(MAX_VERTEX_ATTRIBUTES);
        let default_fb = device.current_framebuffer();
        let default_sp = device.current_program();

        let force_debug = std::env::var("KILN_DEBUG_OUTPUT").map_or(false, |v| v == "1");
        if (info.debug_output || force_debug) && caps.debug_output {
            device.set_debug_hook(Some(Box::new(route_debug_message)));
        }

        let mut ctx = Self {
            device,
            caps,
            default_fb,
            default_sp,
            shaders: Pool::default(),
            textures: Pool::default(),
            vertex_buffers: Pool::default(),
            index_buffers: Pool::default(),
            const_buffers: Pool::default(),
            render_targets: Pool::default(),
            vertex_layouts: Pool::default(),
            layout_cache: FxHashMap::default(),
            state: DeviceState::new(),
        };
        ctx.reset_states();
        Ok(ctx)
    }

    /// Push the full tracked state block to the device unconditionally.
    fn reset_states(&mut self) {
        let block = self.state.state_block;
        self.device.apply_depth_state(&block.depth);
        self.device.apply_stencil_state(&block.stencil);
        self.device.apply_rasterization_state(&block.rasterization);
        self.device.apply_blending_state(&block.blending);
    }

    pub fn caps(&self) -> DeviceCaps {
        self.caps
    }

    /// Counters for the last completed frame.
    pub fn stats(&self) -> Statistics {
        self.state.last_stats
    }

    pub fn frame_id(&self) -> u32 {
        self.state.frame_id
    }

    pub fn inside_render_pass(&self) -> bool {
        self.state.inside_pass
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.state.dirty
    }

    pub fn current_render_target(&self) -> Option<Handle<RenderTarget>> {
        self.state.render_target
    }

    pub fn shader(&self, handle: Handle<Shader>) -> Result<&Shader> {
        self.shaders
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("shader"))
    }

    pub fn texture(&self, handle: Handle<Texture>) -> Result<&Texture> {
        self.textures
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("texture"))
    }

    pub fn const_buffer(&self, handle: Handle<ConstBuffer>) -> Result<&ConstBuffer> {
        self.const_buffers
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("const buffer"))
    }

    pub fn render_target(&self, handle: Handle<RenderTarget>) -> Result<&RenderTarget> {
        self.render_targets
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("render target"))
    }

    pub fn vertex_layout(&self, handle: Handle<VertexLayout>) -> Result<&VertexLayout> {
        self.vertex_layouts
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("vertex layout"))
    }

    // ------------------------------------------------------------------
    // resource creation
    // ------------------------------------------------------------------

    pub fn make_shader(&mut self, info: &ShaderInfo) -> Result<Handle<Shader>> {
        trace!("make_shader '{}'", info.debug_name);
        let raw = self
            .device
            .create_program(info.vertex_src, info.fragment_src)
            .map_err(|fault| reject("make_shader", fault))?;
        let uniforms = self.device.program_uniforms(&raw);
        let attributes = self.device.program_attributes(&raw);
        Ok(self.shaders.insert(Shader::new(raw, uniforms, attributes)))
    }

    pub fn make_texture(&mut self, info: &TextureInfo) -> Result<Handle<Texture>> {
        trace!("make_texture '{}'", info.debug_name);
        let raw = self
            .device
            .create_texture(info.size, info.format, info.initial_data)
            .map_err(|fault| reject("make_texture", fault))?;
        Ok(self
            .textures
            .insert(Texture::new(raw, info.size, info.format)))
    }

    pub fn make_vertex_buffer(&mut self, info: &BufferInfo) -> Result<Handle<VertexBuffer>> {
        trace!("make_vertex_buffer '{}'", info.debug_name);
        let raw = self
            .device
            .create_buffer(BufferTarget::Array, info.byte_size, info.initial_data)
            .map_err(|fault| reject("make_vertex_buffer", fault))?;
        Ok(self
            .vertex_buffers
            .insert(VertexBuffer::new(raw, info.byte_size)))
    }

    pub fn make_index_buffer(&mut self, info: &IndexBufferInfo) -> Result<Handle<IndexBuffer>> {
        trace!("make_index_buffer '{}'", info.debug_name);
        let raw = self
            .device
            .create_buffer(BufferTarget::ElementArray, info.byte_size, info.initial_data)
            .map_err(|fault| reject("make_index_buffer", fault))?;
        Ok(self
            .index_buffers
            .insert(IndexBuffer::new(raw, info.byte_size, info.index_type)))
    }

    /// Const buffers live on the CPU and are uploaded at draw commit; no
    /// native object is created here.
    pub fn make_const_buffer(&mut self, info: &ConstBufferInfo) -> Result<Handle<ConstBuffer>> {
        if info.byte_size == 0 || info.byte_size as usize % VECTOR_REGISTER_SIZE != 0 {
            return Err(GPUError::DeviceRejected {
                op: "make_const_buffer",
                reason: format!(
                    "byte size {} is not a non-zero multiple of {VECTOR_REGISTER_SIZE}",
                    info.byte_size
                ),
            });
        }
        Ok(self
            .const_buffers
            .insert(ConstBuffer::new(info.byte_size, info.scope)))
    }

    /// Deduplicating layout constructor: equal declarations resolve to the
    /// same handle for the lifetime of the context.
    pub fn make_vertex_layout(&mut self, info: &VertexLayoutInfo) -> Result<Handle<VertexLayout>> {
        let layout = VertexLayout::new(info.attributes, info.bytes_per_vertex);
        let bucket = self
            .layout_cache
            .entry(layout.structural_hash_value())
            .or_default();
        for &existing in bucket.iter() {
            if self
                .vertex_layouts
                .get_ref(existing)
                .is_some_and(|l| l.matches(info.attributes, info.bytes_per_vertex))
            {
                return Ok(existing);
            }
        }
        let handle = self.vertex_layouts.insert(layout);
        bucket.push(handle);
        Ok(handle)
    }

    pub fn make_render_target(&mut self, info: &RenderTargetInfo) -> Result<Handle<RenderTarget>> {
        trace!("make_render_target '{}'", info.debug_name);

        let color_tex = self.resolve_attachment_texture(&info.color, info.size, false)?;
        let depth_tex = self.resolve_attachment_texture(&info.depth, info.size, true)?;

        let color_rb = match info.color {
            AttachmentSource::Renderbuffer(format) => Some(
                self.device
                    .create_renderbuffer(info.size, format)
                    .map_err(|fault| reject("make_render_target", fault))?,
            ),
            _ => None,
        };
        let depth_rb = match info.depth {
            AttachmentSource::Renderbuffer(format) => {
                match self.device.create_renderbuffer(info.size, format) {
                    Ok(raw) => Some(raw),
                    Err(fault) => {
                        if let Some(rb) = color_rb {
                            self.device.delete_renderbuffer(rb);
                        }
                        return Err(reject("make_render_target", fault));
                    }
                }
            }
            _ => None,
        };

        let color_texture = color_tex.and_then(|h| self.textures.get_ref(h)).map(|t| &t.raw);
        let depth_texture = depth_tex.and_then(|h| self.textures.get_ref(h)).map(|t| &t.raw);
        let attachments = FramebufferAttachments {
            color_texture,
            depth_texture,
            color_renderbuffer: color_rb.as_ref(),
            depth_renderbuffer: depth_rb.as_ref(),
        };

        match self.device.create_framebuffer(&attachments) {
            Ok(raw) => Ok(self.render_targets.insert(RenderTarget::new(
                raw, info.size, color_tex, depth_tex, color_rb, depth_rb,
            ))),
            Err(fault) => {
                if let Some(rb) = color_rb {
                    self.device.delete_renderbuffer(rb);
                }
                if let Some(rb) = depth_rb {
                    self.device.delete_renderbuffer(rb);
                }
                Err(reject("make_render_target", fault))
            }
        }
    }

    fn resolve_attachment_texture(
        &self,
        source: &AttachmentSource,
        size: [u32; 2],
        want_depth: bool,
    ) -> Result<Option<Handle<Texture>>> {
        let AttachmentSource::Texture(handle) = source else {
            return Ok(None);
        };
        let texture = self
            .textures
            .get_ref(*handle)
            .ok_or(GPUError::InvalidHandle("texture"))?;
        if texture.size() != size {
            return Err(GPUError::DeviceRejected {
                op: "make_render_target",
                reason: format!(
                    "attachment size {:?} does not match target size {size:?}",
                    texture.size()
                ),
            });
        }
        if texture.format().is_depth_stencil() != want_depth {
            return Err(GPUError::DeviceRejected {
                op: "make_render_target",
                reason: format!("attachment format {:?} unsuitable here", texture.format()),
            });
        }
        Ok(Some(*handle))
    }

    // ------------------------------------------------------------------
    // content updates (one per resource per frame)
    // ------------------------------------------------------------------

    pub fn update_texture(&mut self, handle: Handle<Texture>, pixels: &[u8]) -> Result<()> {
        let frame_id = self.state.frame_id;
        let texture = self
            .textures
            .get_mut_ref(handle)
            .ok_or(GPUError::InvalidHandle("texture"))?;
        let expected = texture.size()[0] as usize
            * texture.size()[1] as usize
            * texture.format().bytes_per_pixel();
        if pixels.len() != expected {
            return Err(GPUError::DeviceRejected {
                op: "update_texture",
                reason: format!("pixel data is {} bytes, expected {expected}", pixels.len()),
            });
        }
        texture.guard.note_update(frame_id, "texture")?;
        let size = texture.size();
        let format = texture.format();
        self.device.update_texture(&texture.raw, size, format, pixels);
        Ok(())
    }

    pub fn update_vertex_buffer(
        &mut self,
        handle: Handle<VertexBuffer>,
        byte_offset: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let frame_id = self.state.frame_id;
        let buffer = self
            .vertex_buffers
            .get_mut_ref(handle)
            .ok_or(GPUError::InvalidHandle("vertex buffer"))?;
        check_buffer_range("update_vertex_buffer", buffer.byte_size(), byte_offset, bytes)?;
        buffer.guard.note_update(frame_id, "vertex buffer")?;
        self.device.update_buffer(&buffer.raw, byte_offset, bytes);
        Ok(())
    }

    pub fn update_index_buffer(
        &mut self,
        handle: Handle<IndexBuffer>,
        byte_offset: u32,
        bytes: &[u8],
    ) -> Result<()> {
        let frame_id = self.state.frame_id;
        let buffer = self
            .index_buffers
            .get_mut_ref(handle)
            .ok_or(GPUError::InvalidHandle("index buffer"))?;
        check_buffer_range("update_index_buffer", buffer.byte_size(), byte_offset, bytes)?;
        buffer.guard.note_update(frame_id, "index buffer")?;
        self.device.update_buffer(&buffer.raw, byte_offset, bytes);
        Ok(())
    }

    /// Replaces the buffer's CPU content and bumps its version; the upload
    /// happens at the next draw commit that needs it.
    pub fn update_const_buffer(&mut self, handle: Handle<ConstBuffer>, bytes: &[u8]) -> Result<()> {
        let frame_id = self.state.frame_id;
        let buffer = self
            .const_buffers
            .get_mut_ref(handle)
            .ok_or(GPUError::InvalidHandle("const buffer"))?;
        if bytes.len() != buffer.byte_size() as usize {
            return Err(GPUError::DeviceRejected {
                op: "update_const_buffer",
                reason: format!(
                    "content is {} bytes, buffer holds {}",
                    bytes.len(),
                    buffer.byte_size()
                ),
            });
        }
        buffer.guard.note_update(frame_id, "const buffer")?;
        buffer.write(bytes);
        // New content on a bound buffer must reach the device at the next
        // commit even though the binding itself did not change.
        let scope = buffer.scope();
        if self.state.cbuffers[scope.index()] == Some(handle) {
            self.state.dirty |= DirtyFlags::cbuffer_bit(scope);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // pass lifecycle
    // ------------------------------------------------------------------

    /// Opens a render pass, implicitly closing any pass still open.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc) -> Result<()> {
        if let Some(handle) = desc.target {
            self.render_targets
                .get_ref(handle)
                .ok_or(GPUError::InvalidHandle("render target"))?;
        }
        if self.state.inside_pass {
            self.end_render_pass()?;
        }
        trace!("begin_render_pass '{}'", desc.debug_name);
        self.state.inside_pass = true;

        self.bind_render_target_raw(desc.target)?;
        self.state.render_area = desc.viewport;
        self.state.store_ops = [desc.color.store, desc.depth.store, desc.stencil.store];

        self.device
            .set_depth_range(desc.depth_range[0], desc.depth_range[1]);
        self.device.set_viewport(desc.viewport);

        let mut mask = ClearMask::empty();
        if desc.color.load == LoadOp::Clear {
            mask |= ClearMask::COLOR;
        }
        if desc.depth.load == LoadOp::Clear {
            mask |= ClearMask::DEPTH;
        }
        if desc.stencil.load == LoadOp::Clear {
            mask |= ClearMask::STENCIL;
        }
        if !mask.is_empty() {
            self.device.clear(&ClearRequest {
                mask,
                color: desc.clear_values.color,
                depth: desc.clear_values.depth,
                stencil: desc.clear_values.stencil,
            });
        }

        self.apply_state_block(&desc.states);
        self.state.stats.render_passes += 1;
        Ok(())
    }

    /// Closes the pass: issues the batched store-op hint, restores the
    /// default render target and clears every per-pass binding record.
    pub fn end_render_pass(&mut self) -> Result<()> {
        if !self.state.inside_pass {
            return Err(ContractViolation::PassNotOpen.into());
        }
        self.state.inside_pass = false;

        let mut discardable: SmallVec<[AttachmentPoint; 3]> = SmallVec::new();
        if self.state.store_ops[0] == StoreOp::Discard {
            discardable.push(AttachmentPoint::Color);
        }
        if self.state.store_ops[1] == StoreOp::Discard {
            discardable.push(AttachmentPoint::Depth);
        }
        if self.state.store_ops[2] == StoreOp::Discard {
            discardable.push(AttachmentPoint::Stencil);
        }
        if !discardable.is_empty() {
            if self.caps.framebuffer_invalidate {
                self.device
                    .invalidate_attachments(&discardable, self.state.render_area);
            } else if self.caps.framebuffer_discard {
                self.device.set_scissor(self.state.render_area);
                self.device.discard_attachments(&discardable);
            } else {
                debug!("attachment discard not supported, skipping hint");
            }
        }

        self.bind_render_target_raw(None)?;
        for location in 0..self.caps.max_vertex_attributes {
            self.device.disable_attribute(location);
        }
        self.device.bind_buffer(BufferTarget::Array, None);
        self.device.bind_buffer(BufferTarget::ElementArray, None);
        self.state.reset_pass_bindings();
        Ok(())
    }

    fn bind_render_target_raw(&mut self, target: Option<Handle<RenderTarget>>) -> Result<()> {
        if self.state.render_target == target {
            return Ok(());
        }
        let raw = match target {
            Some(handle) => {
                &self
                    .render_targets
                    .get_ref(handle)
                    .ok_or(GPUError::InvalidHandle("render target"))?
                    .raw
            }
            None => &self.default_fb,
        };
        self.device.bind_framebuffer(raw);
        self.state.render_target = target;
        Ok(())
    }

    /// Field-by-field diff against the last applied block; unchanged
    /// groups cost no native calls.
    fn apply_state_block(&mut self, block: &StateBlock) {
        if block.depth != self.state.state_block.depth {
            self.device.apply_depth_state(&block.depth);
            self.state.state_block.depth = block.depth;
        }
        if block.stencil != self.state.state_block.stencil {
            self.device.apply_stencil_state(&block.stencil);
            self.state.state_block.stencil = block.stencil;
        }
        if block.rasterization != self.state.state_block.rasterization {
            self.device.apply_rasterization_state(&block.rasterization);
            self.state.state_block.rasterization = block.rasterization;
        }
        if block.blending != self.state.state_block.blending {
            self.device.apply_blending_state(&block.blending);
            self.state.state_block.blending = block.blending;
        }
    }

    // ------------------------------------------------------------------
    // bindings
    // ------------------------------------------------------------------

    pub fn set_shader_program(&mut self, shader: Option<Handle<Shader>>) -> Result<()> {
        if self.state.shader == shader {
            return Ok(());
        }
        let raw = match shader {
            Some(handle) => {
                &self
                    .shaders
                    .get_ref(handle)
                    .ok_or(GPUError::InvalidHandle("shader"))?
                    .raw
            }
            None => &self.default_sp,
        };
        self.device.use_program(raw);
        self.state.record_shader(shader);
        Ok(())
    }

    /// Binds `(buffer, layout)` at `slot` with a byte offset; `None`
    /// clears the slot. Rebinding the identical tuple is free.
    pub fn bind_vertex_buffer(
        &mut self,
        slot: usize,
        binding: Option<(Handle<VertexBuffer>, Handle<VertexLayout>)>,
        offset: u32,
    ) -> Result<()> {
        if slot >= MAX_VERTEX_BUFFERS {
            return Err(ContractViolation::SlotOutOfRange.into());
        }
        let record = match binding {
            Some((buffer, layout)) => {
                self.vertex_buffers
                    .get_ref(buffer)
                    .ok_or(GPUError::InvalidHandle("vertex buffer"))?;
                self.vertex_layouts
                    .get_ref(layout)
                    .ok_or(GPUError::InvalidHandle("vertex layout"))?;
                Some(VertexBinding {
                    buffer,
                    layout,
                    offset,
                })
            }
            None => None,
        };
        self.state.record_vertex_buffer(slot, record);
        Ok(())
    }

    /// Routed by the buffer's own binding scope.
    pub fn bind_const_buffer(&mut self, handle: Handle<ConstBuffer>) -> Result<()> {
        let scope = self
            .const_buffers
            .get_ref(handle)
            .ok_or(GPUError::InvalidHandle("const buffer"))?
            .scope();
        self.state.record_const_buffer(scope, handle);
        Ok(())
    }

    /// Recorded unconditionally; consumed directly at indexed draw time.
    pub fn bind_index_buffer(&mut self, handle: Option<Handle<IndexBuffer>>) -> Result<()> {
        if let Some(handle) = handle {
            self.index_buffers
                .get_ref(handle)
                .ok_or(GPUError::InvalidHandle("index buffer"))?;
        }
        self.state.index_buffer = handle;
        Ok(())
    }

    pub fn bind_textures(&mut self, scope: SamplerScope, block: &SamplerBlock) -> Result<()> {
        for entry in &block.entries {
            self.textures
                .get_ref(entry.texture)
                .ok_or(GPUError::InvalidHandle("texture"))?;
        }
        self.state.record_samplers(scope, block);
        Ok(())
    }

    // ------------------------------------------------------------------
    // draws
    // ------------------------------------------------------------------

    pub fn draw(&mut self, topology: Topology, first: u32, count: u32) -> Result<()> {
        if !self.state.inside_pass {
            return Err(ContractViolation::DrawOutsidePass.into());
        }
        if self.state.shader.is_none() {
            return Err(ContractViolation::MissingShader.into());
        }
        self.commit_changes()?;
        self.device.draw_arrays(topology, first, count);
        self.state.stats.draw_calls += 1;
        Ok(())
    }

    /// The index buffer is rebound on every indexed draw; its binding is
    /// not diffed.
    pub fn draw_indexed(&mut self, topology: Topology, count: u32, byte_offset: u32) -> Result<()> {
        if !self.state.inside_pass {
            return Err(ContractViolation::DrawOutsidePass.into());
        }
        if self.state.shader.is_none() {
            return Err(ContractViolation::MissingShader.into());
        }
        let index_handle = self
            .state
            .index_buffer
            .ok_or(ContractViolation::MissingIndexBuffer)?;
        self.commit_changes()?;

        let index_buffer = self
            .index_buffers
            .get_ref(index_handle)
            .ok_or(GPUError::InvalidHandle("index buffer"))?;
        self.device
            .bind_buffer(BufferTarget::ElementArray, Some(&index_buffer.raw));
        let index_type = index_buffer.index_type();
        self.device
            .draw_elements(topology, count, index_type, byte_offset);
        self.state.stats.draw_calls += 1;
        Ok(())
    }

    /// Flushes dirty binding groups in fixed order: vertex attributes,
    /// const buffers, textures. Leaves the mask fully clear.
    fn commit_changes(&mut self) -> Result<()> {
        if self.state.dirty.is_empty() {
            return Ok(());
        }
        let shader = self.state.shader.ok_or(ContractViolation::MissingShader)?;

        let pipeline = self.state.check_and_clear(DirtyFlags::PIPELINE);
        if self.state.check_and_clear(DirtyFlags::VERTEX_ATTRIBS) || pipeline {
            self.commit_vertex_attributes(shader)?;
        }
        for scope in [BindScope::RenderPass, BindScope::Material, BindScope::DrawCommand] {
            if self.state.check_and_clear(DirtyFlags::cbuffer_bit(scope)) || pipeline {
                self.commit_const_buffer(scope, shader)?;
            }
        }
        let pass_units = self.state.samplers[SamplerScope::RenderPass.index()].len() as u32;
        if self
            .state
            .check_and_clear(DirtyFlags::textures_bit(SamplerScope::RenderPass))
            || pipeline
        {
            self.commit_samplers(SamplerScope::RenderPass, shader, 0)?;
        }
        // A resized pass block shifts the material units, so the material
        // block is re-committed even when its own bindings are clean.
        if self
            .state
            .check_and_clear(DirtyFlags::textures_bit(SamplerScope::Material))
            || pipeline
            || pass_units != self.state.material_first_unit
        {
            self.commit_samplers(SamplerScope::Material, shader, pass_units)?;
        }
        self.state.material_first_unit = pass_units;
        Ok(())
    }

    fn commit_vertex_attributes(&mut self, shader_handle: Handle<Shader>) -> Result<()> {
        let shader = self
            .shaders
            .get_ref(shader_handle)
            .ok_or(GPUError::InvalidHandle("shader"))?;

        let mut enabled: u32 = 0;
        for slot in 0..MAX_VERTEX_BUFFERS {
            let Some(binding) = self.state.vertex_buffers[slot] else {
                continue;
            };
            let buffer = self
                .vertex_buffers
                .get_ref(binding.buffer)
                .ok_or(GPUError::InvalidHandle("vertex buffer"))?;
            let layout = self
                .vertex_layouts
                .get_ref(binding.layout)
                .ok_or(GPUError::InvalidHandle("vertex layout"))?;

            self.device.bind_buffer(BufferTarget::Array, Some(&buffer.raw));
            for attribute in layout.attributes() {
                // Names the program does not declare are skipped: a shader
                // variant may consume a subset of the layout.
                let Some(info) = shader.attribute(&attribute.name) else {
                    continue;
                };
                let rows = u32::from(attribute.rows);
                if info.location + rows > self.caps.max_vertex_attributes {
                    warn!(
                        "attribute '{}' needs locations {}..{}, device tops out at {}",
                        attribute.name,
                        info.location,
                        info.location + rows,
                        self.caps.max_vertex_attributes
                    );
                    continue;
                }
                let base = binding.offset + attribute.byte_offset;
                for row in 0..rows {
                    let location = info.location + row;
                    enabled |= 1 << location;
                    self.device.attribute_pointer(
                        location,
                        u32::from(attribute.columns),
                        attribute.kind,
                        attribute.normalized,
                        layout.bytes_per_vertex(),
                        base + row * attribute.row_size(),
                    );
                }
            }
        }

        let previous = self.state.enabled_attribs;
        for location in 0..self.caps.max_vertex_attributes {
            let bit = 1u32 << location;
            if enabled & bit != 0 && previous & bit == 0 {
                self.device.enable_attribute(location);
            } else if enabled & bit == 0 && previous & bit != 0 {
                self.device.disable_attribute(location);
            }
        }
        self.state.enabled_attribs = enabled;

        self.device.bind_buffer(BufferTarget::Array, None);
        Ok(())
    }

    fn commit_const_buffer(
        &mut self,
        scope: BindScope,
        shader_handle: Handle<Shader>,
    ) -> Result<()> {
        let Some(buffer_handle) = self.state.cbuffers[scope.index()] else {
            return Ok(());
        };
        let shader = self
            .shaders
            .get_ref(shader_handle)
            .ok_or(GPUError::InvalidHandle("shader"))?;
        let Some(block) = shader.scope_block(scope) else {
            return Ok(());
        };
        let buffer = self
            .const_buffers
            .get_ref(buffer_handle)
            .ok_or(GPUError::InvalidHandle("const buffer"))?;

        let upload = ScopeUpload {
            buffer: buffer_handle,
            version: buffer.version(),
        };
        if self.state.uploaded[scope.index()] == Some(upload) {
            return Ok(());
        }
        self.device.upload_vec4_array(block.location, buffer.registers());
        self.state.uploaded[scope.index()] = Some(upload);
        Ok(())
    }

    fn commit_samplers(
        &mut self,
        scope: SamplerScope,
        shader_handle: Handle<Shader>,
        first_unit: u32,
    ) -> Result<()> {
        let shader = self
            .shaders
            .get_ref(shader_handle)
            .ok_or(GPUError::InvalidHandle("shader"))?;
        let block = &self.state.samplers[scope.index()];
        for (index, entry) in block.entries.iter().enumerate() {
            let unit = first_unit + index as u32;
            let Some(info) = shader.uniform(&entry.name) else {
                continue;
            };
            if info.kind != UniformKind::Sampler2D {
                continue;
            }
            let texture = self
                .textures
                .get_ref(entry.texture)
                .ok_or(GPUError::InvalidHandle("texture"))?;
            self.device.bind_texture_unit(unit, Some(&texture.raw));
            self.device.set_sampler_unit(info.location, unit);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // frame boundary
    // ------------------------------------------------------------------

    /// Frame boundary: snapshots statistics and advances the frame id the
    /// content-update contract is keyed on.
    pub fn on_present(&mut self) {
        self.state.on_present();
    }

    /// Swap the surface and advance the frame.
    pub fn present(&mut self, surface: &mut dyn PresentSurface) {
        surface.swap_buffers();
        self.on_present();
    }

    // ------------------------------------------------------------------
    // destruction
    // ------------------------------------------------------------------

    pub fn destroy_shader(&mut self, handle: Handle<Shader>) -> Result<()> {
        if self.state.shader == Some(handle) {
            return Err(GPUError::ResourceInUse("shader"));
        }
        let shader = self
            .shaders
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("shader"))?;
        self.device.delete_program(shader.raw);
        Ok(())
    }

    pub fn destroy_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        let attached = self
            .render_targets
            .iter()
            .any(|rt| rt.color == Some(handle) || rt.depth == Some(handle));
        let sampled = self
            .state
            .samplers
            .iter()
            .any(|block| block.entries.iter().any(|e| e.texture == handle));
        if attached || sampled {
            return Err(GPUError::ResourceInUse("texture"));
        }
        let texture = self
            .textures
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("texture"))?;
        self.device.delete_texture(texture.raw);
        Ok(())
    }

    pub fn destroy_vertex_buffer(&mut self, handle: Handle<VertexBuffer>) -> Result<()> {
        let bound = self
            .state
            .vertex_buffers
            .iter()
            .any(|slot| slot.is_some_and(|b| b.buffer == handle));
        if bound {
            return Err(GPUError::ResourceInUse("vertex buffer"));
        }
        let buffer = self
            .vertex_buffers
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("vertex buffer"))?;
        self.device.delete_buffer(buffer.raw);
        Ok(())
    }

    pub fn destroy_index_buffer(&mut self, handle: Handle<IndexBuffer>) -> Result<()> {
        if self.state.index_buffer == Some(handle) {
            return Err(GPUError::ResourceInUse("index buffer"));
        }
        let buffer = self
            .index_buffers
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("index buffer"))?;
        self.device.delete_buffer(buffer.raw);
        Ok(())
    }

    pub fn destroy_const_buffer(&mut self, handle: Handle<ConstBuffer>) -> Result<()> {
        if self.state.cbuffers.iter().any(|cb| *cb == Some(handle)) {
            return Err(GPUError::ResourceInUse("const buffer"));
        }
        self.const_buffers
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("const buffer"))?;
        Ok(())
    }

    pub fn destroy_render_target(&mut self, handle: Handle<RenderTarget>) -> Result<()> {
        if self.state.render_target == Some(handle) {
            return Err(GPUError::ResourceInUse("render target"));
        }
        let target = self
            .render_targets
            .remove(handle)
            .ok_or(GPUError::InvalidHandle("render target"))?;
        self.device.delete_framebuffer(target.raw);
        if let Some(rb) = target.color_rb {
            self.device.delete_renderbuffer(rb);
        }
        if let Some(rb) = target.depth_rb {
            self.device.delete_renderbuffer(rb);
        }
        Ok(())
    }

    /// Explicitly tear down every owned native object.
    pub fn destroy(mut self) {
        for target in self.render_targets.drain() {
            self.device.delete_framebuffer(target.raw);
            if let Some(rb) = target.color_rb {
                self.device.delete_renderbuffer(rb);
            }
            if let Some(rb) = target.depth_rb {
                self.device.delete_renderbuffer(rb);
            }
        }
        for texture in self.textures.drain() {
            self.device.delete_texture(texture.raw);
        }
        for buffer in self.vertex_buffers.drain() {
            self.device.delete_buffer(buffer.raw);
        }
        for buffer in self.index_buffers.drain() {
            self.device.delete_buffer(buffer.raw);
        }
        for shader in self.shaders.drain() {
            self.device.delete_program(shader.raw);
        }
    }
}

fn check_buffer_range(
    op: &'static str,
    byte_size: u32,
    byte_offset: u32,
    bytes: &[u8],
) -> Result<()> {
    let end = byte_offset as usize + bytes.len();
    if end > byte_size as usize {
        return Err(GPUError::DeviceRejected {
            op,
            reason: format!("write of {} bytes at {byte_offset} exceeds buffer size {byte_size}", bytes.len()),
        });
    }
    Ok(())
}
