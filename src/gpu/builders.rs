//! Fluent builders over the raw `*Info`/desc structs.

use crate::utils::Handle;

use super::context::Context;
use super::error::Result;
use super::resources::{RenderTarget, VertexLayout};
use super::structs::{
    AttachmentOps, AttributeKind, ClearValues, Rect2D, RenderPassDesc, StateBlock, VertexAttribute,
    VertexLayoutInfo,
};

/// Builds a [`RenderPassDesc`] incrementally.
///
/// Defaults match `RenderPassDesc::default()`: default framebuffer, color
/// stored, depth and stencil discarded.
#[derive(Default)]
pub struct RenderPassBuilder<'a> {
    desc: RenderPassDesc<'a>,
}

impl<'a> RenderPassBuilder<'a> {
    pub fn new(debug_name: &'a str, viewport: Rect2D) -> Self {
        Self {
            desc: RenderPassDesc {
                debug_name,
                viewport,
                ..Default::default()
            },
        }
    }

    pub fn target(mut self, target: Handle<RenderTarget>) -> Self {
        self.desc.target = Some(target);
        self
    }

    pub fn depth_range(mut self, near: f32, far: f32) -> Self {
        self.desc.depth_range = [near, far];
        self
    }

    pub fn color_ops(mut self, ops: AttachmentOps) -> Self {
        self.desc.color = ops;
        self
    }

    pub fn depth_ops(mut self, ops: AttachmentOps) -> Self {
        self.desc.depth = ops;
        self
    }

    pub fn stencil_ops(mut self, ops: AttachmentOps) -> Self {
        self.desc.stencil = ops;
        self
    }

    pub fn clear_values(mut self, values: ClearValues) -> Self {
        self.desc.clear_values = values;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.desc.color = AttachmentOps::CLEAR_STORE;
        self.desc.clear_values.color = color;
        self
    }

    pub fn states(mut self, states: StateBlock) -> Self {
        self.desc.states = states;
        self
    }

    pub fn build(self) -> RenderPassDesc<'a> {
        self.desc
    }

    /// Build the desc and open the pass in one step.
    pub fn begin(self, ctx: &mut Context) -> Result<()> {
        ctx.begin_render_pass(&self.desc)
    }
}

/// Accumulates a vertex layout declaration, packing attributes back to back
/// and deriving the stride, then resolves it through the context's
/// deduplicating cache.
#[derive(Default)]
pub struct VertexLayoutBuilder<'a> {
    attributes: Vec<VertexAttribute<'a>>,
    cursor: u32,
    stride_override: Option<u32>,
}

impl<'a> VertexLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attribute at the current byte cursor.
    pub fn attribute(
        mut self,
        name: &'a str,
        kind: AttributeKind,
        rows: u8,
        columns: u8,
        normalized: bool,
    ) -> Self {
        self.attributes.push(VertexAttribute {
            name,
            kind,
            rows,
            columns,
            byte_offset: self.cursor,
            normalized,
        });
        self.cursor += u32::from(rows) * u32::from(columns) * kind.byte_size();
        self
    }

    /// Force the stride instead of deriving it from the packed attributes.
    pub fn bytes_per_vertex(mut self, stride: u32) -> Self {
        self.stride_override = Some(stride);
        self
    }

    pub fn build(self, ctx: &mut Context) -> Result<Handle<VertexLayout>> {
        ctx.make_vertex_layout(&VertexLayoutInfo {
            attributes: &self.attributes,
            bytes_per_vertex: self.stride_override.unwrap_or(self.cursor),
        })
    }
}
