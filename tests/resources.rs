mod common;

use common::*;
use kiln::gpu::null::NativeCall;
use kiln::{
    AttachmentSource, AttributeKind, BindScope, ConstBufferInfo, ContractViolation, GPUError,
    PixelFormat, RenderTargetInfo, SamplerBlock, SamplerScope, TextureInfo, VertexAttribute,
    VertexLayoutInfo,
};

#[test]
fn one_content_update_per_frame_is_enforced() {
    let (mut ctx, _log) = recording_context();
    let buffer = make_quad_buffer(&mut ctx);

    ctx.update_vertex_buffer(buffer, 0, &[0u8; 12]).unwrap();
    let err = ctx.update_vertex_buffer(buffer, 0, &[0u8; 12]).unwrap_err();
    assert!(matches!(
        err,
        GPUError::ContractViolation(ContractViolation::FrameContract { .. })
    ));

    ctx.on_present();
    ctx.update_vertex_buffer(buffer, 0, &[0u8; 12]).unwrap();
}

#[test]
fn buffer_updates_are_bounds_checked() {
    let (mut ctx, _log) = recording_context();
    let buffer = make_quad_buffer(&mut ctx);

    let err = ctx.update_vertex_buffer(buffer, 44, &[0u8; 8]).unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { op, .. } if op == "update_vertex_buffer"));
}

#[test]
fn texture_updates_require_exact_pixel_size() {
    let (mut ctx, _log) = recording_context();
    let texture = ctx
        .make_texture(&TextureInfo {
            debug_name: "small",
            size: [2, 2],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    let err = ctx.update_texture(texture, &[0u8; 8]).unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { .. }));
    ctx.update_texture(texture, &[0u8; 16]).unwrap();
}

#[test]
fn destroying_a_bound_vertex_buffer_is_refused() {
    let (mut ctx, log) = recording_context();
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);

    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    let err = ctx.destroy_vertex_buffer(buffer).unwrap_err();
    assert!(matches!(err, GPUError::ResourceInUse("vertex buffer")));

    ctx.bind_vertex_buffer(0, None, 0).unwrap();
    ctx.destroy_vertex_buffer(buffer).unwrap();
    assert!(log.contains(|c| matches!(c, NativeCall::DeleteBuffer(_))));
}

#[test]
fn stale_handles_are_rejected() {
    let (mut ctx, _log) = recording_context();
    let buffer = make_quad_buffer(&mut ctx);
    ctx.destroy_vertex_buffer(buffer).unwrap();

    let err = ctx.destroy_vertex_buffer(buffer).unwrap_err();
    assert!(matches!(err, GPUError::InvalidHandle("vertex buffer")));
    let err = ctx.update_vertex_buffer(buffer, 0, &[0u8; 4]).unwrap_err();
    assert!(matches!(err, GPUError::InvalidHandle("vertex buffer")));
}

#[test]
fn destroying_a_sampled_texture_is_refused() {
    let (mut ctx, _log) = recording_context();
    let texture = ctx
        .make_texture(&TextureInfo {
            debug_name: "sampled",
            size: [4, 4],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    ctx.bind_textures(SamplerScope::Material, &SamplerBlock::new().with("u_texture", texture))
        .unwrap();
    let err = ctx.destroy_texture(texture).unwrap_err();
    assert!(matches!(err, GPUError::ResourceInUse("texture")));

    ctx.bind_textures(SamplerScope::Material, &SamplerBlock::new())
        .unwrap();
    ctx.destroy_texture(texture).unwrap();
}

#[test]
fn destroying_an_attached_texture_is_refused() {
    let (mut ctx, _log) = recording_context();
    let color = ctx
        .make_texture(&TextureInfo {
            debug_name: "attachment",
            size: [32, 32],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();
    let target = ctx
        .make_render_target(&RenderTargetInfo {
            debug_name: "offscreen",
            size: [32, 32],
            color: AttachmentSource::Texture(color),
            depth: AttachmentSource::None,
        })
        .unwrap();

    let err = ctx.destroy_texture(color).unwrap_err();
    assert!(matches!(err, GPUError::ResourceInUse("texture")));

    ctx.destroy_render_target(target).unwrap();
    ctx.destroy_texture(color).unwrap();
}

#[test]
fn render_target_attachments_must_match_in_size() {
    let (mut ctx, _log) = recording_context();
    let color = ctx
        .make_texture(&TextureInfo {
            debug_name: "wrong size",
            size: [16, 16],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    let err = ctx
        .make_render_target(&RenderTargetInfo {
            debug_name: "offscreen",
            size: [32, 32],
            color: AttachmentSource::Texture(color),
            depth: AttachmentSource::None,
        })
        .unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { op, .. } if op == "make_render_target"));
}

#[test]
fn depth_attachments_require_a_depth_format() {
    let (mut ctx, _log) = recording_context();
    let color_format = ctx
        .make_texture(&TextureInfo {
            debug_name: "not depth",
            size: [32, 32],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    let err = ctx
        .make_render_target(&RenderTargetInfo {
            debug_name: "offscreen",
            size: [32, 32],
            color: AttachmentSource::None,
            depth: AttachmentSource::Texture(color_format),
        })
        .unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { .. }));
}

#[test]
fn const_buffer_size_must_be_register_aligned() {
    let (mut ctx, _log) = recording_context();

    for byte_size in [0u32, 20] {
        let err = ctx
            .make_const_buffer(&ConstBufferInfo {
                debug_name: "bad",
                byte_size,
                scope: BindScope::DrawCommand,
            })
            .unwrap_err();
        assert!(matches!(err, GPUError::DeviceRejected { .. }));
    }

    ctx.make_const_buffer(&ConstBufferInfo {
        debug_name: "good",
        byte_size: 32,
        scope: BindScope::DrawCommand,
    })
    .unwrap();
}

#[test]
fn layouts_deduplicate_by_structure() {
    let (mut ctx, _log) = recording_context();
    let a = make_quad_layout(&mut ctx);
    let b = make_quad_layout(&mut ctx);
    assert_eq!(a, b);

    // Same attributes, different packing: distinct layout.
    let attributes = [
        VertexAttribute {
            name: "a_position",
            kind: AttributeKind::F32,
            rows: 1,
            columns: 2,
            byte_offset: 4,
            normalized: false,
        },
        VertexAttribute {
            name: "a_color",
            kind: AttributeKind::U8,
            rows: 1,
            columns: 4,
            byte_offset: 12,
            normalized: true,
        },
    ];
    let c = ctx
        .make_vertex_layout(&VertexLayoutInfo {
            attributes: &attributes,
            bytes_per_vertex: 16,
        })
        .unwrap();
    assert_ne!(a, c);
}

#[test]
fn shaders_accept_buffers_with_matching_scope_blocks() {
    let (mut ctx, _log) = recording_context();
    let shader = make_test_shader(&mut ctx);

    let pass_cb = ctx
        .make_const_buffer(&ConstBufferInfo {
            debug_name: "pass",
            byte_size: 32,
            scope: BindScope::RenderPass,
        })
        .unwrap();
    let oversized_pass_cb = ctx
        .make_const_buffer(&ConstBufferInfo {
            debug_name: "pass big",
            byte_size: 64,
            scope: BindScope::RenderPass,
        })
        .unwrap();
    let draw_cb = ctx
        .make_const_buffer(&ConstBufferInfo {
            debug_name: "draw",
            byte_size: 16,
            scope: BindScope::DrawCommand,
        })
        .unwrap();

    let shader = ctx.shader(shader).unwrap();
    assert!(shader.accepts(ctx.const_buffer(pass_cb).unwrap()));
    assert!(!shader.accepts(ctx.const_buffer(oversized_pass_cb).unwrap()));
    assert!(shader.accepts(ctx.const_buffer(draw_cb).unwrap()));
}

#[test]
fn const_buffer_updates_are_limited_to_one_per_frame() {
    let (mut ctx, _log) = recording_context();
    let cb = ctx
        .make_const_buffer(&ConstBufferInfo {
            debug_name: "per frame",
            byte_size: 16,
            scope: BindScope::DrawCommand,
        })
        .unwrap();

    ctx.update_const_buffer(cb, &[1u8; 16]).unwrap();
    let err = ctx.update_const_buffer(cb, &[2u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        GPUError::ContractViolation(ContractViolation::FrameContract {
            resource: "const buffer"
        })
    ));

    ctx.on_present();
    ctx.update_const_buffer(cb, &[2u8; 16]).unwrap();
}

#[test]
fn programs_needing_too_many_attribute_locations_are_rejected() {
    let (mut ctx, _log) = recording_context();
    let mut vertex_src = String::new();
    for i in 0..8 {
        vertex_src.push_str(&format!("attribute mat4 a_model{i};\n"));
    }
    vertex_src.push_str("attribute vec4 a_tint;\nvoid main() {}\n");

    let err = ctx
        .make_shader(&kiln::ShaderInfo {
            debug_name: "too wide",
            vertex_src: &vertex_src,
            fragment_src: FRAGMENT_SRC,
        })
        .unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { op: "make_shader", .. }));
}

#[test]
fn bad_shader_sources_surface_the_device_reason() {
    let (mut ctx, _log) = recording_context();
    let err = ctx
        .make_shader(&kiln::ShaderInfo {
            debug_name: "broken",
            vertex_src: "#error nope\nvoid main() {}",
            fragment_src: FRAGMENT_SRC,
        })
        .unwrap_err();
    assert!(matches!(err, GPUError::DeviceRejected { op: "make_shader", .. }));
    assert!(err.to_string().contains("vertex shader failed to compile"));
}
