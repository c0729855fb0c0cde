mod common;

use common::*;
use kiln::gpu::driver::{BufferTarget, DeviceCaps};
use kiln::gpu::null::NativeCall;
use kiln::{
    AttributeKind, ContextInfo, ContractViolation, GPUError, HeadlessSurface, IndexBufferInfo,
    IndexType, PixelFormat, PresentSurface, Rect2D, RenderPassBuilder, SamplerBlock, SamplerScope,
    ShaderInfo, TextureInfo, Topology,
};
use serial_test::serial;

#[test]
fn colored_quad_end_to_end() {
    let (mut ctx, log) = recording_context();
    let shader = make_test_shader(&mut ctx);
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);

    log.clear();
    RenderPassBuilder::new("main", Rect2D::new(0, 0, 800, 600))
        .clear_color([0.0, 0.0, 0.0, 1.0])
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    ctx.draw(Topology::TriangleStrip, 0, 4).unwrap();
    ctx.end_render_pass().unwrap();

    let mut surface = HeadlessSurface::new([800, 600]);
    assert_eq!(surface.drawable_size(), [800, 600]);
    let frame = ctx.frame_id();
    ctx.present(&mut surface);
    assert_eq!(ctx.frame_id(), frame + 1);

    assert_eq!(ctx.stats().render_passes, 1);
    assert_eq!(ctx.stats().draw_calls, 1);

    // Position at location 0: two floats from byte 0, stride 12.
    assert!(log.contains(|c| matches!(
        c,
        NativeCall::AttributePointer {
            location: 0,
            columns: 2,
            kind: AttributeKind::F32,
            normalized: false,
            stride: 12,
            byte_offset: 0,
        }
    )));
    // Color at location 1: four normalized bytes from byte 8.
    assert!(log.contains(|c| matches!(
        c,
        NativeCall::AttributePointer {
            location: 1,
            columns: 4,
            kind: AttributeKind::U8,
            normalized: true,
            stride: 12,
            byte_offset: 8,
        }
    )));
    assert!(log.contains(|c| matches!(c, NativeCall::EnableAttribute(0))));
    assert!(log.contains(|c| matches!(c, NativeCall::EnableAttribute(1))));
    assert!(log.contains(|c| matches!(
        c,
        NativeCall::DrawArrays {
            topology: Topology::TriangleStrip,
            first: 0,
            count: 4,
        }
    )));
    // A non-indexed scene never touches the element array binding point.
    assert_eq!(
        log.count(|c| matches!(
            c,
            NativeCall::BindBuffer {
                target: BufferTarget::ElementArray,
                id: Some(_)
            }
        )),
        0
    );
}

#[test]
fn indexed_draws_rebind_the_index_buffer_every_time() {
    let (mut ctx, log) = recording_context();
    let shader = make_test_shader(&mut ctx);
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);
    let indices: [u16; 6] = [0, 1, 2, 2, 1, 3];
    let index_buffer = ctx
        .make_index_buffer(&IndexBufferInfo {
            debug_name: "quad indices",
            byte_size: 12,
            index_type: IndexType::U16,
            initial_data: Some(bytemuck::cast_slice(&indices)),
        })
        .unwrap();

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 256, 256))
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    ctx.bind_index_buffer(Some(index_buffer)).unwrap();

    log.clear();
    ctx.draw_indexed(Topology::Triangles, 6, 0).unwrap();
    ctx.draw_indexed(Topology::Triangles, 6, 0).unwrap();

    assert_eq!(
        log.count(|c| matches!(
            c,
            NativeCall::BindBuffer {
                target: BufferTarget::ElementArray,
                id: Some(_)
            }
        )),
        2
    );
    assert_eq!(
        log.count(|c| matches!(
            c,
            NativeCall::DrawElements {
                index: IndexType::U16,
                count: 6,
                ..
            }
        )),
        2
    );
}

#[test]
fn sampler_blocks_commit_to_sequential_units() {
    let (mut ctx, log) = recording_context();
    let shader = make_test_shader(&mut ctx);
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);
    let env = ctx
        .make_texture(&TextureInfo {
            debug_name: "env",
            size: [4, 4],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();
    let albedo = ctx
        .make_texture(&TextureInfo {
            debug_name: "albedo",
            size: [4, 4],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 256, 256))
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    ctx.bind_textures(SamplerScope::RenderPass, &SamplerBlock::new().with("u_env", env))
        .unwrap();
    ctx.bind_textures(
        SamplerScope::Material,
        &SamplerBlock::new().with("u_texture", albedo),
    )
    .unwrap();

    log.clear();
    ctx.draw(Topology::TriangleStrip, 0, 4).unwrap();

    // Pass block occupies unit 0, material units follow after it.
    assert!(log.contains(|c| matches!(c, NativeCall::BindTextureUnit { unit: 0, id: Some(_) })));
    assert!(log.contains(|c| matches!(c, NativeCall::SetSamplerUnit { unit: 0, .. })));
    assert!(log.contains(|c| matches!(c, NativeCall::BindTextureUnit { unit: 1, id: Some(_) })));
    assert!(log.contains(|c| matches!(c, NativeCall::SetSamplerUnit { unit: 1, .. })));
}

#[test]
fn material_units_follow_a_resized_pass_block() {
    let (mut ctx, log) = recording_context();
    let shader = ctx
        .make_shader(&ShaderInfo {
            debug_name: "three samplers",
            vertex_src: "attribute vec2 a_position;\nvoid main() {}",
            fragment_src: r"
                uniform sampler2D u_env;
                uniform sampler2D u_shadow;
                uniform sampler2D u_albedo;
                void main() {}
            ",
        })
        .unwrap();
    let mut textures = Vec::new();
    for name in ["env", "shadow", "albedo"] {
        textures.push(
            ctx.make_texture(&TextureInfo {
                debug_name: name,
                size: [4, 4],
                format: PixelFormat::RGBA8,
                initial_data: None,
            })
            .unwrap(),
        );
    }
    let (env, shadow, albedo) = (textures[0], textures[1], textures[2]);

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 256, 256))
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    ctx.bind_textures(SamplerScope::RenderPass, &SamplerBlock::new().with("u_env", env))
        .unwrap();
    ctx.bind_textures(
        SamplerScope::Material,
        &SamplerBlock::new().with("u_albedo", albedo),
    )
    .unwrap();
    ctx.draw(Topology::TriangleStrip, 0, 4).unwrap();
    // One pass unit, material right after it: u_albedo reflects at
    // location 2 and lands on unit 1.
    assert!(log.contains(|c| matches!(c, NativeCall::SetSamplerUnit { location: 2, unit: 1 })));

    // Growing the pass block pushes the material units up; the material
    // block must be re-committed even though it did not change itself.
    ctx.bind_textures(
        SamplerScope::RenderPass,
        &SamplerBlock::new().with("u_env", env).with("u_shadow", shadow),
    )
    .unwrap();
    log.clear();
    ctx.draw(Topology::TriangleStrip, 0, 4).unwrap();

    assert!(log.contains(|c| matches!(c, NativeCall::SetSamplerUnit { location: 1, unit: 1 })));
    assert!(log.contains(|c| matches!(c, NativeCall::BindTextureUnit { unit: 2, id: Some(_) })));
    assert!(log.contains(|c| matches!(c, NativeCall::SetSamplerUnit { location: 2, unit: 2 })));
}

#[test]
fn sampler_names_the_program_lacks_are_skipped() {
    let (mut ctx, log) = recording_context();
    let shader = make_test_shader(&mut ctx);
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);
    let texture = ctx
        .make_texture(&TextureInfo {
            debug_name: "unused",
            size: [4, 4],
            format: PixelFormat::RGBA8,
            initial_data: None,
        })
        .unwrap();

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 256, 256))
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    ctx.bind_textures(
        SamplerScope::Material,
        &SamplerBlock::new().with("u_nonexistent", texture),
    )
    .unwrap();

    log.clear();
    ctx.draw(Topology::TriangleStrip, 0, 4).unwrap();
    assert_eq!(
        log.count(|c| matches!(c, NativeCall::BindTextureUnit { .. })),
        0
    );
}

#[test]
fn device_caps_are_clamped_to_the_tracked_attribute_range() {
    let caps = DeviceCaps {
        max_vertex_attributes: 64,
        ..Default::default()
    };
    let (ctx, _log) = recording_context_with_caps(caps);
    assert_eq!(ctx.caps().max_vertex_attributes, kiln::MAX_VERTEX_ATTRIBUTES);
}

#[test]
fn draws_outside_a_pass_are_refused() {
    let (mut ctx, _log) = recording_context();
    let err = ctx.draw(Topology::Triangles, 0, 3).unwrap_err();
    assert!(matches!(
        err,
        GPUError::ContractViolation(ContractViolation::DrawOutsidePass)
    ));
}

#[test]
fn draws_need_a_bound_shader() {
    let (mut ctx, _log) = recording_context();
    let buffer = make_quad_buffer(&mut ctx);
    let layout = make_quad_layout(&mut ctx);

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 64, 64))
        .begin(&mut ctx)
        .unwrap();
    ctx.bind_vertex_buffer(0, Some((buffer, layout)), 0).unwrap();
    let err = ctx.draw(Topology::TriangleStrip, 0, 4).unwrap_err();
    assert!(matches!(
        err,
        GPUError::ContractViolation(ContractViolation::MissingShader)
    ));
}

#[test]
fn indexed_draws_need_an_index_buffer() {
    let (mut ctx, _log) = recording_context();
    let shader = make_test_shader(&mut ctx);

    RenderPassBuilder::new("main", Rect2D::new(0, 0, 64, 64))
        .begin(&mut ctx)
        .unwrap();
    ctx.set_shader_program(Some(shader)).unwrap();
    let err = ctx.draw_indexed(Topology::Triangles, 3, 0).unwrap_err();
    assert!(matches!(
        err,
        GPUError::ContractViolation(ContractViolation::MissingIndexBuffer)
    ));
}

#[test]
#[serial]
fn debug_output_env_var_enables_diagnostics() {
    std::env::set_var("KILN_DEBUG_OUTPUT", "1");
    let (ctx, _log) = recording_context();
    assert!(ctx.caps().debug_output);
    std::env::remove_var("KILN_DEBUG_OUTPUT");

    // Explicit opt-in takes the same path without the env var.
    init_logger();
    let device = kiln::gpu::null::NullDevice::default();
    let info = ContextInfo {
        debug_output: true,
        ..Default::default()
    };
    kiln::Context::with_device(Box::new(device), &info).unwrap();
}
