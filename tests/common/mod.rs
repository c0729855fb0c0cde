#![allow(dead_code)]

use kiln::gpu::driver::DeviceCaps;
use kiln::gpu::null::{CallLog, NullDevice};
use kiln::utils::Handle;
use kiln::{
    AttributeKind, BufferInfo, Context, ContextInfo, Shader, ShaderInfo, VertexBuffer,
    VertexLayout, VertexLayoutBuilder,
};

/// Vertex stage used across the suite: two attributes, a pass block of two
/// registers and a single-register draw block.
pub const VERTEX_SRC: &str = r"
    attribute vec2 a_position;
    attribute vec4 a_color;
    uniform vec4 u_pass[2];
    uniform vec4 u_draw[1];
    void main() {}
";

/// Fragment stage with one sampler per scope and a material block.
pub const FRAGMENT_SRC: &str = r"
    uniform sampler2D u_env;
    uniform sampler2D u_texture;
    uniform vec4 u_material[1];
    void main() {}
";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Context over a recording device, plus a view into its call log.
pub fn recording_context() -> (Context, CallLog) {
    recording_context_with_caps(DeviceCaps::default())
}

pub fn recording_context_with_caps(caps: DeviceCaps) -> (Context, CallLog) {
    init_logger();
    let device = NullDevice::new(caps);
    let log = device.call_log();
    let ctx =
        Context::with_device(Box::new(device), &ContextInfo::default()).expect("context creation");
    (ctx, log)
}

pub fn make_test_shader(ctx: &mut Context) -> Handle<Shader> {
    ctx.make_shader(&ShaderInfo {
        debug_name: "test shader",
        vertex_src: VERTEX_SRC,
        fragment_src: FRAGMENT_SRC,
    })
    .expect("shader creation")
}

/// Four vertices of interleaved position (2 x f32) and color (4 x u8),
/// 12 bytes per vertex.
pub fn quad_vertex_data() -> Vec<u8> {
    let positions = [
        glam::Vec2::new(-0.5, -0.5),
        glam::Vec2::new(0.5, -0.5),
        glam::Vec2::new(-0.5, 0.5),
        glam::Vec2::new(0.5, 0.5),
    ];
    let mut bytes = Vec::with_capacity(positions.len() * 12);
    for position in positions {
        bytes.extend_from_slice(bytemuck::cast_slice(&position.to_array()));
        bytes.extend_from_slice(&[255, 255, 255, 255]);
    }
    bytes
}

pub fn make_quad_buffer(ctx: &mut Context) -> Handle<VertexBuffer> {
    let data = quad_vertex_data();
    ctx.make_vertex_buffer(&BufferInfo {
        debug_name: "quad",
        byte_size: data.len() as u32,
        initial_data: Some(&data),
    })
    .expect("vertex buffer creation")
}

pub fn make_quad_layout(ctx: &mut Context) -> Handle<VertexLayout> {
    VertexLayoutBuilder::new()
        .attribute("a_position", AttributeKind::F32, 1, 2, false)
        .attribute("a_color", AttributeKind::U8, 1, 4, true)
        .build(ctx)
        .expect("layout creation")
}
