pub mod driver;
pub mod error;
pub mod null;
pub mod window;

mod builders;
mod context;
mod resources;
mod state;
mod structs;

pub use builders::{RenderPassBuilder, VertexLayoutBuilder};
pub use context::Context;
pub use error::{ContractViolation, GPUError, Result};
pub use resources::{
    ConstBuffer, IndexBuffer, LayoutAttribute, RenderTarget, ScopeBlock, Shader, Texture,
    VertexBuffer, VertexLayout,
};
pub use state::DirtyFlags;
pub use structs::*;
pub use window::{HeadlessSurface, PresentSurface};
