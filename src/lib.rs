//! Stateful graphics device abstraction with handle-based resources.
//!
//! A [`Context`] owns every GPU resource behind typed [`utils::Handle`]s and
//! tracks the full binding state on the CPU. Bind calls only record intent;
//! the tracker diffs them against what the device last saw and a draw call
//! flushes just the groups that actually changed. Render passes bound the
//! drawing and carry load/store semantics so tile-based hardware can skip
//! useless attachment traffic.
//!
//! All context operations belong to a single render thread. The backend is
//! chosen once at creation through the [`gpu::driver::Device`] trait; the
//! built-in recording device keeps the whole crate testable without a
//! native graphics API.

pub mod gpu;
pub mod utils;

pub use gpu::*;
pub use utils::{Handle, Pool};
