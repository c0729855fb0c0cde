//! Presentation seam between the context and a windowing layer.

use raw_window_handle::RawWindowHandle;

/// A surface the context can present into.
///
/// Windowing is owned by the application; the context only needs a swap
/// call and the drawable size. Implementations backed by a real window
/// should also expose the native handle so a backend can create its
/// surface from it.
pub trait PresentSurface {
    fn drawable_size(&self) -> [u32; 2];

    fn swap_buffers(&mut self);

    fn raw_window_handle(&self) -> Option<RawWindowHandle> {
        None
    }
}

/// Surface with no window behind it; swap is a no-op.
pub struct HeadlessSurface {
    size: [u32; 2],
}

impl HeadlessSurface {
    pub fn new(size: [u32; 2]) -> Self {
        Self { size }
    }
}

impl PresentSurface for HeadlessSurface {
    fn drawable_size(&self) -> [u32; 2] {
        self.size
    }

    fn swap_buffers(&mut self) {}
}
