//! Resize notification shared between the window and its subscribers.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

type SizeSource = Rc<dyn Fn() -> (u32, u32)>;

/// Latest framebuffer size plus a "resize happened" flag.
///
/// The window holds one end and notifies it from its event handler; the
/// renderer holds a clone and consumes the flag between frames. Everything
/// runs on the event-loop thread, so the state is `Rc`-shared and not `Send`.
///
/// A signal built with [`ResizeSignal::with_source`] reads the size from the
/// source on every query, so a swapchain rebuilt on an out-of-date error sees
/// the real window size even when no resize event has been delivered yet.
#[derive(Clone)]
pub struct ResizeSignal {
    state: Rc<ResizeState>,
    source: Option<SizeSource>,
}

#[derive(Debug)]
struct ResizeState {
    size: Cell<(u32, u32)>,
    pending: Cell<bool>,
}

impl ResizeSignal {
    /// Creates a signal seeded with the current framebuffer size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Rc::new(ResizeState {
                size: Cell::new((width, height)),
                pending: Cell::new(false),
            }),
            source: None,
        }
    }

    /// Creates a signal whose size is queried from `source` on every read.
    pub fn with_source(source: impl Fn() -> (u32, u32) + 'static) -> Self {
        let (width, height) = source();
        Self {
            source: Some(Rc::new(source)),
            ..Self::new(width, height)
        }
    }

    /// Records a new framebuffer size and raises the flag.
    pub fn notify(&self, width: u32, height: u32) {
        self.state.size.set((width, height));
        self.state.pending.set(true);
    }

    /// Clears the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.state.pending.replace(false)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.state.pending.get()
    }

    /// Current framebuffer size in pixels.
    ///
    /// Queries the live source when there is one, otherwise the last size
    /// passed to [`ResizeSignal::notify`].
    pub fn framebuffer_size(&self) -> (u32, u32) {
        match &self.source {
            Some(source) => source(),
            None => self.state.size.get(),
        }
    }

    /// True while the framebuffer has no area, e.g. the window is minimized.
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }
}

impl fmt::Debug for ResizeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResizeSignal")
            .field("size", &self.framebuffer_size())
            .field("pending", &self.is_pending())
            .field("live", &self.source.is_some())
            .finish()
    }
}
