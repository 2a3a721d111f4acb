//! Native handle ownership
//!
//! [`OwnedHandle`] is the single place where a native handle is released.
//! It guarantees:
//!
//! 1. **Exactly-once release**: the first `release()` forwards to the
//!    engine; later calls are logged as misuse and do nothing.
//! 2. **No use after release**: [`OwnedHandle::get`] returns `None` once
//!    released, so callers short-circuit instead of forwarding a dead handle.
//! 3. **Drop safety net**: a handle that was never released explicitly is
//!    released on drop, with a warning. Explicit release remains the
//!    contract; the net only catches forgotten paths.
//!
//! The released flag is atomic so that owners shared behind `Arc` can be
//! closed through `&self`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::native::{NativeHandle, NativeModule};

/// What kind of engine object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Container,
    Package,
    Stream,
}

impl HandleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleKind::Container => "container",
            HandleKind::Package => "package",
            HandleKind::Stream => "stream",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A native handle plus its liveness flag
pub struct OwnedHandle {
    native: Arc<dyn NativeModule>,
    handle: NativeHandle,
    kind: HandleKind,
    released: AtomicBool,
}

impl OwnedHandle {
    pub fn new(native: Arc<dyn NativeModule>, handle: NativeHandle, kind: HandleKind) -> Self {
        Self {
            native,
            handle,
            kind,
            released: AtomicBool::new(false),
        }
    }

    /// The handle, or `None` once released
    pub fn get(&self) -> Option<NativeHandle> {
        if self.is_released() {
            None
        } else {
            Some(self.handle)
        }
    }

    /// The handle value for logging; never pass it to the engine
    pub fn raw(&self) -> NativeHandle {
        self.handle
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn native(&self) -> &Arc<dyn NativeModule> {
        &self.native
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the handle. Returns `true` if this call released it.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            tracing::error!("Releasing already released {} [ptr:{}]", self.kind, self.handle);
            return false;
        }
        self.forward_release();
        true
    }

    /// Release without reporting misuse when already released
    pub(crate) fn release_quiet(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.forward_release();
        true
    }

    fn forward_release(&self) {
        match self.kind {
            HandleKind::Container | HandleKind::Package => self.native.release_handle(self.handle),
            HandleKind::Stream => self.native.close_stream(self.handle),
        }
    }
}

impl fmt::Debug for OwnedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            tracing::warn!(
                "Releasing {} [ptr:{}] on drop, it was never closed",
                self.kind,
                self.handle
            );
            self.release_quiet();
        }
    }
}
