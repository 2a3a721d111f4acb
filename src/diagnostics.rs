//! Engine error hook
//!
//! The engine reports module-level conditions (malformed input, recoverable
//! spec violations) as `(message, is_severe)` notifications. A host may
//! install one process-wide handler to observe them. The handler's return
//! value is advisory: `true` means "continue", and the engine does not
//! abort on `false` either. Nothing in this crate depends on it for
//! correctness.

use std::sync::Arc;

use parking_lot::RwLock;

/// Host callback for engine notifications
pub type ErrorHandler = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

static HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);

/// Install `handler`, replacing any previous one
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&str, bool) -> bool + Send + Sync + 'static,
{
    *HANDLER.write() = Some(Arc::new(handler));
}

pub fn clear_error_handler() {
    *HANDLER.write() = None;
}

pub fn has_error_handler() -> bool {
    HANDLER.read().is_some()
}

/// Deliver an engine notification
///
/// Without a handler the message is logged and `true` is returned.
pub fn report_native_error(message: &str, is_severe: bool) -> bool {
    // Clone out so the handler may itself install or clear handlers
    let handler = HANDLER.read().clone();
    match handler {
        Some(handler) => handler(message, is_severe),
        None => {
            if is_severe {
                tracing::warn!("Native error: {}", message);
            } else {
                tracing::info!("Native notice: {}", message);
            }
            true
        }
    }
}
