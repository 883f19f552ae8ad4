//! The native core as an injected capability: three callback-based entry points.

use std::fmt;
use std::sync::{Arc, Weak};

/// Callback handed to the native core. Invoked with a UTF-8 JSON payload, from whatever thread
/// the native core chooses.
pub type Callback = Arc<dyn Fn(String) + Send + Sync>;

/// Identity of a callback already handed to the native core. Holding it keeps the allocation,
/// so the address cannot be reused by a newer callback while the handle lives.
pub type CallbackHandle = Weak<dyn Fn(String) + Send + Sync>;

/// Handle for `callback`, to pass to [`NativeCore::release`] later.
pub fn callback_handle(callback: &Callback) -> CallbackHandle {
    Arc::downgrade(callback)
}

/// Whether `callback` is the one `handle` was taken from.
pub fn is_same_callback(callback: &Callback, handle: &CallbackHandle) -> bool {
    Weak::ptr_eq(&Arc::downgrade(callback), handle)
}

/// Which native entry point a call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Initialize,
    Query,
    Command,
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryPoint::Initialize => "initialize",
            EntryPoint::Query => "query",
            EntryPoint::Command => "command",
        })
    }
}

/// The native core refused a call synchronously.
#[derive(Debug, Clone, thiserror::Error)]
#[error("native {entry} rejected the call (code {code:?}): {message}")]
pub struct NativeError {
    pub entry: EntryPoint,
    pub code: Option<i32>,
    pub message: String,
}

impl NativeError {
    pub fn new(entry: EntryPoint, message: impl Into<String>) -> Self {
        Self {
            entry,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

/// Entry points of the native core.
///
/// `initialize` is called once per bridge instance and keeps `on_event` for its whole lifetime;
/// `on_ready` fires once. `query` and `command` call their own `on_response` once per call; the
/// bridge relies on that per-call callback to correlate responses.
pub trait NativeCore: Send + Sync + 'static {
    fn initialize(
        &self,
        directory: &str,
        on_event: Callback,
        on_ready: Callback,
    ) -> Result<(), NativeError>;

    fn query(&self, request: String, on_response: Callback) -> Result<(), NativeError>;

    fn command(&self, request: String, on_response: Callback) -> Result<(), NativeError>;

    /// The bridge stopped waiting on a one-shot callback (answered, timed out, or the caller
    /// went away). Natives that keep callbacks in a table drop the entry here; a late
    /// invocation must then be ignored. Calling it for an already-used callback is a no-op.
    fn release(&self, _callback: &CallbackHandle) {}
}

impl<T: NativeCore + ?Sized> NativeCore for Arc<T> {
    fn initialize(
        &self,
        directory: &str,
        on_event: Callback,
        on_ready: Callback,
    ) -> Result<(), NativeError> {
        (**self).initialize(directory, on_event, on_ready)
    }

    fn query(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        (**self).query(request, on_response)
    }

    fn command(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        (**self).command(request, on_response)
    }

    fn release(&self, callback: &CallbackHandle) {
        (**self).release(callback)
    }
}
