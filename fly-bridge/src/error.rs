//! Bridge error taxonomy.

use std::time::Duration;

use crate::lifecycle::LifecycleState;
use crate::lock::LockError;
use crate::native::NativeError;
use crate::slot::SlotError;

/// Everything a bridge operation can fail with. Errors stay local to the call that raised them.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The request could not be serialized; the native core was never invoked.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    /// The native entry point refused the call.
    #[error(transparent)]
    Native(#[from] NativeError),
    /// The native payload did not parse as the expected type.
    #[error("failed to decode {target}: {source}")]
    Decode {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("bridge has been disposed")]
    Disposed,
    #[error("bridge is not ready (state: {0})")]
    NotReady(LifecycleState),
    #[error("native core did not signal ready within {0:?}")]
    ReadyTimeout(Duration),
    #[error("native core did not answer within {0:?}")]
    CallTimeout(Duration),
    #[error(transparent)]
    Lock(#[from] LockError),
    /// The native entry points take UTF-8 paths.
    #[error("working directory is not valid UTF-8: {}", .0.display())]
    NonUtf8Directory(std::path::PathBuf),
}

impl BridgeError {
    pub(crate) fn decode<T>(source: serde_json::Error) -> Self {
        BridgeError::Decode {
            target: std::any::type_name::<T>(),
            source,
        }
    }
}
