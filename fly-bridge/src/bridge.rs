//! Host-facing bridge: initialization handshake, typed calls, disposal.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;

use crate::api::{ApiResponse, Command, Query};
use crate::codec::Codec;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::gateway::Gateway;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::lock::InstanceLock;
use crate::native::{callback_handle, Callback, EntryPoint, NativeCore};
use crate::sink::{spawn_sink, EventHandler, EventStats, SinkHandle};
use crate::slot::{completion_slot, SlotError};

/// A live connection to the native core.
///
/// Built only through [`Bridge::initialize`], which returns once the native core has signalled
/// ready. Queries and commands may run concurrently from any number of tasks. Disposal (explicit
/// or on drop) releases the exclusive lock; later calls fail with [`BridgeError::Disposed`].
pub struct Bridge<N: NativeCore> {
    gateway: Gateway<N>,
    lifecycle: Arc<Lifecycle>,
    directory: PathBuf,
    lock: Mutex<Option<InstanceLock>>,
    sink: SinkHandle,
}

impl<N: NativeCore> Bridge<N> {
    /// Register the event sink, call the native initialize entry point and wait for its ready
    /// callback. The ready payload is the directory the native core settled on.
    ///
    /// Must run inside a tokio runtime: the event dispatcher is spawned on it.
    pub async fn initialize<E, H>(
        native: N,
        directory: impl AsRef<Path>,
        handler: H,
        config: &BridgeConfig,
    ) -> Result<Self, BridgeError>
    where
        E: DeserializeOwned + Send + 'static,
        H: EventHandler<E>,
    {
        let directory = directory.as_ref();
        let directory_str = directory
            .to_str()
            .ok_or_else(|| BridgeError::NonUtf8Directory(directory.to_path_buf()))?;
        let lifecycle = Arc::new(Lifecycle::new());
        let lock = InstanceLock::acquire(config.lock_scope, directory)?;
        lifecycle.begin()?;

        let codec = Codec::new(config.naming);
        let (on_event, sink) = spawn_sink::<E, H>(codec, lifecycle.clone(), handler);

        let (ready_tx, ready_rx) = completion_slot::<String>();
        let on_ready: Callback = Arc::new(move |payload: String| {
            if let Err(e) = ready_tx.fulfill(payload) {
                tracing::warn!("ignoring extra native ready signal: {e}");
            }
        });

        let ready_handle = callback_handle(&on_ready);

        let abort = |err: BridgeError| {
            let _ = lifecycle.dispose();
            sink.stop();
            err
        };

        tracing::debug!(directory = %directory.display(), "initializing native core");
        let native = Arc::new(native);
        if let Err(e) = native.initialize(directory_str, on_event, on_ready) {
            tracing::error!(error = %e, "native initialize rejected");
            lock.release();
            return Err(abort(BridgeError::Native(e)));
        }

        let limit = config.ready_timeout();
        let ready_path = match ready_rx.wait_timeout(limit).await {
            Ok(path) => path,
            Err(SlotError::TimedOut(limit)) => {
                tracing::error!(?limit, "native core never signalled ready");
                native.release(&ready_handle);
                lock.release();
                return Err(abort(BridgeError::ReadyTimeout(limit)));
            }
            Err(e) => {
                tracing::error!(error = %e, "native core dropped its ready callback");
                lock.release();
                return Err(abort(BridgeError::Slot(e)));
            }
        };
        if let Err(e) = lifecycle.mark_ready() {
            lock.release();
            return Err(abort(e));
        }
        tracing::info!(directory = %ready_path, "native core ready");

        Ok(Self {
            gateway: Gateway::new(native, codec, config.call_timeout()),
            lifecycle,
            directory: PathBuf::from(ready_path),
            lock: Mutex::new(Some(lock)),
            sink,
        })
    }

    /// Issue a read-only request.
    pub async fn query<Q: Query>(&self, request: &Q) -> Result<ApiResponse<Q::Response>, BridgeError> {
        self.lifecycle.ensure_ready()?;
        self.gateway.call(EntryPoint::Query, request).await
    }

    /// Issue a mutating request.
    pub async fn command<C: Command>(
        &self,
        request: &C,
    ) -> Result<ApiResponse<C::Response>, BridgeError> {
        self.lifecycle.ensure_ready()?;
        self.gateway.call(EntryPoint::Command, request).await
    }

    /// Release the exclusive lock and stop event delivery. A second call fails with
    /// [`BridgeError::Disposed`].
    pub fn dispose(&self) -> Result<(), BridgeError> {
        self.lifecycle.dispose()?;
        self.sink.stop();
        let lock = self
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(lock) = lock {
            lock.release();
        }
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Directory reported by the native ready callback.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn event_stats(&self) -> EventStats {
        self.sink.stats()
    }
}

impl<N: NativeCore> Drop for Bridge<N> {
    fn drop(&mut self) {
        if !self.lifecycle.is_disposed() {
            let _ = self.dispose();
        }
    }
}
