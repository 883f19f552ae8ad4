//! Typed call gateway: encode, invoke native, decode in the callback, complete the call's slot.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::api::ApiResponse;
use crate::codec::Codec;
use crate::error::BridgeError;
use crate::native::{callback_handle, Callback, CallbackHandle, EntryPoint, NativeCore};
use crate::slot::{completion_slot, SlotError};

/// Releases a call's callback on the native side once the call stops waiting, however it stops.
struct Pending<'a, N: NativeCore> {
    native: &'a N,
    on_response: CallbackHandle,
}

impl<N: NativeCore> Drop for Pending<'_, N> {
    fn drop(&mut self) {
        self.native.release(&self.on_response);
    }
}

pub(crate) struct Gateway<N> {
    native: Arc<N>,
    codec: Codec,
    call_timeout: Option<Duration>,
}

impl<N: NativeCore> Gateway<N> {
    pub(crate) fn new(native: Arc<N>, codec: Codec, call_timeout: Option<Duration>) -> Self {
        Self {
            native,
            codec,
            call_timeout,
        }
    }

    /// One round trip through `entry`. Every call owns its slot, so concurrent calls need no
    /// shared correlation table.
    pub(crate) async fn call<Req, Res>(
        &self,
        entry: EntryPoint,
        request: &Req,
    ) -> Result<ApiResponse<Res>, BridgeError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Send + 'static,
    {
        let call_id = Uuid::new_v4();
        let raw = self.codec.encode(request).map_err(|e| {
            tracing::warn!(%call_id, %entry, error = %e, "request encoding failed");
            BridgeError::Encode(e)
        })?;

        let (fulfiller, awaiter) = completion_slot::<Result<ApiResponse<Res>, BridgeError>>();
        let codec = self.codec;
        let on_response: Callback = Arc::new(move |payload: String| {
            let decoded = codec
                .decode::<ApiResponse<Res>>(&payload)
                .map_err(|e| {
                    tracing::warn!(%call_id, %entry, payload = %payload, error = %e, "failed to decode native response");
                    BridgeError::decode::<ApiResponse<Res>>(e)
                });
            if let Err(e) = fulfiller.fulfill(decoded) {
                tracing::warn!(%call_id, %entry, payload = %payload, "ignoring extra native response: {e}");
            }
        });

        let handle = callback_handle(&on_response);
        tracing::debug!(%call_id, %entry, request = %raw, "dispatching native call");
        let dispatched = match entry {
            EntryPoint::Query => self.native.query(raw, on_response),
            EntryPoint::Command => self.native.command(raw, on_response),
            EntryPoint::Initialize => {
                return Err(BridgeError::Native(crate::native::NativeError::new(
                    entry,
                    "initialize is not a call entry point",
                )))
            }
        };
        if let Err(e) = dispatched {
            tracing::error!(%call_id, %entry, error = %e, "native entry point rejected call");
            return Err(BridgeError::Native(e));
        }
        let _pending = Pending {
            native: self.native.as_ref(),
            on_response: handle,
        };

        let outcome = match self.call_timeout {
            Some(limit) => awaiter.wait_timeout(limit).await,
            None => awaiter.wait().await,
        };
        match outcome {
            Ok(result) => result,
            Err(SlotError::TimedOut(limit)) => {
                tracing::warn!(%call_id, %entry, ?limit, "native call timed out");
                Err(BridgeError::CallTimeout(limit))
            }
            Err(e) => {
                tracing::warn!(%call_id, %entry, error = %e, "native call never completed");
                Err(BridgeError::Slot(e))
            }
        }
    }
}
