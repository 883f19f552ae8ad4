//! C ABI adapter: drives a native core exposed as three `extern "C"` entry points.
//!
//! Callback contexts handed to C are opaque tokens, not pointers. A token resolves through a
//! process-wide registry; one-shot tokens are removed on first use or when the bridge stops
//! waiting on them, so a native that calls a response callback twice, or too late, hits a
//! retired token (logged, ignored) instead of freed memory.

use std::collections::HashMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::native::{is_same_callback, Callback, CallbackHandle, EntryPoint, NativeCore, NativeError};

/// Version of the callback ABI below.
pub const ABI_VERSION: u8 = 1;

/// Exported so hosts linking the staticlib can check the callback ABI they were built against.
#[no_mangle]
pub extern "C" fn fly_bridge_abi_version() -> u8 {
    ABI_VERSION
}

/// `cb(ctx, payload)`: payload is a NUL-terminated UTF-8 JSON string owned by the caller.
pub type RawCallback = extern "C" fn(ctx: *mut c_void, payload: *const c_char);

pub type RawInitialize = unsafe extern "C" fn(
    directory: *const c_char,
    on_event: RawCallback,
    event_ctx: *mut c_void,
    on_ready: RawCallback,
    ready_ctx: *mut c_void,
) -> c_int;

pub type RawCall =
    unsafe extern "C" fn(request: *const c_char, on_response: RawCallback, ctx: *mut c_void) -> c_int;

/// Entry points of the native library. Return 0 when the call was accepted.
#[derive(Clone, Copy)]
pub struct NativeVTable {
    pub initialize: RawInitialize,
    pub query: RawCall,
    pub command: RawCall,
}

struct Registration {
    callback: Callback,
    persistent: bool,
}

fn registry() -> &'static Mutex<HashMap<usize, Registration>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Registration>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

fn register(callback: Callback, persistent: bool) -> usize {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(
            token,
            Registration {
                callback,
                persistent,
            },
        );
    token
}

fn retire(token: usize) {
    registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(&token);
}

/// Drop the one-shot registration of `callback`, if it is still pending.
fn forget(callback: &CallbackHandle) {
    let released: Vec<Registration> = {
        let mut map = registry()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tokens: Vec<usize> = map
            .iter()
            .filter(|(_, r)| !r.persistent && is_same_callback(&r.callback, callback))
            .map(|(token, _)| *token)
            .collect();
        tokens.into_iter().filter_map(|t| map.remove(&t)).collect()
    };
    if !released.is_empty() {
        tracing::debug!(count = released.len(), "retired unanswered native callback");
    }
}

fn resolve(token: usize) -> Option<Callback> {
    let mut map = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    match map.get(&token) {
        Some(r) if r.persistent => Some(r.callback.clone()),
        Some(_) => map.remove(&token).map(|r| r.callback),
        None => None,
    }
}

extern "C" fn trampoline(ctx: *mut c_void, payload: *const c_char) {
    let token = ctx as usize;
    let Some(callback) = resolve(token) else {
        tracing::warn!(token, "native invoked a retired callback; ignoring");
        return;
    };
    if payload.is_null() {
        tracing::warn!(token, "native passed a null payload; dropping callback");
        return;
    }
    let raw = unsafe { CStr::from_ptr(payload) };
    let payload = match raw.to_str() {
        Ok(s) => s.to_owned(),
        Err(e) => {
            tracing::warn!(
                token,
                payload = %raw.to_string_lossy(),
                error = %e,
                "native payload is not UTF-8; dropping callback"
            );
            return;
        }
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
        tracing::error!(token, "bridge callback panicked");
    }
}

fn c_string(entry: EntryPoint, s: &str) -> Result<CString, NativeError> {
    CString::new(s).map_err(|_| NativeError::new(entry, "payload contains NUL"))
}

/// [`NativeCore`] over a C vtable.
pub struct FfiCore {
    vtable: NativeVTable,
    event_token: Mutex<Option<usize>>,
}

impl FfiCore {
    /// # Safety
    /// Every function pointer in `vtable` must stay callable for the lifetime of the returned
    /// value, and must honor the callback contract: the payload pointer is valid for the
    /// duration of the callback only.
    pub unsafe fn new(vtable: NativeVTable) -> Self {
        Self {
            vtable,
            event_token: Mutex::new(None),
        }
    }

    fn call(&self, entry: EntryPoint, f: RawCall, request: String, cb: Callback) -> Result<(), NativeError> {
        let request = c_string(entry, &request)?;
        let token = register(cb, false);
        let rc = unsafe { f(request.as_ptr(), trampoline, token as *mut c_void) };
        if rc != 0 {
            retire(token);
            return Err(NativeError::new(entry, "native returned an error code").with_code(rc));
        }
        Ok(())
    }
}

impl NativeCore for FfiCore {
    fn initialize(
        &self,
        directory: &str,
        on_event: Callback,
        on_ready: Callback,
    ) -> Result<(), NativeError> {
        let mut event_token = self
            .event_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if event_token.is_some() {
            return Err(NativeError::new(EntryPoint::Initialize, "already initialized"));
        }
        let directory = c_string(EntryPoint::Initialize, directory)?;
        let events = register(on_event, true);
        let ready = register(on_ready, false);
        let rc = unsafe {
            (self.vtable.initialize)(
                directory.as_ptr(),
                trampoline,
                events as *mut c_void,
                trampoline,
                ready as *mut c_void,
            )
        };
        if rc != 0 {
            retire(events);
            retire(ready);
            return Err(
                NativeError::new(EntryPoint::Initialize, "native returned an error code").with_code(rc),
            );
        }
        *event_token = Some(events);
        Ok(())
    }

    fn query(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        self.call(EntryPoint::Query, self.vtable.query, request, on_response)
    }

    fn command(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        self.call(EntryPoint::Command, self.vtable.command, request, on_response)
    }

    fn release(&self, callback: &CallbackHandle) {
        forget(callback);
    }
}

impl Drop for FfiCore {
    fn drop(&mut self) {
        let token = self
            .event_token
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(token) = token {
            retire(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc};
    use std::time::Duration;

    fn recorder() -> (Callback, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let cb: Callback = Arc::new(move |s| {
            let _ = tx.lock().unwrap().send(s);
        });
        (cb, rx)
    }

    fn invoke(cb: RawCallback, ctx: usize, payload: &str) {
        let payload = CString::new(payload).unwrap();
        cb(ctx as *mut c_void, payload.as_ptr());
    }

    unsafe extern "C" fn fake_initialize(
        directory: *const c_char,
        on_event: RawCallback,
        event_ctx: *mut c_void,
        on_ready: RawCallback,
        ready_ctx: *mut c_void,
    ) -> c_int {
        let dir = CStr::from_ptr(directory).to_string_lossy().into_owned();
        let (event_ctx, ready_ctx) = (event_ctx as usize, ready_ctx as usize);
        std::thread::spawn(move || {
            invoke(on_event, event_ctx, r#"{"n":1}"#);
            invoke(on_ready, ready_ctx, &dir);
            invoke(on_event, event_ctx, r#"{"n":2}"#);
        });
        0
    }

    /// Echoes the request back, twice, from a native thread.
    unsafe extern "C" fn fake_query(
        request: *const c_char,
        on_response: RawCallback,
        ctx: *mut c_void,
    ) -> c_int {
        let request = CStr::from_ptr(request).to_string_lossy().into_owned();
        let ctx = ctx as usize;
        std::thread::spawn(move || {
            invoke(on_response, ctx, &request);
            invoke(on_response, ctx, "again");
        });
        0
    }

    unsafe extern "C" fn fake_command(
        _request: *const c_char,
        _on_response: RawCallback,
        _ctx: *mut c_void,
    ) -> c_int {
        -7
    }

    unsafe extern "C" fn silent_call(
        _request: *const c_char,
        _on_response: RawCallback,
        _ctx: *mut c_void,
    ) -> c_int {
        0
    }

    fn fake_core() -> FfiCore {
        unsafe {
            FfiCore::new(NativeVTable {
                initialize: fake_initialize,
                query: fake_query,
                command: fake_command,
            })
        }
    }

    #[test]
    fn abi_version_is_exported() {
        assert_eq!(fly_bridge_abi_version(), ABI_VERSION);
    }

    #[test]
    fn initialize_routes_events_and_ready() {
        let core = fake_core();
        let (events, events_rx) = recorder();
        let (ready, ready_rx) = recorder();
        core.initialize("/data/fly", events, ready).unwrap();
        let wait = Duration::from_secs(2);
        assert_eq!(ready_rx.recv_timeout(wait).unwrap(), "/data/fly");
        assert_eq!(events_rx.recv_timeout(wait).unwrap(), r#"{"n":1}"#);
        assert_eq!(events_rx.recv_timeout(wait).unwrap(), r#"{"n":2}"#);
        assert!(ready_rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn response_token_is_one_shot() {
        let core = fake_core();
        let (resp, resp_rx) = recorder();
        core.query(r#"{"q":1}"#.into(), resp).unwrap();
        let wait = Duration::from_secs(2);
        assert_eq!(resp_rx.recv_timeout(wait).unwrap(), r#"{"q":1}"#);
        // the second invocation resolved to a retired token and was dropped
        assert!(resp_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn error_code_retires_token() {
        let core = fake_core();
        let (resp, rx) = recorder();
        let err = core.command("{}".into(), resp).unwrap_err();
        assert_eq!(err.code, Some(-7));
        assert_eq!(err.entry, EntryPoint::Command);
        // registry dropped the only other owner of the callback
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn nul_in_request_is_rejected_before_native() {
        let core = fake_core();
        let (resp, _rx) = recorder();
        assert!(core.query("a\0b".into(), resp).is_err());
    }

    #[test]
    fn released_callback_leaves_the_registry() {
        let core = unsafe {
            FfiCore::new(NativeVTable {
                initialize: fake_initialize,
                query: silent_call,
                command: silent_call,
            })
        };
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let (resp, _rx) = recorder();
                let handle = crate::native::callback_handle(&resp);
                core.query("{}".into(), resp).unwrap();
                handle
            })
            .collect();
        assert!(handles.iter().all(|h| h.upgrade().is_some()));
        for h in &handles {
            core.release(h);
        }
        assert!(handles.iter().all(|h| h.upgrade().is_none()));
    }

    #[test]
    fn invalid_utf8_payload_is_dropped() {
        let (resp, rx) = recorder();
        let token = register(resp, false);
        let bytes = b"{\"ok\": \"\xff\"}\0";
        trampoline(token as *mut c_void, bytes.as_ptr() as *const c_char);
        // never delivered, and the one-shot registration went with it
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
    }
}
