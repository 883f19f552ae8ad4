//! In-process native core for tests and the reference host.
//!
//! Every callback is invoked from a thread the core spawns itself, the same way a real native
//! engine calls back from threads the bridge does not own.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::native::{Callback, EntryPoint, NativeCore, NativeError};

/// How the core answers one query or command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Call back once with the payload.
    Respond(String),
    /// Call back once after a delay.
    Delayed(Duration, String),
    /// Call back twice (a misbehaving native).
    Twice(String, String),
    /// Drop the callback without calling it.
    Drop,
    /// Refuse the call synchronously with this code.
    Reject(i32),
}

type Responder = dyn Fn(EntryPoint, &str, &Emitter) -> Reply + Send + Sync;

/// Pushes events into whatever event callback the bridge registered.
#[derive(Clone, Default)]
pub struct Emitter {
    on_event: Arc<Mutex<Option<Callback>>>,
}

impl Emitter {
    /// Deliver `payload` on the calling thread. Returns false if nothing is registered yet.
    pub fn emit(&self, payload: impl Into<String>) -> bool {
        let callback = self
            .on_event
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match callback {
            Some(cb) => {
                cb(payload.into());
                true
            }
            None => false,
        }
    }

    fn register(&self, callback: Callback) -> bool {
        let mut slot = self
            .on_event
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(callback);
        true
    }
}

/// Scriptable stand-in for the native core.
pub struct LoopbackCore {
    emitter: Emitter,
    responder: Box<Responder>,
    startup_events: Vec<String>,
    ready_payload: Option<String>,
    ready_delay: Duration,
    withhold_ready: bool,
    withheld: Mutex<Vec<Callback>>,
}

impl LoopbackCore {
    pub fn builder() -> LoopbackBuilder {
        LoopbackBuilder::default()
    }

    /// Handle for pushing events later; take it before the core is moved into a bridge.
    pub fn emitter(&self) -> Emitter {
        self.emitter.clone()
    }

    fn dispatch(&self, entry: EntryPoint, request: String, cb: Callback) -> Result<(), NativeError> {
        match (self.responder)(entry, &request, &self.emitter) {
            Reply::Reject(code) => Err(NativeError::new(entry, "loopback rejected call").with_code(code)),
            Reply::Respond(payload) => {
                thread::spawn(move || cb(payload));
                Ok(())
            }
            Reply::Delayed(delay, payload) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    cb(payload);
                });
                Ok(())
            }
            Reply::Twice(first, second) => {
                thread::spawn(move || {
                    cb(first);
                    cb(second);
                });
                Ok(())
            }
            Reply::Drop => {
                thread::spawn(move || drop(cb));
                Ok(())
            }
        }
    }
}

impl NativeCore for LoopbackCore {
    fn initialize(
        &self,
        directory: &str,
        on_event: Callback,
        on_ready: Callback,
    ) -> Result<(), NativeError> {
        if !self.emitter.register(on_event.clone()) {
            return Err(NativeError::new(EntryPoint::Initialize, "already initialized"));
        }
        if self.withhold_ready {
            self.withheld
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(on_ready);
            return Ok(());
        }
        let startup = self.startup_events.clone();
        let ready = self
            .ready_payload
            .clone()
            .unwrap_or_else(|| directory.to_owned());
        let delay = self.ready_delay;
        thread::spawn(move || {
            for payload in startup {
                on_event(payload);
            }
            thread::sleep(delay);
            on_ready(ready);
        });
        Ok(())
    }

    fn query(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        self.dispatch(EntryPoint::Query, request, on_response)
    }

    fn command(&self, request: String, on_response: Callback) -> Result<(), NativeError> {
        self.dispatch(EntryPoint::Command, request, on_response)
    }
}

pub struct LoopbackBuilder {
    responder: Box<Responder>,
    startup_events: Vec<String>,
    ready_payload: Option<String>,
    ready_delay: Duration,
    withhold_ready: bool,
}

impl Default for LoopbackBuilder {
    fn default() -> Self {
        Self {
            responder: Box::new(|_, _, _| Reply::Drop),
            startup_events: Vec::new(),
            ready_payload: None,
            ready_delay: Duration::ZERO,
            withhold_ready: false,
        }
    }
}

impl LoopbackBuilder {
    pub fn respond<F>(mut self, f: F) -> Self
    where
        F: Fn(EntryPoint, &str, &Emitter) -> Reply + Send + Sync + 'static,
    {
        self.responder = Box::new(f);
        self
    }

    /// Events emitted between initialize and the ready signal.
    pub fn startup_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.startup_events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Ready payload; defaults to the directory passed to initialize.
    pub fn ready_payload(mut self, payload: impl Into<String>) -> Self {
        self.ready_payload = Some(payload.into());
        self
    }

    pub fn ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Keep the ready callback alive but never call it.
    pub fn withhold_ready(mut self) -> Self {
        self.withhold_ready = true;
        self
    }

    pub fn build(self) -> LoopbackCore {
        LoopbackCore {
            emitter: Emitter::default(),
            responder: self.responder,
            startup_events: self.startup_events,
            ready_payload: self.ready_payload,
            ready_delay: self.ready_delay,
            withhold_ready: self.withhold_ready,
            withheld: Mutex::new(Vec::new()),
        }
    }
}
