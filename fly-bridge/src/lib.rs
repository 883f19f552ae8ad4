//! flydrop bridge: async, strongly-typed access to the callback-driven native core.
//! The native core is injected (`NativeCore`); the bridge owns correlation, decoding and lifecycle.

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod messages;
pub mod naming;
pub mod native;
pub mod slot;

pub use api::{ApiError, ApiResponse, Command, Query};
pub use bridge::Bridge;
pub use codec::Codec;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use lifecycle::LifecycleState;
pub use lock::{InstanceLock, LockError, LockScope};
pub use naming::{wire_name, NamingPolicy};
pub use native::{
    callback_handle, is_same_callback, Callback, CallbackHandle, EntryPoint, NativeCore,
    NativeError,
};
pub use sink::{EventHandler, EventStats};
pub use slot::{completion_slot, Awaiter, Fulfiller, SlotError};

// Host-side adapters for concrete natives.
pub mod ffi;
pub mod loopback;

mod bridge;
mod gateway;
mod sink;
mod wire_de;
mod wire_ser;
