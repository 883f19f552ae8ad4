//! Lifecycle guard: `Uninitialized -> Initializing -> Ready`, terminal `Disposed`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Disposed = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Ready,
            _ => LifecycleState::Disposed,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
            LifecycleState::Disposed => "disposed",
        })
    }
}

/// Atomic state cell shared by the bridge, its event sink and in-flight calls.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Uninitialized -> Initializing`.
    pub fn begin(&self) -> Result<(), BridgeError> {
        self.transition(LifecycleState::Uninitialized, LifecycleState::Initializing)
    }

    /// `Initializing -> Ready`.
    pub fn mark_ready(&self) -> Result<(), BridgeError> {
        self.transition(LifecycleState::Initializing, LifecycleState::Ready)
    }

    /// Move to `Disposed` from `Initializing` or `Ready`. Returns the state it left, or
    /// `Disposed` if another caller got there first.
    pub fn dispose(&self) -> Result<LifecycleState, BridgeError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match LifecycleState::from_u8(current) {
                LifecycleState::Disposed => return Err(BridgeError::Disposed),
                LifecycleState::Uninitialized => {
                    return Err(BridgeError::NotReady(LifecycleState::Uninitialized))
                }
                from => {
                    match self.state.compare_exchange(
                        current,
                        LifecycleState::Disposed as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            tracing::debug!(%from, "bridge disposed");
                            return Ok(from);
                        }
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    /// Gate for query/command: only `Ready` passes.
    pub fn ensure_ready(&self) -> Result<(), BridgeError> {
        match self.state() {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Disposed => Err(BridgeError::Disposed),
            other => Err(BridgeError::NotReady(other)),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == LifecycleState::Disposed
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), BridgeError> {
        match self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::debug!(%from, %to, "bridge lifecycle transition");
                Ok(())
            }
            Err(actual) => match LifecycleState::from_u8(actual) {
                LifecycleState::Disposed => Err(BridgeError::Disposed),
                other => Err(BridgeError::NotReady(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let l = Lifecycle::new();
        assert_eq!(l.state(), LifecycleState::Uninitialized);
        assert!(matches!(l.ensure_ready(), Err(BridgeError::NotReady(_))));
        l.begin().unwrap();
        assert_eq!(l.state(), LifecycleState::Initializing);
        l.mark_ready().unwrap();
        l.ensure_ready().unwrap();
        assert_eq!(l.dispose().unwrap(), LifecycleState::Ready);
        assert!(l.is_disposed());
    }

    #[test]
    fn dispose_from_initializing() {
        let l = Lifecycle::new();
        l.begin().unwrap();
        assert_eq!(l.dispose().unwrap(), LifecycleState::Initializing);
        assert!(matches!(l.mark_ready(), Err(BridgeError::Disposed)));
    }

    #[test]
    fn disposed_is_terminal() {
        let l = Lifecycle::new();
        l.begin().unwrap();
        l.mark_ready().unwrap();
        l.dispose().unwrap();
        assert!(matches!(l.dispose(), Err(BridgeError::Disposed)));
        assert!(matches!(l.ensure_ready(), Err(BridgeError::Disposed)));
        assert!(matches!(l.begin(), Err(BridgeError::Disposed)));
    }

    #[test]
    fn cannot_skip_initializing() {
        let l = Lifecycle::new();
        assert!(matches!(
            l.mark_ready(),
            Err(BridgeError::NotReady(LifecycleState::Uninitialized))
        ));
        assert!(l.dispose().is_err());
    }
}
