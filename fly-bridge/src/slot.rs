//! Completion slot: one native callback invocation handed to one awaiting task.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

/// Why a slot did not deliver a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("completion slot abandoned before it was fulfilled")]
    Abandoned,
    #[error("completion slot already fulfilled")]
    AlreadyFulfilled,
    #[error("completion slot retired before it was fulfilled")]
    Retired,
    #[error("completion slot not fulfilled within {0:?}")]
    TimedOut(Duration),
}

/// Create a fresh single-use slot.
pub fn completion_slot<T>() -> (Fulfiller<T>, Awaiter<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Fulfiller {
            tx: Mutex::new(Some(tx)),
        },
        Awaiter { rx },
    )
}

/// Producer half. Lives inside the native callback, so it is fulfilled through `&self`.
pub struct Fulfiller<T> {
    tx: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Fulfiller<T> {
    /// Hand `value` to the awaiter. Never blocks. A second call drops the value.
    pub fn fulfill(&self, value: T) -> Result<(), SlotError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(tx) = tx else {
            tracing::warn!("completion slot fulfilled more than once; dropping value");
            return Err(SlotError::AlreadyFulfilled);
        };
        if tx.send(value).is_err() {
            tracing::debug!("completion slot awaiter retired; dropping value");
            return Err(SlotError::Retired);
        }
        Ok(())
    }
}

/// Consumer half. Reading it consumes the slot.
pub struct Awaiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Awaiter<T> {
    /// Suspend until fulfilled. Resolves to `Abandoned` if the fulfiller is dropped unused.
    pub async fn wait(self) -> Result<T, SlotError> {
        self.rx.await.map_err(|_| SlotError::Abandoned)
    }

    /// Like [`Awaiter::wait`], bounded by `limit`. On timeout the slot is retired and a late
    /// fulfillment is discarded.
    pub async fn wait_timeout(self, limit: Duration) -> Result<T, SlotError> {
        match tokio::time::timeout(limit, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SlotError::Abandoned),
            Err(_) => Err(SlotError::TimedOut(limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fulfilled_value_reaches_awaiter() {
        let (tx, rx) = completion_slot::<u32>();
        tx.fulfill(7).unwrap();
        assert_eq!(rx.wait().await, Ok(7));
    }

    #[tokio::test]
    async fn second_fulfill_is_rejected_and_first_value_wins() {
        let (tx, rx) = completion_slot::<&'static str>();
        tx.fulfill("first").unwrap();
        assert_eq!(tx.fulfill("second"), Err(SlotError::AlreadyFulfilled));
        assert_eq!(rx.wait().await, Ok("first"));
    }

    #[tokio::test]
    async fn dropped_fulfiller_abandons() {
        let (tx, rx) = completion_slot::<u8>();
        drop(tx);
        assert_eq!(rx.wait().await, Err(SlotError::Abandoned));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fulfilled_from_foreign_thread() {
        let (tx, rx) = completion_slot::<String>();
        let tx = Arc::new(tx);
        let remote = tx.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.fulfill("from native".to_owned()).unwrap();
        });
        assert_eq!(rx.wait().await.unwrap(), "from native");
    }

    #[tokio::test]
    async fn timeout_retires_slot() {
        let (tx, rx) = completion_slot::<u8>();
        let limit = Duration::from_millis(10);
        assert_eq!(rx.wait_timeout(limit).await, Err(SlotError::TimedOut(limit)));
        assert_eq!(tx.fulfill(1), Err(SlotError::Retired));
    }
}
