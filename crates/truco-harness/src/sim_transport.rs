//! Simulated push transport.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use truco_client::{PushChannel, PushTransport, TransportError};
use truco_core::MatchId;

/// Frames buffered per subscriber.
const FRAME_BUFFER: usize = 64;

/// How the hub answers new subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OpenMode {
    #[default]
    Accept,
    Refuse,
    /// Never answer, so the client's connect timeout fires.
    Hang,
}

#[derive(Debug, Default)]
struct Hub {
    subscribers: HashMap<MatchId, Vec<mpsc::Sender<String>>>,
    mode: OpenMode,
    opens: usize,
    /// Opens left unanswered and not yet dropped by the caller.
    hanging: usize,
}

/// In-memory push hub.
///
/// Clones share the hub: a test steers connections through one clone while
/// the runtime subscribes through another.
#[derive(Debug, Clone, Default)]
pub struct SimTransport {
    hub: Arc<Mutex<Hub>>,
}

impl SimTransport {
    /// Hub accepting every subscription.
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        self.hub.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse (`true`) or accept (`false`) subsequent subscriptions.
    pub fn set_refuse(&self, refuse: bool) {
        self.hub().mode = if refuse { OpenMode::Refuse } else { OpenMode::Accept };
    }

    /// Leave subsequent subscriptions unanswered until told otherwise.
    pub fn set_hang(&self, hang: bool) {
        self.hub().mode = if hang { OpenMode::Hang } else { OpenMode::Accept };
    }

    /// Subscriptions attempted so far, refused ones included.
    pub fn open_count(&self) -> usize {
        self.hub().opens
    }

    /// Hung opens the caller still holds. Drops to zero once every timed-out
    /// open has been cancelled.
    pub fn hanging_count(&self) -> usize {
        self.hub().hanging
    }

    /// Live subscribers of `match_id`.
    pub fn subscriber_count(&self, match_id: &MatchId) -> usize {
        let mut hub = self.hub();
        let Some(senders) = hub.subscribers.get_mut(match_id) else {
            return 0;
        };
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    /// Deliver `frame` to every subscriber of `match_id`.
    pub fn broadcast(&self, match_id: &MatchId, frame: String) {
        let mut hub = self.hub();
        let Some(senders) = hub.subscribers.get_mut(match_id) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(%match_id, "subscriber lagging, frame dropped");
                true
            },
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Close every live subscription, as a server restart would.
    pub fn drop_connections(&self) {
        let dropped: usize = self.hub().subscribers.drain().map(|(_, senders)| senders.len()).sum();
        tracing::debug!(dropped, "push connections dropped");
    }

    fn try_open(&self, match_id: MatchId) -> Result<Option<PushChannel>, TransportError> {
        let mut hub = self.hub();
        hub.opens += 1;
        match hub.mode {
            OpenMode::Refuse => Err(TransportError::Connection("connection refused".to_string())),
            OpenMode::Hang => {
                hub.hanging += 1;
                Ok(None)
            },
            OpenMode::Accept => {
                let (tx, rx) = mpsc::channel(FRAME_BUFFER);
                hub.subscribers.entry(match_id).or_default().push(tx);
                Ok(Some(PushChannel::new(rx, None)))
            },
        }
    }
}

/// Held by a hung open; releases its slot in the hub when the open is dropped.
struct Hung(SimTransport);

impl Drop for Hung {
    fn drop(&mut self) {
        let mut hub = self.0.hub();
        hub.hanging = hub.hanging.saturating_sub(1);
    }
}

impl PushTransport for SimTransport {
    async fn open(&self, match_id: MatchId) -> Result<PushChannel, TransportError> {
        match self.try_open(match_id)? {
            Some(channel) => Ok(channel),
            None => {
                let _hung = Hung(self.clone());
                std::future::pending().await
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_only_that_match() {
        let hub = SimTransport::new();
        let mut m1 = hub.open(MatchId::new("M1")).await.unwrap();
        let mut m2 = hub.open(MatchId::new("M2")).await.unwrap();

        hub.broadcast(&MatchId::new("M1"), "hello".into());
        hub.drop_connections();

        assert_eq!(m1.recv().await.as_deref(), Some("hello"));
        assert_eq!(m1.recv().await, None);
        assert_eq!(m2.recv().await, None);
    }

    #[tokio::test]
    async fn refused_open_is_counted() {
        let hub = SimTransport::new();
        hub.set_refuse(true);

        assert!(hub.open(MatchId::new("M1")).await.is_err());
        assert_eq!(hub.open_count(), 1);
        assert_eq!(hub.subscriber_count(&MatchId::new("M1")), 0);
    }

    #[tokio::test]
    async fn hung_open_is_released_when_cancelled() {
        let hub = SimTransport::new();
        hub.set_hang(true);

        let opener = hub.clone();
        let task = tokio::spawn(async move { opener.open(MatchId::new("M1")).await });
        while hub.open_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.hanging_count(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(hub.hanging_count(), 0);
    }

    #[tokio::test]
    async fn dropped_channel_is_pruned() {
        let hub = SimTransport::new();
        let channel = hub.open(MatchId::new("M1")).await.unwrap();
        assert_eq!(hub.subscriber_count(&MatchId::new("M1")), 1);

        drop(channel);
        assert_eq!(hub.subscriber_count(&MatchId::new("M1")), 0);
    }
}
