//! Aggregate connection state across the children.
//!
//! Recomputed from the children's flags on lifecycle events; `all-ready`
//! fires once per transition into the fully ready state.

use multiredis_common::ServerInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::connection::ChildConnection;

/// Aggregate connection state of a fan-out client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// At least one child is connected
    pub connected: bool,
    /// Every child is connected
    pub all_connected: bool,
    /// Server info of the first connected child, `None` when no child is connected
    pub server_info: Option<ServerInfo>,
}

impl ConnectionState {
    pub fn phase(&self) -> ConnectionPhase {
        match (self.connected, self.all_connected) {
            (false, _) => ConnectionPhase::Disconnected,
            (true, false) => ConnectionPhase::PartiallyConnected,
            (true, true) => ConnectionPhase::FullyConnected,
        }
    }
}

/// Coarse view of [`ConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    PartiallyConnected,
    FullyConnected,
}

/// Derives the aggregate state from the children's flags.
///
/// Every recompute rescans the children inside
/// [`watch::Sender::send_if_modified`], so events arriving from several
/// children at once are applied one after another.
pub struct StateTracker {
    children: Vec<Arc<dyn ChildConnection>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Set once `all-ready` was signalled, cleared when quorum is lost
    ready_announced: AtomicBool,
}

impl StateTracker {
    /// Creates a tracker and computes the initial state.
    pub fn new(children: Vec<Arc<dyn ChildConnection>>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let tracker = Self {
            children,
            state_tx,
            ready_announced: AtomicBool::new(false),
        };
        tracker.recompute(false);
        tracker
    }

    /// Re-scans every child and updates the aggregate state.
    ///
    /// Returns true when `ready_event` is set, every child is connected and
    /// ready, and `all-ready` was not already signalled since the last time
    /// that stopped being the case. The caller emits `all-ready` then.
    pub fn recompute(&self, ready_event: bool) -> bool {
        let mut fire = false;

        self.state_tx.send_if_modified(|state| {
            let mut connected = false;
            let mut all_connected = true;
            let mut all_ready = true;
            let mut server_info = None;

            for child in &self.children {
                if child.is_connected() {
                    if !connected {
                        server_info = child.server_info();
                    }
                    connected = true;

                    if !child.is_ready() {
                        all_ready = false;
                    }
                } else {
                    all_connected = false;
                    all_ready = false;
                }
            }

            if !all_ready {
                self.ready_announced.store(false, Ordering::Relaxed);
            } else if ready_event {
                fire = !self.ready_announced.swap(true, Ordering::Relaxed);
            }

            let next = ConnectionState {
                connected,
                all_connected,
                server_info,
            };
            if *state == next {
                return false;
            }
            debug!("Aggregate state {:?} -> {:?}", state.phase(), next.phase());
            *state = next;
            true
        });

        if fire {
            info!("All {} children connected and ready", self.children.len());
        }
        fire
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn connected(&self) -> bool {
        self.state_tx.borrow().connected
    }

    pub fn all_connected(&self) -> bool {
        self.state_tx.borrow().all_connected
    }

    pub fn server_info(&self) -> Option<ServerInfo> {
        self.state_tx.borrow().server_info.clone()
    }

    /// Subscribes to aggregate state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;

    fn child(connected: bool, ready: bool) -> Arc<MemoryConnection> {
        let child = Arc::new(MemoryConnection::new("child"));
        child.set_connected(connected);
        child.set_ready(ready);
        child
    }

    fn tracker(children: &[Arc<MemoryConnection>]) -> StateTracker {
        StateTracker::new(
            children
                .iter()
                .map(|c| c.clone() as Arc<dyn ChildConnection>)
                .collect(),
        )
    }

    #[test]
    fn test_all_connected_ready_event() {
        let tracker = tracker(&[child(true, true), child(true, true)]);
        assert!(tracker.recompute(true));
        assert!(tracker.connected());
        assert!(tracker.all_connected());
    }

    #[test]
    fn test_all_connected_but_not_ready() {
        let tracker = tracker(&[child(true, true), child(true, false)]);
        assert!(!tracker.recompute(true));
        assert!(tracker.connected());
        assert!(tracker.all_connected());
    }

    #[test]
    fn test_all_connected_not_a_ready_event() {
        let tracker = tracker(&[child(true, true), child(true, true)]);
        assert!(!tracker.recompute(false));
        assert!(tracker.all_connected());
    }

    #[test]
    fn test_all_ready_fires_once_per_transition() {
        let a = child(true, true);
        let b = child(true, false);
        let tracker = tracker(&[a.clone(), b.clone()]);
        assert!(!tracker.recompute(true));

        b.set_ready(true);
        assert!(tracker.recompute(true));
        assert!(!tracker.recompute(true));

        a.set_connected(false);
        a.set_ready(false);
        assert!(!tracker.recompute(false));
        a.set_connected(true);
        a.set_ready(true);
        assert!(tracker.recompute(true));
    }

    #[test]
    fn test_not_all_connected_ready_event() {
        let tracker = tracker(&[child(true, true), child(false, false)]);
        assert!(!tracker.recompute(true));
        assert!(tracker.connected());
        assert!(!tracker.all_connected());
        assert_eq!(tracker.state().phase(), ConnectionPhase::PartiallyConnected);
    }

    #[test]
    fn test_none_connected() {
        let tracker = tracker(&[child(false, false), child(false, false)]);
        assert!(!tracker.recompute(true));
        assert!(!tracker.connected());
        assert!(!tracker.all_connected());
        assert_eq!(tracker.state().phase(), ConnectionPhase::Disconnected);
    }

    #[test]
    fn test_server_info_from_first_connected_child() {
        let first = child(false, false);
        let second = child(true, true);
        let third = child(true, true);
        first.set_server_info(Some(ServerInfo::parse("redis_version:1.0.0")));
        second.set_server_info(Some(ServerInfo::parse("redis_version:2.0.0")));
        third.set_server_info(Some(ServerInfo::parse("redis_version:3.0.0")));

        let tracker = tracker(&[first.clone(), second, third]);
        assert_eq!(
            tracker.server_info().as_ref().and_then(|i| i.redis_version().map(String::from)),
            Some("2.0.0".to_string())
        );

        first.set_connected(true);
        tracker.recompute(false);
        assert_eq!(
            tracker.server_info().as_ref().and_then(|i| i.redis_version().map(String::from)),
            Some("1.0.0".to_string())
        );
    }

    #[test]
    fn test_server_info_reset_on_full_disconnect() {
        let only = child(true, true);
        only.set_server_info(Some(ServerInfo::parse("redis_version:7.0.0")));
        let tracker = tracker(&[only.clone()]);
        assert!(tracker.server_info().is_some());

        only.set_connected(false);
        tracker.recompute(false);
        assert!(tracker.server_info().is_none());
        assert!(!tracker.connected());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let a = child(false, false);
        let tracker = tracker(&[a.clone()]);
        let mut rx = tracker.subscribe();
        assert!(!rx.borrow_and_update().connected);

        a.set_connected(true);
        tracker.recompute(false);
        rx.changed().await.unwrap();
        assert!(rx.borrow().all_connected);
    }
}
