//! Unread Badge
//!
//! Subscriber that keeps the latest unread count pushed by the server, for
//! display next to the console's notification icon.

use std::sync::Arc;

use tokio::sync::watch;

use crate::client::{callback, Callback, ConnectionManager, Event, EventKind};

/// What the badge currently shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BadgeState {
    pub count: u64,
    /// Server timestamp of the last notification that carried one
    pub last_timestamp: Option<i64>,
}

/// Unread-count badge fed by `notification` events
///
/// Detaches from the manager when dropped.
pub struct UnreadBadge {
    manager: ConnectionManager,
    callback: Callback,
    sender: Arc<watch::Sender<BadgeState>>,
    receiver: watch::Receiver<BadgeState>,
}

impl UnreadBadge {
    /// Subscribe a new badge to `manager`'s notifications
    pub fn attach(manager: &ConnectionManager) -> Self {
        let (sender, receiver) = watch::channel(BadgeState::default());
        let sender = Arc::new(sender);

        let updates = Arc::clone(&sender);
        let callback = callback(move |event| {
            if let Event::Notification(notification) = event {
                updates.send_modify(|state| {
                    state.count = notification.count;
                    if notification.timestamp.is_some() {
                        state.last_timestamp = notification.timestamp;
                    }
                });
            }
        });
        manager.on(EventKind::Notification, Arc::clone(&callback));

        Self {
            manager: manager.clone(),
            callback,
            sender,
            receiver,
        }
    }

    pub fn count(&self) -> u64 {
        self.receiver.borrow().count
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.receiver.borrow().last_timestamp
    }

    pub fn state(&self) -> BadgeState {
        *self.receiver.borrow()
    }

    /// Receiver for rendering the badge elsewhere
    pub fn subscribe(&self) -> watch::Receiver<BadgeState> {
        self.sender.subscribe()
    }

    /// Wait for the next update and return it
    pub async fn changed(&mut self) -> BadgeState {
        // The sender lives as long as the badge, so this cannot fail
        let _ = self.receiver.changed().await;
        *self.receiver.borrow_and_update()
    }

    /// Clear the count locally until the server pushes a new one
    pub fn mark_all_read(&self) {
        self.sender.send_modify(|state| state.count = 0);
    }

    /// Stop listening for notifications
    pub fn detach(self) {}
}

impl std::fmt::Debug for UnreadBadge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnreadBadge")
            .field("state", &*self.receiver.borrow())
            .finish()
    }
}

impl Drop for UnreadBadge {
    fn drop(&mut self) {
        self.manager.off(&EventKind::Notification, &self.callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::protocol::Notification;
    use crate::token::MemoryTokenStore;
    use std::time::Duration;

    fn manager() -> ConnectionManager {
        ConnectionManager::websocket(
            ClientConfig::new("ws://127.0.0.1:9/ws"),
            Arc::new(MemoryTokenStore::new()),
        )
    }

    fn push(manager: &ConnectionManager, count: u64, timestamp: Option<i64>) {
        manager
            .registry()
            .dispatch(&Event::Notification(Notification { count, timestamp }));
    }

    #[tokio::test]
    async fn test_badge_tracks_latest_count() {
        let manager = manager();
        let badge = UnreadBadge::attach(&manager);
        assert_eq!(badge.count(), 0);

        push(&manager, 3, Some(1_700_000_000));
        push(&manager, 5, None);

        assert_eq!(badge.count(), 5);
        assert_eq!(badge.last_timestamp(), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let manager = manager();
        let badge = UnreadBadge::attach(&manager);

        push(&manager, 4, None);
        badge.mark_all_read();
        assert_eq!(badge.count(), 0);

        push(&manager, 1, None);
        assert_eq!(badge.count(), 1);
    }

    #[tokio::test]
    async fn test_changed_wakes_on_notification() {
        let manager = manager();
        let mut badge = UnreadBadge::attach(&manager);

        let pusher = manager.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            push(&pusher, 7, Some(42));
        });

        let state = tokio::time::timeout(Duration::from_secs(1), badge.changed())
            .await
            .unwrap();
        assert_eq!(
            state,
            BadgeState {
                count: 7,
                last_timestamp: Some(42)
            }
        );
    }

    #[tokio::test]
    async fn test_detach_unsubscribes() {
        let manager = manager();
        let badge = UnreadBadge::attach(&manager);
        let watcher = badge.subscribe();
        assert_eq!(
            manager.registry().subscriber_count(&EventKind::Notification),
            1
        );

        badge.detach();
        assert_eq!(
            manager.registry().subscriber_count(&EventKind::Notification),
            0
        );

        push(&manager, 9, None);
        assert_eq!(watcher.borrow().count, 0);
    }

    #[tokio::test]
    async fn test_two_badges_share_manager() {
        let manager = manager();
        let first = UnreadBadge::attach(&manager);
        let second = UnreadBadge::attach(&manager);

        push(&manager, 2, None);
        first.mark_all_read();

        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 2);
    }
}
