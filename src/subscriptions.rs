//! Passenger subscriptions and the bounded notification history.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Notification, Subscription};

/// Subscriptions keyed by passenger; drives fan-out matching.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription; re-subscribing to the same target replaces the
    /// previous entry instead of stacking duplicates.
    pub async fn subscribe(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().await;
        let entries = subscriptions
            .entry(subscription.passenger_id.clone())
            .or_default();
        entries.retain(|s| {
            s.route_id != subscription.route_id || s.checkpoint_id != subscription.checkpoint_id
        });
        entries.push(subscription);
    }

    /// Remove subscriptions for the route (and checkpoint, if given).
    /// Returns how many were dropped.
    pub async fn unsubscribe(
        &self,
        passenger_id: &str,
        route_id: &str,
        checkpoint_id: Option<&str>,
    ) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(entries) = subscriptions.get_mut(passenger_id) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|s| {
            s.route_id != route_id
                || (checkpoint_id.is_some() && s.checkpoint_id.as_deref() != checkpoint_id)
        });
        before - entries.len()
    }

    /// Passenger ids whose subscriptions match this arrival.
    pub async fn matching(&self, route_id: &str, checkpoint_id: &str) -> Vec<String> {
        let subscriptions = self.subscriptions.read().await;
        let mut recipients: Vec<String> = subscriptions
            .iter()
            .filter(|(_, entries)| entries.iter().any(|s| s.matches(route_id, checkpoint_id)))
            .map(|(passenger_id, _)| passenger_id.clone())
            .collect();
        recipients.sort();
        recipients
    }
}

/// Bounded per-passenger notification history, newest first. The live
/// channel is best-effort; this is the pull-based fallback.
#[derive(Debug)]
pub struct NotificationHistory {
    capacity: usize,
    notifications: RwLock<HashMap<String, VecDeque<Notification>>>,
}

impl NotificationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            notifications: RwLock::new(HashMap::new()),
        }
    }

    /// Append a notification for one recipient, evicting the oldest entry
    /// once the per-passenger cap is reached. Returns the stored copy.
    pub async fn append(
        &self,
        recipient_id: &str,
        driver_id: &str,
        route_id: &str,
        checkpoint_name: &str,
        eta: &str,
    ) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.to_string(),
            driver_id: driver_id.to_string(),
            route_id: route_id.to_string(),
            checkpoint_name: checkpoint_name.to_string(),
            eta: eta.to_string(),
            created_at: Utc::now(),
            read: false,
        };
        if self.capacity == 0 {
            return notification;
        }
        let mut notifications = self.notifications.write().await;
        let entries = notifications.entry(recipient_id.to_string()).or_default();
        while entries.len() >= self.capacity {
            entries.pop_back();
        }
        entries.push_front(notification.clone());
        notification
    }

    /// Newest-first history for one passenger.
    pub async fn history(&self, passenger_id: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .get(passenger_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Flip the read flag. Returns false for unknown ids.
    pub async fn mark_read(&self, notification_id: Uuid) -> bool {
        let mut notifications = self.notifications.write().await;
        for entries in notifications.values_mut() {
            if let Some(notification) = entries.iter_mut().find(|n| n.id == notification_id) {
                notification.read = true;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriptionFilter;

    fn subscription(passenger: &str, route: &str) -> Subscription {
        Subscription {
            passenger_id: passenger.into(),
            route_id: route.into(),
            checkpoint_id: None,
            filter: SubscriptionFilter::All,
        }
    }

    #[tokio::test]
    async fn matching_respects_route_and_filter() {
        let index = SubscriptionIndex::new();
        index.subscribe(subscription("p1", "r1")).await;
        index.subscribe(subscription("p2", "r2")).await;
        index
            .subscribe(Subscription {
                passenger_id: "p3".into(),
                route_id: "r1".into(),
                checkpoint_id: Some("cp-5".into()),
                filter: SubscriptionFilter::Checkpoint,
            })
            .await;

        assert_eq!(index.matching("r1", "cp-2").await, vec!["p1"]);
        assert_eq!(index.matching("r1", "cp-5").await, vec!["p1", "p3"]);
    }

    #[tokio::test]
    async fn resubscribe_does_not_stack() {
        let index = SubscriptionIndex::new();
        index.subscribe(subscription("p1", "r1")).await;
        index.subscribe(subscription("p1", "r1")).await;

        assert_eq!(index.matching("r1", "cp-1").await, vec!["p1"]);
        assert_eq!(index.unsubscribe("p1", "r1", None).await, 1);
        assert!(index.matching("r1", "cp-1").await.is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded_and_newest_first() {
        let history = NotificationHistory::new(2);
        history.append("p1", "d1", "r1", "A", "~5 min").await;
        history.append("p1", "d1", "r1", "B", "~4 min").await;
        history.append("p1", "d1", "r1", "C", "~3 min").await;

        let entries = history.history("p1").await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].checkpoint_name, "C");
        assert_eq!(entries[1].checkpoint_name, "B");
    }

    #[tokio::test]
    async fn zero_capacity_history_stores_nothing() {
        let history = NotificationHistory::new(0);
        history.append("p1", "d1", "r1", "A", "~5 min").await;

        assert!(history.history("p1").await.is_empty());
    }

    #[tokio::test]
    async fn mark_read_flips_flag_once() {
        let history = NotificationHistory::new(10);
        let stored = history.append("p1", "d1", "r1", "A", "~5 min").await;

        assert!(history.mark_read(stored.id).await);
        assert!(history.history("p1").await[0].read);
        assert!(!history.mark_read(Uuid::new_v4()).await);
    }
}
