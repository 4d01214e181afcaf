//! Typed, topic-based publish/subscribe bus for rover notifications.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message without a slow subscriber blocking the publishers.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Safety`] | `obstacle_detected`, `blocked` |
//! | [`Topic::Navigation`] | return-to-home lifecycle, `home_set`, `gps_error` |
//! | [`Topic::Status`] | lights, avoidance and recording toggles |
//!
//! Every event is also mirrored onto an all-events lane, which is what the
//! command channel streams to its clients.

use pirover_types::{Event, Notification};
use tokio::sync::broadcast;
use tracing::trace;

/// Buffered events per lane before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Safety,
    Navigation,
    Status,
}

impl Topic {
    /// The lane a notification belongs on.
    pub fn for_notification(notification: &Notification) -> Self {
        match notification {
            Notification::ObstacleDetected { .. } | Notification::Blocked { .. } => Topic::Safety,
            Notification::NavigationStarted { .. }
            | Notification::NavigationUpdate { .. }
            | Notification::NavigationComplete
            | Notification::NavigationCancelled
            | Notification::NavigationAborted { .. }
            | Notification::HomeSet { .. }
            | Notification::HomeCleared
            | Notification::GpsError { .. } => Topic::Navigation,
            Notification::LightsChanged { .. }
            | Notification::AvoidanceChanged { .. }
            | Notification::RecordingChanged { .. } => Topic::Status,
        }
    }
}

/// Shared notification bus. Clones share the same channels.
#[derive(Clone, Debug)]
pub struct NotificationBus {
    all: broadcast::Sender<Event>,
    safety: broadcast::Sender<Event>,
    navigation: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
}

impl NotificationBus {
    /// Create a bus; `capacity` applies to every lane independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (safety, _) = broadcast::channel(capacity);
        let (navigation, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        Self {
            all,
            safety,
            navigation,
            status,
        }
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Publish `event` on `topic` and on the all-events lane.
    ///
    /// Returns how many receivers were handed the event. Having nobody
    /// listening is normal for a headless rover and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_all = self.all.send(event).unwrap_or(0);
        trace!(?topic, receivers = on_topic + on_all, "notification published");
        on_topic + on_all
    }

    /// Wrap `notification` in an [`Event`] and route it to its topic.
    pub fn emit(&self, source: &str, notification: Notification) -> usize {
        let topic = Topic::for_notification(&notification);
        self.publish_to(topic, Event::new(source, notification))
    }

    // -----------------------------------------------------------------------
    // Subscribing
    // -----------------------------------------------------------------------

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every notification regardless of topic.
    pub fn subscribe_all(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.all.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Safety => &self.safety,
            Topic::Navigation => &self.navigation,
            Topic::Status => &self.status,
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to one lane of the bus.
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// `Lagged(n)` means `n` events were dropped for this subscriber; the
    /// caller decides whether to keep going. `Closed` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll, used by tests and the status paths.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// `None` for the all-events lane.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}
