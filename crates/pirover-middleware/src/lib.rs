pub mod bus;

pub use bus::{NotificationBus, Topic, TopicReceiver};
