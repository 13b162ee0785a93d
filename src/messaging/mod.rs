// Messaging - notifications from the engine to whoever displays them

pub mod channels;
pub mod notification;
pub mod sink;

pub use channels::{NotificationConsumer, NotificationProducer, create_notification_channel};
pub use notification::{Notification, NotificationCategory, NotificationKind, NotificationLevel};
pub use sink::{BeatForwarder, LogNotifier, NotificationForwarder, NotificationSink, RingNotifier};
