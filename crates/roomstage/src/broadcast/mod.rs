//! Broadcasting modules for notifications and workflow state changes.

pub mod notifications;
pub mod workflow_events;

pub use notifications::{
    LogNotifier, Notification, NotificationBroadcaster, NotificationKind, NotificationSink,
};
pub use workflow_events::{WorkflowEvent, WorkflowEventBroadcaster};
