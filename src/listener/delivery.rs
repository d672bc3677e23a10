//! Top-level notification delivery

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, warn};

use crate::events::NotificationEvent;
use crate::trigger::TriggerEngine;

/// Consumer of posted notifications
pub trait NotificationHandler: Send + Sync {
    /// Handle one notification, returning the started session id if any
    fn on_notification_posted(&self, event: &NotificationEvent) -> Option<u64>;
}

impl NotificationHandler for TriggerEngine {
    fn on_notification_posted(&self, event: &NotificationEvent) -> Option<u64> {
        self.on_notification(event).map(|session| session.id())
    }
}

/// Reasons a delivered notification was dropped
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("notification has no source app id")]
    MissingAppId,

    #[error("notification handler crashed")]
    HandlerPanicked,
}

/// Hand `event` to `handler`, containing any failure
///
/// Nothing raised while handling an event reaches the event source; a
/// panic in the handler is logged and reported as an error.
pub fn deliver<H>(handler: &H, event: &NotificationEvent) -> Result<Option<u64>, DeliveryError>
where
    H: NotificationHandler + ?Sized,
{
    if event.source_app_id.trim().is_empty() {
        warn!("dropping notification without source app id");
        return Err(DeliveryError::MissingAppId);
    }

    panic::catch_unwind(AssertUnwindSafe(|| handler.on_notification_posted(event))).map_err(|_| {
        error!(app_id = %event.source_app_id, "notification handler crashed");
        DeliveryError::HandlerPanicked
    })
}
