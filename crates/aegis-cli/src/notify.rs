//! Notification delivery for scheduled units that opt in (spec §4.G
//! `notify`/`notification_channels`). The spec names channels abstractly;
//! this binary only ships the channel every deployment has for free — the
//! process's own stderr/log stream — and leaves richer channels (webhook,
//! Discord, email) as a later `NotificationSink` impl rather than invented
//! integrations.

use tracing::warn;

pub trait NotificationSink: Send + Sync {
    fn notify(&self, channel: &str, title: &str, body: &str);
}

/// Logs the notification at `warn` level so it's visible even with a quiet
/// `RUST_LOG`, tagged with the channel name the schedule file requested.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, channel: &str, title: &str, body: &str) {
        warn!(channel, title, body, "scheduled unit notification");
    }
}
