//! Lifecycle hooks fired by the client.

use serde::{Deserialize, Serialize};
use zalo_core::ThreadType;

/// Confirmation of a delivered/seen receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub message_ids: Vec<String>,
    pub thread_id: String,
    pub thread_type: ThreadType,
    /// Client time of the action, in milliseconds.
    pub ts: i64,
}

/// Callbacks for client lifecycle events. Every method has a default that
/// only logs, so implementors override what they need.
pub trait LifecycleHooks: Send + Sync {
    /// A login is starting.
    fn on_logging_in(&self, phone: &str) {
        tracing::info!("logging in {}...", phone);
    }

    /// A login succeeded.
    fn on_logged_in(&self, phone: &str) {
        tracing::info!("login of {} successful", phone);
    }

    /// The poll loop started.
    fn on_listening(&self) {
        tracing::info!("listening...");
    }

    /// Messages were marked as delivered.
    fn on_message_delivered(&self, receipt: &ActionReceipt) {
        tracing::info!(
            msg_ids = ?receipt.message_ids,
            thread_id = %receipt.thread_id,
            thread_type = %receipt.thread_type,
            "marked messages as delivered"
        );
    }

    /// Messages were marked as seen.
    fn on_marked_seen(&self, receipt: &ActionReceipt) {
        tracing::info!(
            msg_ids = ?receipt.message_ids,
            thread_id = %receipt.thread_id,
            thread_type = %receipt.thread_type,
            "marked messages as seen"
        );
    }
}

/// Hooks that only log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl LifecycleHooks for TracingHooks {}
