//! zalo-client: async client library for the Zalo web chat API.
//!
//! Holds the account session, sends enveloped requests through a single
//! gateway, and polls for new messages, dispatching each one to registered
//! handlers on its own task.
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use zalo_client::{ClientConfig, HandlerRegistry, ZaloClient};
//!
//! # async fn example() -> zalo_client::ZaloResult<()> {
//! let client = ZaloClient::new(ClientConfig::default())?;
//! client.set_session(&json!({"zpw_sek": "...", "zpw_uid": "1000"}));
//! client.set_secret_key("MDEyMzQ1Njc4OWFiY2RlZg==");
//! client.set_imei("device-id");
//!
//! let replier = client.clone();
//! let mut registry = HandlerRegistry::new();
//! registry.command("/ping", move |event| {
//!     let client = replier.clone();
//!     async move {
//!         client
//!             .send_message("pong", &event.thread_id, event.thread_type, None)
//!             .await?;
//!         anyhow::Ok(())
//!     }
//! });
//!
//! let handle = client.listen(registry)?;
//! tokio::signal::ctrl_c().await?;
//! handle.stop();
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod dispatch;
pub mod gateway;
pub mod hooks;
pub mod login;
pub mod poller;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export primary public types.
pub use api::{AccountInfo, Endpoints, SentMessage, Urgency};
pub use client::{ClientConfig, ZaloClient};
pub use dispatch::{DispatchConfig, Dispatcher, HandlerFailure, HandlerRegistry};
pub use gateway::{Gateway, GatewayConfig};
pub use hooks::{ActionReceipt, LifecycleHooks, TracingHooks};
pub use login::{Authenticator, CookieAuthenticator, LoginGrant, LoginRequest};
pub use poller::{PollConfig, PollHandle, PollLoop, PollState, PollStats, SeenSet, SnapshotSource};
pub use session::{CookieJar, Session};
pub use store::{SessionSnapshot, SessionStore};

// Re-export zalo-core types for convenience.
pub use zalo_core::{MessageEvent, ThreadType, ZaloError, ZaloResult};
