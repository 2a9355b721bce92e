//! zalo-core: Shared protocol library for the Zalo web API client.
//!
//! Provides the AES envelope codec, response unwrapping, protocol constants,
//! the normalized message model, group-settings resolution, and the error
//! taxonomy shared by every request.

pub mod envelope;
pub mod error;
pub mod message;
pub mod protocol;
pub mod response;
pub mod settings;

// Re-export commonly used items at crate root.
pub use envelope::{decode, encode, ParamMap, SecretKey};
pub use error::{ZaloError, ZaloResult};
pub use message::{MessageEvent, RawMessage, Snapshot, ThreadType};
pub use protocol::{ZPW_TYPE, ZPW_VER};
pub use response::{unwrap_envelope, ResponseEnvelope};
