//! Message model: raw poll snapshots and the normalized `MessageEvent`.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{ZaloError, ZaloResult};

/// Kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadType {
    /// One-to-one conversation with another user.
    Direct,
    /// Group conversation.
    Group,
}

impl ThreadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadType::Direct => "direct",
            ThreadType::Group => "group",
        }
    }
}

impl fmt::Display for ThreadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadType {
    type Err = ZaloError;

    fn from_str(s: &str) -> ZaloResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "user" => Ok(ThreadType::Direct),
            "group" => Ok(ThreadType::Group),
            other => Err(ZaloError::InvalidInput(format!(
                "thread type must be 'direct' or 'group', got '{other}'"
            ))),
        }
    }
}

/// A message as it appears in a latest-messages snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "msgId", deserialize_with = "string_or_number")]
    pub msg_id: String,
    #[serde(rename = "cliMsgId", default, deserialize_with = "string_or_number")]
    pub cli_msg_id: String,
    #[serde(rename = "uidFrom", default, deserialize_with = "string_or_number")]
    pub uid_from: String,
    #[serde(rename = "idTo", default, deserialize_with = "string_or_number")]
    pub id_to: String,
    #[serde(rename = "msgType", default, deserialize_with = "string_or_number")]
    pub msg_type: String,
    #[serde(default)]
    pub content: Value,
    /// Server timestamp in milliseconds.
    #[serde(deserialize_with = "timestamp_ms")]
    pub ts: i64,
}

/// The batch of most-recent messages returned by one poll fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub direct: Vec<RawMessage>,
    pub group: Vec<RawMessage>,
    /// Items dropped because they did not parse as messages.
    pub skipped: usize,
}

impl Snapshot {
    pub fn new(direct: Vec<RawMessage>, group: Vec<RawMessage>) -> Self {
        Self {
            direct,
            group,
            skipped: 0,
        }
    }

    /// Build a snapshot from the decoded `get-last-msgs` data.
    ///
    /// Items that do not parse as messages are skipped rather than failing
    /// the whole batch; their number is kept in `skipped`.
    pub fn from_value(value: &Value) -> ZaloResult<Self> {
        let obj = value.as_object().ok_or_else(|| {
            ZaloError::Decode("latest-messages data is not an object".into())
        })?;

        let (direct, direct_skipped) = parse_items(obj.get("msgs"));
        let (group, group_skipped) = parse_items(obj.get("groupMsgs"));
        Ok(Self {
            direct,
            group,
            skipped: direct_skipped + group_skipped,
        })
    }

    /// Iterate in snapshot order: direct items first, then group items.
    pub fn iter(&self) -> impl Iterator<Item = (ThreadType, &RawMessage)> {
        self.direct
            .iter()
            .map(|m| (ThreadType::Direct, m))
            .chain(self.group.iter().map(|m| (ThreadType::Group, m)))
    }

    pub fn len(&self) -> usize {
        self.direct.len() + self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_items(items: Option<&Value>) -> (Vec<RawMessage>, usize) {
    let Some(Value::Array(items)) = items else {
        return (Vec::new(), 0);
    };
    let parsed: Vec<RawMessage> = items
        .iter()
        .filter_map(|item| RawMessage::deserialize(item).ok())
        .collect();
    let skipped = items.len() - parsed.len();
    (parsed, skipped)
}

/// A normalized inbound message, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: String,
    pub client_message_id: String,
    pub author_id: String,
    pub thread_id: String,
    pub thread_type: ThreadType,
    /// Service message-kind tag (e.g. `webchat`, `chat.photo`).
    pub msg_type: String,
    /// Raw content: a string for text, an object for attachments.
    pub content: Value,
    /// Server timestamp in milliseconds.
    pub timestamp: i64,
    /// Position of the message within its snapshot.
    pub snapshot_index: usize,
}

impl MessageEvent {
    /// Normalize a raw snapshot item.
    ///
    /// `uidFrom == "0"` marks a message sent by the client itself: the author
    /// becomes `own_uid` and a direct thread is keyed by the recipient.
    pub fn from_raw(
        raw: &RawMessage,
        thread_type: ThreadType,
        own_uid: &str,
        snapshot_index: usize,
    ) -> Self {
        let from_self = is_zero_id(&raw.uid_from);
        let author_id = if from_self {
            own_uid.to_string()
        } else {
            raw.uid_from.clone()
        };
        let thread_id = match thread_type {
            ThreadType::Direct if !from_self => raw.uid_from.clone(),
            _ => raw.id_to.clone(),
        };

        Self {
            message_id: raw.msg_id.clone(),
            client_message_id: raw.cli_msg_id.clone(),
            author_id,
            thread_id,
            thread_type,
            msg_type: raw.msg_type.clone(),
            content: raw.content.clone(),
            timestamp: raw.ts,
            snapshot_index,
        }
    }

    /// Text content, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// Content as matched by handlers: the text itself, or the JSON form of
    /// non-text content.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

fn is_zero_id(id: &str) -> bool {
    id.is_empty() || id == "0"
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn timestamp_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| de::Error::custom(format!("bad timestamp '{s}': {e}"))),
        other => Err(de::Error::custom(format!("expected timestamp, got {other}"))),
    }
}
