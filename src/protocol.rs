use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One history entry as it travels over the wire. Transcript ids stay
/// client-side; the relay and the gateway only ever see role + content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Token counters arrive from gateways as either JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenCount {
    Count(u64),
    Text(String),
}

impl fmt::Display for TokenCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenCount::Count(n) => write!(f, "{}", n),
            TokenCount::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: Option<String>,
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallResult {
    pub name: Option<String>,
    pub result: Option<Value>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub total_tokens: Option<TokenCount>,
    pub prompt_tokens: Option<TokenCount>,
    pub completion_tokens: Option<TokenCount>,
}

/// One event off the live token stream. The wire shape is `{type, data}`;
/// every known tag gets a typed payload, and tags this build has never
/// heard of survive untouched in `Other` so the relay can pass them along.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    FunctionCall(FunctionCall),
    FunctionCallResult(FunctionCallResult),
    Model(Option<String>),
    Usage(Usage),
    Other { kind: String, data: Value },
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl StreamChunk {
    /// Classification is total: a payload that does not match its tag's
    /// expected shape degrades to the empty payload for that tag instead
    /// of failing the whole event.
    fn from_wire(wire: WireChunk) -> Self {
        let WireChunk { kind, data } = wire;
        match kind.as_str() {
            "content" => StreamChunk::Content(lossy_text(data)),
            "functionCall" => {
                StreamChunk::FunctionCall(serde_json::from_value(data).unwrap_or_default())
            }
            "functionCallResult" => {
                StreamChunk::FunctionCallResult(serde_json::from_value(data).unwrap_or_default())
            }
            "model" => StreamChunk::Model(match data {
                Value::String(name) => Some(name),
                _ => None,
            }),
            "usage" => StreamChunk::Usage(serde_json::from_value(data).unwrap_or_default()),
            _ => StreamChunk::Other { kind, data },
        }
    }
}

fn lossy_text(data: Value) -> String {
    match data {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl<'de> Deserialize<'de> for StreamChunk {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        WireChunk::deserialize(deserializer).map(StreamChunk::from_wire)
    }
}

impl Serialize for StreamChunk {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            StreamChunk::Content(text) => {
                map.serialize_entry("type", "content")?;
                map.serialize_entry("data", text)?;
            }
            StreamChunk::FunctionCall(call) => {
                map.serialize_entry("type", "functionCall")?;
                map.serialize_entry("data", call)?;
            }
            StreamChunk::FunctionCallResult(result) => {
                map.serialize_entry("type", "functionCallResult")?;
                map.serialize_entry("data", result)?;
            }
            StreamChunk::Model(name) => {
                map.serialize_entry("type", "model")?;
                map.serialize_entry("data", name)?;
            }
            StreamChunk::Usage(usage) => {
                map.serialize_entry("type", "usage")?;
                map.serialize_entry("data", usage)?;
            }
            StreamChunk::Other { kind, data } => {
                map.serialize_entry("type", kind)?;
                map.serialize_entry("data", data)?;
            }
        }
        map.end()
    }
}
