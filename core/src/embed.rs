// Cross-frame messages exchanged between the shell and embedded diagram apps

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmbedMessage {
    /// Child asks the parent frame to resize it
    #[serde(rename = "EMBED_HEIGHT")]
    EmbedHeight { height: f64 },

    /// Parent injects runtime configuration into the child
    #[serde(rename = "infra.config")]
    InfraConfig {
        #[serde(
            rename = "apiBase",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        api_base: Option<String>,
        #[serde(
            rename = "orgId",
            default,
            deserialize_with = "string_or_number",
            skip_serializing_if = "Option::is_none"
        )]
        org_id: Option<String>,
    },
}

impl EmbedMessage {
    /// Parse a raw message; unknown types and malformed bodies are ignored
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(target: "embed", error = %e, "Ignoring unrecognized frame message");
                None
            }
        }
    }

    pub fn height(height: f64) -> Self {
        EmbedMessage::EmbedHeight { height }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
