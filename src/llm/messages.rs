//! Chat messages: the browser's UI message shape and the provider's.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message as sent by the browser chat hook.
#[derive(Debug, Clone, Deserialize)]
pub struct UiMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<UiPart>,
}

/// One content part of a [`UiMessage`]. Only text is forwarded upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum UiPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// A message in the shape the provider accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

/// Result of [`to_model_messages`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConvertedChat {
    pub system: Option<String>,
    pub messages: Vec<ModelMessage>,
}

impl UiMessage {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                UiPart::Text { text } => Some(text.as_str()),
                UiPart::Other => None,
            })
            .collect()
    }
}

/// Converts UI messages into provider messages.
///
/// System messages are folded into the system instruction after `system`
/// itself; user and assistant messages without any text are dropped.
pub fn to_model_messages(messages: &[UiMessage], system: Option<String>) -> ConvertedChat {
    let mut system_parts: Vec<String> = system.into_iter().filter(|s| !s.is_empty()).collect();
    let mut converted = Vec::with_capacity(messages.len());

    for message in messages {
        let text = message.text();
        if text.is_empty() {
            continue;
        }
        match message.role {
            Role::System => system_parts.push(text),
            role => converted.push(ModelMessage {
                role,
                content: text,
            }),
        }
    }

    ConvertedChat {
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        messages: converted,
    }
}
