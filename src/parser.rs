// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for Telegram Desktop chat exports.
//!
//! Telegram Desktop writes a chat export as a single `result.json` document
//! with a `messages` array. Each message carries a type tag, a naive local
//! timestamp, the sender and a body that is either a plain string or a list
//! of text fragments, some of them annotated with formatting.
//!
//! # Format Overview
//!
//! A message looks like:
//!
//! ```json
//! {
//!     "id": 7,
//!     "type": "message",
//!     "date": "2022-03-15T06:06:11",
//!     "from": "Alice",
//!     "from_id": "user123",
//!     "reply_to_message_id": 6,
//!     "text": ["see ", {"type": "bold", "text": "this"}]
//! }
//! ```
//!
//! Fragment kinds are kept as raw strings here; the [`renderer`] decides
//! which kinds it understands.
//!
//! # Example
//!
//! ```
//! use tg2mm::parser::{Body, parse_export};
//!
//! let json = r#"{
//!     "name": "General",
//!     "messages": [{
//!         "id": 1,
//!         "type": "message",
//!         "date": "2022-03-15T06:06:11",
//!         "from_id": "user123",
//!         "text": "Morning!"
//!     }]
//! }"#;
//!
//! let export = parse_export(json).unwrap();
//! assert_eq!(export.messages.len(), 1);
//! assert_eq!(export.messages[0].text, Body::Plain("Morning!".into()));
//! ```
//!
//! [`renderer`]: crate::renderer

use serde::Deserialize;
use snafu::prelude::*;

/// Identifier of a message, unique within one export.
pub type MessageId = i64;

/// Prefix Telegram writes instead of a path when media was not downloaded.
const NOT_INCLUDED_PREFIX: &str = "(File not included";

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}

/// The root structure of a Telegram chat export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatExport {
    /// Chat title, absent for some personal exports.
    #[serde(default)]
    pub name: Option<String>,

    /// Every message of the chat, in export order.
    pub messages: Vec<RawMessage>,
}

/// One message record as it appears in the export.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMessage {
    /// Export-unique message id.
    pub id: MessageId,

    /// Type tag such as `"message"` or `"service"`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Naive local timestamp, e.g. `2022-03-15T06:06:11`.
    #[serde(default)]
    pub date: String,

    /// Display name of the sender.
    #[serde(rename = "from", default)]
    pub sender_name: Option<String>,

    /// Opaque sender key, e.g. `user123`.
    #[serde(rename = "from_id", default)]
    pub sender_id: Option<String>,

    /// The message body.
    #[serde(default)]
    pub text: Body,

    /// Id of the message this one replies to.
    #[serde(rename = "reply_to_message_id", default)]
    pub reply_to_id: Option<MessageId>,

    /// Relative path of an attached file.
    #[serde(default)]
    pub file: Option<String>,

    /// Relative path of an attached photo.
    #[serde(default)]
    pub photo: Option<String>,

    /// Emoji standing in for a sticker.
    #[serde(default)]
    pub sticker_emoji: Option<String>,

    /// Media classification such as `"sticker"` or `"voice_message"`.
    #[serde(default)]
    pub media_type: Option<String>,
}

impl RawMessage {
    /// Returns `true` if this message is a sticker.
    #[must_use]
    pub fn is_sticker(&self) -> bool {
        self.media_type.as_deref() == Some("sticker") || self.sticker_emoji.is_some()
    }

    /// Returns the raw relative path of the attached file or photo.
    ///
    /// Stickers never yield a path; neither do media entries Telegram did
    /// not download (see [`is_missing_media`]).
    #[must_use]
    pub fn media_path(&self) -> Option<&str> {
        if self.is_sticker() {
            return None;
        }
        self.file
            .as_deref()
            .or(self.photo.as_deref())
            .filter(|path| !is_missing_media(path))
    }
}

/// Returns `true` for the placeholder Telegram writes when a media file was
/// excluded from the export.
#[must_use]
pub fn is_missing_media(path: &str) -> bool {
    path.starts_with(NOT_INCLUDED_PREFIX)
}

/// A message body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Body {
    /// Unformatted text.
    Plain(String),
    /// Ordered fragments, concatenated when rendered.
    Fragments(Vec<TextFragment>),
}

impl Default for Body {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

/// One piece of a fragmented body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TextFragment {
    /// A bare string, rendered verbatim.
    Bare(String),
    /// A fragment carrying a formatting kind.
    Tagged(TaggedFragment),
}

/// A formatted fragment: `{"type": ..., "text": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaggedFragment {
    /// The raw kind tag, e.g. `"bold"` or `"mention_name"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The fragment text.
    #[serde(default)]
    pub text: String,

    /// Numeric user referenced by a `mention_name` fragment.
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Parses a JSON string into a [`ChatExport`] structure.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or doesn't contain a
/// `messages` array of message records.
pub fn parse_export(json_str: &str) -> Result<ChatExport, ParseError> {
    serde_json::from_str(json_str).context(JsonSnafu)
}
