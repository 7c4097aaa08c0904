// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Conversion of a whole export into a Mattermost bulk-import stream.
//!
//! The stream is JSON Lines: a version record first, then one post record
//! per root-level message in export order. Replies appear only nested in
//! their root's `replies`.
//!
//! ```text
//! {"type":"version","version":1}
//! {"type":"post","post":{"team":"example","channel":"town square",...}}
//! ```
//!
//! # Example
//!
//! ```
//! use tg2mm::config::Config;
//! use tg2mm::import::convert;
//! use tg2mm::parser::parse_export;
//!
//! let config = Config::from_toml_str(r#"
//!     [import_into]
//!     team = "example"
//!     channel = "town square"
//!     [users]
//!     user123 = "abc"
//! "#).unwrap();
//!
//! let export = parse_export(r#"{"messages": [{
//!     "id": 1, "type": "message", "date": "2022-03-15T06:06:11",
//!     "from_id": "user123", "text": "Morning!"
//! }]}"#).unwrap();
//!
//! let lines = convert(&config, &export.messages).unwrap().lines().unwrap();
//! assert_eq!(lines[0], r#"{"type":"version","version":1}"#);
//! assert_eq!(
//!     lines[1],
//!     r#"{"type":"post","post":{"team":"example","channel":"town square","user":"abc","message":"Morning!","create_at":1647324371000}}"#
//! );
//! ```

use crate::config::{Config, ConfigError};
use crate::parser::{MessageId, RawMessage};
use crate::thread::{ReplyIndex, ThreadError};
use crate::timestamp::Clock;
use crate::transform::{Outcome, Post, TransformError, Transformer};
use serde::Serialize;
use snafu::prelude::*;
use std::collections::HashSet;
use std::io::Write;

/// Bulk-import format version written in the first record.
pub const IMPORT_VERSION: u32 = 1;

/// Type tags of administrative messages that have no import counterpart.
const ADMINISTRATIVE_TYPES: &[&str] = &["service"];

/// Error type for converting an export. Any error aborts the whole run.
#[derive(Debug, Snafu)]
pub enum ConvertError {
    /// The settings could not be applied.
    #[snafu(display("{source}"))]
    Settings {
        /// The underlying settings error.
        source: ConfigError,
    },

    /// The reply structure is invalid.
    #[snafu(display("{source}"))]
    Thread {
        /// The underlying reply resolution error.
        source: ThreadError,
    },

    /// A message could not be transformed.
    #[snafu(display("{source}"))]
    Transform {
        /// The underlying transformation error.
        source: TransformError,
    },
}

/// Error type for writing an import stream.
#[derive(Debug, Snafu)]
pub enum WriteError {
    /// A record could not be serialized.
    #[snafu(display("failed to serialize record: {source}"))]
    Serialize {
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The destination rejected a write.
    #[snafu(display("failed to write record: {source}"))]
    Io {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// One line of the import stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportLine {
    /// The leading format version record.
    Version {
        /// Format version, always [`IMPORT_VERSION`].
        version: u32,
    },
    /// A root-level post with its replies.
    Post {
        /// The post.
        post: Post,
    },
}

/// Counters describing one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Root-level posts emitted.
    pub posts: usize,
    /// Replies nested under emitted posts.
    pub replies: usize,
    /// Messages dropped for an unmapped sender.
    pub dropped: usize,
    /// Messages skipped for their type.
    pub skipped: usize,
    /// Replies lost because their root is missing, dropped or skipped.
    pub orphaned: usize,
}

/// The result of converting one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Import records, version record first.
    pub records: Vec<ImportLine>,
    /// Raw relative paths of the attachments emitted posts reference, in
    /// record order. Media on orphaned replies is not listed.
    pub attachments: Vec<String>,
    /// What happened to the input messages.
    pub summary: Summary,
}

impl Conversion {
    /// Serializes every record as one JSON line, without newlines.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be serialized.
    pub fn lines(&self) -> Result<Vec<String>, WriteError> {
        self.records
            .iter()
            .map(|record| serde_json::to_string(record).context(SerializeSnafu))
            .collect()
    }

    /// Writes the records as newline-terminated JSON lines.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<(), WriteError> {
        for record in &self.records {
            serde_json::to_writer(&mut writer, record).context(SerializeSnafu)?;
            writer.write_all(b"\n").context(IoSnafu)?;
        }
        writer.flush().context(IoSnafu)
    }
}

/// Converts the messages of one export.
///
/// # Errors
///
/// Returns an error for an invalid timezone, a reply cycle, or any message
/// that cannot be transformed. Nothing is returned on error.
pub fn convert(config: &Config, messages: &[RawMessage]) -> Result<Conversion, ConvertError> {
    let clock = Clock::new(config.tz().context(SettingsSnafu)?);
    let index = ReplyIndex::build(messages).context(ThreadSnafu)?;
    let mut transformer = Transformer::new(config, clock, &index);

    let mut records = vec![ImportLine::Version {
        version: IMPORT_VERSION,
    }];
    let mut summary = Summary::default();
    let mut emitted: HashSet<MessageId> = HashSet::new();
    let mut attachments = Vec::new();

    for message in messages {
        if message
            .kind
            .as_deref()
            .is_some_and(|kind| ADMINISTRATIVE_TYPES.contains(&kind))
        {
            tracing::debug!(id = message.id, "Skipping administrative message");
            summary.skipped += 1;
            continue;
        }

        match transformer.transform(message).context(TransformSnafu)? {
            Outcome::Post(post) if message.reply_to_id.is_none() => {
                summary.posts += 1;
                summary.replies += post.replies.len();
                emitted.insert(message.id);
                let thread = std::iter::once(message.id)
                    .chain(index.replies_under(message.id).iter().map(|reply| reply.id));
                attachments.extend(
                    thread.filter_map(|id| transformer.media_path(id)).map(str::to_owned),
                );
                records.push(ImportLine::Post { post });
            }
            Outcome::Post(_) => {}
            Outcome::Dropped => summary.dropped += 1,
            Outcome::Passthrough { kind } => {
                tracing::warn!(id = message.id, %kind, "Skipping message of unsupported type");
                summary.skipped += 1;
            }
        }
    }

    summary.orphaned = index
        .roots()
        .filter(|root| !emitted.contains(root))
        .map(|root| index.replies_under(root).len())
        .sum();
    if summary.orphaned > 0 {
        tracing::warn!(
            count = summary.orphaned,
            "Replies whose thread root was not imported are left out"
        );
    }

    tracing::info!(
        posts = summary.posts,
        replies = summary.replies,
        dropped = summary.dropped,
        skipped = summary.skipped,
        orphaned = summary.orphaned,
        attachments = attachments.len(),
        "Converted export"
    );

    Ok(Conversion {
        records,
        attachments,
        summary,
    })
}
