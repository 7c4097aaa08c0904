// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Per-message transformation into Mattermost posts.
//!
//! A [`Transformer`] turns one [`RawMessage`] into an [`Outcome`]:
//!
//! - [`Outcome::Post`] for a `message` whose sender maps to a target user,
//!   with its replies folded in when it roots a thread;
//! - [`Outcome::Dropped`] when the sender has no target username;
//! - [`Outcome::Passthrough`] for any other type tag, left to the caller.
//!
//! Outcomes are memoized by message id, so a reply reached once through
//! its root and once on its own is rendered and logged only once.

use crate::config::Config;
use crate::parser::{Body, MessageId, RawMessage, is_missing_media};
use crate::renderer::{self, RenderError};
use crate::thread::ReplyIndex;
use crate::timestamp::{Clock, TimestampError};
use serde::Serialize;
use snafu::prelude::*;
use std::collections::{HashMap, HashSet};

/// Error type for message transformation. Every variant names the message.
#[derive(Debug, Snafu)]
pub enum TransformError {
    /// The message has no type tag, or an empty one.
    #[snafu(display("message {id} has no type"))]
    MissingType {
        /// The message id.
        id: MessageId,
    },

    /// The body could not be rendered.
    #[snafu(display("message {id}: {source}"))]
    Render {
        /// The message id.
        id: MessageId,
        /// The underlying rendering error.
        source: RenderError,
    },

    /// The `date` field could not be converted.
    #[snafu(display("message {id}: {source}"))]
    Timestamp {
        /// The message id.
        id: MessageId,
        /// The underlying timestamp error.
        source: TimestampError,
    },

    /// A message was reached again while its own replies were attached.
    #[snafu(display("message {id} is part of a reply cycle"))]
    ReplyCycle {
        /// The message id.
        id: MessageId,
    },
}

/// A file attached to a post, relative to the import archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    /// Path of the file.
    pub path: String,
}

/// A top-level Mattermost post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    /// Team name.
    pub team: String,
    /// Channel name.
    pub channel: String,
    /// Target username of the author.
    pub user: String,
    /// Rendered Markdown body.
    pub message: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub create_at: i64,
    /// Attached files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Replies in thread order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Reply>,
}

impl Post {
    /// Converts this post into a reply nested under another post.
    ///
    /// Team and channel are inherited from the root; replies of replies do
    /// not exist, so any nested replies are discarded.
    #[must_use]
    pub fn into_reply(self) -> Reply {
        Reply {
            user: self.user,
            message: self.message,
            create_at: self.create_at,
            attachments: self.attachments,
        }
    }
}

/// A reply nested inside a [`Post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    /// Target username of the author.
    pub user: String,
    /// Rendered Markdown body.
    pub message: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub create_at: i64,
    /// Attached files.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Result of transforming one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message became a post.
    Post(Post),
    /// The sender has no target username; nothing is emitted.
    Dropped,
    /// Not a `message`; returned untouched.
    Passthrough {
        /// The original type tag.
        kind: String,
    },
}

/// Output record kinds an export type tag maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `message` becomes `post`.
    Post,
}

impl RecordKind {
    /// Maps an export type tag, `None` for tags with no output record.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "message" => Some(Self::Post),
            _ => None,
        }
    }
}

/// Transforms messages of one export.
#[derive(Debug)]
pub struct Transformer<'a, 'm> {
    config: &'a Config,
    clock: Clock,
    index: &'a ReplyIndex<'m>,
    done: HashMap<MessageId, Outcome>,
    in_progress: HashSet<MessageId>,
    media: HashMap<MessageId, String>,
}

impl<'a, 'm> Transformer<'a, 'm> {
    /// Creates a transformer over a built reply index.
    #[must_use]
    pub fn new(config: &'a Config, clock: Clock, index: &'a ReplyIndex<'m>) -> Self {
        Self {
            config,
            clock,
            index,
            done: HashMap::new(),
            in_progress: HashSet::new(),
            media: HashMap::new(),
        }
    }

    /// Transforms `message`, attaching its replies if it roots a thread.
    ///
    /// Calling this again for the same message returns the first outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the message has no type, its body or date cannot
    /// be converted, or the same is true for one of its replies.
    pub fn transform(&mut self, message: &RawMessage) -> Result<Outcome, TransformError> {
        let id = message.id;
        let kind = message
            .kind
            .as_deref()
            .filter(|kind| !kind.is_empty())
            .context(MissingTypeSnafu { id })?;

        if RecordKind::from_tag(kind).is_none() {
            return Ok(Outcome::Passthrough {
                kind: kind.to_owned(),
            });
        }

        if let Some(outcome) = self.done.get(&id) {
            return Ok(outcome.clone());
        }

        // Indexes from `ReplyIndex::build` never list a root among its own
        // replies; this only trips on an index that breaks that invariant.
        ensure!(self.in_progress.insert(id), ReplyCycleSnafu { id });
        let outcome = self.build_post(message);
        self.in_progress.remove(&id);

        let outcome = outcome?;
        self.done.insert(id, outcome.clone());
        Ok(outcome)
    }

    /// Raw relative path of the attachment of a transformed message.
    ///
    /// `None` for messages without media, stickers, dropped messages and
    /// messages not transformed yet.
    #[must_use]
    pub fn media_path(&self, id: MessageId) -> Option<&str> {
        self.media.get(&id).map(String::as_str)
    }

    fn build_post(&mut self, message: &RawMessage) -> Result<Outcome, TransformError> {
        let id = message.id;
        let Some(user) = message
            .sender_id
            .as_deref()
            .and_then(|sender| self.config.user(sender))
        else {
            tracing::warn!(
                id,
                sender = message.sender_id.as_deref().unwrap_or("<none>"),
                name = message.sender_name.as_deref().unwrap_or("<none>"),
                "Dropping message from sender without a target username"
            );
            return Ok(Outcome::Dropped);
        };

        let text = self.render_text(message)?;
        let create_at = self
            .clock
            .epoch_millis(&message.date)
            .context(TimestampSnafu { id })?;

        let target = &self.config.import_into;
        let mut post = Post {
            team: target.team.clone(),
            channel: target.channel.clone(),
            user: user.to_owned(),
            message: text,
            create_at,
            attachments: Vec::new(),
            replies: Vec::new(),
        };

        if let Some(attachment) = self.collect_attachment(message) {
            post.attachments.push(attachment);
        }

        let index = self.index;
        for reply in index.replies_under(id) {
            if let Outcome::Post(reply_post) = self.transform(reply)? {
                post.replies.push(reply_post.into_reply());
            }
        }

        Ok(Outcome::Post(post))
    }

    fn render_text(&self, message: &RawMessage) -> Result<String, TransformError> {
        // An empty sticker body reads as its emoji.
        if let (Body::Plain(text), Some(emoji)) = (&message.text, &message.sticker_emoji)
            && text.is_empty()
        {
            return Ok(emoji.clone());
        }
        renderer::render(&message.text, &self.config.users).context(RenderSnafu { id: message.id })
    }

    fn collect_attachment(&mut self, message: &RawMessage) -> Option<Attachment> {
        if !message.is_sticker()
            && let Some(placeholder) = [&message.file, &message.photo]
                .into_iter()
                .flatten()
                .find(|path| is_missing_media(path))
        {
            tracing::warn!(id = message.id, %placeholder, "Media was not included in the export");
        }

        let path = message.media_path()?;
        self.media.insert(message.id, path.to_owned());
        Some(Attachment {
            path: self
                .config
                .attachment_base_dir
                .join(path)
                .to_string_lossy()
                .into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportTarget;
    use crate::parser::{TaggedFragment, TextFragment};
    use chrono_tz::Tz;

    const MORNING_MILLIS: i64 = 1_647_324_371_000;

    fn config() -> Config {
        Config {
            users: HashMap::from([
                ("user123".to_owned(), "abc".to_owned()),
                ("user456".to_owned(), "def".to_owned()),
            ]),
            import_into: ImportTarget {
                team: "example".into(),
                channel: "town square".into(),
            },
            timezone: None,
            attachment_base_dir: "/import/data".into(),
        }
    }

    fn message(id: MessageId, text: &str) -> RawMessage {
        RawMessage {
            id,
            kind: Some("message".into()),
            date: "2022-03-15T06:06:11".into(),
            sender_name: Some("Alice".into()),
            sender_id: Some("user123".into()),
            text: Body::Plain(text.into()),
            reply_to_id: None,
            file: None,
            photo: None,
            sticker_emoji: None,
            media_type: None,
        }
    }

    fn reply(id: MessageId, to: MessageId, sender: &str, text: &str) -> RawMessage {
        RawMessage {
            reply_to_id: Some(to),
            sender_id: Some(sender.into()),
            ..message(id, text)
        }
    }

    fn transform_all(config: &Config, messages: &[RawMessage]) -> Vec<Outcome> {
        let index = ReplyIndex::build(messages).unwrap();
        let mut transformer = Transformer::new(config, Clock::default(), &index);
        messages
            .iter()
            .map(|m| transformer.transform(m).unwrap())
            .collect()
    }

    fn expect_post(outcome: Outcome) -> Post {
        match outcome {
            Outcome::Post(post) => post,
            other => panic!("Expected Post, got {other:?}"),
        }
    }

    #[test]
    fn builds_post_core_fields() {
        let config = config();
        let outcomes = transform_all(&config, &[message(1, "Morning!")]);

        assert_eq!(
            expect_post(outcomes[0].clone()),
            Post {
                team: "example".into(),
                channel: "town square".into(),
                user: "abc".into(),
                message: "Morning!".into(),
                create_at: MORNING_MILLIS,
                attachments: vec![],
                replies: vec![],
            }
        );
    }

    #[test]
    fn uses_configured_clock() {
        let config = config();
        let messages = [message(1, "hi")];
        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::new(Tz::Europe__Busingen), &index);

        let post = expect_post(transformer.transform(&messages[0]).unwrap());
        assert_eq!(post.create_at, MORNING_MILLIS - 3_600_000);
    }

    #[test]
    fn drops_unknown_sender() {
        let config = config();
        let mut unknown = message(1, "who am I");
        unknown.sender_id = Some("user999".into());

        assert_eq!(transform_all(&config, &[unknown]), [Outcome::Dropped]);
    }

    #[test]
    fn drops_message_without_sender() {
        let config = config();
        let mut anonymous = message(1, "hi");
        anonymous.sender_id = None;

        assert_eq!(transform_all(&config, &[anonymous]), [Outcome::Dropped]);
    }

    #[test]
    fn rejects_missing_type() {
        let config = config();
        let index = ReplyIndex::default();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);

        let mut untyped = message(4, "x");
        untyped.kind = None;
        let err = transformer.transform(&untyped).unwrap_err();
        assert!(matches!(err, TransformError::MissingType { id: 4 }));

        untyped.kind = Some(String::new());
        let err = transformer.transform(&untyped).unwrap_err();
        assert_eq!(err.to_string(), "message 4 has no type");
    }

    #[test]
    fn passes_through_other_types() {
        let config = config();
        let mut service = message(1, "");
        service.kind = Some("service".into());

        assert_eq!(
            transform_all(&config, &[service]),
            [Outcome::Passthrough {
                kind: "service".into()
            }]
        );
    }

    #[test]
    fn reports_message_id_for_render_errors() {
        let config = config();
        let mut bad = message(17, "");
        bad.text = Body::Fragments(vec![TextFragment::Tagged(TaggedFragment {
            kind: "blink".into(),
            text: "x".into(),
            user_id: None,
        })]);

        let index = ReplyIndex::default();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);
        let err = transformer.transform(&bad).unwrap_err();
        assert_eq!(err.to_string(), "message 17: unsupported markup \"blink\"");
    }

    #[test]
    fn reports_message_id_for_bad_timestamp() {
        let config = config();
        let mut bad = message(18, "hi");
        bad.date = "yesterday".into();

        let index = ReplyIndex::default();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);
        let err = transformer.transform(&bad).unwrap_err();
        assert!(matches!(err, TransformError::Timestamp { id: 18, .. }));
    }

    #[test]
    fn sticker_emoji_replaces_empty_body() {
        let config = config();
        let mut sticker = message(1, "");
        sticker.sticker_emoji = Some("🙂".into());
        sticker.media_type = Some("sticker".into());
        sticker.file = Some("stickers/s.webp".into());

        let post = expect_post(transform_all(&config, &[sticker]).remove(0));
        assert_eq!(post.message, "🙂");
        assert!(post.attachments.is_empty());
    }

    #[test]
    fn sticker_emoji_does_not_replace_text() {
        let config = config();
        let mut sticker = message(1, "caption");
        sticker.sticker_emoji = Some("🙂".into());

        let post = expect_post(transform_all(&config, &[sticker]).remove(0));
        assert_eq!(post.message, "caption");
    }

    #[test]
    fn attaches_photo_under_base_dir() {
        let config = config();
        let mut photo = message(1, "look");
        photo.photo = Some("photos/photo_1.jpg".into());

        let messages = [photo];
        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);
        let post = expect_post(transformer.transform(&messages[0]).unwrap());

        assert_eq!(
            post.attachments,
            [Attachment {
                path: "/import/data/photos/photo_1.jpg".into()
            }]
        );
        assert_eq!(transformer.media_path(1), Some("photos/photo_1.jpg"));
    }

    #[test]
    fn skips_media_not_included_in_export() {
        let config = config();
        let mut file = message(1, "doc");
        file.file = Some("(File not included. Change data exporting settings to download.)".into());

        let messages = [file];
        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);
        let post = expect_post(transformer.transform(&messages[0]).unwrap());

        assert!(post.attachments.is_empty());
        assert!(transformer.media_path(1).is_none());
    }

    #[test]
    fn folds_reply_chain_into_root() {
        let config = config();
        let messages = [
            message(1, "A"),
            reply(2, 1, "user456", "B"),
            reply(3, 2, "user123", "C"),
        ];
        let outcomes = transform_all(&config, &messages);

        let root = expect_post(outcomes[0].clone());
        let replies: Vec<_> = root
            .replies
            .iter()
            .map(|r| (r.user.as_str(), r.message.as_str()))
            .collect();
        assert_eq!(replies, [("def", "B"), ("abc", "C")]);
    }

    #[test]
    fn reply_outcome_is_memoized() {
        let config = config();
        let mut photo_reply = reply(2, 1, "user456", "B");
        photo_reply.photo = Some("photos/b.jpg".into());
        let messages = [message(1, "A"), photo_reply];

        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);
        let root = expect_post(transformer.transform(&messages[0]).unwrap());
        let first = transformer.transform(&messages[1]).unwrap();
        let second = transformer.transform(&messages[1]).unwrap();

        assert_eq!(first, second);
        assert_eq!(root.replies[0], expect_post(first).into_reply());
        assert_eq!(transformer.media_path(2), Some("photos/b.jpg"));
        assert!(transformer.media_path(1).is_none());
    }

    #[test]
    fn retransforming_root_returns_same_post() {
        let config = config();
        let messages = [message(1, "A"), reply(2, 1, "user456", "B")];
        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);

        let first = transformer.transform(&messages[0]).unwrap();
        let second = transformer.transform(&messages[0]).unwrap();
        assert_eq!(first, second);
        assert_eq!(expect_post(second).replies.len(), 1);
    }

    #[test]
    fn dropped_reply_is_left_out() {
        let config = config();
        let messages = [
            message(1, "A"),
            reply(2, 1, "user999", "ghost"),
            reply(3, 1, "user456", "C"),
        ];
        let outcomes = transform_all(&config, &messages);

        let root = expect_post(outcomes[0].clone());
        assert_eq!(root.replies.len(), 1);
        assert_eq!(root.replies[0].message, "C");
        assert_eq!(outcomes[1], Outcome::Dropped);
    }

    #[test]
    fn root_listed_among_its_own_replies_is_a_cycle() {
        let config = config();
        let messages = [message(1, "A")];
        let index = ReplyIndex::from_groups(vec![(1, vec![&messages[0]])]);
        let mut transformer = Transformer::new(&config, Clock::default(), &index);

        let err = transformer.transform(&messages[0]).unwrap_err();
        assert!(matches!(err, TransformError::ReplyCycle { id: 1 }));
        assert_eq!(err.to_string(), "message 1 is part of a reply cycle");
    }

    #[test]
    fn dropped_message_has_no_media_path() {
        let config = config();
        let mut ghost = message(1, "look");
        ghost.sender_id = Some("user999".into());
        ghost.photo = Some("photos/ghost.jpg".into());

        let messages = [ghost];
        let index = ReplyIndex::build(&messages).unwrap();
        let mut transformer = Transformer::new(&config, Clock::default(), &index);

        assert_eq!(transformer.transform(&messages[0]).unwrap(), Outcome::Dropped);
        assert!(transformer.media_path(1).is_none());
    }

    #[test]
    fn into_reply_drops_team_and_channel() {
        let post = Post {
            team: "t".into(),
            channel: "c".into(),
            user: "u".into(),
            message: "m".into(),
            create_at: 5,
            attachments: vec![Attachment { path: "p".into() }],
            replies: vec![],
        };

        let json = serde_json::to_value(post.into_reply()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"user": "u", "message": "m", "create_at": 5, "attachments": [{"path": "p"}]})
        );
    }

    #[test]
    fn post_serializes_in_import_field_order() {
        let post = Post {
            team: "example".into(),
            channel: "town square".into(),
            user: "abc".into(),
            message: "Morning!".into(),
            create_at: MORNING_MILLIS,
            attachments: vec![],
            replies: vec![],
        };

        assert_eq!(
            serde_json::to_string(&post).unwrap(),
            r#"{"team":"example","channel":"town square","user":"abc","message":"Morning!","create_at":1647324371000}"#
        );
    }

    #[test]
    fn maps_only_message_to_post() {
        assert_eq!(RecordKind::from_tag("message"), Some(RecordKind::Post));
        assert_eq!(RecordKind::from_tag("service"), None);
    }
}
