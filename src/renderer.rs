// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown rendering of message bodies.
//!
//! This module turns a [`Body`] into the Markdown dialect Mattermost
//! displays. Plain bodies pass through untouched. Fragmented bodies are
//! rendered fragment by fragment and concatenated in order, with no
//! trimming or whitespace collapsing.
//!
//! # Fragment Rules
//!
//! | kind | output |
//! |---|---|
//! | `plain`, `link`, `text_link`, `mention`, `hashtag`, ... | text verbatim |
//! | `code` | `` " `text` " `` |
//! | `bold` | `**text**` |
//! | `italic` | `_text_` |
//! | `underline` | `**_text_**` |
//! | `strikethrough` | `~~text~~` |
//! | `pre` | a fenced block on its own lines |
//! | `mention_name` | `@` + the mentioned user's target username |
//!
//! Any other kind is an error rather than silently lost text.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use tg2mm::parser::{Body, TaggedFragment, TextFragment};
//! use tg2mm::renderer::render;
//!
//! let body = Body::Fragments(vec![
//!     TextFragment::Bare("say ".into()),
//!     TextFragment::Tagged(TaggedFragment {
//!         kind: "italic".into(),
//!         text: "hi".into(),
//!         user_id: None,
//!     }),
//! ]);
//!
//! let users: HashMap<String, String> = HashMap::new();
//! assert_eq!(render(&body, &users).unwrap(), "say _hi_");
//! ```

use crate::parser::{Body, TaggedFragment, TextFragment};
use snafu::prelude::*;
use std::collections::HashMap;

/// Error type for body rendering.
#[derive(Debug, Snafu)]
pub enum RenderError {
    /// A fragment carries a kind the renderer does not know.
    #[snafu(display("unsupported markup {kind:?}"))]
    UnsupportedMarkup {
        /// The unrecognized kind tag.
        kind: String,
    },

    /// A `mention_name` fragment has no `user_id`.
    #[snafu(display("mention of {text:?} has no user_id"))]
    MissingMentionTarget {
        /// The visible mention text.
        text: String,
    },

    /// A `mention_name` fragment refers to a user absent from the directory.
    #[snafu(display("mentioned user {user} has no target username"))]
    UnknownMentionUser {
        /// The directory key that was looked up.
        user: String,
    },
}

/// Maps export user keys (e.g. `user123`) to target usernames.
pub trait UserDirectory {
    /// Returns the target username for `key`, if known.
    fn lookup(&self, key: &str) -> Option<&str>;
}

impl UserDirectory for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// Every fragment kind the renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// `plain`
    Plain,
    /// `link`
    Link,
    /// `bot_command`
    BotCommand,
    /// `mention` (an `@username` already in text form)
    Mention,
    /// `email`
    Email,
    /// `text_link`
    TextLink,
    /// `phone`
    Phone,
    /// `hashtag`
    Hashtag,
    /// `cashtag`
    Cashtag,
    /// `bank_card`
    BankCard,
    /// `code`
    Code,
    /// `bold`
    Bold,
    /// `italic`
    Italic,
    /// `underline`
    Underline,
    /// `strikethrough`
    Strikethrough,
    /// `pre`
    Pre,
    /// `mention_name` (a mention of a user without a public username)
    MentionName,
}

impl FragmentKind {
    /// Looks up the kind for an export tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "plain" => Self::Plain,
            "link" => Self::Link,
            "bot_command" => Self::BotCommand,
            "mention" => Self::Mention,
            "email" => Self::Email,
            "text_link" => Self::TextLink,
            "phone" => Self::Phone,
            "hashtag" => Self::Hashtag,
            "cashtag" => Self::Cashtag,
            "bank_card" => Self::BankCard,
            "code" => Self::Code,
            "bold" => Self::Bold,
            "italic" => Self::Italic,
            "underline" => Self::Underline,
            "strikethrough" => Self::Strikethrough,
            "pre" => Self::Pre,
            "mention_name" => Self::MentionName,
            _ => return None,
        })
    }
}

/// Renders a message body as Markdown.
///
/// # Errors
///
/// Returns an error for an unknown fragment kind or a `mention_name` that
/// cannot be resolved through `users`.
pub fn render(body: &Body, users: &impl UserDirectory) -> Result<String, RenderError> {
    match body {
        Body::Plain(text) => Ok(text.clone()),
        Body::Fragments(fragments) => {
            let mut out = String::new();
            for fragment in fragments {
                render_fragment(&mut out, fragment, users)?;
            }
            Ok(out)
        }
    }
}

/// Appends one rendered fragment to `out`.
///
/// # Errors
///
/// See [`render`].
pub fn render_fragment(
    out: &mut String,
    fragment: &TextFragment,
    users: &impl UserDirectory,
) -> Result<(), RenderError> {
    let tagged = match fragment {
        TextFragment::Bare(text) => {
            out.push_str(text);
            return Ok(());
        }
        TextFragment::Tagged(tagged) => tagged,
    };

    let kind = FragmentKind::from_tag(&tagged.kind).context(UnsupportedMarkupSnafu {
        kind: &tagged.kind,
    })?;
    let text = tagged.text.as_str();

    match kind {
        FragmentKind::Plain
        | FragmentKind::Link
        | FragmentKind::BotCommand
        | FragmentKind::Mention
        | FragmentKind::Email
        | FragmentKind::TextLink
        | FragmentKind::Phone
        | FragmentKind::Hashtag
        | FragmentKind::Cashtag
        | FragmentKind::BankCard => out.push_str(text),
        FragmentKind::Code => wrap(out, " `", text, "` "),
        FragmentKind::Bold => wrap(out, "**", text, "**"),
        FragmentKind::Italic => wrap(out, "_", text, "_"),
        FragmentKind::Underline => wrap(out, "**_", text, "_**"),
        FragmentKind::Strikethrough => wrap(out, "~~", text, "~~"),
        FragmentKind::Pre => wrap(out, "\n```\n", text, "\n```\n"),
        FragmentKind::MentionName => {
            out.push('@');
            out.push_str(resolve_mention(tagged, users)?);
        }
    }

    Ok(())
}

fn wrap(out: &mut String, open: &str, text: &str, close: &str) {
    out.push_str(open);
    out.push_str(text);
    out.push_str(close);
}

/// Mentions carry a numeric id; the directory is keyed like `from_id`.
fn resolve_mention<'a>(
    tagged: &TaggedFragment,
    users: &'a impl UserDirectory,
) -> Result<&'a str, RenderError> {
    let user_id = tagged.user_id.context(MissingMentionTargetSnafu {
        text: &tagged.text,
    })?;
    let user = format!("user{user_id}");
    users.lookup(&user).context(UnknownMentionUserSnafu { user })
}
