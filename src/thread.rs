// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Reply chain resolution.
//!
//! Telegram lets a message reply to any earlier message, including another
//! reply, so replies form trees. Mattermost threads are one level deep: a
//! root post and a flat list of replies. [`ReplyIndex`] flattens every tree
//! under its topmost ancestor, keeping export order.
//!
//! # Example
//!
//! ```
//! use tg2mm::parser::parse_export;
//! use tg2mm::thread::ReplyIndex;
//!
//! let export = parse_export(r#"{"messages": [
//!     {"id": 1, "type": "message", "text": "A"},
//!     {"id": 2, "type": "message", "text": "B", "reply_to_message_id": 1},
//!     {"id": 3, "type": "message", "text": "C", "reply_to_message_id": 2}
//! ]}"#).unwrap();
//!
//! let index = ReplyIndex::build(&export.messages).unwrap();
//! let ids: Vec<_> = index.replies_under(1).iter().map(|m| m.id).collect();
//! assert_eq!(ids, [2, 3]);
//! ```

use crate::parser::{MessageId, RawMessage};
use snafu::prelude::*;
use std::collections::HashMap;

/// Error type for reply chain resolution.
#[derive(Debug, Snafu)]
pub enum ThreadError {
    /// Following `reply_to` links from a message never reaches a root.
    #[snafu(display("message {id} is part of a reply cycle"))]
    ReplyCycle {
        /// The message whose chain was being followed.
        id: MessageId,
    },
}

/// Replies grouped under their topmost ancestor.
///
/// Built once per export and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReplyIndex<'m> {
    parent_of: HashMap<MessageId, MessageId>,
    replies_under: HashMap<MessageId, Vec<&'m RawMessage>>,
}

impl<'m> ReplyIndex<'m> {
    /// Indexes every reply in `messages`.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::ReplyCycle`] if a message is its own ancestor.
    pub fn build(messages: &'m [RawMessage]) -> Result<Self, ThreadError> {
        let parent_of: HashMap<MessageId, MessageId> = messages
            .iter()
            .filter_map(|m| Some((m.id, m.reply_to_id?)))
            .collect();

        let mut resolver = RootResolver::new(&parent_of);
        let mut replies_under: HashMap<MessageId, Vec<&'m RawMessage>> = HashMap::new();
        for message in messages {
            if message.reply_to_id.is_none() {
                continue;
            }
            let root = resolver.resolve(message.id)?;
            replies_under.entry(root).or_default().push(message);
        }

        Ok(Self {
            parent_of,
            replies_under,
        })
    }

    /// The message `id` directly replies to.
    #[must_use]
    pub fn parent_of(&self, id: MessageId) -> Option<MessageId> {
        self.parent_of.get(&id).copied()
    }

    /// Every reply in the tree rooted at `root`, in export order.
    ///
    /// Empty when `root` has no replies or is itself a reply.
    #[must_use]
    pub fn replies_under(&self, root: MessageId) -> &[&'m RawMessage] {
        self.replies_under
            .get(&root)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns `true` if at least one reply resolves to `id`.
    #[must_use]
    pub fn has_replies(&self, id: MessageId) -> bool {
        self.replies_under.contains_key(&id)
    }

    /// Ids of all messages that have replies. Unordered.
    pub fn roots(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.replies_under.keys().copied()
    }

    /// Builds an index from raw groups without checking that roots are not
    /// themselves replies.
    #[cfg(test)]
    pub(crate) fn from_groups(groups: Vec<(MessageId, Vec<&'m RawMessage>)>) -> Self {
        Self {
            parent_of: HashMap::new(),
            replies_under: groups.into_iter().collect(),
        }
    }

    /// Total number of replies across all roots.
    #[must_use]
    pub fn reply_count(&self) -> usize {
        self.parent_of.len()
    }
}

/// Resolves topmost ancestors, remembering the root of every id it walks
/// through so each `parent_of` link is followed at most once per build.
#[derive(Debug)]
struct RootResolver<'p> {
    parent_of: &'p HashMap<MessageId, MessageId>,
    root_of: HashMap<MessageId, MessageId>,
    steps: usize,
}

impl<'p> RootResolver<'p> {
    fn new(parent_of: &'p HashMap<MessageId, MessageId>) -> Self {
        Self {
            parent_of,
            root_of: HashMap::new(),
            steps: 0,
        }
    }

    /// Follows `parent_of` from `start` until an id with a known root or
    /// with no parent.
    ///
    /// An acyclic walk passes each entry at most once, so a path longer
    /// than the number of entries means a cycle.
    fn resolve(&mut self, start: MessageId) -> Result<MessageId, ThreadError> {
        let mut path = Vec::new();
        let mut current = start;
        let root = loop {
            if let Some(&root) = self.root_of.get(&current) {
                break root;
            }
            let Some(&parent) = self.parent_of.get(&current) else {
                break current;
            };
            path.push(current);
            self.steps += 1;
            ensure!(
                path.len() <= self.parent_of.len(),
                ReplyCycleSnafu { id: start }
            );
            current = parent;
        };

        for id in path {
            self.root_of.insert(id, root);
        }
        Ok(root)
    }
}
