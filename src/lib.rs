// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Convert Telegram chat exports to Mattermost bulk-import JSONL.
//!
//! This crate reads the `result.json` written by Telegram Desktop's chat
//! export and produces the JSON Lines stream accepted by Mattermost's bulk
//! import, with reply chains reattached as threads and formatted text
//! rendered as Markdown.
//!
//! # Overview
//!
//! 1. Parse the export into typed messages ([`parser`])
//! 2. Flatten reply trees under their root message ([`thread`])
//! 3. Transform each message into a post ([`transform`]), rendering its
//!    body ([`renderer`]) and converting its timestamp ([`timestamp`])
//! 4. Emit the import stream ([`import`])
//!
//! # Example
//!
//! ```no_run
//! use tg2mm::{config::Config, import, parser};
//!
//! let config = Config::load("config.toml".as_ref())
//!     .unwrap()
//!     .with_attachment_base_dir("export");
//! let json = std::fs::read_to_string("export/result.json").unwrap();
//! let export = parser::parse_export(&json).unwrap();
//!
//! let conversion = import::convert(&config, &export.messages).unwrap();
//! conversion.write_jsonl(std::io::stdout().lock()).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`config`]: settings file and timezone resolution
//! - [`parser`]: JSON parsing and type definitions for Telegram exports
//! - [`timestamp`]: naive local timestamps to epoch milliseconds
//! - [`renderer`]: message bodies to Markdown
//! - [`thread`]: reply chain resolution
//! - [`transform`]: per-message conversion into posts
//! - [`import`]: the bulk-import stream

#![deny(missing_docs)]

pub mod config;
pub mod import;
pub mod parser;
pub mod renderer;
pub mod thread;
pub mod timestamp;
pub mod transform;
