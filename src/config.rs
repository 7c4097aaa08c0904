// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Conversion settings.
//!
//! The settings file is TOML:
//!
//! ```toml
//! timezone = "Europe/Busingen"
//!
//! [import_into]
//! team = "example"
//! channel = "town square"
//!
//! [users]
//! user123 = "abc"
//! ```
//!
//! `timezone` is optional and defaults to UTC. The attachment base
//! directory is not part of the file; callers set it per run with
//! [`Config::with_attachment_base_dir`].

use chrono_tz::Tz;
use serde::Deserialize;
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Error type for loading and interpreting settings.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[snafu(display("failed to read {}: {source}", path.display()))]
    Read {
        /// Path of the settings file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or misses required keys.
    #[snafu(display("failed to parse settings: {source}"))]
    Toml {
        /// The underlying TOML error.
        source: toml::de::Error,
    },

    /// `timezone` is not an IANA zone name.
    #[snafu(display("invalid timezone {name:?}"))]
    InvalidTimezone {
        /// The configured name.
        name: String,
    },
}

/// Where imported posts land.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImportTarget {
    /// Team name.
    pub team: String,
    /// Channel name within the team.
    pub channel: String,
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Export sender key (e.g. `user123`) to target username.
    pub users: HashMap<String, String>,

    /// Team and channel receiving every post.
    pub import_into: ImportTarget,

    /// IANA zone the export timestamps were written in.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Directory attachment paths are resolved against.
    #[serde(skip)]
    pub attachment_base_dir: PathBuf,
}

impl Config {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] when the text is malformed or a required
    /// key is missing.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).context(TomlSnafu)
    }

    /// Reads and parses a settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), users = config.users.len(), "Loaded settings");
        Ok(config)
    }

    /// Sets the directory attachment paths are resolved against.
    #[must_use]
    pub fn with_attachment_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.attachment_base_dir = dir.into();
        self
    }

    /// Resolves the configured zone, UTC when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimezone`] for an unknown zone name.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        match self.timezone.as_deref() {
            None => Ok(Tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .ok()
                .context(InvalidTimezoneSnafu { name }),
        }
    }

    /// Target username for an export sender key.
    #[must_use]
    pub fn user(&self, sender_id: &str) -> Option<&str> {
        self.users.get(sender_id).map(String::as_str)
    }
}
