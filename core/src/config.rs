/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Session configuration.
//!
//! Options arrive as a JSON object from the embedding application (the same
//! map the account settings store). Missing keys take their defaults; there
//! is no process-wide state.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::managesieve::logger::LogLevel;

pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

/// Which SASL mechanism to authenticate with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum SaslPreference {
    /// Best mechanism the server offers.
    #[default]
    Default,
    /// Skip authentication.
    None,
    /// This mechanism or nothing.
    Mechanism(String),
}

impl From<String> for SaslPreference {
    fn from(s: String) -> Self {
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            SaslPreference::Default
        } else if s.eq_ignore_ascii_case("none") {
            SaslPreference::None
        } else {
            SaslPreference::Mechanism(s)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    /// `LogLevel` bits.
    pub log_level: u8,
    pub sasl: SaslPreference,
    /// Idle keep-alive interval in milliseconds; 0 disables it.
    pub keep_alive: u64,
    /// Response timeout in milliseconds.
    pub timeout: u64,
    /// Whether the connection must be upgraded with STARTTLS.
    pub secure: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            log_level: 0,
            sasl: SaslPreference::Default,
            keep_alive: 0,
            timeout: DEFAULT_TIMEOUT_MS,
            secure: true,
        }
    }
}

impl SessionOptions {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_bits_truncate(self.log_level)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        match self.keep_alive {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
