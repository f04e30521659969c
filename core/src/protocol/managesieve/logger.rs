/*
 * logger.rs
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

//! Category-filtered protocol logging on top of the `log` facade.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, trace, warn};

bitflags! {
    /// Which protocol events a session logs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LogLevel: u8 {
        /// Outgoing commands.
        const REQUEST = 1 << 0;
        /// Parsed responses.
        const RESPONSE = 1 << 1;
        /// Pump and request state changes.
        const STATE = 1 << 2;
        /// Raw bytes read from the stream.
        const STREAM = 1 << 3;
        /// Connect, STARTTLS, authentication, referral.
        const SESSION = 1 << 4;
    }
}

/// Per-session logger. Cheap to clone; the prefix identifies the session.
#[derive(Debug, Clone)]
pub struct SieveLogger {
    prefix: Arc<str>,
    level: LogLevel,
}

impl SieveLogger {
    pub fn new(prefix: &str, level: LogLevel) -> Self {
        Self {
            prefix: Arc::from(prefix),
            level,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.level.intersects(level)
    }

    pub fn request(&self, message: impl fmt::Display) {
        if self.is_enabled(LogLevel::REQUEST) {
            debug!(target: "managesieve::request", "[{}] >> {}", self.prefix, message);
        }
    }

    pub fn response(&self, message: impl fmt::Display) {
        if self.is_enabled(LogLevel::RESPONSE) {
            debug!(target: "managesieve::response", "[{}] << {}", self.prefix, message);
        }
    }

    pub fn state(&self, message: impl fmt::Display) {
        if self.is_enabled(LogLevel::STATE) {
            debug!(target: "managesieve::state", "[{}] {}", self.prefix, message);
        }
    }

    pub fn stream(&self, bytes: &[u8]) {
        if self.is_enabled(LogLevel::STREAM) {
            trace!(
                target: "managesieve::stream",
                "[{}] {} bytes: {:?}",
                self.prefix,
                bytes.len(),
                String::from_utf8_lossy(bytes)
            );
        }
    }

    pub fn session(&self, message: impl fmt::Display) {
        if self.is_enabled(LogLevel::SESSION) {
            debug!(target: "managesieve::session", "[{}] {}", self.prefix, message);
        }
    }

    /// Problems nobody is waiting to hear about. Always emitted.
    pub fn warn(&self, message: impl fmt::Display) {
        warn!(target: "managesieve", "[{}] {}", self.prefix, message);
    }
}
