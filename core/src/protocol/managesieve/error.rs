/*
 * error.rs
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

//! ManageSieve error types: wire-level parse errors and the session-facing
//! `SieveError`.

use std::io;

use thiserror::Error;

use super::response::{ReferralTarget, SimpleResponse};
use crate::sasl::SaslError;

/// Outcome of a failed parse attempt against the receive buffer.
///
/// `Incomplete` is recoverable: the pump keeps the buffer and waits for more
/// bytes. `Malformed` means the bytes can never form a valid response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("more data needed")]
    Incomplete,
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ParseError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ParseError::Malformed(msg.into())
    }
}

/// Error returned by requests and session operations.
#[derive(Debug, Error)]
pub enum SieveError {
    /// Local misuse: nothing was sent, the connection is unaffected.
    #[error("{0}")]
    Client(String),
    /// The server answered NO (or BYE without a referral).
    #[error("{0}")]
    Server(SimpleResponse),
    /// The server answered BYE (REFERRAL ...).
    #[error("referred to {0}")]
    Referral(ReferralTarget),
    /// Timed out, canceled, or the connection went away while queued.
    #[error("request abandoned: {0}")]
    Abandoned(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Sasl(#[from] SaslError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SieveError {
    pub fn client(msg: impl Into<String>) -> Self {
        SieveError::Client(msg.into())
    }

    /// The server response behind a `Server` error, if any.
    pub fn response(&self) -> Option<&SimpleResponse> {
        match self {
            SieveError::Server(response) => Some(response),
            _ => None,
        }
    }
}

impl From<ParseError> for SieveError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Incomplete => SieveError::Malformed("truncated response".to_string()),
            ParseError::Malformed(msg) => SieveError::Malformed(msg),
        }
    }
}
