/*
 * mechanism.rs
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

//! SASL mechanism names, metadata and selection against the server list.

use super::{HashAlgorithm, SaslError};

/// Mechanisms the client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// Legacy LOGIN: base64 username, then base64 password. Last resort only.
    Login,
    /// EXTERNAL (RFC 4422 appendix A): identity from the TLS layer.
    External,
    ScramSha1,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::Login => "LOGIN",
            SaslMechanism::External => "EXTERNAL",
            SaslMechanism::ScramSha1 => "SCRAM-SHA-1",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Some(SaslMechanism::Plain),
            "LOGIN" => Some(SaslMechanism::Login),
            "EXTERNAL" => Some(SaslMechanism::External),
            "SCRAM-SHA-1" => Some(SaslMechanism::ScramSha1),
            "SCRAM-SHA-256" => Some(SaslMechanism::ScramSha256),
            "SCRAM-SHA-512" => Some(SaslMechanism::ScramSha512),
            _ => None,
        }
    }

    /// Whether the credentials callback must supply a password.
    pub fn has_password(&self) -> bool {
        !matches!(self, SaslMechanism::External)
    }

    /// Whether a proxy authorization identity can be sent.
    pub fn is_authorizable(&self) -> bool {
        !matches!(self, SaslMechanism::Login)
    }

    pub fn scram_hash(&self) -> Option<HashAlgorithm> {
        match self {
            SaslMechanism::ScramSha1 => Some(HashAlgorithm::Sha1),
            SaslMechanism::ScramSha256 => Some(HashAlgorithm::Sha256),
            SaslMechanism::ScramSha512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }
}

impl std::fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pick a mechanism from the server's list (server priority order).
///
/// A forced mechanism must be advertised by the server. Otherwise the first
/// recognised mechanism wins, except that LOGIN is only chosen when nothing
/// else matches.
pub fn select_mechanism(
    server: &[String],
    forced: Option<&str>,
) -> Result<SaslMechanism, SaslError> {
    let no_match = || SaslError::invalid("No compatible SASL Mechanism");

    if let Some(forced) = forced {
        if !server.iter().any(|m| m.eq_ignore_ascii_case(forced)) {
            return Err(no_match());
        }
        return SaslMechanism::from_name(forced).ok_or_else(no_match);
    }

    let mut candidates: Vec<SaslMechanism> = server
        .iter()
        .filter_map(|m| SaslMechanism::from_name(m))
        .collect();
    if let Some(i) = candidates.iter().position(|m| *m == SaslMechanism::Login) {
        let login = candidates.remove(i);
        candidates.push(login);
    }
    candidates.into_iter().next().ok_or_else(no_match)
}
