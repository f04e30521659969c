/*
 * mod.rs
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

//! SASL client side for ManageSieve AUTHENTICATE: PLAIN, LOGIN, EXTERNAL and
//! SCRAM-SHA-1/256/512.
//!
//! - mechanism names, metadata and server-list selection
//! - PLAIN payload encoding
//! - SCRAM exchange state (RFC 5802) over a pluggable crypto provider

mod crypto;
mod mechanism;
mod plain;
mod scram;

pub use crypto::{HashAlgorithm, ScramCrypto};
pub use mechanism::{select_mechanism, SaslMechanism};
pub use plain::encode_plain;
pub use scram::{
    generate_nonce, parse_server_final, parse_server_first, sasl_name, ScramExchange, ServerFinal,
};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SaslError {
    pub message: String,
}

impl SaslError {
    pub fn invalid(msg: &str) -> Self {
        Self { message: msg.to_string() }
    }
}
