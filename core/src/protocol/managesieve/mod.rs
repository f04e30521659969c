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

//! ManageSieve (RFC 5804) client.
//!
//! Layers, bottom up: wire `parser` and `builder`, typed `response`s,
//! `request` state machines, the `queue`, the `client` message pump that
//! owns the connection, and the `session` that runs the handshake and
//! exposes the script operations.

pub mod builder;
pub mod client;
pub mod compatibility;
pub mod error;
pub mod logger;
pub mod parser;
pub mod queue;
pub mod request;
pub mod response;
pub mod session;

pub use client::{ClientHooks, ClientOptions, Security, SieveClient};
pub use compatibility::Compatibility;
pub use error::{ParseError, SieveError};
pub use logger::{LogLevel, SieveLogger};
pub use request::{Command, Request, RequestResult, SaslCredentials, SaslRequest};
pub use response::{
    Capabilities, ReferralTarget, Response, ResponseCode, ScriptEntry, SimpleResponse, Status,
    DEFAULT_PORT,
};
pub use session::{Credentials, SieveSession, MAX_REFERRALS};
