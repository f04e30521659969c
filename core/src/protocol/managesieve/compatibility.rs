/*
 * compatibility.rs
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

//! What the connected server supports, as far as the session cares.

use super::response::Capabilities;

/// Replaced wholesale on every capability block (greeting, CAPABILITY,
/// post-STARTTLS re-advertisement).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compatibility {
    pub starttls: bool,
    /// Server priority order.
    pub sasl: Vec<String>,
    pub noop: bool,
    pub checkscript: bool,
    pub renamescript: bool,
}

impl Default for Compatibility {
    /// Before the greeting nothing is known: assume the minimal RFC 5804
    /// server, which must offer STARTTLS.
    fn default() -> Self {
        Self {
            starttls: true,
            sasl: Vec::new(),
            noop: false,
            checkscript: false,
            renamescript: false,
        }
    }
}

impl Compatibility {
    pub fn from_capabilities(capabilities: &Capabilities) -> Self {
        Self {
            starttls: capabilities.starttls,
            sasl: capabilities.sasl.clone(),
            noop: capabilities.noop,
            checkscript: capabilities.checkscript,
            renamescript: capabilities.renamescript,
        }
    }
}
