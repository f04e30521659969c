/*
 * builder.rs
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

//! Builds one ManageSieve command line.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Append-only command assembler. Tokens are separated by a single space;
/// `into_bytes` terminates the command with CRLF.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    data: String,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw token (command name, pre-rendered string).
    pub fn add_literal(&mut self, literal: &str) -> &mut Self {
        if !self.data.is_empty() {
            self.data.push(' ');
        }
        self.data.push_str(literal);
        self
    }

    pub fn add_quoted_string(&mut self, s: &str) -> &mut Self {
        let quoted = quote_string(s);
        self.add_literal(&quoted)
    }

    /// Non-synchronizing literal sized in UTF-8 octets: `{len+}` CRLF payload.
    pub fn add_multiline_string(&mut self, s: &str) -> &mut Self {
        let literal = format!("{{{}+}}\r\n{}", s.len(), s);
        self.add_literal(&literal)
    }

    /// SASL payloads travel as quoted base64 (RFC 5804 section 2.1).
    pub fn add_quoted_base64(&mut self, payload: &[u8]) -> &mut Self {
        let quoted = format!("\"{}\"", BASE64.encode(payload));
        self.add_literal(&quoted)
    }

    /// The rendered command without the terminating CRLF (for logging).
    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.data.into_bytes();
        bytes.extend_from_slice(b"\r\n");
        bytes
    }
}

/// Quote a string: escape `\` and `"`, wrap in double quotes.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Rewrite every line break variant (CRLF, CR, LF, NEL, FF, LS, PS) to CRLF.
pub fn normalize_line_breaks(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' | '\u{85}' | '\u{0C}' | '\u{2028}' | '\u{2029}' => out.push_str("\r\n"),
            _ => out.push(c),
        }
    }
    out
}
