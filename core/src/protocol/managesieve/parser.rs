/*
 * parser.rs
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

//! ManageSieve wire parser (RFC 5804 section 4).
//!
//! A cursor over an immutable byte slice. Every extractor either consumes a
//! complete token and returns its value, or fails without a usable result:
//! `ParseError::Incomplete` when the buffer ends before the token does,
//! `ParseError::Malformed` when the bytes can never become a valid token.
//! On failure the caller discards the parser and retries later from the
//! start of the buffer.

use super::error::ParseError;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const SP: u8 = b' ';
const QUOTE: u8 = b'"';
const BACKSLASH: u8 = b'\\';
const LEFT_BRACE: u8 = b'{';
const RIGHT_BRACE: u8 = b'}';

pub struct ResponseParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ResponseParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn byte_at(&self, offset: usize) -> Result<u8, ParseError> {
        self.data
            .get(self.pos + offset)
            .copied()
            .ok_or(ParseError::Incomplete)
    }

    /// Skip `n` bytes.
    pub fn extract(&mut self, n: usize) -> Result<(), ParseError> {
        if self.pos + n > self.data.len() {
            return Err(ParseError::Incomplete);
        }
        self.pos += n;
        Ok(())
    }

    pub fn is_line_break(&self) -> Result<bool, ParseError> {
        if self.byte_at(0)? != CR {
            return Ok(false);
        }
        Ok(self.byte_at(1)? == LF)
    }

    pub fn extract_line_break(&mut self) -> Result<(), ParseError> {
        if !self.is_line_break()? {
            return Err(ParseError::malformed("line break expected"));
        }
        self.pos += 2;
        Ok(())
    }

    pub fn is_space(&self) -> Result<bool, ParseError> {
        Ok(self.byte_at(0)? == SP)
    }

    pub fn extract_space(&mut self) -> Result<(), ParseError> {
        if !self.is_space()? {
            return Err(ParseError::malformed("space expected"));
        }
        self.pos += 1;
        Ok(())
    }

    pub fn starts_with_byte(&self, b: u8) -> Result<bool, ParseError> {
        Ok(self.byte_at(0)? == b)
    }

    /// Case-insensitive prefix test. Incomplete only while every byte seen
    /// so far still matches.
    pub fn starts_with_ignore_case(&self, token: &str) -> Result<bool, ParseError> {
        for (offset, expected) in token.bytes().enumerate() {
            let b = self.byte_at(offset)?;
            if !b.eq_ignore_ascii_case(&expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn is_quoted(&self) -> Result<bool, ParseError> {
        Ok(self.byte_at(0)? == QUOTE)
    }

    pub fn is_literal(&self) -> Result<bool, ParseError> {
        Ok(self.byte_at(0)? == LEFT_BRACE)
    }

    pub fn is_string(&self) -> Result<bool, ParseError> {
        Ok(matches!(self.byte_at(0)?, QUOTE | LEFT_BRACE))
    }

    /// Quoted string: only `\\` and `\"` escapes, no CR or LF inside.
    pub fn extract_quoted(&mut self) -> Result<String, ParseError> {
        if !self.is_quoted()? {
            return Err(ParseError::malformed("quoted string expected"));
        }
        let mut out = Vec::new();
        let mut i = self.pos + 1;
        loop {
            let b = *self.data.get(i).ok_or(ParseError::Incomplete)?;
            match b {
                QUOTE => {
                    self.pos = i + 1;
                    return Ok(String::from_utf8_lossy(&out).into_owned());
                }
                BACKSLASH => {
                    let escaped = *self.data.get(i + 1).ok_or(ParseError::Incomplete)?;
                    if escaped != QUOTE && escaped != BACKSLASH {
                        return Err(ParseError::malformed(format!(
                            "invalid escape sequence \\{}",
                            escaped as char
                        )));
                    }
                    out.push(escaped);
                    i += 2;
                }
                CR | LF => {
                    return Err(ParseError::malformed("line break inside quoted string"));
                }
                _ => {
                    out.push(b);
                    i += 1;
                }
            }
        }
    }

    /// Literal string: `{n}` or `{n+}`, CRLF, then exactly n octets.
    pub fn extract_literal(&mut self) -> Result<String, ParseError> {
        if !self.is_literal()? {
            return Err(ParseError::malformed("literal expected"));
        }
        let mut i = self.pos + 1;
        let mut size: usize = 0;
        let mut digits = 0;
        loop {
            let b = *self.data.get(i).ok_or(ParseError::Incomplete)?;
            match b {
                b'0'..=b'9' => {
                    size = size
                        .checked_mul(10)
                        .and_then(|s| s.checked_add((b - b'0') as usize))
                        .ok_or_else(|| ParseError::malformed("literal size overflow"))?;
                    digits += 1;
                    i += 1;
                }
                b'+' => {
                    // non-synchronizing marker, must close the size
                    if *self.data.get(i + 1).ok_or(ParseError::Incomplete)? != RIGHT_BRACE {
                        return Err(ParseError::malformed("invalid literal size"));
                    }
                    i += 1;
                }
                RIGHT_BRACE => break,
                _ => return Err(ParseError::malformed("invalid literal size")),
            }
        }
        if digits == 0 {
            return Err(ParseError::malformed("literal without size"));
        }
        i += 1;
        if *self.data.get(i).ok_or(ParseError::Incomplete)? != CR {
            return Err(ParseError::malformed("line break expected after literal size"));
        }
        if *self.data.get(i + 1).ok_or(ParseError::Incomplete)? != LF {
            return Err(ParseError::malformed("line break expected after literal size"));
        }
        i += 2;
        let end = i.checked_add(size).ok_or(ParseError::Incomplete)?;
        if end > self.data.len() {
            return Err(ParseError::Incomplete);
        }
        let text = String::from_utf8_lossy(&self.data[i..end]).into_owned();
        self.pos = end;
        Ok(text)
    }

    /// Quoted or literal, whichever the next byte announces.
    pub fn extract_string(&mut self) -> Result<String, ParseError> {
        if self.is_quoted()? {
            return self.extract_quoted();
        }
        if self.is_literal()? {
            return self.extract_literal();
        }
        Err(ParseError::malformed("string expected"))
    }

    /// Bytes up to (not including) the first delimiter.
    pub fn extract_token(&mut self, delimiters: &[u8]) -> Result<String, ParseError> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|b| delimiters.contains(b))
            .ok_or(ParseError::Incomplete)?;
        let token = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_with_escapes() {
        let mut p = ResponseParser::new(b"\"a\\\"b\\\\c\" rest");
        assert_eq!(p.extract_quoted().unwrap(), "a\"b\\c");
        assert_eq!(p.remaining(), b" rest");
    }

    #[test]
    fn quoted_incomplete_and_malformed() {
        let mut p = ResponseParser::new(b"\"abc");
        assert_eq!(p.extract_quoted(), Err(ParseError::Incomplete));
        assert_eq!(p.position(), 0);

        let mut p = ResponseParser::new(b"\"ab\\");
        assert_eq!(p.extract_quoted(), Err(ParseError::Incomplete));

        let mut p = ResponseParser::new(b"\"ab\r\n\"");
        assert!(matches!(p.extract_quoted(), Err(ParseError::Malformed(_))));

        let mut p = ResponseParser::new(b"\"a\\nb\"");
        assert!(matches!(p.extract_quoted(), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn literal_forms() {
        let mut p = ResponseParser::new(b"{3}\r\nabcdef");
        assert_eq!(p.extract_literal().unwrap(), "abc");
        assert_eq!(p.remaining(), b"def");

        let mut p = ResponseParser::new(b"{3+}\r\nabc");
        assert_eq!(p.extract_string().unwrap(), "abc");
        assert!(p.is_empty());

        let mut p = ResponseParser::new(b"{0}\r\n\r\n");
        assert_eq!(p.extract_literal().unwrap(), "");
        assert!(p.is_line_break().unwrap());
    }

    #[test]
    fn literal_counts_octets_not_chars() {
        let body = "s\u{e9}";
        let wire = format!("{{{}}}\r\n{}", body.len(), body);
        let mut p = ResponseParser::new(wire.as_bytes());
        assert_eq!(p.extract_literal().unwrap(), body);
    }

    #[test]
    fn literal_incomplete_and_malformed() {
        for partial in [&b"{"[..], b"{1", b"{12+", b"{3}", b"{3}\r", b"{3}\r\nab"] {
            let mut p = ResponseParser::new(partial);
            assert_eq!(p.extract_literal(), Err(ParseError::Incomplete), "{:?}", partial);
        }
        for bad in [&b"{}\r\n"[..], b"{3x}\r\nabc", b"{3+x}\r\nabc", b"{3}xx"] {
            let mut p = ResponseParser::new(bad);
            assert!(matches!(p.extract_literal(), Err(ParseError::Malformed(_))), "{:?}", bad);
        }
    }

    #[test]
    fn line_break_needs_two_bytes() {
        let p = ResponseParser::new(b"\r");
        assert_eq!(p.is_line_break(), Err(ParseError::Incomplete));
        let p = ResponseParser::new(b"\rx");
        assert_eq!(p.is_line_break(), Ok(false));
        let mut p = ResponseParser::new(b"x");
        assert!(matches!(p.extract_line_break(), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn tokens_and_prefixes() {
        let mut p = ResponseParser::new(b"ACTIVE\r\n");
        assert_eq!(p.extract_token(b"\r").unwrap(), "ACTIVE");
        assert!(p.is_line_break().unwrap());

        let mut p = ResponseParser::new(b"ACTI");
        assert_eq!(p.extract_token(b"\r"), Err(ParseError::Incomplete));

        let p = ResponseParser::new(b"o");
        assert_eq!(p.starts_with_ignore_case("OK"), Err(ParseError::Incomplete));
        let p = ResponseParser::new(b"N");
        assert_eq!(p.starts_with_ignore_case("OK"), Ok(false));
        let p = ResponseParser::new(b"bye ");
        assert_eq!(p.starts_with_ignore_case("BYE"), Ok(true));
    }
}
