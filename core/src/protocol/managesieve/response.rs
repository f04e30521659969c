/*
 * response.rs
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

//! Typed ManageSieve responses decoded from the receive buffer.
//!
//! Every response ends with a status line: `OK` / `NO` / `BYE`, an optional
//! parenthesized response code, an optional human-readable string, CRLF.
//! CAPABILITY, LISTSCRIPTS and GETSCRIPT prepend payload lines.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::error::{ParseError, SieveError};
use super::parser::ResponseParser;

/// Default ManageSieve port (RFC 5804 section 1.8).
pub const DEFAULT_PORT: u16 = 4190;

/// Response codes defined by RFC 5804 section 1.3.
pub mod codes {
    pub const AUTH_TOO_WEAK: &str = "AUTH-TOO-WEAK";
    pub const ENCRYPT_NEEDED: &str = "ENCRYPT-NEEDED";
    pub const QUOTA: &str = "QUOTA";
    pub const QUOTA_MAXSCRIPTS: &str = "QUOTA/MAXSCRIPTS";
    pub const QUOTA_MAXSIZE: &str = "QUOTA/MAXSIZE";
    pub const REFERRAL: &str = "REFERRAL";
    pub const SASL: &str = "SASL";
    pub const TRANSITION_NEEDED: &str = "TRANSITION-NEEDED";
    pub const TRYLATER: &str = "TRYLATER";
    pub const ACTIVE: &str = "ACTIVE";
    pub const NONEXISTENT: &str = "NONEXISTENT";
    pub const ALREADYEXISTS: &str = "ALREADYEXISTS";
    pub const WARNINGS: &str = "WARNINGS";
    pub const TAG: &str = "TAG";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bye,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bye => "BYE",
        })
    }
}

/// Parenthesized response code, e.g. `(SASL "dj1...")`: atoms and strings in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCode {
    items: Vec<String>,
}

impl ResponseCode {
    pub fn new(items: Vec<String>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn name(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    pub fn is(&self, code: &str) -> bool {
        self.name().map_or(false, |n| n.eq_ignore_ascii_case(code))
    }

    /// Base64 payload of a `(SASL "...")` code.
    pub fn sasl(&self) -> Option<&str> {
        if !self.is(codes::SASL) {
            return None;
        }
        self.items.get(1).map(String::as_str)
    }

    pub fn referral(&self) -> Option<ReferralTarget> {
        if !self.is(codes::REFERRAL) {
            return None;
        }
        self.items.get(1).and_then(|url| ReferralTarget::parse(url))
    }
}

/// Host and port named by a `sieve://` referral URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralTarget {
    pub host: String,
    pub port: u16,
}

impl ReferralTarget {
    /// Parse `sieve://host[:port][/path]`. Path is dropped, port defaults to 4190.
    pub fn parse(url: &str) -> Option<Self> {
        let scheme = "sieve://";
        let rest = url
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &url[scheme.len()..])?;
        let authority = rest.split('/').next().unwrap_or("");
        // drop userinfo
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        let (host, port) = if let Some(stripped) = authority.strip_prefix('[') {
            let end = stripped.find(']')?;
            let host = &stripped[..end];
            let port = match stripped[end + 1..].strip_prefix(':') {
                Some(p) => p.parse().ok()?,
                None => DEFAULT_PORT,
            };
            (host, port)
        } else {
            match authority.rfind(':') {
                Some(i) => (&authority[..i], authority[i + 1..].parse().ok()?),
                None => (authority, DEFAULT_PORT),
            }
        };
        if host.is_empty() {
            return None;
        }
        Some(Self { host: host.to_string(), port })
    }
}

impl fmt::Display for ReferralTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "sieve://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "sieve://{}:{}", self.host, self.port)
        }
    }
}

/// Status line: status, response code, message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleResponse {
    pub status: Status,
    pub code: ResponseCode,
    pub message: String,
}

impl SimpleResponse {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            code: ResponseCode::default(),
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn parse(parser: &mut ResponseParser<'_>) -> Result<Self, ParseError> {
        let status = if parser.starts_with_ignore_case("OK")? {
            parser.extract(2)?;
            Status::Ok
        } else if parser.starts_with_ignore_case("NO")? {
            parser.extract(2)?;
            Status::No
        } else if parser.starts_with_ignore_case("BYE")? {
            parser.extract(3)?;
            Status::Bye
        } else {
            return Err(ParseError::malformed("OK, NO or BYE expected"));
        };

        let mut response = SimpleResponse::new(status, "");
        if parser.is_line_break()? {
            parser.extract_line_break()?;
            return Ok(response);
        }
        parser.extract_space()?;

        if parser.starts_with_byte(b'(')? {
            parser.extract(1)?;
            response.code = parse_response_code(parser)?;
            if parser.is_line_break()? {
                parser.extract_line_break()?;
                return Ok(response);
            }
            parser.extract_space()?;
        }

        response.message = if parser.is_string()? {
            parser.extract_string()?
        } else {
            // tolerate servers sending a bare text message
            parser.extract_token(b"\r")?
        };
        parser.extract_line_break()?;
        Ok(response)
    }
}

fn parse_response_code(parser: &mut ResponseParser<'_>) -> Result<ResponseCode, ParseError> {
    let mut items = Vec::new();
    loop {
        if parser.starts_with_byte(b')')? {
            parser.extract(1)?;
            return Ok(ResponseCode::new(items));
        }
        if parser.is_space()? {
            parser.extract_space()?;
        } else if parser.is_string()? {
            items.push(parser.extract_string()?);
        } else if parser.is_line_break()? {
            return Err(ParseError::malformed("unterminated response code"));
        } else {
            items.push(parser.extract_token(b" )\r")?);
        }
    }
}

impl fmt::Display for SimpleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if !self.code.is_empty() {
            write!(f, " ({})", self.code.items.join(" "))?;
        }
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

/// Server capabilities as advertised in the greeting or a CAPABILITY reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub implementation: String,
    pub version: Option<String>,
    pub sasl: Vec<String>,
    pub sieve: Vec<String>,
    pub starttls: bool,
    pub notify: Vec<String>,
    pub language: String,
    pub owner: Option<String>,
    /// None means no limit was advertised.
    pub max_redirects: Option<u32>,
    pub noop: bool,
    pub checkscript: bool,
    pub renamescript: bool,
    pub other: BTreeMap<String, String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            implementation: String::new(),
            version: None,
            sasl: Vec::new(),
            sieve: Vec::new(),
            starttls: false,
            notify: Vec::new(),
            language: "i-default".to_string(),
            owner: None,
            max_redirects: None,
            noop: false,
            checkscript: false,
            renamescript: false,
            other: BTreeMap::new(),
        }
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Capabilities {
    fn apply(&mut self, key: &str, value: Option<String>) {
        match key.to_ascii_uppercase().as_str() {
            "IMPLEMENTATION" => self.implementation = value.unwrap_or_default(),
            "SASL" => self.sasl = split_list(value.as_deref()),
            "SIEVE" => self.sieve = split_list(value.as_deref()),
            "STARTTLS" => self.starttls = true,
            "NOTIFY" => self.notify = split_list(value.as_deref()),
            "LANGUAGE" => {
                if let Some(v) = value {
                    self.language = v;
                }
            }
            "OWNER" => self.owner = value,
            "MAXREDIRECTS" => self.max_redirects = value.and_then(|v| v.trim().parse().ok()),
            "VERSION" => {
                // RFC 5804 servers (VERSION 1.0) implement all three extensions
                let major = value
                    .as_deref()
                    .and_then(|v| v.trim().parse::<f32>().ok())
                    .unwrap_or(0.0);
                if major >= 1.0 {
                    self.noop = true;
                    self.checkscript = true;
                    self.renamescript = true;
                }
                self.version = value;
            }
            "RENAME" | "RENAMESCRIPT" => self.renamescript = true,
            "NOOP" => self.noop = true,
            "CHECKSCRIPT" => self.checkscript = true,
            other => {
                self.other.insert(other.to_string(), value.unwrap_or_default());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
    pub response: SimpleResponse,
}

impl CapabilitiesResponse {
    pub fn parse(parser: &mut ResponseParser<'_>) -> Result<Self, ParseError> {
        let mut capabilities = Capabilities::default();
        let mut has_implementation = false;
        while parser.is_string()? {
            let key = parser.extract_string()?;
            let value = if parser.is_line_break()? {
                None
            } else {
                parser.extract_space()?;
                Some(parser.extract_string()?)
            };
            parser.extract_line_break()?;
            if key.eq_ignore_ascii_case("IMPLEMENTATION") {
                has_implementation = true;
            }
            capabilities.apply(&key, value);
        }
        let response = SimpleResponse::parse(parser)?;
        // a refusing server (BYE with REFERRAL, NO) may skip the capability block
        if !has_implementation && response.is_ok() {
            return Err(ParseError::malformed(
                "server did not provide an IMPLEMENTATION capability",
            ));
        }
        Ok(Self { capabilities, response })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct ListScriptsResponse {
    pub scripts: Vec<ScriptEntry>,
    pub response: SimpleResponse,
}

impl ListScriptsResponse {
    pub fn parse(parser: &mut ResponseParser<'_>) -> Result<Self, ParseError> {
        let mut scripts = Vec::new();
        while parser.is_string()? {
            let name = parser.extract_string()?;
            let mut active = false;
            if !parser.is_line_break()? {
                parser.extract_space()?;
                let flag = parser.extract_token(b"\r")?;
                if !flag.eq_ignore_ascii_case(codes::ACTIVE) {
                    return Err(ParseError::malformed(format!("ACTIVE expected, got {}", flag)));
                }
                active = true;
            }
            parser.extract_line_break()?;
            scripts.push(ScriptEntry { name, active });
        }
        let response = SimpleResponse::parse(parser)?;
        Ok(Self { scripts, response })
    }
}

#[derive(Debug, Clone)]
pub struct GetScriptResponse {
    pub script: Option<String>,
    pub response: SimpleResponse,
}

impl GetScriptResponse {
    pub fn parse(parser: &mut ResponseParser<'_>) -> Result<Self, ParseError> {
        let mut script = None;
        if parser.is_string()? {
            script = Some(parser.extract_string()?);
            parser.extract_line_break()?;
        }
        let response = SimpleResponse::parse(parser)?;
        Ok(Self { script, response })
    }
}

/// A SASL server challenge: a base64 string on a line of its own.
pub fn parse_challenge(parser: &mut ResponseParser<'_>) -> Result<Vec<u8>, ParseError> {
    let encoded = parser.extract_string()?;
    parser.extract_line_break()?;
    decode_base64(&encoded)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, ParseError> {
    BASE64
        .decode(encoded.trim())
        .map_err(|e| ParseError::malformed(format!("invalid base64: {}", e)))
}

/// Final result of a completed request.
#[derive(Debug, Clone)]
pub enum Response {
    Simple(SimpleResponse),
    Capabilities(CapabilitiesResponse),
    ListScripts(ListScriptsResponse),
    GetScript(GetScriptResponse),
}

impl Response {
    pub fn simple(&self) -> &SimpleResponse {
        match self {
            Response::Simple(r) => r,
            Response::Capabilities(r) => &r.response,
            Response::ListScripts(r) => &r.response,
            Response::GetScript(r) => &r.response,
        }
    }

    pub fn status(&self) -> Status {
        self.simple().status
    }

    pub fn into_capabilities(self) -> Result<Capabilities, SieveError> {
        match self {
            Response::Capabilities(r) => Ok(r.capabilities),
            other => Err(unexpected(&other)),
        }
    }

    pub fn into_scripts(self) -> Result<Vec<ScriptEntry>, SieveError> {
        match self {
            Response::ListScripts(r) => Ok(r.scripts),
            other => Err(unexpected(&other)),
        }
    }

    pub fn into_script(self) -> Result<String, SieveError> {
        match self {
            Response::GetScript(r) => Ok(r.script.unwrap_or_default()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> SieveError {
    SieveError::Malformed(format!("unexpected response: {}", response.simple()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(data: &[u8]) -> Result<SimpleResponse, ParseError> {
        SimpleResponse::parse(&mut ResponseParser::new(data))
    }

    #[test]
    fn bare_status() {
        assert_eq!(simple(b"OK\r\n").unwrap(), SimpleResponse::new(Status::Ok, ""));
        assert_eq!(simple(b"no\r\n").unwrap().status, Status::No);
    }

    #[test]
    fn status_with_code_and_message() {
        let r = simple(b"NO (QUOTA/MAXSIZE) \"Script too large\"\r\n").unwrap();
        assert_eq!(r.status, Status::No);
        assert!(r.code.is(codes::QUOTA_MAXSIZE));
        assert_eq!(r.message, "Script too large");
        assert_eq!(r.to_string(), "NO (QUOTA/MAXSIZE) Script too large");

        let r = simple(b"OK (SASL \"dj1ybUY5\")\r\n").unwrap();
        assert_eq!(r.code.sasl(), Some("dj1ybUY5"));
        assert!(r.message.is_empty());

        let r = simple(b"OK {5}\r\nhello\r\n").unwrap();
        assert_eq!(r.message, "hello");
    }

    #[test]
    fn referral() {
        let r = simple(b"BYE (REFERRAL \"sieve://other.example.com\") \"Try elsewhere\"\r\n")
            .unwrap();
        assert_eq!(r.status, Status::Bye);
        assert_eq!(
            r.code.referral(),
            Some(ReferralTarget { host: "other.example.com".into(), port: 4190 })
        );
        assert_eq!(
            ReferralTarget::parse("SIEVE://h:2000/path/"),
            Some(ReferralTarget { host: "h".into(), port: 2000 })
        );
        assert_eq!(
            ReferralTarget::parse("sieve://[::1]:4191"),
            Some(ReferralTarget { host: "::1".into(), port: 4191 })
        );
        assert_eq!(ReferralTarget::parse("imap://h"), None);
        assert_eq!(ReferralTarget::parse("sieve://h:notaport"), None);
    }

    #[test]
    fn referral_with_non_ascii_url() {
        assert_eq!(ReferralTarget::parse("sieve:/\u{e9}x"), None);
        assert_eq!(ReferralTarget::parse("si\u{e9}ve://h"), None);
        assert_eq!(
            ReferralTarget::parse("sieve://b\u{fc}ro.example:2000"),
            Some(ReferralTarget { host: "b\u{fc}ro.example".into(), port: 2000 })
        );
        let r = simple("BYE (REFERRAL \"sieve:/\u{e9}x\") \"moved\"\r\n".as_bytes()).unwrap();
        assert_eq!(r.status, Status::Bye);
        assert_eq!(r.code.referral(), None);
    }

    #[test]
    fn status_incomplete_vs_malformed() {
        let partials = [
            &b""[..],
            b"O",
            b"B",
            b"BY",
            b"OK",
            b"OK ",
            b"OK (SASL \"ab",
            b"OK \"msg\"",
            b"OK \"msg\"\r",
        ];
        for partial in partials {
            assert_eq!(simple(partial), Err(ParseError::Incomplete), "{:?}", partial);
        }
        assert!(matches!(simple(b"BAD\r\n"), Err(ParseError::Malformed(_))));
        assert!(matches!(simple(b"OK (X\r\n"), Err(ParseError::Malformed(_))));
    }

    const CAPS: &[u8] = b"\"IMPLEMENTATION\" \"Dovecot Pigeonhole\"\r\n\
\"SIEVE\" \"fileinto reject envelope\"\r\n\
\"NOTIFY\" \"mailto\"\r\n\
\"SASL\" \"PLAIN SCRAM-SHA-256 LOGIN\"\r\n\
\"STARTTLS\"\r\n\
\"MAXREDIRECTS\" \"4\"\r\n\
\"VERSION\" \"1.0\"\r\n\
\"X-CUSTOM\" \"yes\"\r\n\
OK \"Ready.\"\r\n";

    #[test]
    fn capabilities() {
        let mut p = ResponseParser::new(CAPS);
        let r = CapabilitiesResponse::parse(&mut p).unwrap();
        assert!(p.is_empty());
        let c = r.capabilities;
        assert_eq!(c.implementation, "Dovecot Pigeonhole");
        assert_eq!(c.sieve, vec!["fileinto", "reject", "envelope"]);
        assert_eq!(c.sasl, vec!["PLAIN", "SCRAM-SHA-256", "LOGIN"]);
        assert_eq!(c.notify, vec!["mailto"]);
        assert!(c.starttls);
        assert_eq!(c.max_redirects, Some(4));
        assert_eq!(c.language, "i-default");
        assert!(c.noop && c.checkscript && c.renamescript);
        assert_eq!(c.other.get("X-CUSTOM").map(String::as_str), Some("yes"));
        assert_eq!(r.response.message, "Ready.");
    }

    #[test]
    fn capabilities_every_split_is_incomplete() {
        for cut in 0..CAPS.len() {
            let mut p = ResponseParser::new(&CAPS[..cut]);
            assert_eq!(
                CapabilitiesResponse::parse(&mut p).err(),
                Some(ParseError::Incomplete),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn capabilities_without_implementation() {
        let mut p = ResponseParser::new(b"\"SASL\" \"PLAIN\"\r\nOK\r\n");
        assert!(matches!(CapabilitiesResponse::parse(&mut p), Err(ParseError::Malformed(_))));

        let mut p = ResponseParser::new(b"BYE (REFERRAL \"sieve://other.example\") \"moved\"\r\n");
        let r = CapabilitiesResponse::parse(&mut p).unwrap();
        assert_eq!(r.response.status, Status::Bye);
        assert_eq!(r.response.code.referral().map(|t| t.host), Some("other.example".to_string()));
    }

    #[test]
    fn pre_rfc_capabilities() {
        let mut p = ResponseParser::new(
            b"\"IMPLEMENTATION\" \"old\"\r\n\"RENAME\"\r\n\"SASL\" \"\"\r\nOK\r\n",
        );
        let c = CapabilitiesResponse::parse(&mut p).unwrap().capabilities;
        assert!(c.renamescript);
        assert!(!c.noop && !c.checkscript);
        assert!(c.sasl.is_empty());
    }

    #[test]
    fn listscripts() {
        let data = b"\"summer\"\r\n\"main\" ACTIVE\r\n{7}\r\nvacance\r\nOK\r\n";
        let mut p = ResponseParser::new(data);
        let r = ListScriptsResponse::parse(&mut p).unwrap();
        assert_eq!(
            r.scripts,
            vec![
                ScriptEntry { name: "summer".into(), active: false },
                ScriptEntry { name: "main".into(), active: true },
                ScriptEntry { name: "vacance".into(), active: false },
            ]
        );
        let mut p = ResponseParser::new(b"\"x\" PASSIVE\r\nOK\r\n");
        assert!(matches!(ListScriptsResponse::parse(&mut p), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn getscript() {
        let mut p = ResponseParser::new(b"{14}\r\nkeep;\r\nstop;\r\n\r\nOK\r\n");
        let r = GetScriptResponse::parse(&mut p).unwrap();
        assert_eq!(r.script.as_deref(), Some("keep;\r\nstop;\r\n"));
        assert!(r.response.is_ok());

        let mut p = ResponseParser::new(b"NO (NONEXISTENT) \"No such script\"\r\n");
        let r = GetScriptResponse::parse(&mut p).unwrap();
        assert!(r.script.is_none());
        assert!(r.response.code.is(codes::NONEXISTENT));
    }
}
