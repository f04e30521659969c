/*
 * request.rs
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

//! ManageSieve requests.
//!
//! `Command` is the closed set of protocol commands. Each knows whether it
//! sends anything, how many round trips it still needs, how to render its
//! next message, and how to decode the server's answer. SASL commands carry
//! an explicit per-mechanism state machine.
//!
//! `Request` wraps a command for the message pump: optional flag, in-flight
//! flag, abandonment, and the channel that resolves the caller's future.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::builder::{normalize_line_breaks, RequestBuilder};
use super::error::{ParseError, SieveError};
use super::parser::ResponseParser;
use super::response::{
    decode_base64, parse_challenge, CapabilitiesResponse, GetScriptResponse, ListScriptsResponse,
    Response, SimpleResponse, Status,
};
use crate::sasl::{
    encode_plain, parse_server_final, SaslMechanism, ScramCrypto, ScramExchange, ServerFinal,
};

pub type RequestResult = Result<Response, SieveError>;

#[derive(Debug, Clone, Default)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
    /// Proxy authorization identity; empty for none.
    pub authorization: String,
}

/// PLAIN and EXTERNAL: one message, one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleState {
    Initial,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Initial,
    SendUsername,
    SendPassword,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramState {
    FirstMessage,
    FinalMessage,
    /// Verifier arrived as a challenge; an empty client response is due.
    EmptyMessage,
    Completed,
}

#[derive(Debug, Clone)]
enum SaslState {
    Plain(SingleState),
    External(SingleState),
    Login(LoginState),
    Scram {
        state: ScramState,
        exchange: ScramExchange,
        server_first: Option<String>,
        verifier: Option<Vec<u8>>,
    },
}

/// AUTHENTICATE with one SASL mechanism.
#[derive(Debug, Clone)]
pub struct SaslRequest {
    mechanism: SaslMechanism,
    credentials: SaslCredentials,
    state: SaslState,
}

impl SaslRequest {
    pub fn new(mechanism: SaslMechanism, credentials: SaslCredentials) -> Self {
        let state = match mechanism.scram_hash() {
            Some(hash) => scram_state(ScramExchange::new(Arc::new(hash))),
            None => match mechanism {
                SaslMechanism::Login => SaslState::Login(LoginState::Initial),
                SaslMechanism::External => SaslState::External(SingleState::Initial),
                _ => SaslState::Plain(SingleState::Initial),
            },
        };
        Self::build(mechanism, credentials, state)
    }

    /// SCRAM request over a caller-supplied exchange (custom crypto provider
    /// or fixed nonce). Falls back to `new` for non-SCRAM mechanisms.
    pub fn with_exchange(
        mechanism: SaslMechanism,
        credentials: SaslCredentials,
        exchange: ScramExchange,
    ) -> Self {
        if mechanism.scram_hash().is_none() {
            return Self::new(mechanism, credentials);
        }
        Self::build(mechanism, credentials, scram_state(exchange))
    }

    /// SCRAM request with a specific crypto provider.
    pub fn with_crypto(
        mechanism: SaslMechanism,
        credentials: SaslCredentials,
        crypto: Arc<dyn ScramCrypto>,
    ) -> Self {
        Self::with_exchange(mechanism, credentials, ScramExchange::new(crypto))
    }

    fn build(mechanism: SaslMechanism, mut credentials: SaslCredentials, state: SaslState) -> Self {
        if !mechanism.is_authorizable() {
            credentials.authorization.clear();
        }
        Self { mechanism, credentials, state }
    }

    pub fn mechanism(&self) -> SaslMechanism {
        self.mechanism
    }

    pub fn has_next_request(&self) -> bool {
        match &self.state {
            SaslState::Plain(s) | SaslState::External(s) => *s != SingleState::Completed,
            SaslState::Login(s) => *s != LoginState::Completed,
            SaslState::Scram { state, .. } => *state != ScramState::Completed,
        }
    }

    pub fn render(&mut self, builder: &mut RequestBuilder) -> Result<(), SieveError> {
        let mechanism = self.mechanism.name();
        let creds = &self.credentials;
        match &mut self.state {
            SaslState::Plain(_) => {
                let payload = encode_plain(&creds.authorization, &creds.username, &creds.password);
                builder
                    .add_literal("AUTHENTICATE")
                    .add_quoted_string(mechanism)
                    .add_quoted_base64(&payload);
            }
            SaslState::External(_) => {
                builder
                    .add_literal("AUTHENTICATE")
                    .add_quoted_string(mechanism)
                    .add_quoted_base64(creds.authorization.as_bytes());
            }
            SaslState::Login(LoginState::Initial) => {
                builder.add_literal("AUTHENTICATE").add_quoted_string(mechanism);
            }
            SaslState::Login(LoginState::SendUsername) => {
                builder.add_quoted_base64(creds.username.as_bytes());
            }
            SaslState::Login(LoginState::SendPassword) => {
                builder.add_quoted_base64(creds.password.as_bytes());
            }
            SaslState::Scram { state: ScramState::FirstMessage, exchange, .. } => {
                let first = exchange.client_first(&creds.username, &creds.authorization);
                builder
                    .add_literal("AUTHENTICATE")
                    .add_quoted_string(mechanism)
                    .add_quoted_base64(&first);
            }
            SaslState::Scram { state: ScramState::FinalMessage, exchange, server_first, .. } => {
                let server_first = server_first
                    .as_deref()
                    .ok_or_else(|| SieveError::client("SCRAM server-first message missing"))?;
                let fin = exchange.client_final(server_first, &creds.password)?;
                builder.add_quoted_base64(&fin);
            }
            SaslState::Scram { state: ScramState::EmptyMessage, .. } => {
                builder.add_quoted_string("");
            }
            SaslState::Login(LoginState::Completed) | SaslState::Scram { .. } => {
                return Err(SieveError::client("authentication already completed"));
            }
        }
        Ok(())
    }

    /// Consume one server message. `Some` once the final status arrived.
    pub fn on_response(
        &mut self,
        parser: &mut ResponseParser<'_>,
    ) -> Result<Option<SimpleResponse>, ParseError> {
        let challenge = parser.is_string()?;
        match &mut self.state {
            SaslState::Plain(state) | SaslState::External(state) => {
                let response = SimpleResponse::parse(parser)?;
                *state = SingleState::Completed;
                Ok(Some(response))
            }
            SaslState::Login(state) => {
                if challenge {
                    let next = match *state {
                        LoginState::Initial => LoginState::SendUsername,
                        LoginState::SendUsername => LoginState::SendPassword,
                        _ => return Err(ParseError::malformed("unexpected LOGIN challenge")),
                    };
                    parse_challenge(parser)?;
                    *state = next;
                    return Ok(None);
                }
                let response = SimpleResponse::parse(parser)?;
                *state = LoginState::Completed;
                Ok(Some(response))
            }
            SaslState::Scram { state, exchange, server_first, verifier } => {
                if challenge {
                    let message = String::from_utf8_lossy(&parse_challenge(parser)?).into_owned();
                    match *state {
                        ScramState::FirstMessage => {
                            *server_first = Some(message);
                            *state = ScramState::FinalMessage;
                        }
                        ScramState::FinalMessage => {
                            // a server-final carrying e= still ends in NO
                            if let Ok(ServerFinal::Verifier(v)) = parse_server_final(&message) {
                                *verifier = Some(v);
                            }
                            *state = ScramState::EmptyMessage;
                        }
                        _ => return Err(ParseError::malformed("unexpected SCRAM challenge")),
                    }
                    return Ok(None);
                }

                let mut response = SimpleResponse::parse(parser)?;
                if response.is_ok() {
                    let signature = match *state {
                        ScramState::FinalMessage => response
                            .code
                            .sasl()
                            .and_then(|b64| decode_base64(b64).ok())
                            .and_then(|raw| parse_server_final(&String::from_utf8_lossy(&raw)).ok())
                            .and_then(|fin| match fin {
                                ServerFinal::Verifier(v) => Some(v),
                                ServerFinal::Error(_) => None,
                            }),
                        ScramState::EmptyMessage => verifier.take(),
                        _ => None,
                    };
                    let valid = signature.map_or(false, |v| exchange.verify(&v));
                    if !valid {
                        response.status = Status::No;
                        response.message = "Server Signature not valid".to_string();
                    }
                }
                *state = ScramState::Completed;
                Ok(Some(response))
            }
        }
    }
}

fn scram_state(exchange: ScramExchange) -> SaslState {
    SaslState::Scram {
        state: ScramState::FirstMessage,
        exchange,
        server_first: None,
        verifier: None,
    }
}

/// One ManageSieve command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Server greeting: nothing is sent, a capability block is expected.
    Init,
    Capability,
    StartTls,
    Logout,
    Noop,
    ListScripts,
    GetScript(String),
    PutScript { name: String, script: String },
    CheckScript(String),
    DeleteScript(String),
    /// Empty name deactivates all scripts.
    SetActive(String),
    RenameScript { old_name: String, new_name: String },
    Authenticate(SaslRequest),
}

impl Command {
    /// PUTSCRIPT with the body's line breaks normalized to CRLF.
    pub fn put_script(name: &str, script: &str) -> Self {
        Command::PutScript {
            name: name.to_string(),
            script: normalize_line_breaks(script),
        }
    }

    pub fn check_script(script: &str) -> Self {
        Command::CheckScript(normalize_line_breaks(script))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Init => "INIT",
            Command::Capability => "CAPABILITY",
            Command::StartTls => "STARTTLS",
            Command::Logout => "LOGOUT",
            Command::Noop => "NOOP",
            Command::ListScripts => "LISTSCRIPTS",
            Command::GetScript(_) => "GETSCRIPT",
            Command::PutScript { .. } => "PUTSCRIPT",
            Command::CheckScript(_) => "CHECKSCRIPT",
            Command::DeleteScript(_) => "DELETESCRIPT",
            Command::SetActive(_) => "SETACTIVE",
            Command::RenameScript { .. } => "RENAMESCRIPT",
            Command::Authenticate(_) => "AUTHENTICATE",
        }
    }

    /// False only for the greeting, which the server sends unprompted.
    pub fn has_request(&self) -> bool {
        !matches!(self, Command::Init)
    }

    pub fn has_next_request(&self) -> bool {
        match self {
            Command::Authenticate(sasl) => sasl.has_next_request(),
            _ => false,
        }
    }

    /// Replied to with a capability block.
    pub fn answers_with_capabilities(&self) -> bool {
        matches!(self, Command::Init | Command::Capability)
    }

    /// Nothing may be pipelined across these.
    pub fn is_barrier(&self) -> bool {
        matches!(self, Command::StartTls | Command::Logout | Command::Authenticate(_))
    }

    pub fn render(&mut self, builder: &mut RequestBuilder) -> Result<(), SieveError> {
        match self {
            Command::Init => {}
            Command::Capability
            | Command::StartTls
            | Command::Logout
            | Command::Noop
            | Command::ListScripts => {
                builder.add_literal(self.name());
            }
            Command::GetScript(name) => {
                builder.add_literal("GETSCRIPT").add_quoted_string(name);
            }
            Command::DeleteScript(name) => {
                builder.add_literal("DELETESCRIPT").add_quoted_string(name);
            }
            Command::SetActive(name) => {
                builder.add_literal("SETACTIVE").add_quoted_string(name);
            }
            Command::PutScript { name, script } => {
                builder
                    .add_literal("PUTSCRIPT")
                    .add_quoted_string(name)
                    .add_multiline_string(script);
            }
            Command::CheckScript(script) => {
                builder.add_literal("CHECKSCRIPT").add_multiline_string(script);
            }
            Command::RenameScript { old_name, new_name } => {
                builder
                    .add_literal("RENAMESCRIPT")
                    .add_quoted_string(old_name)
                    .add_quoted_string(new_name);
            }
            Command::Authenticate(sasl) => sasl.render(builder)?,
        }
        Ok(())
    }

    /// Decode the answer to the last rendered message. `Some` when the
    /// command is finished.
    pub fn on_response(
        &mut self,
        parser: &mut ResponseParser<'_>,
    ) -> Result<Option<Response>, ParseError> {
        let response = match self {
            Command::Init | Command::Capability => {
                Response::Capabilities(CapabilitiesResponse::parse(parser)?)
            }
            Command::ListScripts => Response::ListScripts(ListScriptsResponse::parse(parser)?),
            Command::GetScript(_) => Response::GetScript(GetScriptResponse::parse(parser)?),
            Command::Authenticate(sasl) => match sasl.on_response(parser)? {
                Some(simple) => Response::Simple(simple),
                None => return Ok(None),
            },
            _ => Response::Simple(SimpleResponse::parse(parser)?),
        };
        Ok(Some(response))
    }
}

/// A queued command and the caller waiting for it.
#[derive(Debug)]
pub struct Request {
    command: Command,
    optional: bool,
    awaiting: bool,
    abandoned: Option<String>,
    reply: Option<oneshot::Sender<RequestResult>>,
}

impl Request {
    pub fn new(command: Command) -> (Self, oneshot::Receiver<RequestResult>) {
        let (tx, rx) = oneshot::channel();
        let mut request = Self::detached(command);
        request.reply = Some(tx);
        (request, rx)
    }

    /// Request nobody waits for (keep-alive, optional greeting).
    pub fn detached(command: Command) -> Self {
        Self {
            command,
            optional: false,
            awaiting: false,
            abandoned: None,
            reply: None,
        }
    }

    /// A reply is not mandatory; the pump skips this request when the
    /// buffered bytes do not parse for it.
    pub fn make_optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    pub fn has_request(&self) -> bool {
        self.command.has_request()
    }

    pub fn has_next_request(&self) -> bool {
        self.command.has_next_request()
    }

    pub fn is_barrier(&self) -> bool {
        self.command.is_barrier()
    }

    /// Waiting on the server: sent and unanswered, or a mandatory greeting.
    pub fn expects_response(&self) -> bool {
        self.awaiting || (!self.has_request() && !self.optional)
    }

    /// Render the next outgoing message, CRLF-terminated.
    pub fn render(&mut self) -> Result<Vec<u8>, SieveError> {
        let mut builder = RequestBuilder::new();
        self.command.render(&mut builder)?;
        Ok(builder.into_bytes())
    }

    pub fn mark_sent(&mut self) {
        self.awaiting = true;
    }

    /// Parse one response for this request and resolve it when finished.
    /// Returns true once the request is done and may leave the queue.
    pub fn on_response(&mut self, parser: &mut ResponseParser<'_>) -> Result<bool, ParseError> {
        let response = self.command.on_response(parser)?;
        match response {
            Some(response) => {
                if self.optional && response.status() != Status::Ok {
                    return Err(ParseError::malformed("invalid response for an optional request"));
                }
                self.awaiting = false;
                self.resolve(response);
                Ok(true)
            }
            None => {
                self.awaiting = false;
                Ok(false)
            }
        }
    }

    fn resolve(&mut self, response: Response) {
        let simple = response.simple();
        let result = match simple.status {
            Status::Ok => Ok(response),
            Status::Bye if matches!(self.command, Command::Logout) => Ok(response),
            Status::Bye | Status::No => match simple.code.referral() {
                Some(target) => Err(SieveError::Referral(target)),
                None => Err(SieveError::Server(simple.clone())),
            },
        };
        self.finish(result);
    }

    pub fn fail(&mut self, error: SieveError) {
        self.finish(Err(error));
    }

    /// Give up on this request. Fires at most once; optional requests are
    /// dropped without notifying anyone.
    pub fn abandon(&mut self, reason: &str) {
        if self.abandoned.is_some() {
            return;
        }
        self.abandoned = Some(reason.to_string());
        if self.optional {
            self.reply = None;
            return;
        }
        self.finish(Err(SieveError::Abandoned(reason.to_string())));
    }

    fn finish(&mut self, result: RequestResult) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::HashAlgorithm;

    fn render(command: &mut Command) -> String {
        let mut b = RequestBuilder::new();
        command.render(&mut b).unwrap();
        String::from_utf8(b.into_bytes()).unwrap()
    }

    fn respond(command: &mut Command, data: &str) -> Option<Response> {
        let mut parser = ResponseParser::new(data.as_bytes());
        let response = command.on_response(&mut parser).unwrap();
        assert!(parser.is_empty(), "unconsumed: {:?}", parser.remaining());
        response
    }

    fn creds(username: &str, password: &str) -> SaslCredentials {
        SaslCredentials {
            username: username.into(),
            password: password.into(),
            authorization: String::new(),
        }
    }

    fn sasl(mechanism: SaslMechanism, credentials: SaslCredentials) -> Command {
        Command::Authenticate(SaslRequest::new(mechanism, credentials))
    }

    const SHA1_NONCE: &str = "fyko+d2lbbFgONRv9qkxdawL";
    const SHA256_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";

    fn scram(mechanism: SaslMechanism, hash: HashAlgorithm, nonce: &str) -> Command {
        let exchange = ScramExchange::with_nonce(Arc::new(hash), nonce);
        Command::Authenticate(SaslRequest::with_exchange(
            mechanism,
            creds("user", "pencil"),
            exchange,
        ))
    }

    #[test]
    fn one_shot_commands() {
        assert_eq!(render(&mut Command::Capability), "CAPABILITY\r\n");
        assert_eq!(render(&mut Command::GetScript("a\"b".into())), "GETSCRIPT \"a\\\"b\"\r\n");
        assert_eq!(render(&mut Command::SetActive(String::new())), "SETACTIVE \"\"\r\n");
        assert_eq!(
            render(&mut Command::RenameScript { old_name: "a".into(), new_name: "b".into() }),
            "RENAMESCRIPT \"a\" \"b\"\r\n"
        );
        assert_eq!(
            render(&mut Command::put_script("s", "keep;\nstop;")),
            "PUTSCRIPT \"s\" {12+}\r\nkeep;\r\nstop;\r\n"
        );
        assert_eq!(render(&mut Command::check_script("keep;")), "CHECKSCRIPT {5+}\r\nkeep;\r\n");
        assert!(!Command::Init.has_request());
        assert!(!Command::Noop.has_next_request());
    }

    #[test]
    fn plain_vectors() {
        let mut cmd = sasl(SaslMechanism::Plain, creds("user", "pencil"));
        assert_eq!(render(&mut cmd), "AUTHENTICATE \"PLAIN\" \"AHVzZXIAcGVuY2ls\"\r\n");
        assert!(cmd.has_next_request());
        let r = respond(&mut cmd, "OK\r\n").unwrap();
        assert_eq!(r.status(), Status::Ok);
        assert!(!cmd.has_next_request());

        let mut cmd = sasl(SaslMechanism::Plain, creds("user2", "abc\u{a7}123"));
        assert_eq!(render(&mut cmd), "AUTHENTICATE \"PLAIN\" \"AHVzZXIyAGFiY8KnMTIz\"\r\n");
    }

    #[test]
    fn login_ignores_authorization() {
        let mut c = creds("user", "pencil");
        c.authorization = "admin".into();
        let mut cmd = sasl(SaslMechanism::Login, c);
        assert_eq!(render(&mut cmd), "AUTHENTICATE \"LOGIN\"\r\n");
        assert!(respond(&mut cmd, "\"VXNlcm5hbWU6\"\r\n").is_none());
        assert_eq!(render(&mut cmd), "\"dXNlcg==\"\r\n");
        assert!(respond(&mut cmd, "{12}\r\nUGFzc3dvcmQ6\r\n").is_none());
        assert_eq!(render(&mut cmd), "\"cGVuY2ls\"\r\n");
        assert!(cmd.has_next_request());
        let r = respond(&mut cmd, "OK \"Logged in\"\r\n").unwrap();
        assert_eq!(r.simple().message, "Logged in");
        assert!(!cmd.has_next_request());
    }

    #[test]
    fn login_rejected_early() {
        let mut cmd = sasl(SaslMechanism::Login, creds("u", "p"));
        render(&mut cmd);
        let r = respond(&mut cmd, "NO \"Go away\"\r\n").unwrap();
        assert_eq!(r.status(), Status::No);
        assert!(!cmd.has_next_request());
    }

    #[test]
    fn external() {
        let mut cmd = sasl(SaslMechanism::External, creds("", ""));
        assert_eq!(render(&mut cmd), "AUTHENTICATE \"EXTERNAL\" \"\"\r\n");
    }

    #[test]
    fn scram_sha1_verifier_in_ok() {
        let mut cmd = scram(SaslMechanism::ScramSha1, HashAlgorithm::Sha1, SHA1_NONCE);
        assert_eq!(
            render(&mut cmd),
            "AUTHENTICATE \"SCRAM-SHA-1\" \"biwsbj11c2VyLHI9ZnlrbytkMmxiYkZnT05Sdjlxa3hkYXdM\"\r\n"
        );
        assert!(respond(
            &mut cmd,
            "\"cj1meWtvK2QybGJiRmdPTlJ2OXFreGRhd0wzcmZjTkhZSlkxWlZ2V1ZzN2oscz1RU1hDUitRNnNlazhiZjkyLGk9NDA5Ng==\"\r\n"
        )
        .is_none());
        assert_eq!(
            render(&mut cmd),
            "\"Yz1iaXdzLHI9ZnlrbytkMmxiYkZnT05Sdjlxa3hkYXdMM3JmY05IWUpZMVpWdldWczdqLHA9djBYOHYzQnoyVDBDSkdiSlF5RjBYK0hJNFRzPQ==\"\r\n"
        );
        let r = respond(
            &mut cmd,
            "OK (SASL \"dj1ybUY5cHFWOFM3c3VBb1pXamE0ZEpSa0ZzS1E9\")\r\n",
        )
        .unwrap();
        assert_eq!(r.status(), Status::Ok);
        assert!(!cmd.has_next_request());
    }

    #[test]
    fn scram_sha1_verifier_as_challenge() {
        let mut cmd = scram(SaslMechanism::ScramSha1, HashAlgorithm::Sha1, SHA1_NONCE);
        render(&mut cmd);
        respond(
            &mut cmd,
            "\"cj1meWtvK2QybGJiRmdPTlJ2OXFreGRhd0wzcmZjTkhZSlkxWlZ2V1ZzN2oscz1RU1hDUitRNnNlazhiZjkyLGk9NDA5Ng==\"\r\n",
        );
        render(&mut cmd);
        assert!(respond(&mut cmd, "\"dj1ybUY5cHFWOFM3c3VBb1pXamE0ZEpSa0ZzS1E9\"\r\n").is_none());
        assert_eq!(render(&mut cmd), "\"\"\r\n");
        let r = respond(&mut cmd, "OK\r\n").unwrap();
        assert_eq!(r.status(), Status::Ok);
    }

    #[test]
    fn scram_sha256_vector() {
        let mut cmd = scram(SaslMechanism::ScramSha256, HashAlgorithm::Sha256, SHA256_NONCE);
        assert_eq!(
            render(&mut cmd),
            "AUTHENTICATE \"SCRAM-SHA-256\" \"biwsbj11c2VyLHI9ck9wck5HZndFYmVSV2diTkVrcU8=\"\r\n"
        );
        respond(
            &mut cmd,
            "\"cj1yT3ByTkdmd0ViZVJXZ2JORWtxTyVodllEcFdVYTJSYVRDQWZ1eEZJbGopaE5sRiRrMCxzPVcyMlphSjBTTlk3c29Fc1VFamI2Z1E9PSxpPTQwOTY=\"\r\n",
        );
        assert_eq!(
            render(&mut cmd),
            "\"Yz1iaXdzLHI9ck9wck5HZndFYmVSV2diTkVrcU8laHZZRHBXVWEyUmFUQ0FmdXhGSWxqKWhObEYkazAscD1kSHpiWmFwV0lrNGpVaE4rVXRlOXl0YWc5empmTUhnc3FtbWl6N0FuZFZRPQ==\"\r\n"
        );
        let r = respond(
            &mut cmd,
            "OK (SASL \"dj02cnJpVFJCaTIzV3BSUi93dHVwK21NaFVaVW4vZEI1bkxUSlJzamw5NUc0PQ==\")\r\n",
        )
        .unwrap();
        assert_eq!(r.status(), Status::Ok);
    }

    #[test]
    fn scram_sha512_vector() {
        // RFC 7677 inputs, digests computed with SHA-512
        let mut cmd = scram(SaslMechanism::ScramSha512, HashAlgorithm::Sha512, SHA256_NONCE);
        assert_eq!(
            render(&mut cmd),
            "AUTHENTICATE \"SCRAM-SHA-512\" \"biwsbj11c2VyLHI9ck9wck5HZndFYmVSV2diTkVrcU8=\"\r\n"
        );
        respond(
            &mut cmd,
            "\"cj1yT3ByTkdmd0ViZVJXZ2JORWtxTyVodllEcFdVYTJSYVRDQWZ1eEZJbGopaE5sRiRrMCxzPVcyMlphSjBTTlk3c29Fc1VFamI2Z1E9PSxpPTQwOTY=\"\r\n",
        );
        assert_eq!(
            render(&mut cmd),
            "\"Yz1iaXdzLHI9ck9wck5HZndFYmVSV2diTkVrcU8laHZZRHBXVWEyUmFUQ0FmdXhGSWxqKWhObEYkazAscD1nTUdYUmNldlNjTnR4WjYvOGxRWXBHdG5zTkFjM21HY21Ob212K3hub09NdyszUjJ4TkpkTU5uek1sVE44UFBDNndkcDZkeWJFbURZWFlUeHduWVBKUT09\"\r\n"
        );
        let r = respond(
            &mut cmd,
            "OK (SASL \"dj1aUW5ZRWdXUU1GbW1zTThhUU1GMG5EREN5L0FnQ3prd2s4Q21NWlljTWcwdlNWbEtEYW5la0x0aWZEU2VWR1Q0KzVaeFhuSnExOTlSVkcyclI3Tjdadz09\")\r\n",
        )
        .unwrap();
        assert_eq!(r.status(), Status::Ok);
        assert!(!cmd.has_next_request());
    }

    #[test]
    fn scram_bad_signature_becomes_no() {
        let mut cmd = scram(SaslMechanism::ScramSha1, HashAlgorithm::Sha1, SHA1_NONCE);
        render(&mut cmd);
        respond(
            &mut cmd,
            "\"cj1meWtvK2QybGJiRmdPTlJ2OXFreGRhd0wzcmZjTkhZSlkxWlZ2V1ZzN2oscz1RU1hDUitRNnNlazhiZjkyLGk9NDA5Ng==\"\r\n",
        );
        render(&mut cmd);
        // v=AAAA
        let r = respond(&mut cmd, "OK (SASL \"dj1BQUFB\")\r\n").unwrap();
        assert_eq!(r.status(), Status::No);
        assert_eq!(r.simple().message, "Server Signature not valid");

        // OK without any verifier is not a success either
        let mut cmd = scram(SaslMechanism::ScramSha1, HashAlgorithm::Sha1, SHA1_NONCE);
        render(&mut cmd);
        let r = respond(&mut cmd, "OK\r\n").unwrap();
        assert_eq!(r.status(), Status::No);
    }

    #[test]
    fn scram_nonce_tamper_fails_render() {
        let mut cmd = scram(SaslMechanism::ScramSha1, HashAlgorithm::Sha1, SHA1_NONCE);
        render(&mut cmd);
        // r=XXXX,s=QSXCR+Q6sek8bf92,i=4096
        respond(&mut cmd, "\"cj1YWFhYLHM9UVNYQ1IrUTZzZWs4YmY5MixpPTQwOTY=\"\r\n");
        let mut builder = RequestBuilder::new();
        let err = cmd.render(&mut builder).unwrap_err();
        assert!(matches!(err, SieveError::Sasl(_)));
        assert_eq!(builder.as_str(), "");
    }

    #[tokio::test]
    async fn request_resolution() {
        let (mut request, rx) = Request::new(Command::DeleteScript("x".into()));
        request.render().unwrap();
        request.mark_sent();
        assert!(request.expects_response());
        request
            .on_response(&mut ResponseParser::new(b"NO (NONEXISTENT) \"nope\"\r\n"))
            .unwrap();
        match rx.await.unwrap() {
            Err(SieveError::Server(r)) => assert_eq!(r.message, "nope"),
            other => panic!("unexpected {:?}", other),
        }

        let (mut request, rx) = Request::new(Command::Noop);
        request
            .on_response(&mut ResponseParser::new(b"BYE (REFERRAL \"sieve://b.example\")\r\n"))
            .unwrap();
        match rx.await.unwrap() {
            Err(SieveError::Referral(t)) => assert_eq!(t.host, "b.example"),
            other => panic!("unexpected {:?}", other),
        }

        let (mut request, rx) = Request::new(Command::Logout);
        request.on_response(&mut ResponseParser::new(b"BYE\r\n")).unwrap();
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn abandon_fires_once() {
        let (mut request, rx) = Request::new(Command::Noop);
        request.abandon("Timeout");
        request.abandon("again");
        request.fail(SieveError::client("late"));
        match rx.await.unwrap() {
            Err(SieveError::Abandoned(reason)) => assert_eq!(reason, "Timeout"),
            other => panic!("unexpected {:?}", other),
        }

        let (request, rx) = Request::new(Command::Init);
        let mut request = request.make_optional();
        request.abandon("Timeout");
        assert!(rx.await.is_err());
    }

    #[test]
    fn optional_rejects_error_status() {
        let mut request = Request::detached(Command::Capability).make_optional();
        let err = request
            .on_response(&mut ResponseParser::new(b"\"IMPLEMENTATION\" \"x\"\r\nNO\r\n"))
            .unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }
}
