/*
 * scram.rs
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

//! SCRAM-SHA-* SASL client exchange (RFC 5802, 7677).
//!
//! Holds the per-attempt state between client-first and server-final:
//! client nonce, gs2-header, client-first-bare and the expected server
//! signature. Dropped once authentication finishes.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::warn;
use rand::Rng;

use super::{SaslError, ScramCrypto};

const NONCE_LEN: usize = 32;

/// Iteration counts above this are logged; the key derivation runs on the
/// connection task.
const WARN_ITERATIONS: u32 = 100_000;
/// Iteration counts above this are refused.
pub const MAX_ITERATIONS: u32 = 1_000_000;

/// Parsed server-final-message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFinal {
    /// `v=`: server signature.
    Verifier(Vec<u8>),
    /// `e=`: server-side authentication error.
    Error(String),
}

#[derive(Clone)]
pub struct ScramExchange {
    crypto: Arc<dyn ScramCrypto>,
    nonce: String,
    gs2_header: String,
    client_first_bare: String,
    server_signature: Option<Vec<u8>>,
}

impl fmt::Debug for ScramExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramExchange")
            .field("nonce", &self.nonce)
            .field("gs2_header", &self.gs2_header)
            .finish_non_exhaustive()
    }
}

impl ScramExchange {
    pub fn new(crypto: Arc<dyn ScramCrypto>) -> Self {
        Self::with_nonce(crypto, generate_nonce())
    }

    /// Exchange with a fixed client nonce (test vectors).
    pub fn with_nonce(crypto: Arc<dyn ScramCrypto>, nonce: impl Into<String>) -> Self {
        Self {
            crypto,
            nonce: nonce.into(),
            gs2_header: String::new(),
            client_first_bare: String::new(),
            server_signature: None,
        }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// client-first-message: gs2-header + client-first-message-bare.
    pub fn client_first(&mut self, username: &str, authzid: &str) -> Vec<u8> {
        self.gs2_header = if authzid.is_empty() {
            "n,,".to_string()
        } else {
            format!("n,a={},", sasl_name(authzid))
        };
        self.client_first_bare = format!("n={},r={}", sasl_name(username), self.nonce);
        format!("{}{}", self.gs2_header, self.client_first_bare).into_bytes()
    }

    /// client-final-message for the given server-first-message. Fails before
    /// producing anything if the server nonce does not extend ours.
    pub fn client_final(
        &mut self,
        server_first: &str,
        password: &str,
    ) -> Result<Vec<u8>, SaslError> {
        let (nonce, salt, iterations) = parse_server_first(server_first)?;
        if !nonce.starts_with(&self.nonce) {
            return Err(SaslError::invalid("Nonce mismatch"));
        }

        let crypto = &self.crypto;
        let password = crypto.normalize(password);
        let salted_password = crypto.hi(password.as_bytes(), &salt, iterations);
        let client_key = crypto.hmac(&salted_password, b"Client Key");
        let stored_key = crypto.hash(&client_key);

        let without_proof = format!("c={},r={}", BASE64.encode(self.gs2_header.as_bytes()), nonce);
        let auth_message = format!("{},{},{}", self.client_first_bare, server_first, without_proof);

        let client_signature = crypto.hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let server_key = crypto.hmac(&salted_password, b"Server Key");
        self.server_signature = Some(crypto.hmac(&server_key, auth_message.as_bytes()));

        Ok(format!("{},p={}", without_proof, BASE64.encode(client_proof)).into_bytes())
    }

    /// Compare the server's signature with the one derived in `client_final`.
    pub fn verify(&self, verifier: &[u8]) -> bool {
        match &self.server_signature {
            Some(expected) => expected.as_slice() == verifier,
            None => false,
        }
    }
}

/// Printable ASCII without commas.
pub fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_LEN)
        .map(|_| loop {
            let c: u8 = rng.gen_range(0x21..=0x7e);
            if c != b',' {
                break c as char;
            }
        })
        .collect()
}

/// saslname escaping: `=` as `=3D`, `,` as `=2C`.
pub fn sasl_name(s: &str) -> String {
    s.replace('=', "=3D").replace(',', "=2C")
}

/// server-first-message: `[m=ext,]r=nonce,s=salt,i=count[,ext]`.
pub fn parse_server_first(input: &str) -> Result<(String, Vec<u8>, u32), SaslError> {
    let mut r = None;
    let mut s = None;
    let mut i = None;
    for part in input.split(',') {
        if part.starts_with("m=") {
            return Err(SaslError::invalid("unsupported mandatory SCRAM extension"));
        } else if let Some(v) = part.strip_prefix("r=") {
            r = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("s=") {
            s = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("i=") {
            i = Some(v.to_string());
        }
    }
    let nonce = r.ok_or_else(|| SaslError::invalid("missing r in server-first"))?;
    let salt = s.ok_or_else(|| SaslError::invalid("missing s in server-first"))?;
    let iterations = i.ok_or_else(|| SaslError::invalid("missing i in server-first"))?;
    let salt = BASE64
        .decode(salt)
        .map_err(|_| SaslError::invalid("invalid salt base64"))?;
    let iterations: u32 = iterations
        .parse()
        .map_err(|_| SaslError::invalid("invalid iteration count"))?;
    if iterations == 0 {
        return Err(SaslError::invalid("invalid iteration count"));
    }
    if iterations > MAX_ITERATIONS {
        return Err(SaslError::invalid(&format!(
            "iteration count {} exceeds {}",
            iterations, MAX_ITERATIONS
        )));
    }
    if iterations > WARN_ITERATIONS {
        warn!(target: "managesieve", "SCRAM server asks for {} iterations", iterations);
    }
    Ok((nonce, salt, iterations))
}

/// server-final-message: `e=error` or `v=verifier`.
pub fn parse_server_final(input: &str) -> Result<ServerFinal, SaslError> {
    let first = input.split(',').next().unwrap_or("");
    if let Some(e) = first.strip_prefix("e=") {
        return Ok(ServerFinal::Error(e.to_string()));
    }
    if let Some(v) = first.strip_prefix("v=") {
        let verifier = BASE64
            .decode(v)
            .map_err(|_| SaslError::invalid("invalid verifier base64"))?;
        return Ok(ServerFinal::Verifier(verifier));
    }
    Err(SaslError::invalid("invalid server-final message"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sasl::HashAlgorithm;

    fn sha1() -> Arc<dyn ScramCrypto> {
        Arc::new(HashAlgorithm::Sha1)
    }

    #[test]
    fn rfc5802_example() {
        let mut x = ScramExchange::with_nonce(sha1(), "fyko+d2lbbFgONRv9qkxdawL");
        assert_eq!(x.client_first("user", ""), b"n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL".to_vec());
        let fin = x
            .client_final(
                "r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096",
                "pencil",
            )
            .unwrap();
        assert_eq!(
            String::from_utf8(fin).unwrap(),
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
        );
        match parse_server_final("v=rmF9pqV8S7suAoZWja4dJRkFsKQ=").unwrap() {
            ServerFinal::Verifier(v) => assert!(x.verify(&v)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!x.verify(b"forged"));
    }

    #[test]
    fn authzid_in_gs2_header() {
        let mut x = ScramExchange::with_nonce(sha1(), "abc");
        let first = x.client_first("us,er", "ad=min");
        assert_eq!(first, b"n,a=ad=3Dmin,n=us=2Cer,r=abc".to_vec());
    }

    #[test]
    fn nonce_must_extend_client_nonce() {
        let mut x = ScramExchange::with_nonce(sha1(), "fyko+d2lbbFgONRv9qkxdawL");
        x.client_first("user", "");
        let err = x
            .client_final("r=tampered3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096", "pencil")
            .unwrap_err();
        assert_eq!(err.message, "Nonce mismatch");
        assert!(!x.verify(b""));
    }

    #[test]
    fn server_first_errors() {
        assert!(parse_server_first("m=ext,r=a,s=QQ==,i=1").is_err());
        assert!(parse_server_first("r=a,s=QQ==").is_err());
        assert!(parse_server_first("r=a,s=QQ==,i=zero").is_err());
        assert!(parse_server_first("r=a,s=QQ==,i=0").is_err());
        let err = parse_server_first("r=a,s=QQ==,i=4294967295").unwrap_err();
        assert_eq!(err.message, "iteration count 4294967295 exceeds 1000000");
        assert!(parse_server_first(&format!("r=a,s=QQ==,i={}", MAX_ITERATIONS)).is_ok());
        let (nonce, salt, i) = parse_server_first("r=a,s=QQ==,i=4096,x=ext").unwrap();
        assert_eq!((nonce.as_str(), salt.as_slice(), i), ("a", &b"A"[..], 4096));
    }

    #[test]
    fn server_final_error() {
        assert_eq!(
            parse_server_final("e=invalid-proof").unwrap(),
            ServerFinal::Error("invalid-proof".into())
        );
        assert!(parse_server_final("x=1").is_err());
    }

    #[test]
    fn generated_nonce_is_printable_without_comma() {
        for _ in 0..50 {
            let n = generate_nonce();
            assert_eq!(n.len(), NONCE_LEN);
            assert!(n.bytes().all(|b| (0x21..=0x7e).contains(&b) && b != b','));
        }
    }
}
