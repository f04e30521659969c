/*
 * session.rs
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

//! ManageSieve session: connect, STARTTLS, authenticate, follow referrals,
//! and the script operations on top of one `SieveClient`.

use std::sync::{Arc, RwLock};

use super::client::{
    wait, ClientHooks, ClientOptions, DisconnectHook, IdleHook, Security, SieveClient,
    TimeoutHook,
};
use super::compatibility::Compatibility;
use super::error::SieveError;
use super::logger::SieveLogger;
use super::request::{Command, Request, RequestResult, SaslCredentials, SaslRequest};
use super::response::{Capabilities, ReferralTarget, ScriptEntry};
use crate::config::{SaslPreference, SessionOptions};
use crate::net::{Connector, TlsConnector};
use crate::sasl::select_mechanism;

/// Referrals followed in a row before giving up.
pub const MAX_REFERRALS: usize = 5;

/// Scratch name used to syntax-check a script on servers without CHECKSCRIPT.
const CHECK_SCRIPT_NAME: &str = "TMP_FILE_DELETE_ME";

/// What the `authenticate` callback hands back.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    /// Required unless the mechanism is EXTERNAL.
    pub password: Option<String>,
}

/// Called with whether the chosen mechanism needs a password.
pub type AuthenticateCallback = Arc<dyn Fn(bool) -> Option<Credentials> + Send + Sync>;
/// Returns the proxy authorization identity; empty for none.
pub type AuthorizeCallback = Arc<dyn Fn() -> Option<String> + Send + Sync>;

pub struct SieveSession<C: Connector = TlsConnector> {
    options: SessionOptions,
    connector: Arc<C>,
    client: Option<SieveClient>,
    compatibility: Arc<RwLock<Compatibility>>,
    capabilities: Option<Capabilities>,
    connecting: bool,
    logger: SieveLogger,
    on_authenticate: Option<AuthenticateCallback>,
    on_authorize: Option<AuthorizeCallback>,
    on_disconnected: Option<DisconnectHook>,
    on_timeout: Option<TimeoutHook>,
}

impl SieveSession {
    pub fn new(id: &str, options: SessionOptions) -> Self {
        Self::with_connector(id, options, TlsConnector::default())
    }
}

impl<C: Connector> SieveSession<C> {
    pub fn with_connector(id: &str, options: SessionOptions, connector: C) -> Self {
        let logger = SieveLogger::new(id, options.log_level());
        Self {
            options,
            connector: Arc::new(connector),
            client: None,
            compatibility: Arc::new(RwLock::new(Compatibility::default())),
            capabilities: None,
            connecting: false,
            logger,
            on_authenticate: None,
            on_authorize: None,
            on_disconnected: None,
            on_timeout: None,
        }
    }

    pub fn on_authenticate<F>(&mut self, callback: F)
    where
        F: Fn(bool) -> Option<Credentials> + Send + Sync + 'static,
    {
        self.on_authenticate = Some(Arc::new(callback));
    }

    pub fn on_authorize<F>(&mut self, callback: F)
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.on_authorize = Some(Arc::new(callback));
    }

    pub fn on_disconnected<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_disconnected = Some(Arc::new(callback));
    }

    pub fn on_timeout<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(callback));
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(SieveClient::is_alive)
    }

    /// True while a connect or referral sequence is running.
    pub fn is_connecting(&self) -> bool {
        self.connecting
    }

    pub fn security(&self) -> Option<Security> {
        self.client.as_ref().map(SieveClient::security)
    }

    pub fn compatibility(&self) -> Compatibility {
        self.compatibility
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// The last capability block the server sent.
    pub fn server_capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Connect and run the handshake, following referrals.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), SieveError> {
        self.connect_to(ReferralTarget {
            host: host.to_string(),
            port,
        })
        .await
    }

    async fn connect_to(&mut self, mut target: ReferralTarget) -> Result<(), SieveError> {
        self.connecting = true;
        let mut hops = 0;
        let result = loop {
            match self.handshake(&target).await {
                Ok(()) => break Ok(()),
                Err(SieveError::Referral(next)) if hops < MAX_REFERRALS => {
                    hops += 1;
                    self.logger
                        .session(format_args!("Referred from {} to {}", target, next));
                    self.disconnect(true).await;
                    target = next;
                }
                Err(e) => {
                    self.logger
                        .session(format_args!("Handshake with {} failed: {}", target, e));
                    self.disconnect(true).await;
                    break Err(e);
                }
            }
        };
        self.connecting = false;
        result
    }

    async fn handshake(&mut self, target: &ReferralTarget) -> Result<(), SieveError> {
        if self.client.is_some() {
            self.disconnect(true).await;
        }
        self.logger
            .session(format_args!("Connecting to {}", target));
        let client = SieveClient::connect(
            self.connector.clone(),
            &target.host,
            target.port,
            self.client_options(),
            self.client_hooks(),
            self.logger.clone(),
        )
        .await?;
        self.client = Some(client.clone());

        let capabilities = client.send(Command::Init).await?.into_capabilities()?;
        self.set_capabilities(capabilities);
        self.start_tls().await?;
        self.authenticate().await
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.options.timeout(),
            idle: self.options.keep_alive(),
            secure: self.options.secure,
        }
    }

    fn client_hooks(&self) -> ClientHooks {
        let compatibility = self.compatibility.clone();
        let on_idle: IdleHook = Arc::new(move || {
            let noop = compatibility.read().map(|c| c.noop).unwrap_or(false);
            Some(if noop { Command::Noop } else { Command::Capability })
        });
        ClientHooks {
            on_idle: Some(on_idle),
            on_timeout: self.on_timeout.clone(),
            on_disconnected: self.on_disconnected.clone(),
        }
    }

    fn set_capabilities(&mut self, capabilities: Capabilities) {
        if let Ok(mut compatibility) = self.compatibility.write() {
            *compatibility = Compatibility::from_capabilities(&capabilities);
        }
        self.logger.session(format_args!(
            "Server {} offers SASL [{}]",
            capabilities.implementation,
            capabilities.sasl.join(" ")
        ));
        self.capabilities = Some(capabilities);
    }

    fn client(&self) -> Result<SieveClient, SieveError> {
        self.client
            .clone()
            .ok_or_else(|| SieveError::client("Not connected"))
    }

    /// Upgrade to TLS when the connection is securable. Servers re-advertise
    /// capabilities after the handshake, but some don't, so an explicit
    /// CAPABILITY goes out with an optional greeting behind it.
    async fn start_tls(&mut self) -> Result<(), SieveError> {
        let client = self.client()?;
        if !client.is_securable() || client.is_secured() {
            return Ok(());
        }
        if !self.compatibility().starttls {
            return Err(SieveError::client(
                "Server does not support a secure connection",
            ));
        }

        client.send(Command::StartTls).await?;
        client.start_tls().await?;
        self.logger.session("TLS established");

        let capability = client.submit(Command::Capability);
        client.add_request(Request::detached(Command::Init).make_optional());
        let capabilities = wait(capability).await?.into_capabilities()?;
        self.set_capabilities(capabilities);
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<(), SieveError> {
        let forced = match &self.options.sasl {
            SaslPreference::None => {
                self.logger.session("SASL authentication disabled");
                return Ok(());
            }
            SaslPreference::Default => None,
            SaslPreference::Mechanism(name) => Some(name.clone()),
        };
        let offered = self.compatibility().sasl;
        let mechanism = select_mechanism(&offered, forced.as_deref())
            .map_err(|e| SieveError::client(e.to_string()))?;

        let callback = self
            .on_authenticate
            .clone()
            .ok_or_else(|| SieveError::client("No authentication callback registered"))?;
        let credentials = callback(mechanism.has_password())
            .ok_or_else(|| SieveError::client("Authentication canceled"))?;
        let password = if mechanism.has_password() {
            credentials
                .password
                .ok_or_else(|| SieveError::client("No password provided"))?
        } else {
            String::new()
        };
        let authorization = match (&self.on_authorize, mechanism.is_authorizable()) {
            (Some(authorize), true) => authorize()
                .ok_or_else(|| SieveError::client("No authorization identity provided"))?,
            _ => String::new(),
        };

        self.logger.session(format_args!(
            "Authenticating as {} using {}",
            credentials.username, mechanism
        ));
        let request = SaslRequest::new(
            mechanism,
            SaslCredentials {
                username: credentials.username,
                password,
                authorization,
            },
        );
        self.client()?
            .send(Command::Authenticate(request))
            .await?;
        self.logger.session("Authenticated");
        Ok(())
    }

    /// Send a command; on a referral, reconnect to the new server and retry
    /// once. Inside a connect sequence the referral is returned instead.
    pub async fn send_request(&mut self, command: Command) -> RequestResult {
        let result = self.client()?.send(command.clone()).await;
        match result {
            Err(SieveError::Referral(target)) if !self.connecting => {
                self.logger.session(format_args!(
                    "{} referred to {}",
                    command.name(),
                    target
                ));
                self.disconnect(true).await;
                self.connect_to(target).await?;
                self.client()?.send(command).await
            }
            other => other,
        }
    }

    /// Graceful unless forced: LOGOUT first, whatever it answers.
    pub async fn disconnect(&mut self, force: bool) {
        let Some(client) = self.client.take() else {
            return;
        };
        if !force && client.is_alive() {
            if let Err(e) = client.send(Command::Logout).await {
                self.logger
                    .session(format_args!("Graceful logout failed: {}", e));
            }
        }
        client.disconnect("Disconnected").await;
    }

    pub async fn logout(&mut self) -> Result<(), SieveError> {
        self.client()?.send(Command::Logout).await?;
        Ok(())
    }

    /// Abandon everything in flight.
    pub fn cancel(&self, reason: &str) {
        if let Some(client) = &self.client {
            client.cancel(reason);
        }
    }

    pub async fn capabilities(&mut self) -> Result<Capabilities, SieveError> {
        let capabilities = self
            .send_request(Command::Capability)
            .await?
            .into_capabilities()?;
        self.set_capabilities(capabilities.clone());
        Ok(capabilities)
    }

    /// NOOP, or CAPABILITY on servers without it.
    pub async fn noop(&mut self) -> Result<(), SieveError> {
        if self.compatibility().noop {
            self.send_request(Command::Noop).await?;
        } else {
            self.capabilities().await?;
        }
        Ok(())
    }

    pub async fn list_scripts(&mut self) -> Result<Vec<ScriptEntry>, SieveError> {
        self.send_request(Command::ListScripts).await?.into_scripts()
    }

    /// Store a script, replacing any script of the same name.
    pub async fn put_script(&mut self, name: &str, script: &str) -> Result<(), SieveError> {
        self.send_request(Command::put_script(name, script)).await?;
        Ok(())
    }

    pub async fn get_script(&mut self, name: &str) -> Result<String, SieveError> {
        self.send_request(Command::GetScript(name.to_string()))
            .await?
            .into_script()
    }

    pub async fn delete_script(&mut self, name: &str) -> Result<(), SieveError> {
        self.send_request(Command::DeleteScript(name.to_string()))
            .await?;
        Ok(())
    }

    /// Make `name` the active script; `None` deactivates all scripts.
    pub async fn activate_script(&mut self, name: Option<&str>) -> Result<(), SieveError> {
        let name = name.unwrap_or_default().to_string();
        self.send_request(Command::SetActive(name)).await?;
        Ok(())
    }

    /// Syntax-check a script. Without CHECKSCRIPT the script is stored under
    /// a scratch name and deleted again; a script of that name is lost.
    pub async fn check_script(&mut self, script: &str) -> Result<(), SieveError> {
        if script.is_empty() {
            return Ok(());
        }
        if self.compatibility().checkscript {
            self.send_request(Command::check_script(script)).await?;
            return Ok(());
        }
        self.put_script(CHECK_SCRIPT_NAME, script).await?;
        self.delete_script(CHECK_SCRIPT_NAME).await
    }

    /// Rename a script. Without RENAMESCRIPT this is GET, PUT, optional
    /// SETACTIVE, then DELETE, which overwrites an existing `new_name`.
    pub async fn rename_script(
        &mut self,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), SieveError> {
        if self.compatibility().renamescript {
            self.send_request(Command::RenameScript {
                old_name: old_name.to_string(),
                new_name: new_name.to_string(),
            })
            .await?;
            return Ok(());
        }

        let active = self
            .list_scripts()
            .await?
            .into_iter()
            .find(|entry| entry.name == old_name)
            .map(|entry| entry.active)
            .ok_or_else(|| SieveError::client(format!("Unknown script {}", old_name)))?;
        let script = self.get_script(old_name).await?;
        self.put_script(new_name, &script).await?;
        if active {
            self.activate_script(Some(new_name)).await?;
        }
        self.delete_script(old_name).await
    }
}
