//! CVS session lifecycle.
//!
//! ```text
//! TransportEstablished -> [Authenticated] -> Negotiated -> Active -> Terminated
//! ```
//!
//! A [`Session`] owns one connection. Commands live in `crate::commands`
//! as further `impl Session` blocks; each writes its request, flushes, and
//! reads until `ok` or `error` before returning.

pub mod auth;

use crate::config::ClientConfig;
use crate::error::{CvsError, Result};
use crate::protocol::{get_reply, request::VALID_RESPONSES};
use crate::root::{CvsRoot, Method};
use crate::transport::{ServerConnection, StreamStats};
use std::collections::BTreeSet;

/// Requests every session needs.
pub const REQUIRED_REQUESTS: &[&str] = &["add", "ci", "co", "rlog", "status", "UseUnchanged"];

/// Servers whose `rlog` mishandles `-S`.
const BROKEN_RLOG_S_VERSION: &str = "1.11.1p1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    TransportEstablished,
    Authenticated,
    Negotiated,
    Active,
    Terminated,
}

/// What the server said it can do.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub requests: BTreeSet<String>,
    pub version: Option<String>,
    pub compression: bool,
    pub rlist: bool,
    /// `rlog -S` may be sent.
    pub rlog_no_empty: bool,
}

impl Capabilities {
    pub fn parse(valid_requests: &str) -> Self {
        let requests: BTreeSet<String> = valid_requests
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self {
            compression: requests.contains("Gzip-stream"),
            rlist: requests.contains("rlist"),
            rlog_no_empty: true,
            version: None,
            requests,
        }
    }

    pub fn supports(&self, request: &str) -> bool {
        self.requests.contains(request)
    }

    /// Required requests the server lacks.
    pub fn missing(&self) -> Vec<String> {
        REQUIRED_REQUESTS
            .iter()
            .filter(|r| !self.supports(r))
            .map(|r| r.to_string())
            .collect()
    }
}

pub struct Session {
    conn: ServerConnection,
    root: CvsRoot,
    module: String,
    full_module_path: String,
    capabilities: Capabilities,
    config: ClientConfig,
    state: SessionState,
}

impl Session {
    /// Parse `cvsroot`, connect, authenticate and negotiate.
    pub async fn connect(cvsroot: &str, module: &str, config: ClientConfig) -> Result<Self> {
        let root = CvsRoot::parse(cvsroot)?;
        tracing::debug!("Connecting to {} module {}", root, module);
        let conn = ServerConnection::open(&root, &config).await?;
        Self::establish(conn, root, module, config).await
    }

    /// Run authentication and negotiation over an already open connection.
    pub async fn establish(
        conn: ServerConnection,
        root: CvsRoot,
        module: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let module = normalize_module(module)?;
        let full_module_path = format!("{}/{}/", root.path.trim_end_matches('/'), module);

        let mut session = Self {
            conn,
            root,
            module,
            full_module_path,
            capabilities: Capabilities::default(),
            config,
            state: SessionState::TransportEstablished,
        };

        if session.root.method == Method::Pserver {
            session.login().await?;
        }
        session.negotiate().await?;
        session.state = SessionState::Active;
        Ok(session)
    }

    async fn login(&mut self) -> Result<()> {
        let user = self.root.user.clone().ok_or_else(|| {
            CvsError::AuthenticationFailure("no user set for pserver connection".to_string())
        })?;
        let password = self.root.password.as_deref().unwrap_or("");
        let scrambled = auth::scramble(password.as_bytes());
        let repo = self.root.path.clone();

        let stream = self.conn.stream();
        stream.write_line("BEGIN AUTH REQUEST");
        stream.write_line(&repo);
        stream.write_line(&user);
        stream.write_raw(&scrambled);
        stream.write_raw(b"\n");
        stream.write_line("END AUTH REQUEST");
        stream.flush().await?;

        let reply = stream.read_line().await?;
        match reply.as_str() {
            "I LOVE YOU" => {
                tracing::debug!("pserver accepted user {}", user);
                self.state = SessionState::Authenticated;
                Ok(())
            }
            "I HATE YOU" => Err(CvsError::AuthenticationFailure(format!(
                "rejected user {}",
                user
            ))),
            _ => Err(CvsError::unexpected(SessionState::TransportEstablished, reply)),
        }
    }

    async fn negotiate(&mut self) -> Result<()> {
        let repo = self.root.path.clone();
        let stream = self.conn.stream();
        stream.write_line(&format!("Root {}", repo));
        stream.write_line(&format!("Valid-responses {}", VALID_RESPONSES));
        stream.write_line("valid-requests");
        stream.flush().await?;

        let requests = get_reply(stream, "Valid-requests ").await?.ok_or_else(|| {
            CvsError::unexpected(self.state, "reply without Valid-requests")
        })?;
        let mut caps = Capabilities::parse(&requests);

        let missing = caps.missing();
        if !missing.is_empty() {
            return Err(CvsError::MissingCapability(missing));
        }
        self.state = SessionState::Negotiated;

        if !caps.rlist {
            tracing::warn!("CVS server does not support rlist (checkout will be used instead)");
        }

        let stream = self.conn.stream();
        stream.write_line("UseUnchanged");

        let level = self.config.compression_level;
        if caps.compression && level > 0 {
            stream.write_line(&format!("Gzip-stream {}", level));
            stream.enable_compression(level).await?;
        } else if !caps.compression {
            tracing::warn!("CVS server does not support gzip compression");
        }

        if caps.supports("version") {
            stream.write_line("version");
            stream.flush().await?;
            caps.version = get_reply(stream, "M ").await?;
            tracing::info!(
                "CVS server version: {}",
                caps.version.as_deref().unwrap_or("unknown")
            );
        } else {
            tracing::warn!("CVS server does not support version request");
        }

        let broken_s = caps
            .version
            .as_deref()
            .is_some_and(|v| v.contains(BROKEN_RLOG_S_VERSION));
        caps.rlog_no_empty = !self.config.dumb_rlog && !broken_s;
        if !caps.rlog_no_empty {
            tracing::warn!("Using rlog without -S (incremental updates will take longer)");
        }

        self.capabilities = caps;
        Ok(())
    }

    /// Close the connection, finishing compression and reaping the child.
    pub async fn terminate(mut self) -> Result<StreamStats> {
        self.state = SessionState::Terminated;
        let stats = self.conn.close().await?;
        tracing::info!(
            "CVS session closed: read {} bytes, wrote {} bytes",
            stats.payload_read,
            stats.payload_written
        );
        Ok(stats)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn root(&self) -> &CvsRoot {
        &self.root
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `<repo>/<module>/`, the prefix of every RCS path in the module.
    pub fn full_module_path(&self) -> &str {
        &self.full_module_path
    }

    pub fn repo_path(&self) -> &str {
        &self.root.path
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&mut self) -> StreamStats {
        self.conn.stream().stats()
    }

    pub(crate) fn stream(&mut self) -> &mut crate::transport::CvsStream {
        self.conn.stream()
    }
}

fn normalize_module(module: &str) -> Result<String> {
    if module.starts_with('/') {
        return Err(CvsError::Config(format!(
            "CVS module name should not start with '/': {}",
            module
        )));
    }
    let trimmed = module.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CvsError::Config("CVS module name is empty".to_string()));
    }
    Ok(trimmed.to_string())
}
