//! Connection to a CVS server.
//!
//! `:ext:` roots run `cvs server` over ssh, `:local:` roots run it directly,
//! `:pserver:` roots open a TCP socket. Either way the result is one
//! [`CvsStream`]. Protocol handling is done by the session.

use crate::config::ClientConfig;
use crate::error::{CvsError, Result};
use crate::root::{CvsRoot, Method, DEFAULT_EXT_PORT};
use crate::transport::stream::{CvsStream, StreamStats};
use std::process::Stdio;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

/// Remote command started on the far end of an ssh connection.
const REMOTE_COMMAND: &str = "cvs server";

/// Manages the byte channel to one `cvs server` instance.
pub struct ServerConnection {
    child: Option<Child>,
    stream: CvsStream,
    target: String,
}

impl ServerConnection {
    pub async fn open(root: &CvsRoot, config: &ClientConfig) -> Result<Self> {
        match root.method {
            Method::Ext => Self::connect_ssh(root, config.ssh_program()).await,
            Method::Local => Self::connect_local(&config.server_command).await,
            Method::Pserver => Self::connect_tcp(root).await,
        }
    }

    /// Wrap an already established stream, e.g. an in-memory pipe.
    pub fn from_stream(stream: CvsStream, target: impl Into<String>) -> Self {
        Self {
            child: None,
            stream,
            target: target.into(),
        }
    }

    /// Connect to a remote server via ssh.
    pub async fn connect_ssh(root: &CvsRoot, program: &str) -> Result<Self> {
        let argv = ssh_command(root, program)?;
        let target = argv.join(" ");
        tracing::debug!("Spawning {}", target);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        Self::spawn(cmd, target)
    }

    /// Run `cvs server` locally through the shell.
    pub async fn connect_local(server_command: &str) -> Result<Self> {
        tracing::debug!("Spawning local {}", server_command);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(server_command);
        Self::spawn(cmd, server_command.to_string())
    }

    fn spawn(mut cmd: Command, target: String) -> Result<Self> {
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| CvsError::TransportFailure {
            target: target.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| pipe_missing(&target, "stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| pipe_missing(&target, "stdout"))?;

        Ok(Self {
            child: Some(child),
            stream: CvsStream::from_io(stdout, stdin),
            target,
        })
    }

    /// Open the pserver TCP socket.
    pub async fn connect_tcp(root: &CvsRoot) -> Result<Self> {
        let addr = root
            .socket_addr()
            .ok_or_else(|| CvsError::malformed_root(&root.to_string(), "missing host"))?;
        tracing::debug!("Connecting to {}", addr);

        let socket = TcpStream::connect(&addr)
            .await
            .map_err(|source| CvsError::TransportFailure {
                target: addr.clone(),
                source,
            })?;
        // Requests are small and always followed by a read
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!("Cannot set TCP_NODELAY on {}: {}", addr, e);
        }
        let (rd, wr) = socket.into_split();

        Ok(Self {
            child: None,
            stream: CvsStream::from_io(rd, wr),
            target: addr,
        })
    }

    pub fn stream(&mut self) -> &mut CvsStream {
        &mut self.stream
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Shut the stream down and reap the child process.
    pub async fn close(mut self) -> Result<StreamStats> {
        let shutdown = self.stream.shutdown().await;

        if let Some(mut child) = self.child.take() {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => tracing::warn!("{} exited with {}", self.target, status),
                Err(e) => tracing::warn!("Failed to reap {}: {}", self.target, e),
            }
        }
        shutdown
    }
}

fn pipe_missing(target: &str, which: &str) -> CvsError {
    CvsError::TransportFailure {
        target: target.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("failed to open {}", which),
        ),
    }
}

/// Build the argv for an `:ext:` connection.
///
/// PuTTY's `plink` needs `-batch` (TortoisePlink rejects it) and spells the
/// port option `-P`.
pub fn ssh_command(root: &CvsRoot, program: &str) -> Result<Vec<String>> {
    let host = root
        .host
        .as_deref()
        .ok_or_else(|| CvsError::malformed_root(&root.to_string(), "missing host"))?;

    let lower = program.to_ascii_lowercase();
    let putty = lower.contains("plink");

    let mut argv = vec![program.to_string()];
    if putty && !lower.contains("tortoiseplink") {
        argv.push("-batch".to_string());
    }
    if let Some(port) = root.port.filter(|p| *p != DEFAULT_EXT_PORT) {
        argv.push(if putty { "-P" } else { "-p" }.to_string());
        argv.push(port.to_string());
    }
    match &root.user {
        Some(user) => argv.push(format!("{}@{}", user, host)),
        None => argv.push(host.to_string()),
    }
    argv.push(REMOTE_COMMAND.to_string());
    Ok(argv)
}
