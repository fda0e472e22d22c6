//! CVSROOT parsing.
//!
//! Grammar: `[:method:][[user][:password]@]host[:port]/path`. A root with
//! no method and no leading slash is treated as `ext`; a bare absolute
//! path is a local repository.

use crate::error::{CvsError, Result};
use std::fmt;

pub const DEFAULT_EXT_PORT: u16 = 22;
pub const DEFAULT_PSERVER_PORT: u16 = 2401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Ext,
    Local,
    Pserver,
}

impl Method {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "ext" => Some(Method::Ext),
            "local" => Some(Method::Local),
            "pserver" => Some(Method::Pserver),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Method::Ext => "ext",
            Method::Local => "local",
            Method::Pserver => "pserver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvsRoot {
    pub method: Method,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

impl CvsRoot {
    pub fn parse(root: &str) -> Result<Self> {
        let (method, rest) = match root.strip_prefix(':') {
            Some(after) => {
                let end = after
                    .find(':')
                    .ok_or_else(|| CvsError::malformed_root(root, "unterminated method"))?;
                let method = Method::from_str(&after[..end]).ok_or_else(|| {
                    CvsError::malformed_root(root, format!("unknown method '{}'", &after[..end]))
                })?;
                (method, &after[end + 1..])
            }
            None if root.starts_with('/') => (Method::Local, root),
            None => (Method::Ext, root),
        };

        if method == Method::Local {
            return Self::parse_local(root, rest);
        }

        let (user, password, rest) = match rest.rfind('@') {
            Some(at) => {
                let creds = &rest[..at];
                let (user, password) = match creds.find(':') {
                    Some(colon) => (&creds[..colon], Some(creds[colon + 1..].to_string())),
                    None => (creds, None),
                };
                let user = if user.is_empty() {
                    None
                } else {
                    Some(user.to_string())
                };
                (user, password, &rest[at + 1..])
            }
            None => (None, None, rest),
        };

        let (host, rest) = if let Some(bracketed) = rest.strip_prefix('[') {
            let close = bracketed
                .find(']')
                .ok_or_else(|| CvsError::malformed_root(root, "unterminated bracketed host"))?;
            (&bracketed[..close], &bracketed[close + 1..])
        } else {
            let end = rest
                .find(|c| c == ':' || c == '/')
                .ok_or_else(|| CvsError::malformed_root(root, "missing repository path"))?;
            (&rest[..end], &rest[end..])
        };
        if host.is_empty() {
            return Err(CvsError::malformed_root(root, "missing host"));
        }

        let (port, path) = match rest.strip_prefix(':') {
            Some(after) if !after.starts_with('/') => {
                let slash = after
                    .find('/')
                    .ok_or_else(|| CvsError::malformed_root(root, "missing repository path"))?;
                let port: u16 = after[..slash]
                    .parse()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| {
                        CvsError::malformed_root(root, format!("bad port '{}'", &after[..slash]))
                    })?;
                (Some(port), &after[slash..])
            }
            Some(after) => (None, after),
            None => (None, rest),
        };

        let path = Self::normalize_path(root, path)?;
        let port = port.or(match method {
            Method::Ext => Some(DEFAULT_EXT_PORT),
            Method::Pserver => Some(DEFAULT_PSERVER_PORT),
            Method::Local => None,
        });

        Ok(Self {
            method,
            user,
            password,
            host: Some(host.to_string()),
            port,
            path,
        })
    }

    fn parse_local(root: &str, rest: &str) -> Result<Self> {
        Ok(Self {
            method: Method::Local,
            user: None,
            password: None,
            host: None,
            port: None,
            path: Self::normalize_path(root, rest)?,
        })
    }

    fn normalize_path(root: &str, path: &str) -> Result<String> {
        if !path.starts_with('/') {
            return Err(CvsError::malformed_root(root, "missing repository path"));
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok("/".to_string());
        }
        Ok(trimmed.to_string())
    }

    /// `host:port` suitable for a socket connect, bracketing IPv6 literals.
    pub fn socket_addr(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        let port = self.port.unwrap_or(DEFAULT_PSERVER_PORT);
        if host.contains(':') {
            Some(format!("[{}]:{}", host, port))
        } else {
            Some(format!("{}:{}", host, port))
        }
    }
}

impl fmt::Display for CvsRoot {
    /// Renders the root without the password.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}:", self.method.as_str())?;
        if let Some(host) = &self.host {
            if let Some(user) = &self.user {
                write!(f, "{}@", user)?;
            }
            if host.contains(':') {
                write!(f, "[{}]", host)?;
            } else {
                f.write_str(host)?;
            }
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        f.write_str(&self.path)
    }
}
