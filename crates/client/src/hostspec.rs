//! Source/destination hostspec parsing.
//!
//! The accepted forms, in the order they are tried:
//!
//! - `rsync://[user@]host[:port]/module/path`: daemon over TCP;
//! - `[user@]host::module/path`: daemon over TCP, classic syntax;
//! - `[user@]host:path`: remote shell, provided the colon appears before
//!   any slash;
//! - anything else is a local path.

/// Default TCP port of the rsync daemon.
pub const DEFAULT_PORT: u16 = 873;

/// Where one side of the transfer lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// A plain local path.
    Local(String),
    /// A daemon module, `module/path` addressed.
    Daemon {
        /// Login name, when given as `user@host`.
        user: Option<String>,
        /// Daemon host.
        host: String,
        /// Daemon port.
        port: u16,
        /// `module/path` operand; empty requests the module listing.
        module_path: String,
    },
    /// A path reached through a remote shell.
    RemoteShell {
        /// Login name, when given as `user@host`.
        user: Option<String>,
        /// Remote host.
        host: String,
        /// Path on the remote host.
        path: String,
    },
}

impl Target {
    /// Returns the module name for daemon targets: the part up to the
    /// first slash.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::Daemon { module_path, .. } => {
                Some(module_path.split('/').next().unwrap_or_default())
            }
            _ => None,
        }
    }
}

fn split_user(spec: &str) -> (Option<String>, &str) {
    match spec.split_once('@') {
        Some((user, rest)) if !user.is_empty() => (Some(user.to_owned()), rest),
        _ => (None, spec),
    }
}

/// Classifies one transfer operand.
#[must_use]
pub fn parse_target(spec: &str) -> Target {
    if let Some(rest) = spec.strip_prefix("rsync://") {
        let (user, rest) = split_user(rest);
        let (hostport, module_path) = match rest.split_once('/') {
            Some((hostport, module_path)) => (hostport, module_path),
            None => (rest, ""),
        };
        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, port),
                Err(_) => (hostport, DEFAULT_PORT),
            },
            None => (hostport, DEFAULT_PORT),
        };
        return Target::Daemon {
            user,
            host: host.to_owned(),
            port,
            module_path: module_path.to_owned(),
        };
    }

    // A colon only counts as a host separator before the first slash.
    let colon = spec.find(':');
    let slash = spec.find('/').unwrap_or(usize::MAX);
    match colon {
        Some(at) if at < slash => {
            let (host_part, rest) = (&spec[..at], &spec[at + 1..]);
            let (user, host) = split_user(host_part);
            if let Some(module_path) = rest.strip_prefix(':') {
                Target::Daemon {
                    user,
                    host: host.to_owned(),
                    port: DEFAULT_PORT,
                    module_path: module_path.to_owned(),
                }
            } else {
                Target::RemoteShell {
                    user,
                    host: host.to_owned(),
                    path: rest.to_owned(),
                }
            }
        }
        _ => Target::Local(spec.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_paths() {
        assert_eq!(parse_target("./src"), Target::Local("./src".to_owned()));
        assert_eq!(parse_target("/tmp/x"), Target::Local("/tmp/x".to_owned()));
        // The colon comes after a slash, so this stays local.
        assert_eq!(
            parse_target("dir/with:colon"),
            Target::Local("dir/with:colon".to_owned())
        );
    }

    #[test]
    fn remote_shell_spec() {
        assert_eq!(
            parse_target("backup@example.com:srv/data"),
            Target::RemoteShell {
                user: Some("backup".to_owned()),
                host: "example.com".to_owned(),
                path: "srv/data".to_owned(),
            }
        );
    }

    #[test]
    fn double_colon_daemon_spec() {
        assert_eq!(
            parse_target("example.com::pub/dists"),
            Target::Daemon {
                user: None,
                host: "example.com".to_owned(),
                port: DEFAULT_PORT,
                module_path: "pub/dists".to_owned(),
            }
        );
    }

    #[test]
    fn rsync_url_with_port() {
        let target = parse_target("rsync://mirror@example.com:8730/pub");
        assert_eq!(
            target,
            Target::Daemon {
                user: Some("mirror".to_owned()),
                host: "example.com".to_owned(),
                port: 8730,
                module_path: "pub".to_owned(),
            }
        );
        assert_eq!(target.module(), Some("pub"));
    }

    #[test]
    fn empty_module_requests_listing() {
        let target = parse_target("rsync://example.com/");
        assert_eq!(target.module(), Some(""));
        assert_eq!(parse_target("example.com::").module(), Some(""));
    }
}
