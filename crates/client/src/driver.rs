//! Transport selection and subprocess wiring.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use rsync_opts::Options;
use rsync_protocol::TransferStats;

use crate::hostspec::{parse_target, Target};
use crate::session::{client_session, Role};
use crate::socket;
use crate::ClientError;

/// Command executed on the remote side of a shell transport.
const REMOTE_COMMAND: &str = "rsync";

/// Runs one client invocation: resolves the operands, picks a transport
/// and drives the session.
///
/// Returns the transfer statistics, or `None` for a module-listing run.
pub fn run_client(
    opts: &Options,
    sources: &[String],
    dest: Option<&str>,
) -> Result<Option<TransferStats>, ClientError> {
    let src = sources
        .first()
        .ok_or_else(|| ClientError::Usage("at least one source is required".to_owned()))?;
    if sources.len() > 1 {
        return Err(ClientError::Usage(
            "multiple sources are not supported".to_owned(),
        ));
    }

    let src_target = parse_target(src);
    tracing::debug!(?src_target, ?dest, "resolved source");

    match src_target {
        // Pull or listing: the remote side is the sender.
        Target::Daemon {
            host,
            port,
            module_path,
            ..
        } => {
            if module_path.is_empty() || dest.is_none() {
                socket::list_modules(
                    opts,
                    &Target::Daemon {
                        user: None,
                        host,
                        port,
                        module_path,
                    },
                )?;
                return Ok(None);
            }
            let dest = prepare_dest(dest.unwrap_or_default())?;
            socket::run_daemon(opts, &host, port, &module_path, Role::Receive { dest: &dest })
        }
        Target::RemoteShell { user, host, path } => {
            let dest = dest.ok_or_else(|| {
                ClientError::Usage("a destination is required when pulling".to_owned())
            })?;
            let dest = prepare_dest(dest)?;
            let mut args = opts.to_server_args(true);
            args.push(".".to_owned());
            args.push(path);
            let ServerChild {
                child,
                stdout,
                stdin,
            } = spawn_remote_shell(opts, user.as_deref(), &host, &args)?;
            let stats = client_session(stdout, stdin, opts, Role::Receive { dest: &dest }, true)?;
            reap(child);
            Ok(Some(stats))
        }
        // Push: we are the sender.
        Target::Local(src) => {
            let dest = dest.ok_or_else(|| {
                ClientError::Usage("a destination is required".to_owned())
            })?;
            let (root, walk_path) = split_source(&src);
            let paths = vec![walk_path];

            match parse_target(dest) {
                Target::Daemon {
                    host,
                    port,
                    module_path,
                    ..
                } => socket::run_daemon(
                    opts,
                    &host,
                    port,
                    &module_path,
                    Role::Send {
                        root: &root,
                        paths: &paths,
                    },
                ),
                Target::RemoteShell { user, host, path } => {
                    let mut args = opts.to_server_args(false);
                    args.push(".".to_owned());
                    args.push(path);
                    let ServerChild {
                        child,
                        stdout,
                        stdin,
                    } = spawn_remote_shell(opts, user.as_deref(), &host, &args)?;
                    let stats = client_session(
                        stdout,
                        stdin,
                        opts,
                        Role::Send {
                            root: &root,
                            paths: &paths,
                        },
                        true,
                    )?;
                    reap(child);
                    Ok(Some(stats))
                }
                Target::Local(dest) => {
                    let ServerChild {
                        child,
                        stdout,
                        stdin,
                    } = spawn_local_server(opts, &dest)?;
                    let stats = client_session(
                        stdout,
                        stdin,
                        opts,
                        Role::Send {
                            root: &root,
                            paths: &paths,
                        },
                        true,
                    )?;
                    reap(child);
                    Ok(Some(stats))
                }
            }
        }
    }
}

/// Splits a local source operand into a walk root and a relative path,
/// honoring the trailing-slash convention: `src/` transfers the contents
/// of the directory, `src` transfers the directory itself.
fn split_source(src: &str) -> (PathBuf, String) {
    if let Some(stripped) = src.strip_suffix('/') {
        let root = if stripped.is_empty() { "/" } else { stripped };
        return (PathBuf::from(root), ".".to_owned());
    }

    let path = Path::new(src);
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map_or_else(|| ".".to_owned(), |name| name.to_string_lossy().into_owned());
    (root, name)
}

fn prepare_dest(dest: &str) -> Result<PathBuf, ClientError> {
    let dest = PathBuf::from(dest);
    fs::create_dir_all(&dest)?;
    Ok(dest)
}

/// A spawned server subprocess with its stdio duplex.
struct ServerChild {
    child: Child,
    stdout: ChildStdout,
    stdin: ChildStdin,
}

/// Reaps a finished server subprocess, logging abnormal exits.
fn reap(mut child: Child) {
    match child.wait() {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::warn!(%status, "server subprocess exited abnormally"),
        Err(error) => tracing::warn!(%error, "failed to reap server subprocess"),
    }
}

fn spawn(program: PathBuf, args: &[String]) -> Result<ServerChild, ClientError> {
    tracing::debug!(program = %program.display(), ?args, "spawning server");
    let mut child = Command::new(&program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| ClientError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin missing"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("child stdout missing"))?;
    Ok(ServerChild {
        child,
        stdout,
        stdin,
    })
}

/// Spawns the remote shell with the server-side rsync argument vector.
fn spawn_remote_shell(
    opts: &Options,
    user: Option<&str>,
    host: &str,
    server_args: &[String],
) -> Result<ServerChild, ClientError> {
    let shell = opts
        .rsh
        .clone()
        .or_else(|| env::var("RSYNC_RSH").ok())
        .unwrap_or_else(|| "ssh".to_owned());
    let mut argv = shlex::split(&shell)
        .ok_or_else(|| ClientError::Usage(format!("unparsable remote shell command {shell:?}")))?;
    if argv.is_empty() {
        return Err(ClientError::Usage("empty remote shell command".to_owned()));
    }

    if let Some(user) = user {
        argv.push("-l".to_owned());
        argv.push(user.to_owned());
    }
    argv.push(host.to_owned());
    argv.push(REMOTE_COMMAND.to_owned());
    argv.extend_from_slice(server_args);

    spawn(PathBuf::from(&argv[0]), &argv[1..])
}

/// Spawns the current executable as a receiving server for local-to-local
/// transfers.
fn spawn_local_server(opts: &Options, dest: &str) -> Result<ServerChild, ClientError> {
    let program = env::current_exe()?;
    let mut args = opts.to_server_args(false);
    args.push(".".to_owned());
    args.push(dest.to_owned());
    spawn(program, &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_source_trailing_slash_means_contents() {
        assert_eq!(split_source("src/"), (PathBuf::from("src"), ".".to_owned()));
        assert_eq!(split_source("/"), (PathBuf::from("/"), ".".to_owned()));
    }

    #[test]
    fn split_source_without_slash_means_the_entry() {
        assert_eq!(
            split_source("tree"),
            (PathBuf::from("."), "tree".to_owned())
        );
        assert_eq!(
            split_source("/tmp/tree"),
            (PathBuf::from("/tmp"), "tree".to_owned())
        );
    }
}
