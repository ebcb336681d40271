//! The `rsync-rs` binary: client, command-mode server and daemon in one
//! executable, dispatched on `--server`/`--daemon` exactly like the
//! classic tool, so the local-server path can re-invoke the same binary.

use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches};
use tracing_subscriber::EnvFilter;

use rsync_client::run_client;
use rsync_daemon::{Config, Daemon, Module, Server};
use rsync_opts::{base_command, options_from_matches, Options};
use rsync_protocol::{ByteCounter, CountingReader, CountingWriter};

/// Configuration files consulted when `--config` is absent.
const DEFAULT_CONFIG_PATHS: &[&str] = &["/etc/rsync-rs/rsyncd.toml", "rsyncd.toml"];

fn cli() -> clap::Command {
    base_command("rsync-rs")
        .about("rsync protocol-27 client and daemon")
        .disable_help_flag(false)
        .arg(
            Arg::new("rsh")
                .long("rsh")
                .short('e')
                .value_name("COMMAND")
                .help("Remote shell to use for single-colon transfers."),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Daemon configuration file."),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("HOST:PORT")
                .help("Daemon listen address, overriding the config file."),
        )
        .arg(
            Arg::new("module")
                .long("module")
                .value_name("NAME=PATH")
                .action(ArgAction::Append)
                .help("Add a module without a config file; may be repeated."),
        )
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    let mut opts = options_from_matches(&matches);
    opts.rsh = matches.get_one::<String>("rsh").cloned();

    init_tracing(&opts);

    let remaining: Vec<String> = matches
        .get_many::<String>("args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let result = if opts.daemon && opts.server {
        daemon_over_stdio(&matches)
    } else if opts.server {
        command_mode(&opts, &remaining)
    } else if opts.daemon {
        daemon_main(&matches)
    } else {
        client_main(&opts, &remaining)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("rsync-rs: {error}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(opts: &Options) {
    let level = match opts.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Client invocation: the last operand is the destination unless there is
/// only one, which requests a listing.
fn client_main(opts: &Options, remaining: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if remaining.is_empty() {
        return Err("no source given; try rsync-rs SRC DEST".into());
    }
    let (sources, dest) = match remaining.split_last() {
        Some((dest, sources)) if !sources.is_empty() => (sources, Some(dest.as_str())),
        _ => (remaining, None),
    };

    match run_client(opts, sources, dest)? {
        Some(stats) => {
            tracing::info!(
                read = stats.read,
                written = stats.written,
                size = stats.size,
                "transfer complete"
            );
        }
        None => tracing::debug!("module listing complete"),
    }
    Ok(())
}

/// `--server`: command mode over stdin/stdout, spawned by a remote shell
/// or by a local client.
fn command_mode(opts: &Options, remaining: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if remaining.len() < 2 || remaining[0] != "." {
        return Err("invalid server invocation: expected . and a path".into());
    }
    let paths = &remaining[1..];

    let (module, walk_paths) = if opts.sender {
        if paths.len() != 1 {
            return Err("server sender expects exactly one source path".into());
        }
        let (root, walk) = split_server_source(&paths[0]);
        (implicit_module(root), vec![walk])
    } else {
        let dest = PathBuf::from(&paths[0]);
        std::fs::create_dir_all(&dest)?;
        (implicit_module(dest), vec![".".to_owned()])
    };

    let daemon = Daemon::new(Vec::new())?;
    // Stdin/Stdout handles rather than locks: the receiver pipeline moves
    // the write half across a thread.
    let crd = CountingReader::new(io::stdin());
    let read_bytes = crd.counter();
    let mut rd = crd;
    let mut cwr = CountingWriter::new(io::stdout());
    let written_bytes: ByteCounter = cwr.counter();

    daemon.handle_conn(
        &module,
        &mut rd,
        &mut cwr,
        &walk_paths,
        opts,
        true,
        &read_bytes,
        &written_bytes,
    )?;
    Ok(())
}

fn implicit_module(path: PathBuf) -> Module {
    Module {
        name: "implicit".to_owned(),
        path,
        comment: String::new(),
        writable: true,
        acl: Vec::new(),
    }
}

/// Splits a server-side source operand the same way the client driver
/// does: a trailing slash serves the directory contents, otherwise the
/// entry itself from its parent directory.
fn split_server_source(path: &str) -> (PathBuf, String) {
    if let Some(stripped) = path.strip_suffix('/') {
        let root = if stripped.is_empty() { "/" } else { stripped };
        return (PathBuf::from(root), ".".to_owned());
    }
    let path = Path::new(path);
    let root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map_or_else(|| ".".to_owned(), |name| name.to_string_lossy().into_owned());
    (root, name)
}

/// `--server --daemon`: a daemon session over stdin/stdout, used behind
/// SSH transports.
fn daemon_over_stdio(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(matches)?;
    let daemon = Daemon::new(config.modules)?;
    daemon.handle_daemon_conn(io::stdin(), io::stdout(), None)?;
    Ok(())
}

/// `--daemon`: the TCP listening daemon.
fn daemon_main(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(matches)?;

    for spec in matches
        .get_many::<String>("module")
        .into_iter()
        .flatten()
    {
        let (name, path) = spec
            .split_once('=')
            .ok_or_else(|| format!("malformed --module {spec:?}, expected NAME=PATH"))?;
        config.modules.push(Module {
            name: name.to_owned(),
            path: PathBuf::from(path),
            comment: String::new(),
            writable: false,
            acl: Vec::new(),
        });
    }

    let listen = matches
        .get_one::<String>("listen")
        .cloned()
        .or_else(|| config.listeners.first().map(|l| l.rsyncd.clone()))
        .ok_or("no listen address: pass --listen or configure a [[listener]]")?;
    if config.modules.is_empty() {
        return Err("no modules configured; pass --module or a config file".into());
    }
    for module in &config.modules {
        tracing::info!(name = %module.name, path = %module.path.display(), "module configured");
    }

    let listener = TcpListener::bind(&listen)?;
    let shutdown = Server::shutdown_handle(&listener)?;
    let server = Server::new(Daemon::new(config.modules)?);
    server.serve(&listener, &shutdown)?;
    Ok(())
}

fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn std::error::Error>> {
    if let Some(path) = matches.get_one::<String>("config") {
        return Ok(Config::from_file(Path::new(path))?);
    }
    for candidate in DEFAULT_CONFIG_PATHS {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(Config::from_file(path)?);
        }
    }
    Ok(Config::default())
}
