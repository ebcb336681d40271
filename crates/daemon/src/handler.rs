//! The connection state machine.
//!
//! Daemon-side flow: greeting, module request (or listing), ACL check,
//! argument lines, checksum seed, multiplex switch, role dispatch. The
//! command-mode entry point ([`Daemon::handle_conn`]) skips the `@RSYNCD`
//! framing and is used for remote-shell invocations, where an implicit
//! module stands in for the daemon configuration.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rsync_opts::{parse_server_args, Options};
use rsync_protocol::{
    ByteCounter, CountingReader, CountingWriter, MessageTag, MuxWriter, WireRead, WireWrite,
    ERROR_SEED, PROTOCOL_VERSION,
};
use rsync_sandbox::RootDir;
use rsync_transfer::{recv_exclusion_list, run_receiver, run_sender};

use crate::module::{check_acl, AclRule, Module};
use crate::DaemonError;

/// Longest accepted handshake line.
const MAX_LINE_LENGTH: usize = 4096;

/// A daemon instance: validated modules with pre-parsed ACLs.
#[derive(Debug)]
pub struct Daemon {
    modules: Vec<(Module, Vec<AclRule>)>,
}

impl Daemon {
    /// Validates `modules` and builds a daemon.
    pub fn new(modules: Vec<Module>) -> Result<Self, DaemonError> {
        let modules = modules
            .into_iter()
            .map(|module| {
                let rules = module.compile()?;
                Ok((module, rules))
            })
            .collect::<Result<_, DaemonError>>()?;
        Ok(Self { modules })
    }

    fn find_module(&self, name: &str) -> Option<&(Module, Vec<AclRule>)> {
        self.modules.iter().find(|(module, _)| module.name == name)
    }

    fn module_listing(&self) -> String {
        let mut listing = String::new();
        for (module, _) in &self.modules {
            listing.push_str(&module.name);
            listing.push('\t');
            listing.push_str(&module.comment);
            listing.push('\n');
        }
        listing
    }

    /// Handles one daemon connection from greeting to goodbye.
    ///
    /// `peer` is the remote address for ACL purposes; `None` (e.g. an SSH
    /// channel that already authenticated) skips ACL checks.
    pub fn handle_daemon_conn<R, W>(
        &self,
        rd: R,
        wr: W,
        peer: Option<IpAddr>,
    ) -> Result<(), DaemonError>
    where
        R: Read,
        W: Write + Send,
    {
        let crd = CountingReader::new(rd);
        let read_bytes = crd.counter();
        let mut rd = BufReader::new(crd);
        let mut cwr = CountingWriter::new(wr);
        let written_bytes = cwr.counter();

        write!(cwr, "@RSYNCD: {PROTOCOL_VERSION}\n")?;
        cwr.flush()?;

        let client_greeting = read_line(&mut rd)?;
        if !client_greeting.starts_with("@RSYNCD: ") {
            return Err(DaemonError::Protocol(format!(
                "invalid client greeting: {client_greeting:?}"
            )));
        }

        let requested = read_line(&mut rd)?;
        if requested.is_empty() || requested == "#list" {
            tracing::info!(?peer, "module listing requested");
            cwr.write_all(self.module_listing().as_bytes())?;
            cwr.write_all(b"@RSYNCD: EXIT\n")?;
            cwr.flush()?;
            return Ok(());
        }
        tracing::info!(?peer, module = %requested, "module requested");

        let Some((module, rules)) = self.find_module(&requested) else {
            write!(cwr, "@ERROR: Unknown module {requested:?}\n")?;
            cwr.flush()?;
            return Err(DaemonError::UnknownModule(requested));
        };

        if let Some(ip) = peer {
            if let Err(denied) = check_acl(rules, ip) {
                write!(cwr, "@ERROR: {denied}\n")?;
                cwr.flush()?;
                return Err(denied);
            }
        }

        cwr.write_all(b"@RSYNCD: OK\n")?;
        cwr.flush()?;

        let mut args = Vec::new();
        loop {
            let line = read_line(&mut rd)?;
            if line.is_empty() {
                break;
            }
            args.push(line);
        }
        tracing::debug!(?args, "client argument lines");

        let parsed = match parse_server_args(&args) {
            Ok(parsed) => parsed,
            Err(error) => {
                // The client already expects a seed; ship the placeholder,
                // then the parse failure as a multiplexed error frame.
                cwr.write_i32(ERROR_SEED)?;
                let mut mux = MuxWriter::new(&mut cwr);
                let _ = mux.send(
                    MessageTag::Error,
                    format!("rsync-rs [server]: parsing server args: {error}\n").as_bytes(),
                );
                return Err(error.into());
            }
        };
        let opts = parsed.options;
        let paths = module_paths(&module.name, &parsed.remaining)?;

        self.handle_conn(
            module,
            &mut rd,
            &mut cwr,
            &paths,
            &opts,
            false,
            &read_bytes,
            &written_bytes,
        )
    }

    /// Runs the post-handshake part of a connection: optional version
    /// negotiation, seed, multiplex switch, then the sender or receiver
    /// role. Command-mode invocations call this directly with an implicit
    /// module.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_conn<R, W>(
        &self,
        module: &Module,
        rd: &mut R,
        cwr: &mut CountingWriter<W>,
        paths: &[String],
        opts: &Options,
        negotiate: bool,
        read_bytes: &ByteCounter,
        written_bytes: &ByteCounter,
    ) -> Result<(), DaemonError>
    where
        R: Read,
        W: Write + Send,
    {
        if negotiate {
            let remote_protocol = rd.read_i32()?;
            tracing::debug!(remote_protocol, "negotiated");
            cwr.write_i32(PROTOCOL_VERSION)?;
            cwr.flush()?;
        }

        let seed = opts.checksum_seed.unwrap_or_else(derive_seed);
        cwr.write_i32(seed)?;
        cwr.flush()?;

        // From here on, everything to the client is multiplexed; the
        // client-to-server direction stays raw.
        let mut mux = MuxWriter::new(&mut *cwr);
        let result = run_role(
            module,
            rd,
            &mut mux,
            paths,
            opts,
            seed,
            read_bytes,
            written_bytes,
        );
        if let Err(error) = &result {
            let role = if opts.sender { "sender" } else { "receiver" };
            let _ = mux.send(
                MessageTag::Error,
                format!("rsync-rs [{role}]: {error}\n").as_bytes(),
            );
        }
        result
    }
}

#[allow(clippy::too_many_arguments)]
fn run_role<R, W>(
    module: &Module,
    rd: &mut R,
    mux: &mut MuxWriter<W>,
    paths: &[String],
    opts: &Options,
    seed: i32,
    read_bytes: &ByteCounter,
    written_bytes: &ByteCounter,
) -> Result<(), DaemonError>
where
    R: Read,
    W: Write + Send,
{
    let root = RootDir::open(&module.path)?;
    let mut wr = BufWriter::with_capacity(32 * 1024, mux);

    if opts.sender {
        recv_exclusion_list(rd)?;
        let stats = run_sender(rd, &mut wr, &root, paths, opts, seed, read_bytes, written_bytes)?;
        tracing::info!(
            module = %module.name,
            read = stats.read,
            written = stats.written,
            size = stats.size,
            "sender finished"
        );
        return Ok(());
    }

    if !module.writable {
        return Err(DaemonError::ReadOnlyModule(module.name.clone()));
    }
    if opts.delete_mode {
        recv_exclusion_list(rd)?;
    }
    let stats = run_receiver(rd, &mut wr, &root, opts, seed)?;
    tracing::info!(
        module = %module.name,
        read = stats.read,
        written = stats.written,
        size = stats.size,
        "receiver finished"
    );
    Ok(())
}

/// Validates the positional operands and strips the module-name prefix
/// from each path, as the client addresses files as `module/path`.
fn module_paths(module_name: &str, remaining: &[String]) -> Result<Vec<String>, DaemonError> {
    if remaining.len() < 2 {
        return Err(DaemonError::Protocol(
            "invalid args: at least one path required".to_owned(),
        ));
    }
    if remaining[0] != "." {
        return Err(DaemonError::Protocol(format!(
            "expected \".\" placeholder, got {:?}",
            remaining[0]
        )));
    }

    Ok(remaining[1..]
        .iter()
        .map(|path| {
            let trimmed = path
                .strip_prefix(module_name)
                .unwrap_or(path)
                .trim_start_matches('/');
            if trimmed.is_empty() {
                ".".to_owned()
            } else {
                trimmed.to_owned()
            }
        })
        .collect())
}

fn derive_seed() -> i32 {
    // time ^ (pid << 6), unique enough per connection.
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    (now as i32) ^ ((std::process::id() as i32) << 6)
}

fn read_line<R: BufRead>(rd: &mut R) -> Result<String, DaemonError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if rd.read(&mut byte)? == 0 {
            return Err(DaemonError::Protocol(
                "connection closed mid-line".to_owned(),
            ));
        }
        if byte[0] == b'\n' {
            return Ok(String::from_utf8_lossy(&line).trim().to_owned());
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE_LENGTH {
            return Err(DaemonError::Protocol("handshake line too long".to_owned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_paths_strip_the_module_prefix() {
        let paths = module_paths(
            "pub",
            &[".".into(), "pub/".into(), "pub/sub/dir".into()],
        )
        .unwrap();
        assert_eq!(paths, [".", "sub/dir"]);
    }

    #[test]
    fn module_paths_require_the_dot_placeholder() {
        assert!(module_paths("pub", &["pub/".into()]).is_err());
        assert!(module_paths("pub", &["x".into(), "pub/".into()]).is_err());
    }

    #[test]
    fn listing_includes_comments() {
        let daemon = Daemon::new(vec![Module {
            name: "pub".into(),
            path: "/srv/pub".into(),
            comment: "public files".into(),
            writable: false,
            acl: Vec::new(),
        }])
        .unwrap();
        assert_eq!(daemon.module_listing(), "pub\tpublic files\n");
    }

    #[test]
    fn derive_seed_varies_with_time_and_pid() {
        // Smoke check only: the seed must be computable.
        let _ = derive_seed();
    }
}
