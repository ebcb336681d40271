//! The daemon conversation: greeting, module request, argument lines.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use rsync_opts::Options;
use rsync_protocol::PROTOCOL_VERSION;

use crate::hostspec::Target;
use crate::session::{client_session, Role};
use crate::ClientError;

/// Outcome of the in-band daemon handshake.
#[derive(Debug)]
enum Handshake {
    /// The server accepted the module; the binary protocol follows.
    Ready,
    /// The server sent a module listing and closed with `@RSYNCD: EXIT`.
    Listing,
}

/// Connects to a daemon and runs the requested role against a module.
///
/// An empty module requests the listing, which is printed to stdout.
pub(crate) fn run_daemon(
    opts: &Options,
    host: &str,
    port: u16,
    module_path: &str,
    role: Role<'_>,
) -> Result<Option<rsync_protocol::TransferStats>, ClientError> {
    let stream = TcpStream::connect((host, port))?;
    let write_half = stream.try_clone()?;
    let mut rd = BufReader::new(stream);
    let mut wr = write_half;

    let server_is_sender = matches!(role, Role::Receive { .. });
    match inband_handshake(&mut rd, &mut wr, opts, module_path, server_is_sender)? {
        Handshake::Listing => Ok(None),
        Handshake::Ready => {
            let stats = client_session(rd, wr, opts, role, false)?;
            Ok(Some(stats))
        }
    }
}

/// Runs the daemon handshake over an already-connected duplex.
///
/// Used for TCP sockets and for remote-shell daemon transports alike. The
/// argument lines describe the *server's* role, so a pulling client asks
/// for `--sender`.
fn inband_handshake<R: BufRead, W: Write>(
    rd: &mut R,
    wr: &mut W,
    opts: &Options,
    module_path: &str,
    server_is_sender: bool,
) -> Result<Handshake, ClientError> {
    write!(wr, "@RSYNCD: {PROTOCOL_VERSION}\n")?;
    wr.flush()?;

    let greeting = read_line(rd)?;
    let Some(version) = greeting.strip_prefix("@RSYNCD: ") else {
        return Err(ClientError::Protocol(format!(
            "invalid daemon greeting: {greeting:?}"
        )));
    };
    tracing::debug!(version, "daemon greeting");

    let module = module_path.split('/').next().unwrap_or_default();
    write!(wr, "{module}\n")?;
    wr.flush()?;

    loop {
        let line = read_line(rd)?;
        if line == "@RSYNCD: OK" {
            break;
        }
        if line == "@RSYNCD: EXIT" {
            return Ok(Handshake::Listing);
        }
        if let Some(error) = line.strip_prefix("@ERROR") {
            return Err(ClientError::Remote(format!(
                "server rejected the request:{}",
                error.trim_start_matches(':')
            )));
        }
        // Module listing lines pass straight through to the user.
        println!("{line}");
    }

    for arg in opts.to_server_args(server_is_sender) {
        write!(wr, "{arg}\n")?;
    }
    write!(wr, ".\n{module_path}\n\n")?;
    wr.flush()?;

    Ok(Handshake::Ready)
}

/// Lists a daemon's modules (empty module request).
pub(crate) fn list_modules(opts: &Options, target: &Target) -> Result<(), ClientError> {
    let Target::Daemon {
        host,
        port,
        module_path,
        ..
    } = target
    else {
        return Err(ClientError::Usage(
            "module listing requires a daemon target".to_owned(),
        ));
    };

    let stream = TcpStream::connect((host.as_str(), *port))?;
    let write_half = stream.try_clone()?;
    let mut rd = BufReader::new(stream);
    let mut wr = write_half;

    match inband_handshake(&mut rd, &mut wr, opts, module_path, true)? {
        Handshake::Listing => Ok(()),
        Handshake::Ready => Err(ClientError::Protocol(
            "daemon entered transfer mode for a listing request".to_owned(),
        )),
    }
}

fn read_line<R: BufRead>(rd: &mut R) -> Result<String, ClientError> {
    let mut line = Vec::new();
    let n = rd.by_ref().take(4096).read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(ClientError::Protocol(
            "daemon closed the connection mid-handshake".to_owned(),
        ));
    }
    Ok(String::from_utf8_lossy(&line).trim_end().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn handshake_sends_module_and_server_args() {
        let mut opts = Options {
            recurse: true,
            preserve_mtimes: true,
            ..Options::default()
        };
        opts.verbose = 1;

        let server_side = b"@RSYNCD: 27\n@RSYNCD: OK\n".to_vec();
        let mut rd = Cursor::new(server_side);
        let mut sent = Vec::new();

        let outcome = inband_handshake(&mut rd, &mut sent, &opts, "pub/sub", true).unwrap();
        assert!(matches!(outcome, Handshake::Ready));

        let sent = String::from_utf8(sent).unwrap();
        let lines: Vec<&str> = sent.split('\n').collect();
        assert_eq!(lines[0], "@RSYNCD: 27");
        assert_eq!(lines[1], "pub");
        assert!(lines.contains(&"--server"));
        assert!(lines.contains(&"--sender"));
        assert!(lines.contains(&"-vtr"));
        assert!(lines.contains(&"."));
        assert!(lines.contains(&"pub/sub"));
        // Argument block ends with an empty line.
        assert_eq!(&sent[sent.len() - 2..], "\n\n");
    }

    #[test]
    fn error_lines_become_remote_errors() {
        let server_side = b"@RSYNCD: 27\n@ERROR: Unknown module \"nope\"\n".to_vec();
        let mut rd = Cursor::new(server_side);
        let mut sent = Vec::new();

        let err =
            inband_handshake(&mut rd, &mut sent, &Options::default(), "nope", true).unwrap_err();
        assert!(matches!(err, ClientError::Remote(_)));
        assert!(err.to_string().contains("Unknown module"));
    }

    #[test]
    fn listing_terminates_at_exit() {
        let server_side = b"@RSYNCD: 27\npub\tpublic files\n@RSYNCD: EXIT\n".to_vec();
        let mut rd = Cursor::new(server_side);
        let mut sent = Vec::new();

        let outcome = inband_handshake(&mut rd, &mut sent, &Options::default(), "", true).unwrap();
        assert!(matches!(outcome, Handshake::Listing));
    }
}
