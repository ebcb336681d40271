//! Parser for server-role argument lines.
//!
//! rsync bundles short options when invoking the server end (`-logDtpr`),
//! so the command definition leans on clap's builder API with combined
//! short flags. Unknown or unimplemented options must fail parsing: the
//! daemon turns that failure into a multiplexed error so the remote user
//! sees which flag was rejected.

use clap::{value_parser, Arg, ArgAction, Command};

use crate::{Options, OptionParseError};

/// Wire arguments decoded into an [`Options`] record plus path operands.
#[derive(Clone, Debug)]
pub struct ParsedServerArgs {
    /// The resolved options.
    pub options: Options,
    /// Positional operands; for server invocations `remaining[0]` is the
    /// `.` placeholder and the rest are paths.
    pub remaining: Vec<String>,
}

/// The shared argument set understood on the wire and by the CLI binary.
///
/// The binary extends this with client-only flags; the daemon uses it
/// as-is for the argument lines read off the socket.
#[must_use]
pub fn base_command(name: &'static str) -> Command {
    Command::new(name)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("server")
                .long("server")
                .help("Run as the server end of a connection.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sender")
                .long("sender")
                .help("Take the sending role.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("daemon")
                .long("daemon")
                .help("Run as an rsync daemon.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .short('n')
                .help("Show what would be transferred without doing it.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase verbosity; may be repeated.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("recursive")
                .long("recursive")
                .short('r')
                .help("Recurse into directories.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("links")
                .long("links")
                .short('l')
                .help("Copy symlinks as symlinks.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("perms")
                .long("perms")
                .short('p')
                .help("Preserve permissions.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("times")
                .long("times")
                .short('t')
                .help("Preserve modification times.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("owner")
                .long("owner")
                .short('o')
                .help("Preserve the owner (super-user only).")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("group")
                .long("group")
                .short('g')
                .help("Preserve the group.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("devices-specials")
                .short('D')
                .help("Preserve device and special files.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("hard-links")
                .long("hard-links")
                .short('H')
                .help("Preserve hard links (not yet implemented).")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("checksum")
                .long("checksum")
                .short('c')
                .help("Skip files based on checksum, not size and mtime.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("whole-file")
                .long("whole-file")
                .short('W')
                .help("Copy whole files without the delta-transfer algorithm.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("delete")
                .long("delete")
                .help("Delete extraneous files from the destination.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("numeric-ids")
                .long("numeric-ids")
                .help("Keep uid/gid values instead of mapping by name.")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("checksum-seed")
                .long("checksum-seed")
                .value_name("NUM")
                .help("Fix the block and file checksum seed.")
                .value_parser(value_parser!(i32)),
        )
        .arg(
            Arg::new("args")
                .value_name("ARGS")
                .num_args(0..)
                .help("Path operands."),
        )
}

/// Extracts the shared [`Options`] fields from parsed matches.
#[must_use]
pub fn options_from_matches(matches: &clap::ArgMatches) -> Options {
    let devices_specials = matches.get_flag("devices-specials");
    Options {
        server: matches.get_flag("server"),
        sender: matches.get_flag("sender"),
        daemon: matches.get_flag("daemon"),
        dry_run: matches.get_flag("dry-run"),
        verbose: matches.get_count("verbose"),
        delete_mode: matches.get_flag("delete"),
        checksum: matches.get_flag("checksum"),
        whole_file: matches.get_flag("whole-file"),
        numeric_ids: matches.get_flag("numeric-ids"),
        preserve_uid: matches.get_flag("owner"),
        preserve_gid: matches.get_flag("group"),
        preserve_perms: matches.get_flag("perms"),
        preserve_mtimes: matches.get_flag("times"),
        preserve_links: matches.get_flag("links"),
        preserve_devices: devices_specials,
        preserve_specials: devices_specials,
        preserve_hard_links: matches.get_flag("hard-links"),
        recurse: matches.get_flag("recursive"),
        checksum_seed: matches.get_one::<i32>("checksum-seed").copied(),
        rsh: None,
    }
}

/// Parses the argument lines a server read from its peer.
///
/// # Errors
///
/// Returns [`OptionParseError`] for unknown flags or malformed values; the
/// message names the offending argument for the multiplexed error frame.
pub fn parse_server_args(args: &[String]) -> Result<ParsedServerArgs, OptionParseError> {
    let matches = base_command("rsync-server")
        .no_binary_name(true)
        .try_get_matches_from(args)
        .map_err(|error| OptionParseError(error.to_string().trim().to_owned()))?;

    let options = options_from_matches(&matches);
    let remaining = matches
        .get_many::<String>("args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    Ok(ParsedServerArgs { options, remaining })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn bundled_short_flags_parse() {
        let parsed =
            parse_server_args(&args(&["--server", "--sender", "-logDtpr", ".", "pub/"])).unwrap();
        let opts = parsed.options;

        assert!(opts.server && opts.sender);
        assert!(opts.preserve_links && opts.preserve_uid && opts.preserve_gid);
        assert!(opts.preserve_devices && opts.preserve_specials);
        assert!(opts.preserve_mtimes && opts.preserve_perms && opts.recurse);
        assert_eq!(parsed.remaining, [".", "pub/"]);
    }

    #[test]
    fn repeated_verbose_counts() {
        let parsed = parse_server_args(&args(&["--server", "-vvr", ".", "x"])).unwrap();
        assert_eq!(parsed.options.verbose, 2);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = parse_server_args(&args(&["--server", "--acls", ".", "x"])).unwrap_err();
        assert!(err.to_string().contains("--acls"), "got: {err}");
    }

    #[test]
    fn checksum_seed_value_is_captured() {
        let parsed =
            parse_server_args(&args(&["--server", "--checksum-seed=12345", ".", "x"])).unwrap();
        assert_eq!(parsed.options.checksum_seed, Some(12345));
    }

    #[test]
    fn paths_may_be_empty_for_daemon_invocation() {
        let parsed = parse_server_args(&args(&["--server", "--daemon", "."])).unwrap();
        assert!(parsed.options.daemon);
        assert_eq!(parsed.remaining, ["."]);
    }
}
