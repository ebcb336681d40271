//! The immutable options record consumed by the transfer core.

/// Resolved configuration for one transfer, immutable after parsing.
///
/// The external command-line parser accepts a superset of rsync's flags;
/// only the fields here affect the core's behavior.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Options {
    /// Acting as the server end of the connection.
    pub server: bool,
    /// Acting as the sending side.
    pub sender: bool,
    /// Daemon mode.
    pub daemon: bool,
    /// Plan the transfer without touching the destination.
    pub dry_run: bool,
    /// Verbosity level (`-v` count).
    pub verbose: u8,
    /// Remove destination files absent from the source (`--delete`).
    pub delete_mode: bool,
    /// Never trust size+mtime; always compare content (`--checksum`).
    pub checksum: bool,
    /// Skip the delta algorithm and send whole files (`--whole-file`).
    pub whole_file: bool,
    /// Do not map uid/gid values via the name tables (`--numeric-ids`).
    pub numeric_ids: bool,
    /// Preserve owners (`-o`).
    pub preserve_uid: bool,
    /// Preserve groups (`-g`).
    pub preserve_gid: bool,
    /// Preserve permission bits (`-p`).
    pub preserve_perms: bool,
    /// Preserve modification times (`-t`).
    pub preserve_mtimes: bool,
    /// Preserve symlinks (`-l`).
    pub preserve_links: bool,
    /// Preserve device nodes (`-D`).
    pub preserve_devices: bool,
    /// Preserve fifos and sockets (`-D`).
    pub preserve_specials: bool,
    /// Preserve hard links (`-H`); parsed but not implemented.
    pub preserve_hard_links: bool,
    /// Recurse into directories (`-r`).
    pub recurse: bool,
    /// Fixed checksum seed override (`--checksum-seed`).
    pub checksum_seed: Option<i32>,
    /// Remote shell command (`-e`/`--rsh`).
    pub rsh: Option<String>,
}

impl Options {
    /// Renders the server-side argument vector for spawning a peer.
    ///
    /// `server_is_sender` states the role the *server* should take: pulls
    /// put the remote end in `--sender` mode, pushes leave it receiving.
    #[must_use]
    pub fn to_server_args(&self, server_is_sender: bool) -> Vec<String> {
        let mut args = vec!["--server".to_owned()];
        if server_is_sender {
            args.push("--sender".to_owned());
        }

        let mut shorts = String::from("-");
        for _ in 0..self.verbose {
            shorts.push('v');
        }
        if self.preserve_links {
            shorts.push('l');
        }
        if self.preserve_uid {
            shorts.push('o');
        }
        if self.preserve_gid {
            shorts.push('g');
        }
        if self.preserve_devices || self.preserve_specials {
            shorts.push('D');
        }
        if self.preserve_mtimes {
            shorts.push('t');
        }
        if self.preserve_perms {
            shorts.push('p');
        }
        if self.recurse {
            shorts.push('r');
        }
        if self.checksum {
            shorts.push('c');
        }
        if self.whole_file {
            shorts.push('W');
        }
        if self.preserve_hard_links {
            shorts.push('H');
        }
        if self.dry_run {
            shorts.push('n');
        }
        if shorts.len() > 1 {
            args.push(shorts);
        }

        if self.delete_mode {
            args.push("--delete".to_owned());
        }
        if self.numeric_ids {
            args.push("--numeric-ids".to_owned());
        }
        if let Some(seed) = self.checksum_seed {
            args.push(format!("--checksum-seed={seed}"));
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::parse_server_args;

    #[test]
    fn server_args_bundle_short_flags() {
        let opts = Options {
            preserve_links: true,
            preserve_uid: true,
            preserve_gid: true,
            preserve_devices: true,
            preserve_specials: true,
            preserve_mtimes: true,
            preserve_perms: true,
            recurse: true,
            ..Options::default()
        };
        assert_eq!(
            opts.to_server_args(true),
            ["--server", "--sender", "-logDtpr"]
        );
    }

    #[test]
    fn rendered_args_parse_back() {
        let opts = Options {
            verbose: 2,
            delete_mode: true,
            numeric_ids: true,
            preserve_links: true,
            preserve_mtimes: true,
            recurse: true,
            checksum_seed: Some(666),
            ..Options::default()
        };

        let mut args = opts.to_server_args(false);
        args.push(".".to_owned());
        args.push("module/".to_owned());
        let parsed = parse_server_args(&args).unwrap();

        assert!(parsed.options.server);
        assert!(!parsed.options.sender);
        assert_eq!(parsed.options.verbose, 2);
        assert!(parsed.options.delete_mode);
        assert!(parsed.options.numeric_ids);
        assert!(parsed.options.preserve_links);
        assert!(parsed.options.preserve_mtimes);
        assert!(parsed.options.recurse);
        assert_eq!(parsed.options.checksum_seed, Some(666));
        assert_eq!(parsed.remaining, [".", "module/"]);
    }
}
