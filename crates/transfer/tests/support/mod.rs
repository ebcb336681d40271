//! Shared scaffolding: a daemon on a loopback port with tempdir-backed
//! modules, driven end to end through the client.

use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::thread::JoinHandle;

use rsync_daemon::{Daemon, Module, Server, ShutdownHandle};
use rsync_opts::Options;

/// A daemon serving on an ephemeral loopback port for one test.
pub struct TestDaemon {
    /// Bound port.
    pub port: u16,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl TestDaemon {
    /// Returns the `rsync://` URL for a path inside `module`.
    pub fn url(&self, module_path: &str) -> String {
        format!("rsync://127.0.0.1:{}/{module_path}", self.port)
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Starts a daemon with the given modules on an ephemeral port.
pub fn spawn_daemon(modules: Vec<Module>) -> TestDaemon {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    let shutdown = Server::shutdown_handle(&listener).expect("shutdown handle");
    let server = Server::new(Daemon::new(modules).expect("valid modules"));

    let serve_shutdown = shutdown.clone();
    let thread = std::thread::spawn(move || {
        let _ = server.serve(&listener, &serve_shutdown);
    });

    TestDaemon {
        port,
        shutdown,
        thread: Some(thread),
    }
}

/// A module definition rooted at a test directory.
pub fn module(name: &str, path: &Path, writable: bool) -> Module {
    Module {
        name: name.to_owned(),
        path: path.to_path_buf(),
        comment: format!("{name} test module"),
        writable,
        acl: Vec::new(),
    }
}

/// Typical archive-style pull/push options: recurse, links, perms, times.
pub fn archive_opts() -> Options {
    Options {
        recurse: true,
        preserve_links: true,
        preserve_perms: true,
        preserve_mtimes: true,
        ..Options::default()
    }
}
