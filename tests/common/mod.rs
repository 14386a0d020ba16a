//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use controller_config::config::{AppNames, ConfigRegistry, PathResolver, ProcessProperties};
use controller_config::probe::{CancelFlag, MonitorConnector, ProbeError, ProbeTarget};

/// Primary and extended roots inside one temporary directory.
pub struct TempRoots {
    dir: TempDir,
}

impl TempRoots {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    pub fn ex_home(&self) -> PathBuf {
        self.dir.path().join("ex")
    }

    pub fn resolver(&self, properties: ProcessProperties) -> PathResolver {
        PathResolver::new(
            AppNames::default(),
            properties,
            Some(self.dir.path().to_path_buf()),
            self.dir.path().to_path_buf(),
        )
        .with_env("CONTROLLER_HOME", self.home().display().to_string())
        .with_env("CONTROLLER_EX_HOME", self.ex_home().display().to_string())
    }

    pub fn registry(&self) -> Arc<ConfigRegistry> {
        self.registry_with(ProcessProperties::new())
    }

    pub fn registry_with(&self, properties: ProcessProperties) -> Arc<ConfigRegistry> {
        Arc::new(ConfigRegistry::init(&self.resolver(properties)).unwrap())
    }

    /// Write a file relative to the temp dir, e.g. `home/system.conf`.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    /// Write a file and move its modification time `secs` into the future so
    /// a watchdog always sees it as changed.
    pub fn write_changed(&self, rel: &str, content: &str, secs: u64) -> PathBuf {
        let path = self.write(rel, content);
        set_mtime(&path, secs);
        path
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.dir.path().join(rel)).unwrap();
    }
}

pub fn set_mtime(path: &Path, secs_ahead: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead))
        .unwrap();
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A fake monitoring agent answering every `STATUS` line with `response`.
///
/// Returns the bound address and a counter of accepted connections.
pub async fn start_status_agent(response: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let (read, mut write) = socket.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            if line.trim() == "STATUS" {
                                let reply = format!("{response}\n");
                                if write.write_all(reply.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, connections)
}

/// An address with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Connector whose fetch takes far longer than any deadline used in tests.
pub struct SlowConnector;

impl MonitorConnector for SlowConnector {
    type Handle = ();
    type Status = String;

    fn connect(&self, _target: &ProbeTarget) -> Result<(), ProbeError> {
        Ok(())
    }

    fn fetch(&self, _handle: &(), cancel: &CancelFlag) -> Result<String, ProbeError> {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(2) {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok("too late".into())
    }
}
