//! Newline-delimited JSON monitor client over TCP.
//!
//! The agent answers a `STATUS` line with one JSON document on one line.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::probe::bounded::{CancelFlag, ProbeError};
use crate::probe::monitor::{MonitorConnector, ProbeTarget};

pub const STATUS_REQUEST: &[u8] = b"STATUS\n";

#[derive(Debug, Clone, Copy)]
pub struct JsonLineConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl JsonLineConnector {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }
}

impl Default for JsonLineConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(3))
    }
}

/// An open connection to one agent.
#[derive(Debug)]
pub struct JsonLineSession {
    stream: Mutex<BufReader<TcpStream>>,
}

impl MonitorConnector for JsonLineConnector {
    type Handle = JsonLineSession;
    type Status = serde_json::Value;

    fn connect(&self, target: &ProbeTarget) -> Result<JsonLineSession, ProbeError> {
        let connect_err = |source| ProbeError::Connect {
            target: target.to_string(),
            source,
        };
        let addr = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(connect_err)?
            .next()
            .ok_or_else(|| {
                connect_err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no address",
                ))
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(connect_err)?;
        stream.set_read_timeout(Some(self.io_timeout)).map_err(connect_err)?;
        stream.set_write_timeout(Some(self.io_timeout)).map_err(connect_err)?;
        tracing::debug!(endpoint = %target, "Monitor connection established");

        Ok(JsonLineSession {
            stream: Mutex::new(BufReader::new(stream)),
        })
    }

    fn fetch(&self, session: &JsonLineSession, cancel: &CancelFlag) -> Result<serde_json::Value, ProbeError> {
        let mut stream = session.stream.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }

        stream
            .get_mut()
            .write_all(STATUS_REQUEST)
            .map_err(|e| ProbeError::Query(format!("send failed: {e}")))?;

        let mut line = String::new();
        let read = stream
            .read_line(&mut line)
            .map_err(|e| ProbeError::Query(format!("receive failed: {e}")))?;
        if read == 0 {
            return Err(ProbeError::Query("connection closed by agent".into()));
        }
        serde_json::from_str(line.trim_end()).map_err(|e| ProbeError::Query(format!("malformed status: {e}")))
    }
}
