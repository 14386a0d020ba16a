//! Remote system status probe.
//!
//! Resolves an address to a monitor endpoint, keeps one connection handle
//! per endpoint and queries it through [`BoundedProbe`].

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::registry::ConfigRegistry;
use crate::probe::bounded::{BoundedProbe, CancelFlag, ProbeError, ProbeFailure};

/// Monitor port used when the configured one cannot be read.
pub const DEFAULT_MONITOR_PORT: u16 = 13243;
/// Version reported in envelopes when the remote does not tell.
pub const UNKNOWN_VERSION: &str = "UNKNOWN";

/// Blocking client of a remote monitoring agent.
pub trait MonitorConnector: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;
    type Status: Serialize + Send + 'static;

    fn connect(&self, target: &ProbeTarget) -> Result<Self::Handle, ProbeError>;

    /// Query the current status. Long-running implementations should check
    /// `cancel` and give up once it is raised.
    fn fetch(&self, handle: &Self::Handle, cancel: &CancelFlag) -> Result<Self::Status, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => write!(f, "[{}]:{}", self.host, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Host part of an address given as `host`, `host:port`, `[v6]:port` or a
/// bare IPv6 address.
pub fn parse_host(address: &str) -> &str {
    let address = address.trim();
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return match socket {
            SocketAddr::V4(_) => address.rsplit_once(':').map_or(address, |(host, _)| host),
            SocketAddr::V6(_) => address
                .strip_prefix('[')
                .and_then(|rest| rest.split_once(']'))
                .map_or(address, |(host, _)| host),
        };
    }
    if address.parse::<IpAddr>().is_ok() {
        return address;
    }
    if let Some(inner) = address.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return inner;
    }
    match address.split_once(':') {
        Some((host, _)) => host,
        None => address,
    }
}

/// Outcome of one status query.
#[derive(Debug)]
pub struct ProbeResult<S> {
    pub target: ProbeTarget,
    pub elapsed: Duration,
    pub outcome: Result<S, ProbeFailure>,
}

impl<S> ProbeResult<S> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl<S: Serialize> ProbeResult<S> {
    pub fn envelope(&self) -> StatusEnvelope {
        match &self.outcome {
            Ok(status) => StatusEnvelope {
                success: true,
                system_data: Some(SystemData {
                    host: self.target.host.clone(),
                    port: self.target.port,
                    version: UNKNOWN_VERSION.to_string(),
                    status: serde_json::to_value(status).unwrap_or(serde_json::Value::Null),
                }),
                error: None,
            },
            Err(failure) => StatusEnvelope {
                success: false,
                system_data: None,
                error: Some(failure.clone()),
            },
        }
    }
}

/// JSON envelope handed to the request layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_data: Option<SystemData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemData {
    pub host: String,
    pub port: u16,
    pub version: String,
    pub status: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub workers: usize,
    pub deadline: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            workers: 16,
            deadline: Duration::from_secs(3),
        }
    }
}

/// Where the monitor port comes from.
#[derive(Debug, Clone)]
pub enum PortSource {
    Fixed(u16),
    /// Read on every query so a settings reload is picked up.
    Registry(Arc<ConfigRegistry>),
}

impl PortSource {
    fn port(&self) -> u16 {
        match self {
            PortSource::Fixed(port) => *port,
            PortSource::Registry(registry) => registry.monitor_port().unwrap_or_else(|e| {
                tracing::warn!(error = %e, port = DEFAULT_MONITOR_PORT, "Invalid monitor port, using default");
                DEFAULT_MONITOR_PORT
            }),
        }
    }
}

pub struct MonitorProbe<C: MonitorConnector> {
    connector: Arc<C>,
    handles: Arc<DashMap<ProbeTarget, Arc<C::Handle>>>,
    pool: BoundedProbe,
    ports: PortSource,
    deadline: Duration,
}

impl<C: MonitorConnector> MonitorProbe<C> {
    pub fn new(connector: C, ports: PortSource, settings: ProbeSettings) -> Self {
        Self {
            connector: Arc::new(connector),
            handles: Arc::new(DashMap::new()),
            pool: BoundedProbe::new(settings.workers),
            ports,
            deadline: settings.deadline,
        }
    }

    pub fn target_for(&self, address: &str) -> ProbeTarget {
        ProbeTarget {
            host: parse_host(address).to_string(),
            port: self.ports.port(),
        }
    }

    /// Fetch the current status of `address` within the configured deadline.
    pub async fn status(&self, address: &str) -> ProbeResult<C::Status> {
        let started = Instant::now();
        let target = self.target_for(address);

        let connector = Arc::clone(&self.connector);
        let handles = Arc::clone(&self.handles);
        let key = target.clone();
        let outcome = self
            .pool
            .run(self.deadline, move |cancel| {
                // Release the map guard before inserting.
                let cached = handles.get(&key).map(|entry| Arc::clone(entry.value()));
                let handle = match cached {
                    Some(handle) => handle,
                    None => {
                        let handle = Arc::new(connector.connect(&key)?);
                        handles.insert(key.clone(), Arc::clone(&handle));
                        handle
                    }
                };
                if cancel.is_cancelled() {
                    return Err(ProbeError::Cancelled);
                }
                connector.fetch(&handle, cancel).inspect_err(|_| {
                    handles.remove_if(&key, |_, cached| Arc::ptr_eq(cached, &handle));
                })
            })
            .await;

        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => tracing::debug!(endpoint = %target, elapsed_ms = elapsed.as_millis() as u64, "Monitor status fetched"),
            Err(failure) => tracing::warn!(
                endpoint = %target,
                kind = %failure.kind,
                error = %failure.message,
                "Monitor status unavailable"
            ),
        }
        ProbeResult {
            target,
            elapsed,
            outcome,
        }
    }

    /// Drop every cached handle for the host of `address`.
    ///
    /// A fetch still running may re-insert its handle afterwards; the next
    /// failure on it evicts it again.
    pub fn close(&self, address: &str) -> usize {
        let host = parse_host(address);
        let before = self.handles.len();
        self.handles.retain(|target, _| target.host != host);
        let released = before.saturating_sub(self.handles.len());
        tracing::info!(host, released, "Monitor connection closed");
        released
    }

    pub fn cached_targets(&self) -> Vec<ProbeTarget> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn pool(&self) -> &BoundedProbe {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConnector {
        connects: AtomicUsize,
        fail_fetch: AtomicBool,
    }

    impl MonitorConnector for Arc<CountingConnector> {
        type Handle = usize;
        type Status = String;

        fn connect(&self, _target: &ProbeTarget) -> Result<usize, ProbeError> {
            Ok(self.connects.fetch_add(1, Ordering::SeqCst))
        }

        fn fetch(&self, handle: &usize, _cancel: &CancelFlag) -> Result<String, ProbeError> {
            if self.fail_fetch.load(Ordering::SeqCst) {
                Err(ProbeError::Query("agent gone".into()))
            } else {
                Ok(format!("handle-{handle}"))
            }
        }
    }

    fn probe(connector: Arc<CountingConnector>) -> MonitorProbe<Arc<CountingConnector>> {
        MonitorProbe::new(connector, PortSource::Fixed(13243), ProbeSettings::default())
    }

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("10.0.0.1"), "10.0.0.1");
        assert_eq!(parse_host("10.0.0.1:16001"), "10.0.0.1");
        assert_eq!(parse_host(" agent.local:80 "), "agent.local");
        assert_eq!(parse_host("[::1]:13243"), "::1");
        assert_eq!(parse_host("fe80::1"), "fe80::1");
        assert_eq!(parse_host("[fe80::1]"), "fe80::1");
    }

    #[test]
    fn test_target_display() {
        let v4 = ProbeTarget { host: "10.0.0.1".into(), port: 1 };
        let v6 = ProbeTarget { host: "::1".into(), port: 2 };
        assert_eq!(v4.to_string(), "10.0.0.1:1");
        assert_eq!(v6.to_string(), "[::1]:2");
    }

    #[tokio::test]
    async fn test_handle_is_reused_until_closed() {
        let connector = Arc::new(CountingConnector::default());
        let probe = probe(connector.clone());

        let first = probe.status("10.0.0.1:80").await;
        let second = probe.status("10.0.0.1").await;
        assert_eq!(first.outcome, Ok("handle-0".to_string()));
        assert_eq!(second.outcome, Ok("handle-0".to_string()));
        assert_eq!(first.target.port, 13243);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        assert_eq!(probe.close("10.0.0.1:9999"), 1);
        assert!(probe.cached_targets().is_empty());

        let third = probe.status("10.0.0.1").await;
        assert_eq!(third.outcome, Ok("handle-1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_fetch_evicts_handle() {
        let connector = Arc::new(CountingConnector::default());
        let probe = probe(connector.clone());

        connector.fail_fetch.store(true, Ordering::SeqCst);
        let failed = probe.status("agent").await;
        assert!(!failed.is_success());
        assert!(probe.cached_targets().is_empty());

        let envelope = failed.envelope();
        assert!(!envelope.success);
        assert!(envelope.system_data.is_none());

        connector.fail_fetch.store(false, Ordering::SeqCst);
        let ok = probe.status("agent").await;
        assert_eq!(ok.outcome, Ok("handle-1".to_string()));
    }

    #[tokio::test]
    async fn test_envelope_json_shape() {
        let probe = probe(Arc::new(CountingConnector::default()));
        let result = probe.status("10.0.0.2").await;
        let json = serde_json::to_value(result.envelope()).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["systemData"]["host"], "10.0.0.2");
        assert_eq!(json["systemData"]["version"], UNKNOWN_VERSION);
        assert_eq!(json["systemData"]["status"], "handle-0");
        assert!(json.get("error").is_none());
    }
}
