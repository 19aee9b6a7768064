//! Listener topology per run mode, plus the running set of listeners and
//! its one-shot graceful shutdown.

use crate::mode::RunMode;
use crate::server::create_redirect_app;
use crate::tls::TlsPaths;
use axum::Router;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use std::future::Future;
use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Shared deadline for stopping every listener, measured from the signal.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Slack after the deadline for force-closed listeners to unwind.
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(250);

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Tls,
}

/// One listener to start.
pub struct ListenerSpec {
    pub name: &'static str,
    pub addr: SocketAddr,
    pub transport: Transport,
    pub app: Router,
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("{name}: failed to load TLS material: {source}")]
    TlsConfig { name: &'static str, source: io::Error },
    #[error("{name}: failed to bind {addr}: {source}")]
    Bind {
        name: &'static str,
        addr: SocketAddr,
        source: io::Error,
    },
}

fn any_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))
}

/// Listeners for `mode`.
///
/// Production gets a redirect-only listener on :80 and the full app over
/// TLS on :443; the other serving modes get one listener on `port`; view
/// mode gets none.
pub fn plan(mode: RunMode, port: u16, app: Router) -> Vec<ListenerSpec> {
    match mode {
        RunMode::Test => vec![ListenerSpec {
            name: "test",
            addr: any_addr(port),
            transport: Transport::Tls,
            app,
        }],
        RunMode::PlainHttp => vec![ListenerSpec {
            name: "http",
            addr: any_addr(port),
            transport: Transport::Plain,
            app,
        }],
        RunMode::TunnelOrigin => vec![ListenerSpec {
            name: "tunnel-origin",
            addr: any_addr(port),
            transport: Transport::Plain,
            app,
        }],
        RunMode::Production => vec![
            ListenerSpec {
                name: "redirect",
                addr: any_addr(HTTP_PORT),
                transport: Transport::Plain,
                app: create_redirect_app(),
            },
            ListenerSpec {
                name: "https",
                addr: any_addr(HTTPS_PORT),
                transport: Transport::Tls,
                app,
            },
        ],
        RunMode::View => Vec::new(),
    }
}

struct RunningListener {
    name: &'static str,
    addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
}

/// Every listener started for this process.
///
/// Filled once by [`ServerSet::start`] and drained once by
/// [`ServerSet::shutdown`], which consumes it.
pub struct ServerSet {
    listeners: Vec<RunningListener>,
}

impl ServerSet {
    /// Starts every listener on its own task and waits until each one is
    /// bound. Any failure stops the listeners already started and is
    /// returned; a partial topology is never left running.
    pub async fn start(specs: Vec<ListenerSpec>, tls: &TlsPaths) -> Result<Self, TopologyError> {
        let mut set = Self {
            listeners: Vec::with_capacity(specs.len()),
        };

        for spec in specs {
            match spawn_listener(spec, tls).await {
                Ok(listener) => set.listeners.push(listener),
                Err(err) => {
                    set.shutdown(Duration::ZERO).await;
                    return Err(err);
                }
            }
        }

        let mut failed = None;
        for (index, listener) in set.listeners.iter_mut().enumerate() {
            match listener.handle.listening().await {
                Some(addr) => {
                    info!(listener = listener.name, %addr, "Listening");
                    listener.local_addr = Some(addr);
                }
                None => {
                    failed = Some(index);
                    break;
                }
            }
        }

        if let Some(index) = failed {
            let listener = set.listeners.remove(index);
            let source = match listener.task.await {
                Ok(Err(err)) => err,
                Ok(Ok(())) => io::Error::other("listener stopped before binding"),
                Err(err) => io::Error::other(err),
            };
            set.shutdown(Duration::ZERO).await;
            return Err(TopologyError::Bind {
                name: listener.name,
                addr: listener.addr,
                source,
            });
        }

        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Bound addresses, in start order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().filter_map(|l| l.local_addr).collect()
    }

    /// Blocks until `signal` resolves, then shuts everything down within
    /// [`SHUTDOWN_DEADLINE`].
    pub async fn run_until<F>(self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.shutdown(SHUTDOWN_DEADLINE).await;
    }

    /// Stops accepting on every listener and lets in-flight requests finish
    /// until `deadline` (shared by all listeners) passes; stragglers are
    /// force-closed and logged.
    pub async fn shutdown(self, deadline: Duration) {
        let stop_by = Instant::now() + deadline + FORCE_CLOSE_GRACE;

        for listener in &self.listeners {
            listener.handle.graceful_shutdown(Some(deadline));
        }

        for listener in self.listeners {
            let abort = listener.task.abort_handle();
            match tokio::time::timeout_at(stop_by, listener.task).await {
                Ok(Ok(Ok(()))) => info!(listener = listener.name, "Listener stopped"),
                Ok(Ok(Err(err))) => error!(listener = listener.name, %err, "Listener failed"),
                Ok(Err(err)) => error!(listener = listener.name, %err, "Listener task failed"),
                Err(_) => {
                    warn!(
                        listener = listener.name,
                        "Listener did not stop within the shutdown deadline; forcing close"
                    );
                    listener.handle.shutdown();
                    abort.abort();
                }
            }
        }
    }
}

async fn spawn_listener(spec: ListenerSpec, tls: &TlsPaths) -> Result<RunningListener, TopologyError> {
    let ListenerSpec {
        name,
        addr,
        transport,
        app,
    } = spec;

    let handle = Handle::new();
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    let task = match transport {
        Transport::Plain => {
            let server = axum_server::bind(addr).handle(handle.clone());
            tokio::spawn(async move { server.serve(service).await })
        }
        Transport::Tls => {
            let config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .map_err(|source| TopologyError::TlsConfig { name, source })?;
            let server = axum_server::bind_rustls(addr, config).handle(handle.clone());
            tokio::spawn(async move { server.serve(service).await })
        }
    };

    info!(listener = name, %addr, ?transport, "Starting listener");

    Ok(RunningListener {
        name,
        addr,
        local_addr: None,
        handle,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(specs: &[ListenerSpec]) -> Vec<(u16, Transport)> {
        specs.iter().map(|s| (s.addr.port(), s.transport)).collect()
    }

    #[test]
    fn production_has_redirect_and_https() {
        let specs = plan(RunMode::Production, 8080, Router::new());
        assert_eq!(
            ports(&specs),
            vec![(HTTP_PORT, Transport::Plain), (HTTPS_PORT, Transport::Tls)]
        );
    }

    #[test]
    fn single_listener_modes_use_configured_port() {
        for (mode, transport) in [
            (RunMode::Test, Transport::Tls),
            (RunMode::PlainHttp, Transport::Plain),
            (RunMode::TunnelOrigin, Transport::Plain),
        ] {
            let specs = plan(mode, 9090, Router::new());
            assert_eq!(ports(&specs), vec![(9090, transport)], "mode {mode}");
        }
    }

    #[test]
    fn view_mode_has_no_listeners() {
        assert!(plan(RunMode::View, 8080, Router::new()).is_empty());
    }

    #[tokio::test]
    async fn missing_tls_material_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let tls = TlsPaths::new(dir.path().join("server.crt"), dir.path().join("server.key"));
        let spec = ListenerSpec {
            name: "test",
            addr: "127.0.0.1:0".parse().unwrap(),
            transport: Transport::Tls,
            app: Router::new(),
        };

        let err = ServerSet::start(vec![spec], &tls).await.err().unwrap();
        assert!(matches!(err, TopologyError::TlsConfig { name: "test", .. }));
    }
}
