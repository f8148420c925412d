//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use upstream_balancer::clock::ManualClock;
use upstream_balancer::load_balancer::{Host, Pool};
use upstream_balancer::net::Connector;
use upstream_balancer::{MemoryStore, Upstream};

/// Connector that succeeds only for addresses marked reachable and logs
/// every attempt in order.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    reachable: Arc<Mutex<HashSet<String>>>,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        let mut set = self.reachable.lock().unwrap();
        if reachable {
            set.insert(host.to_string());
        } else {
            set.remove(host);
        }
    }

    /// Hosts attempted so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn clear_attempts(&self) {
        self.attempts.lock().unwrap().clear();
    }
}

impl Connector for ScriptedConnector {
    /// The host the "connection" went to.
    type Conn = String;

    async fn connect(&self, host: &str, _port: u16, _timeout: Duration) -> io::Result<String> {
        self.attempts.lock().unwrap().push(host.to_string());
        if self.reachable.lock().unwrap().contains(host) {
            Ok(host.to_string())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, format!("{host} refused")))
        }
    }
}

/// Host whose address equals its id, so attempts read as host ids.
pub fn host(id: &str, weight: u32) -> Host {
    Host::new(id, id, 80, weight)
}

pub fn pool(id: &str, priority: i64, hosts: &[&str]) -> Pool {
    hosts
        .iter()
        .fold(Pool::new(id).with_priority(priority), |pool, h| pool.with_host(host(h, 1)))
}

/// Upstream "api" on a fresh store, seeded with `pools`.
pub async fn seeded(
    pools: Vec<Pool>,
    clock: Arc<ManualClock>,
) -> (Upstream<MemoryStore, ScriptedConnector>, ScriptedConnector) {
    let connector = ScriptedConnector::new();
    let store = Arc::new(MemoryStore::new());
    let (upstream, configured) = Upstream::new(store, connector.clone(), "api").unwrap();
    assert!(!configured);
    let upstream = upstream.with_clock(clock);

    let mut ctx = upstream.begin();
    upstream.seed_pools(&mut ctx, pools).await.unwrap();
    (upstream, connector)
}

/// Look up one host in the latest persisted table.
pub fn stored_host(upstream: &Upstream<MemoryStore, ScriptedConnector>, pool: &str, host: &str) -> Host {
    let mut ctx = upstream.begin();
    let pools = upstream.status(&mut ctx).unwrap();
    pools.get(pool).unwrap().host(host).unwrap().clone()
}

/// Start an echo backend on an ephemeral port.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// A local port with nothing listening on it.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
