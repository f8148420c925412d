//! TCP forwarding worker.
//!
//! Each accepted client is one unit of work: pick and connect an upstream
//! host, pump bytes both ways until either side closes, then hand the unit's
//! failures to `post_process`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::health::WorkerId;
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::net::Connector;
use crate::store::SharedStore;
use crate::upstream::Upstream;

/// Accept and forward connections until `shutdown` fires.
pub async fn serve<S, C>(
    upstream: Upstream<S, C>,
    listener: Arc<Listener>,
    worker: WorkerId,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: SharedStore,
    C: Connector,
    C::Conn: AsyncRead + AsyncWrite + Unpin,
{
    tracing::info!(upstream = %upstream.id(), worker = %worker, "Worker accepting connections");
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let upstream = upstream.clone();
                    tokio::spawn(async move {
                        forward(upstream, stream, peer, permit).await;
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(worker = %worker, error = %e, "Accept failed");
                }
            },
            _ = shutdown.recv() => {
                tracing::info!(worker = %worker, "Worker received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Forward one client connection.
pub async fn forward<S, C>(upstream: Upstream<S, C>, mut client: TcpStream, peer: SocketAddr, _permit: ConnectionPermit)
where
    S: SharedStore,
    C: Connector,
    C::Conn: AsyncRead + AsyncWrite + Unpin,
{
    let mut ctx = upstream.begin();
    match upstream.connect(&mut ctx).await {
        Ok((mut server, selected)) => {
            tracing::debug!(peer = %peer, pool = %selected.pool, host = %selected.host.id, "Forwarding");
            match copy_bidirectional(&mut client, &mut server).await {
                Ok((sent, received)) => {
                    tracing::debug!(peer = %peer, sent, received, "Connection closed");
                }
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                }
            }
        }
        Err(e) => {
            tracing::warn!(upstream = %upstream.id(), peer = %peer, error = %e, "No upstream host reachable");
        }
    }
    upstream.post_process(ctx);
}
