//! Bulk chain transfer over TCP.
//!
//! Each accepted connection receives the full chain as a single JSON array
//! and is then closed. Accepted connections wait in a bounded queue; once it
//! fills, the accept loop stops pulling from the listener. At most
//! `workers` transfers are written concurrently.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use ledger_core::{Block, Ledger};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::Peer;
use crate::constants::MAX_TRANSFER_BYTES;
use crate::error::NodeError;

pub struct TransferServer {
    ledger: Arc<Ledger>,
    queue_capacity: usize,
    workers: usize,
}

impl TransferServer {
    pub fn new(ledger: Arc<Ledger>, queue_capacity: usize, workers: usize) -> Self {
        Self {
            ledger,
            queue_capacity: queue_capacity.max(1),
            workers: workers.max(1),
        }
    }

    /// Serve snapshots on `listener` until `token` is cancelled. Returns once
    /// every in-flight transfer has finished.
    pub async fn serve(self, listener: TcpListener, token: CancellationToken) -> io::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            queue = self.queue_capacity,
            workers = self.workers,
            "transfer server listening"
        );
        let (tx, rx) = mpsc::channel::<(TcpStream, SocketAddr)>(self.queue_capacity);
        let dispatcher = tokio::spawn(dispatch(
            self.ledger.clone(),
            rx,
            self.workers,
            token.clone(),
        ));

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok(conn) => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = tx.send(conn) => if sent.is_err() { break },
                    }
                }
                Err(e) => warn!(error = %e, "transfer accept failed"),
            }
        }

        drop(listener);
        drop(tx);
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "transfer dispatcher panicked");
        }
        info!("transfer server stopped");
        Ok(())
    }
}

async fn dispatch(
    ledger: Arc<Ledger>,
    mut queue: mpsc::Receiver<(TcpStream, SocketAddr)>,
    workers: usize,
    token: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut in_flight = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => break,
            next = queue.recv() => match next {
                Some(conn) => conn,
                None => break,
            },
        };

        let ledger = ledger.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            match send_snapshot(&ledger, stream).await {
                Ok(bytes) => debug!(%peer, bytes, "chain transferred"),
                Err(e) => warn!(%peer, error = %e, "chain transfer failed"),
            }
        });
        while let Some(done) = in_flight.try_join_next() {
            if let Err(e) = done {
                warn!(error = %e, "transfer task panicked");
            }
        }
    }

    // Queued but undispatched connections are dropped (closed) here.
    drop(queue);
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            warn!(error = %e, "transfer task panicked");
        }
    }
}

async fn send_snapshot(ledger: &Ledger, mut stream: TcpStream) -> io::Result<usize> {
    let payload = serde_json::to_vec(&ledger.snapshot())?;
    stream.write_all(&payload).await?;
    stream.shutdown().await?;
    Ok(payload.len())
}

/// Dial `addr` and read one full chain. The stream is read to EOF, capped at
/// `MAX_TRANSFER_BYTES`.
pub async fn fetch_chain(addr: SocketAddr) -> Result<Vec<Block>, NodeError> {
    let label = addr.to_string();
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| NodeError::network(label.as_str(), e))?;

    let mut buf = Vec::new();
    stream
        .take(MAX_TRANSFER_BYTES + 1)
        .read_to_end(&mut buf)
        .await
        .map_err(|e| NodeError::network(label.as_str(), e))?;
    if buf.len() as u64 > MAX_TRANSFER_BYTES {
        return Err(NodeError::TransferTooLarge {
            peer: label,
            limit: MAX_TRANSFER_BYTES,
        });
    }
    serde_json::from_slice(&buf).map_err(|source| NodeError::Decode { peer: label, source })
}

/// [`fetch_chain`] against a cluster member's transfer address.
pub async fn fetch_chain_from(peer: &Peer) -> Result<Vec<Block>, NodeError> {
    fetch_chain(peer.transfer_addr).await.map_err(|e| match e {
        NodeError::Network { source, .. } => NodeError::network(peer.id.as_str(), source),
        NodeError::Decode { source, .. } => NodeError::Decode {
            peer: peer.id.clone(),
            source,
        },
        other => other,
    })
}
