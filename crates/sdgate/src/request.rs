//! Connection handling: accept, frame, dispatch, respond.
//!
//! One tokio task per client connection, tracked in a `JoinSet` so that
//! shutdown can drain them:
//!   accept_loop → spawn(handle_client) → read region → read payload
//!   → ops::dispatch → single write of response and data

use std::io;
use std::net::SocketAddr;

use sdgate_proto::constants::SD_REQ_SIZE;
use sdgate_proto::error::ProtocolError;
use sdgate_proto::request::SdRequest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::daemon::SharedSys;
use crate::ops;

/// Reasons a connection ends without a response.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for ConnError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ConnError::Timeout
    }
}

/// Accept clients until shutdown is signalled, then drain them.
pub async fn accept_loop(sys: SharedSys, listener: TcpListener) {
    let shutdown_notify = sys.shutdown_notify.clone();
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {}", peer);
                        let sys = sys.clone();
                        clients.spawn(async move {
                            if let Err(e) = handle_client(sys, stream, peer).await {
                                debug!("client {} disconnected: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("accept error: {}", e);
                    }
                }
            }
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
            _ = shutdown_notify.notified() => {
                info!("accept loop shutting down");
                break;
            }
        }
    }
    drop(listener);

    sys.closing.send_replace(true);
    drain(&mut clients, sys.config.drain_timeout).await;
}

async fn drain(clients: &mut JoinSet<()>, limit: Duration) {
    if clients.is_empty() {
        return;
    }
    info!("waiting for {} connection(s) to finish", clients.len());
    let finished = timeout(limit, async {
        while clients.join_next().await.is_some() {}
    })
    .await;
    if finished.is_err() {
        warn!("aborting {} connection(s) after drain timeout", clients.len());
        clients.shutdown().await;
    }
}

/// Serve requests on one connection, strictly in order.
async fn handle_client(
    sys: SharedSys,
    mut stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), ConnError> {
    let config = &sys.config;
    let mut closing = sys.closing.subscribe();
    let mut region = [0u8; SD_REQ_SIZE];

    loop {
        let read = tokio::select! {
            read = timeout(config.idle_timeout, stream.read_exact(&mut region)) => read?,
            _ = closing.wait_for(|closing| *closing) => {
                debug!("closing idle connection from {}", peer);
                return Ok(());
            }
        };
        match read {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("client {} closed the connection", peer);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let req = SdRequest::decode(&region)?;
        let hdr = req.header;
        debug!(
            "{:?} id {} len {} from {}",
            req.opcode, hdr.id, hdr.data_length, peer
        );

        let mut payload = Vec::new();
        if hdr.is_write() && hdr.data_length > 0 {
            if hdr.data_length > config.max_payload {
                return Err(ProtocolError::PayloadTooLarge(hdr.data_length).into());
            }
            payload.resize(hdr.data_length as usize, 0);
            timeout(config.io_timeout, stream.read_exact(&mut payload)).await??;
        }

        let rsp = ops::dispatch(&sys, &req, &payload).await;
        timeout(config.io_timeout, stream.write_all(&rsp.encode())).await??;
    }
}
