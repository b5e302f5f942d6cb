//! Client-facing TCP server
//!
//! One task per client connection. Requests on a connection are handled
//! strictly one after another, so a client always reads responses in the
//! order it sent requests.

use std::net::SocketAddr;

use fieldgw_core::MAX_FRAME_LEN;
use fieldgw_transport::framing::{write_line, LineReader};
use fieldgw_transport::TransportError;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::router::CommandRouter;
use crate::shutdown::Shutdown;

/// Accept client connections until shutdown
pub async fn serve_clients(listener: TcpListener, router: CommandRouter, mut shutdown: Shutdown) {
    info!(addr = ?listener.local_addr().ok(), "Client server started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "Client connected");
                    let router = router.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_client(stream, peer, router, shutdown).await;
                    });
                }
                Err(e) => warn!(error = %e, "Failed to accept client connection"),
            },
        }
    }

    debug!("Client server stopped");
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    router: CommandRouter,
    mut shutdown: Shutdown,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = LineReader::new(read_half, MAX_FRAME_LEN);

    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = reader.next_line() => line,
        };

        let request = match line {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(TransportError::FrameTooLarge(len)) => {
                warn!(%peer, len, "Client request too long, closing connection");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Client read failed");
                break;
            }
        };

        // Tolerate keep-alive blank lines
        if request.trim().is_empty() {
            continue;
        }

        debug!(%peer, request = %request, "Client request");
        let response = single_line(router.handle_line(&request).await);

        if let Err(e) = write_line(&mut write_half, response.as_bytes()).await {
            warn!(%peer, error = %e, "Failed to write client response");
            break;
        }
    }

    info!(%peer, "Client disconnected");
}

/// Flatten line breaks so one request always gets exactly one response line
fn single_line(response: String) -> String {
    if response.contains(['\r', '\n']) {
        response.replace(['\r', '\n'], " ")
    } else {
        response
    }
}
