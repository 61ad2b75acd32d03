use std::io;
use std::time::Duration;

use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

use crate::tls::TlsIdentity;

/// How long open connections get to finish in-flight requests on shutdown.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Serve `app` on `listener` until `shutdown` is cancelled.
///
/// With a TLS identity every connection is wrapped in TLS 1.3 before being
/// handed to hyper; without one the router is served over plain HTTP.
/// On shutdown, open connections are asked to close after their in-flight
/// request and awaited before this returns; over TLS the wait is bounded by
/// `CONNECTION_DRAIN_TIMEOUT`.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsIdentity>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    match tls {
        Some(identity) => {
            tracing::info!(addr = %addr, "Starting HTTPS server");
            serve_tls(listener, app, identity.acceptor(), shutdown).await
        }
        None => {
            tracing::warn!(addr = %addr, "Starting plain HTTP server (insecure)");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    }
}

async fn serve_tls(
    listener: TcpListener,
    app: Router,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let shutdown = shutdown.clone();
        connections.spawn(async move {
            let tls_stream = tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = acceptor.accept(stream) => match accepted {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
                        return;
                    }
                },
            };

            let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
                app.clone().oneshot(request)
            });

            let builder = Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(TokioIo::new(tls_stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
            }
        });
    }

    connections.close();
    tracing::info!(
        open = connections.len(),
        "HTTPS server stopped accepting connections, draining"
    );
    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, connections.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            open = connections.len(),
            "Connections still open after drain timeout"
        );
    }
    Ok(())
}
