use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::orchestrator::BoundedQueryHandler;

pub mod handler;

/// Pause after a failed accept. Errors like EMFILE clear up once open
/// connections finish, retrying immediately would spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of incoming connections.
#[async_trait]
trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&mut self) -> io::Result<(Self::Stream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Accepts connections until `shutdown` resolves, serving each one on its own task.
/// Accept errors are logged and retried, they never stop the server.
pub async fn serve<F>(listener: TcpListener, queries: BoundedQueryHandler, shutdown: F)
where
    F: Future<Output = ()>,
{
    serve_on(listener, queries, shutdown).await
}

async fn serve_on<A, F>(mut acceptor: A, queries: BoundedQueryHandler, shutdown: F)
where
    A: Acceptor,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = acceptor.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    log::warn!("Failed to accept connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut shutdown => {
                log::info!("Shutting down HTTP server");
                return;
            }
        };

        let queries = queries.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handler::handle(req, queries.clone()));
            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::warn!("Connection from {peer} failed: {e}");
            }
        });
    }
}
