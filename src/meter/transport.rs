use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::report;

const USER_AGENT: &str = "throttlemeter/1.0";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: StatusCode },
}

/// Issues a single request against a URL and reports whether it succeeded.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn issue_request(&self, url: &str) -> Result<(), TransportError>;
}

/// reqwest backed transport. Every request opens a fresh connection so that
/// kept-alive sockets from an earlier batch do not make a later one look cheaper.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(0)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue_request(&self, url: &str) -> Result<(), TransportError> {
        let outcome = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(TransportError::Status {
                url: url.to_string(),
                status: resp.status(),
            }),
            Err(source) => Err(TransportError::Request {
                url: url.to_string(),
                source,
            }),
        };

        if let Err(e) = &outcome {
            log::warn!("{}", report(e));
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::{Request, Response, server::conn::http1, service::service_fn};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    use super::*;

    /// Serves `200` on `/ok`, `503` on `/busy`, and stalls on `/slow`.
    /// Also returns the number of connections accepted so far.
    async fn spawn_upstream() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&connections);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                        let status = match req.uri().path() {
                            "/ok" => 200,
                            "/slow" => {
                                tokio::time::sleep(Duration::from_secs(2)).await;
                                200
                            }
                            _ => 503,
                        };
                        let resp = Response::builder()
                            .status(status)
                            .body(Full::new(Bytes::from_static(b"hello")))
                            .expect("response");
                        Ok::<_, Infallible>(resp)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        (format!("http://{addr}"), connections)
    }

    #[tokio::test]
    async fn test_success_status_is_accepted() {
        let (base, _) = spawn_upstream().await;
        let transport = HttpTransport::new(Duration::from_secs(1)).expect("client");

        assert!(transport.issue_request(&format!("{base}/ok")).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (base, _) = spawn_upstream().await;
        let transport = HttpTransport::new(Duration::from_secs(1)).expect("client");

        let err = transport
            .issue_request(&format!("{base}/busy"))
            .await
            .expect_err("503 must fail");
        assert!(matches!(
            err,
            TransportError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let (base, _) = spawn_upstream().await;
        let transport = HttpTransport::new(Duration::from_millis(100)).expect("client");

        let err = transport
            .issue_request(&format!("{base}/slow"))
            .await
            .expect_err("slow upstream must time out");
        assert!(matches!(err, TransportError::Request { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_failure() {
        // Bind and immediately drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind")
            .local_addr()
            .expect("local addr");
        let transport = HttpTransport::new(Duration::from_secs(1)).expect("client");

        assert!(transport.issue_request(&format!("http://{addr}/")).await.is_err());
    }

    #[tokio::test]
    async fn test_every_request_opens_its_own_connection() {
        let (base, connections) = spawn_upstream().await;
        let transport = HttpTransport::new(Duration::from_secs(1)).expect("client");

        for _ in 0..3 {
            assert!(transport.issue_request(&format!("{base}/ok")).await.is_ok());
        }

        assert_eq!(connections.load(Ordering::SeqCst), 3);
    }
}
