use std::time::Duration;

/// One observed data point: at `concurrency` parallel requests, the slowest
/// of them took `duration`.
///
/// A `concurrency` of zero means the endpoint failed even a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub concurrency: usize,
    pub duration: Duration,
}

impl ProbeResult {
    pub fn new(url: &str, concurrency: usize, duration: Duration) -> Self {
        ProbeResult {
            url: url.to_string(),
            concurrency,
            duration,
        }
    }

    /// The sentinel emitted when the very first request to `url` fails.
    pub fn unreachable(url: &str) -> Self {
        Self::new(url, 0, Duration::ZERO)
    }
}
