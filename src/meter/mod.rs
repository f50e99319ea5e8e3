pub mod probe;
pub mod result;
pub mod transport;

pub mod prelude {
    pub use super::MAX_CONCURRENCY;
    pub use super::probe::ConcurrencyProber;
    pub use super::result::ProbeResult;
    pub use super::transport::{HttpTransport, Transport, TransportError};
}

use std::fmt::Write;

/// Upper bound on the number of parallel requests fired at a single URL.
pub const MAX_CONCURRENCY: usize = 512;

/// Flattens an error and its `source()` chain into a single log-friendly string.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, "\n\nCaused by: {}", src);
        err = src;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    #[test]
    fn test_report_walks_source_chain() {
        let err = Outer(std::io::Error::other("connection reset"));
        assert_eq!(report(&err), "outer failure\n\nCaused by: connection reset");
    }

    #[test]
    fn test_report_without_source() {
        let err = std::io::Error::other("plain");
        assert_eq!(report(&err), "plain");
    }
}
