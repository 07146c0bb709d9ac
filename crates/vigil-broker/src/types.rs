use std::fmt;

/// How a broker call failed. The distinction between `Transient` and the
/// other two variants is what [`crate::SessionWrapper`] uses to decide
/// whether a retry is safe: `Rejected`/`Fatal` are never retried, since
/// resubmitting a rejected order or hammering a broken session can't turn
/// into success.
#[derive(Debug, Clone)]
pub enum BrokerFault {
    /// Network blip, rate limit, or other condition expected to clear on
    /// its own; safe to retry with backoff.
    Transient(String),
    /// The broker understood the request and refused it; retrying the same
    /// request will not change the outcome.
    Rejected(String),
    /// The session itself is unusable (auth failure, protocol mismatch).
    Fatal(String),
}

impl fmt::Display for BrokerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerFault::Transient(msg) => write!(f, "transient broker fault: {msg}"),
            BrokerFault::Rejected(msg) => write!(f, "broker rejected request: {msg}"),
            BrokerFault::Fatal(msg) => write!(f, "fatal broker fault: {msg}"),
        }
    }
}

impl std::error::Error for BrokerFault {}

impl BrokerFault {
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerFault::Transient(_))
    }
}
