//! Engine-level error kinds.

use thiserror::Error;

/// Every error the engine's components can produce. Segment workers record
/// one of these against their own segment rather than propagating across
/// threads; the task controller inspects the aggregated outcome and decides
/// between retry and terminal failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("name resolution failed: {0}")]
    NameResolution(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("proxy negotiation failed: {0}")]
    ProxyNegotiation(String),

    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),

    #[error("unexpected http status: {0}")]
    HttpStatus(u16),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("response truncated: {0}")]
    TruncatedResponse(String),

    #[error("file i/o error: {0}")]
    FileIo(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// `Cancelled` short-circuits the task state machine straight to
    /// `Cancelled` without consulting the retry policy; every other kind
    /// goes through the retry-or-fail decision.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Short free-form detail shown to the user alongside the error kind,
    /// matching what the `error` callback carries.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => EngineError::PermissionDenied(e.to_string()),
            std::io::ErrorKind::TimedOut => EngineError::Timeout(e.to_string()),
            _ => EngineError::FileIo(e.to_string()),
        }
    }
}

impl From<curl::Error> for EngineError {
    fn from(e: curl::Error) -> Self {
        if e.is_couldnt_resolve_host() {
            EngineError::NameResolution(e.to_string())
        } else if e.is_couldnt_connect() {
            EngineError::ConnectFailed(e.to_string())
        } else if e.is_ssl_connect_error() || e.is_ssl_peer_certificate() {
            EngineError::TlsHandshake(e.to_string())
        } else if e.is_operation_timedout() {
            EngineError::Timeout(e.to_string())
        } else if e.is_partial_file() {
            EngineError::TruncatedResponse(e.to_string())
        } else {
            EngineError::ConnectFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_short_circuits() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::Timeout("slow".into()).is_cancelled());
    }

    #[test]
    fn detail_includes_kind_text() {
        let e = EngineError::HttpStatus(403);
        assert!(e.detail().contains("403"));
    }
}
