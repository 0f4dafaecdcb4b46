//! Connectivity classification.
//!
//! Only network/availability failures are worth retrying and only they feed
//! the circuit breaker. Everything else (constraint violations, malformed
//! queries, permission errors) is a logic error and surfaces immediately.

use std::fmt;

/// Lowercased fragments that identify a network or availability failure.
const CONNECTIVITY_SIGNATURES: &[&str] = &[
    "econnrefused",
    "connection refused",
    "etimedout",
    "timeout",
    "timed out",
    "enotfound",
    "getaddrinfo",
    "dns lookup",
    "dns error",
    "eai_again",
    "name resolution",
    "econnreset",
    "connection reset",
    "socket hang up",
    "network error",
    "fetch failed",
    "protocol error",
    "epipe",
    "broken pipe",
    // SQLite's equivalents of an unreachable server.
    "database is locked",
    "unable to open database file",
];

/// True iff the lowercased text of `err` matches a known network-failure signature.
pub fn is_connectivity_error<E: fmt::Display + ?Sized>(err: &E) -> bool {
    let text = err.to_string().to_lowercase();
    CONNECTIVITY_SIGNATURES.iter().any(|sig| text.contains(sig))
}

/// Errors that know whether they are transient availability failures.
pub trait Classify {
    fn is_connectivity(&self) -> bool;
}

impl Classify for String {
    fn is_connectivity(&self) -> bool {
        is_connectivity_error(self.as_str())
    }
}

impl Classify for &str {
    fn is_connectivity(&self) -> bool {
        is_connectivity_error(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_are_connectivity() {
        for msg in [
            "connect ECONNREFUSED 127.0.0.1:5432",
            "Request Timeout",
            "operation timed out",
            "getaddrinfo ENOTFOUND db.internal",
            "read ECONNRESET",
            "socket hang up",
            "TypeError: fetch failed",
            "Network Error",
            "write EPIPE",
            "database is locked",
            "getaddrinfo EAI_AGAIN db.internal",
            "Temporary failure in name resolution",
            "dns error: failed to lookup address information",
        ] {
            assert!(is_connectivity_error(msg), "expected connectivity: {msg}");
        }
    }

    #[test]
    fn logic_failures_are_not_connectivity() {
        for msg in [
            "duplicate key value violates unique constraint",
            "syntax error at or near \"SELECT\"",
            "permission denied for table events",
            "UNIQUE constraint failed: interaction_claims.interaction_id",
            "no such column: dns_name",
        ] {
            assert!(!is_connectivity_error(msg), "expected logic error: {msg}");
        }
    }

    #[test]
    fn classification_ignores_case() {
        assert!("CONNECTION REFUSED".to_string().is_connectivity());
        assert!("Broken Pipe".is_connectivity());
    }
}
