//! Error taxonomy for the academic advisor backend.

use thiserror::Error;

/// The error kinds enumerated in the error-handling design: each carries its
/// own propagation rule (surfaced status code, local recovery, or silent
/// termination) applied by callers, not by this type itself.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Request failed input validation; callers surface this as HTTP 422
    /// with a structured `validation_errors` array.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required upstream collaborator (KV, graph engine, vector index,
    /// LLM) could not be reached at all.
    #[error("upstream unavailable: {service}: {detail}")]
    UpstreamUnavailable {
        /// Name of the collaborator, e.g. `"redis"`, `"neo4j"`, or a
        /// configured LLM backend name.
        service: String,
        /// Human-readable detail.
        detail: String,
    },

    /// A required upstream collaborator did not respond within its
    /// configured deadline.
    #[error("upstream timeout: {service} after {elapsed_ms}ms")]
    UpstreamTimeout {
        /// Name of the collaborator.
        service: &'static str,
        /// Elapsed wall-clock time in milliseconds.
        elapsed_ms: u64,
    },

    /// The LLM output could not be coerced into the `ChatAdvisorResponse`
    /// schema after the repair pass and the single re-ask.
    #[error("schema enforcement failed at {stage}: {detail}")]
    SchemaEnforce {
        /// `json_decode` or `schema_validate`.
        stage: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// An explicitly looked-up entity does not exist (`/grades/{code}`, a
    /// missing conversation in `/explain`).
    #[error("not found: {0}")]
    NotFound(String),

    /// A genuine optimistic-concurrency race loss: another writer swapped
    /// the key out from under us. Distinct from `UpstreamUnavailable` so
    /// callers can retry the atomic path instead of degrading to a
    /// non-atomic merge.
    #[error("cas conflict on {0}")]
    CasConflict(String),

    /// The client disconnected; callers must terminate silently and never
    /// emit a frame for this variant.
    #[error("client disconnected")]
    ClientDisconnect,

    /// An unexpected internal failure; callers surface HTTP 500 with a
    /// stable code and log the full error with its source chain.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code used in API error bodies and log lines.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::UpstreamUnavailable { .. } => "upstream_unavailable",
            Error::UpstreamTimeout { .. } => "upstream_timeout",
            Error::SchemaEnforce { .. } => "schema_enforce_error",
            Error::NotFound(_) => "not_found",
            Error::CasConflict(_) => "cas_conflict",
            Error::ClientDisconnect => "client_disconnect",
            Error::Internal(_) => "internal_error",
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::Validation("message too long".to_string());
        assert_eq!(err.to_string(), "validation failed: message too long");
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn upstream_unavailable_display() {
        let err = Error::UpstreamUnavailable {
            service: "redis".to_string(),
            detail: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "upstream unavailable: redis: connection refused"
        );
    }

    #[test]
    fn upstream_timeout_display() {
        let err = Error::UpstreamTimeout {
            service: "vector_search",
            elapsed_ms: 150,
        };
        assert_eq!(err.to_string(), "upstream timeout: vector_search after 150ms");
    }

    #[test]
    fn client_disconnect_has_no_detail() {
        let err = Error::ClientDisconnect;
        assert_eq!(err.code(), "client_disconnect");
    }

    #[test]
    fn every_variant_has_a_stable_code() {
        let variants = vec![
            Error::Validation("x".into()),
            Error::UpstreamUnavailable {
                service: "s".to_string(),
                detail: "x".into(),
            },
            Error::UpstreamTimeout {
                service: "s",
                elapsed_ms: 1,
            },
            Error::SchemaEnforce {
                stage: "json_decode",
                detail: "x".into(),
            },
            Error::NotFound("x".into()),
            Error::CasConflict("x".into()),
            Error::ClientDisconnect,
            Error::Internal("x".into()),
        ];
        for v in variants {
            assert!(!v.code().is_empty());
        }
    }
}
