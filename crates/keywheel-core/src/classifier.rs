//! Error classifier. Maps a raised error + optional finish reason to
//! an `ErrorClassification`, in a fixed rule order where the first match
//! wins.

use keywheel_types::classification::{constants::*, ErrorClassification, ErrorType};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Anything the engine can classify: a numeric status (if the upstream
/// exposes one directly or via a nested response) and a message `fn`'s
/// error formats to. Implement this on your own error type to plug it into
/// the engine; `keywheel-core`'s internal timeout wrapper implements it too.
pub trait ClassifiableError: std::fmt::Display {
    /// HTTP-style status code, if the error carries one.
    fn status_code(&self) -> Option<u16> {
        None
    }
    /// Whether this error represents a dedicated timeout type (distinct
    /// from a message that merely mentions "timeout").
    fn is_timeout(&self) -> bool {
        false
    }
}

fn auth_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)403|permission.?denied|invalid.?api.?key|unauthorized|unauthenticated")
            .expect("static pattern compiles")
    })
}

fn quota_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)429|quota|exhausted|resource.?exhausted|too.?many.?requests|rate.?limit")
            .expect("static pattern compiles")
    })
}

fn bad_request_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)400|invalid.?argument|failed.?precondition|malformed|not.?found|404")
            .expect("static pattern compiles")
    })
}

fn transient_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)500|502|503|504|internal|unavailable|deadline|timeout|overloaded")
            .expect("static pattern compiles")
    })
}

/// Classify a raised error plus optional caller-supplied finish reason.
///
/// Rules are applied in a fixed order; the first match wins.
pub fn classify<E: ClassifiableError>(err: &E, finish_reason: Option<&str>) -> ErrorClassification {
    if finish_reason == Some("SAFETY") {
        return ErrorClassification {
            error_type: ErrorType::Safety,
            retryable: false,
            cooldown_ms: None,
            mark_key_failed: false,
            mark_key_dead: false,
        };
    }
    if finish_reason == Some("RECITATION") {
        return ErrorClassification {
            error_type: ErrorType::Recitation,
            retryable: false,
            cooldown_ms: None,
            mark_key_failed: false,
            mark_key_dead: false,
        };
    }

    let message = err.to_string();
    let status = err.status_code();

    if err.is_timeout() || message.to_lowercase().contains("timeout") {
        return ErrorClassification {
            error_type: ErrorType::Timeout,
            retryable: true,
            cooldown_ms: Some(COOLDOWN_TRANSIENT_MS),
            mark_key_failed: true,
            mark_key_dead: false,
        };
    }

    if status == Some(403) || auth_pattern().is_match(&message) {
        return ErrorClassification {
            error_type: ErrorType::Auth,
            retryable: false,
            cooldown_ms: None,
            mark_key_failed: true,
            mark_key_dead: true,
        };
    }

    if status == Some(429) || quota_pattern().is_match(&message) {
        return ErrorClassification {
            error_type: ErrorType::Quota,
            retryable: true,
            cooldown_ms: Some(COOLDOWN_QUOTA_MS),
            mark_key_failed: true,
            mark_key_dead: false,
        };
    }

    if status == Some(400) || bad_request_pattern().is_match(&message) {
        return ErrorClassification {
            error_type: ErrorType::BadRequest,
            retryable: false,
            cooldown_ms: None,
            mark_key_failed: false,
            mark_key_dead: false,
        };
    }

    if matches!(status, Some(500) | Some(502) | Some(503) | Some(504))
        || transient_pattern().is_match(&message)
    {
        return ErrorClassification {
            error_type: ErrorType::Transient,
            retryable: true,
            cooldown_ms: Some(COOLDOWN_TRANSIENT_MS),
            mark_key_failed: true,
            mark_key_dead: false,
        };
    }

    ErrorClassification {
        error_type: ErrorType::Unknown,
        retryable: true,
        cooldown_ms: Some(COOLDOWN_TRANSIENT_MS),
        mark_key_failed: true,
        mark_key_dead: false,
    }
}
