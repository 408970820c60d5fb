//! Protocol header names, content types and header value helpers.
use super::codec::{GRPC_MESSAGE, GRPC_STATUS, Status, parse_status_code};
use http::HeaderMap;
use std::time::Duration;

pub const CONTENT_TYPE_GRPC_WEB: &str = "application/grpc-web+proto";

pub const X_GRPC_WEB: &str = "x-grpc-web";
pub const X_USER_AGENT: &str = "x-user-agent";
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

pub const DEFAULT_USER_AGENT: &str = concat!("gweb/", env!("CARGO_PKG_VERSION"));

/// Formats a timeout for the `grpc-timeout` header.
///
/// The protocol allows at most 8 digits, so the finest unit that fits is used.
pub fn grpc_timeout(timeout: Duration) -> String {
    const MAX_DIGITS_VALUE: u128 = 99_999_999;

    let millis = timeout.as_millis();
    if millis <= MAX_DIGITS_VALUE {
        return format!("{millis}m");
    }

    let secs = u128::from(timeout.as_secs());
    if secs <= MAX_DIGITS_VALUE {
        return format!("{secs}S");
    }

    let minutes = secs / 60;
    if minutes <= MAX_DIGITS_VALUE {
        return format!("{minutes}M");
    }

    format!("{}H", (minutes / 60).min(MAX_DIGITS_VALUE))
}

/// Reads a status from response headers, used for trailers-only responses and HTTP errors.
///
/// Returns `None` when neither `grpc-status` nor `grpc-message` is present.
pub fn status_from_headers(headers: &HeaderMap) -> Option<Status> {
    let code = headers
        .get(GRPC_STATUS)
        .and_then(|v| v.to_str().ok())
        .map(parse_status_code);

    let message = headers
        .get(GRPC_MESSAGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if code.is_none() && message.is_none() {
        return None;
    }

    Some(Status {
        code: code.unwrap_or(0),
        message: message.unwrap_or_default(),
    })
}
