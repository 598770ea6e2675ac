//! Component C1: parsing bearer tokens out of the two transports the spec
//! names — the HTTP `Authorization` header and the WebSocket subprotocol
//! string (spec.md §4.1).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use std::sync::LazyLock;

static BEARER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Bearer\s+(.*)$").expect("static regex"));

static WS_SUBPROTOCOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^base64url\.bearer\.authorization\.cryostat\.(\S+)$").expect("static regex")
});

/// Decode a base64url string (no padding expected, but padded input is
/// tolerated) into a trimmed UTF-8 string. Returns `None` on any decoding or
/// UTF-8 failure, which callers treat as "no token" rather than a hard
/// error (spec.md §4.1).
fn decode_b64url(raw: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .ok()
        .or_else(|| base64::engine::general_purpose::URL_SAFE.decode(raw).ok())?;
    String::from_utf8(bytes).ok().map(|s| s.trim().to_string())
}

/// Extract a bearer token from an HTTP `Authorization` header value.
///
/// Returns `None` (not an error) when the header is missing/blank, uses a
/// scheme other than `Bearer`, or the remainder fails to decode as
/// base64url UTF-8 — all three are "no token", a distinct signal from
/// "invalid token" (spec.md §4.1).
pub fn extract_from_header(header_value: Option<&str>) -> Option<String> {
    let header_value = header_value?.trim();
    if header_value.is_empty() {
        return None;
    }
    let captures = BEARER_HEADER.captures(header_value)?;
    let encoded = captures.get(1)?.as_str();
    let decoded = decode_b64url(encoded)?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Extract a bearer token from a WebSocket subprotocol string of the form
/// `base64url.bearer.authorization.cryostat.<token>` (spec.md §4.1).
///
/// A non-matching or blank subprotocol yields `None`; this is a
/// short-circuit at the validation layer with no cluster call performed.
pub fn extract_from_subprotocol(subprotocol: Option<&str>) -> Option<String> {
    let subprotocol = subprotocol?.trim();
    if subprotocol.is_empty() {
        return None;
    }
    let captures = WS_SUBPROTOCOL.captures(subprotocol)?;
    let encoded = captures.get(1)?.as_str();
    let decoded = decode_b64url(encoded)?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Base64url-encode a token, useful for constructing test fixtures and for
/// building the WebSocket subprotocol clients should send.
pub fn encode_b64url(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(token.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_arbitrary_bytes() {
        let token = "sha256~abcDEF123_-";
        let encoded = encode_b64url(token);
        let header = format!("Bearer {encoded}");
        assert_eq!(extract_from_header(Some(&header)).as_deref(), Some(token));
    }

    #[test]
    fn header_rejects_non_bearer_scheme() {
        assert_eq!(extract_from_header(Some("Basic QUJD")), None);
    }

    #[test]
    fn header_rejects_missing_header() {
        assert_eq!(extract_from_header(None), None);
    }

    #[test]
    fn header_rejects_blank_header() {
        assert_eq!(extract_from_header(Some("   ")), None);
    }

    #[test]
    fn header_rejects_garbage_base64() {
        assert_eq!(extract_from_header(Some("Bearer !!!not-base64!!!")), None);
    }

    #[test]
    fn header_is_case_insensitive_on_scheme() {
        let encoded = encode_b64url("tok");
        let header = format!("bearer {encoded}");
        assert_eq!(extract_from_header(Some(&header)).as_deref(), Some("tok"));
    }

    #[test]
    fn subprotocol_extracts_token() {
        let encoded = encode_b64url("ABC");
        let subprotocol = format!("base64url.bearer.authorization.cryostat.{encoded}");
        assert_eq!(
            extract_from_subprotocol(Some(&subprotocol)).as_deref(),
            Some("ABC")
        );
    }

    #[test]
    fn subprotocol_is_case_insensitive() {
        let encoded = encode_b64url("ABC");
        let subprotocol = format!("BASE64URL.BEARER.AUTHORIZATION.CRYOSTAT.{encoded}");
        assert_eq!(
            extract_from_subprotocol(Some(&subprotocol)).as_deref(),
            Some("ABC")
        );
    }

    #[test]
    fn subprotocol_rejects_non_matching_string() {
        assert_eq!(extract_from_subprotocol(Some("chat")), None);
    }

    #[test]
    fn subprotocol_rejects_blank() {
        assert_eq!(extract_from_subprotocol(Some("")), None);
    }
}
