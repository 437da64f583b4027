//! Server side of the RFC 6455 opening handshake.
//!
//! [`is_upgrade_request`] decides whether a request asks for a WebSocket, following
//! [RFC 6455 Section 4.2.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2.1), and
//! [`build_handshake_response`] produces the `101 Switching Protocols` answer of Section 4.2.2.
//!
//! ```rust
//! use http::{header, Request, StatusCode};
//! use wsgate::handshake::{build_handshake_response, is_upgrade_request};
//!
//! let request = Request::get("/chat")
//!     .header(header::HOST, "server.example.com")
//!     .header(header::UPGRADE, "websocket")
//!     .header(header::CONNECTION, "Upgrade")
//!     .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
//!     .header(header::SEC_WEBSOCKET_VERSION, "13")
//!     .body(())
//!     .unwrap();
//!
//! assert!(is_upgrade_request(&request));
//!
//! let response = build_handshake_response(&request).unwrap();
//! assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
//! assert_eq!(
//!     response.headers()[header::SEC_WEBSOCKET_ACCEPT],
//!     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
//! );
//! ```
use http::{header, HeaderMap, Method, Request, Response, StatusCode, Version};
use sha1::{Digest, Sha1};

use crate::{Result, WebSocketError};

/// GUID appended to the client key before hashing.
const WEBSOCKET_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Returns `true` if `request` is a WebSocket opening handshake this server can accept.
///
/// The request must be:
/// - a `GET` over HTTP/1.1 or newer,
/// - with `Upgrade: websocket` (case-insensitive),
/// - with a `Connection` header listing the `upgrade` token (case-insensitive),
/// - with a `Sec-WebSocket-Key` header,
/// - with `Sec-WebSocket-Version: 13`.
///
/// `Origin`, `Sec-WebSocket-Protocol` and `Sec-WebSocket-Extensions` are accepted but ignored.
pub fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    if request.method() != Method::GET {
        return false;
    }
    if matches!(request.version(), Version::HTTP_09 | Version::HTTP_10) {
        return false;
    }

    let headers = request.headers();
    header_equals(headers, header::UPGRADE, "websocket")
        && connection_has_upgrade(headers)
        && headers.contains_key(header::SEC_WEBSOCKET_KEY)
        && headers
            .get(header::SEC_WEBSOCKET_VERSION)
            .map(|v| v.as_bytes())
            == Some(b"13")
}

/// Builds the `101 Switching Protocols` response for an upgrade request.
///
/// The response carries `Upgrade: websocket`, `Connection: Upgrade` and the
/// `Sec-WebSocket-Accept` value derived from the client's key.
///
/// # Errors
/// Returns [`WebSocketError::MissingSecWebSocketKey`] if the request has no
/// `Sec-WebSocket-Key` header.
pub fn build_handshake_response<B>(request: &Request<B>) -> Result<Response<()>> {
    let key = request
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .ok_or(WebSocketError::MissingSecWebSocketKey)?;

    let response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(
            header::SEC_WEBSOCKET_ACCEPT,
            sec_websocket_accept(key.as_bytes()),
        )
        .body(())?;

    Ok(response)
}

/// Computes the `Sec-WebSocket-Accept` value: base64(SHA-1(key + GUID)).
pub fn sec_websocket_accept(key: &[u8]) -> String {
    use base64::prelude::*;
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WEBSOCKET_GUID);
    let result = sha1.finalize();
    BASE64_STANDARD.encode(&result[..])
}

fn header_equals(headers: &HeaderMap, name: header::HeaderName, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(expected))
}

/// `Connection` may be repeated and each line may list several tokens.
fn connection_has_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}
