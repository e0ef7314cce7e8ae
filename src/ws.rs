//! WebSocket upgrade handshake, RFC 6455 §4.

use base64::prelude::*;
use http::{Method, StatusCode};
use sha1::{Digest as _, Sha1};
use url::Url;

use crate::error::{Error, WsError};
use crate::protocol::Protocol;
use crate::request::Request;
use crate::response::Response;

const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Client side of the WebSocket opening handshake.
///
/// One instance per connection attempt: the nonce is drawn at
/// construction and reused across redirection hops.
#[derive(Debug, Clone)]
pub struct WebSocket {
    nonce: [u8; 16],
    subprotocols: Vec<String>,
}

impl WebSocket {
    /// Handshake with a random 16-byte nonce (RFC 6455 §4.1).
    pub fn new() -> WebSocket {
        WebSocket {
            nonce: rand::random(),
            subprotocols: Vec::new(),
        }
    }

    /// Handshake with a caller-provided nonce.
    pub fn with_nonce(nonce: [u8; 16]) -> WebSocket {
        WebSocket {
            nonce,
            subprotocols: Vec::new(),
        }
    }

    /// Advertise subprotocols in preference order.
    pub fn subprotocols<I, S>(mut self, subprotocols: I) -> WebSocket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = subprotocols.into_iter().map(Into::into).collect();
        self
    }

    /// The `Sec-WebSocket-Key` value for this handshake.
    pub fn key(&self) -> String {
        BASE64_STANDARD.encode(self.nonce)
    }
}

impl Default for WebSocket {
    fn default() -> Self {
        WebSocket::new()
    }
}

/// The `Sec-WebSocket-Accept` value a server must answer for `key`:
/// `base64(sha1(key ++ GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID);
    BASE64_STANDARD.encode(hasher.finalize())
}

impl Protocol for WebSocket {
    fn validate_target(&self, url: &Url) -> Result<(), Error> {
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            _ => Err(WsError::InvalidScheme.into()),
        }
    }

    fn prepare_request(&self, req: &mut Request) {
        req.method = Method::GET;
        req.header.append("Connection", "Upgrade");
        req.header.append("Upgrade", "websocket");
        req.header.append("Sec-WebSocket-Version", "13");
        req.header.append("Sec-WebSocket-Key", self.key());
        if !self.subprotocols.is_empty() {
            req.header
                .append("Sec-WebSocket-Protocol", self.subprotocols.join(" "));
        }
    }

    fn validate_response(&self, resp: &Response) -> Result<(), Error> {
        debug_assert_eq!(resp.status, StatusCode::SWITCHING_PROTOCOLS);

        let accept = resp
            .header
            .find("Sec-WebSocket-Accept")
            .ok_or(WsError::MissingAccept)?;

        if accept != accept_key(&self.key()) {
            log::trace!(
                target: "gannet::client",
                "websocket accept mismatch: expected {:?} received {:?}",
                accept_key(&self.key()),
                accept,
            );
            return Err(WsError::AcceptMismatch.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::header::HeaderSet;
    use crate::response::ResponseInternal;

    use super::*;

    fn response_with_accept(accept: Option<&str>) -> Response {
        let mut header = HeaderSet::new();
        header.append("Upgrade", "websocket");
        header.append("Connection", "Upgrade");
        if let Some(accept) = accept {
            header.append("Sec-WebSocket-Accept", accept);
        }
        Response {
            version: http::Version::HTTP_11,
            status: StatusCode::SWITCHING_PROTOCOLS,
            reason: "Switching Protocols".into(),
            header,
            body: bytes::Bytes::new(),
            internal: ResponseInternal::default(),
        }
    }

    #[test]
    fn accept_key_matches_rfc_6455_example() {
        // RFC 6455 §1.3
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn prepare_request_appends_handshake_fields_in_order() {
        let ws = WebSocket::new().subprotocols(["chat", "superchat"]);
        let mut req = Request::new(Method::POST, "/chat");
        ws.prepare_request(&mut req);

        assert_eq!(req.method, Method::GET);
        let fields: Vec<_> = req.header.iter().collect();
        assert_eq!(fields[0], ("Connection", "Upgrade"));
        assert_eq!(fields[1], ("Upgrade", "websocket"));
        assert_eq!(fields[2], ("Sec-WebSocket-Version", "13"));
        assert_eq!(fields[3].0, "Sec-WebSocket-Key");
        assert_eq!(fields[3].1, ws.key());
        assert_eq!(fields[4], ("Sec-WebSocket-Protocol", "chat superchat"));
    }

    #[test]
    fn validates_matching_accept() {
        let ws = WebSocket::new();
        let resp = response_with_accept(Some(&accept_key(&ws.key())));
        assert!(ws.validate_response(&resp).is_ok());
    }

    #[test]
    fn rejects_missing_or_mismatched_accept() {
        let ws = WebSocket::new();

        let resp = response_with_accept(None);
        assert!(matches!(
            ws.validate_response(&resp),
            Err(Error::WebSocket(WsError::MissingAccept))
        ));

        let resp = response_with_accept(Some("bm90IHRoZSByaWdodCBrZXk="));
        assert!(matches!(
            ws.validate_response(&resp),
            Err(Error::WebSocket(WsError::AcceptMismatch))
        ));
    }

    #[test]
    fn rejects_non_websocket_schemes() {
        let ws = WebSocket::new();
        let url = Url::parse("http://example.com/chat").unwrap();
        assert!(matches!(
            ws.validate_target(&url),
            Err(Error::WebSocket(WsError::InvalidScheme))
        ));

        let url = Url::parse("wss://example.com/chat").unwrap();
        assert!(ws.validate_target(&url).is_ok());
    }
}
