//! Target canonicalization and connection key derivation.

use url::Url;

use crate::connect::Transport;
use crate::error::Error;
use crate::pool::ClientKey;

/// Resolve a request target to an absolute URI.
pub(crate) fn canonicalize(target: &str) -> Result<Url, Error> {
    let url = Url::parse(target).map_err(|err| Error::InvalidTarget(err.to_string()))?;
    if url.host_str().is_none() {
        return Err(Error::InvalidTarget(format!("no host in {target:?}")));
    }
    transport_for_scheme(url.scheme())?;
    Ok(url)
}

pub(crate) fn transport_for_scheme(scheme: &str) -> Result<Transport, Error> {
    match scheme {
        "http" | "ws" => Ok(Transport::Tcp),
        "https" | "wss" => Ok(Transport::Tls),
        other => Err(Error::InvalidTarget(format!("unsupported scheme {other:?}"))),
    }
}

/// Derive the connection key for a canonical URI.
///
/// Port precedence: explicit URI port, then the credential-store
/// override, then the transport default.
pub(crate) fn client_key(url: &Url, port_override: Option<u16>) -> Result<ClientKey, Error> {
    let transport = transport_for_scheme(url.scheme())?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidTarget(format!("no host in {url}")))?
        .to_string();
    let port = url
        .port()
        .or(port_override)
        .unwrap_or_else(|| transport.default_port());

    Ok(ClientKey {
        host,
        port,
        transport,
    })
}

/// The origin-form target placed on the request line.
pub(crate) fn send_target(url: &Url) -> String {
    let mut target = String::from(url.path());
    if target.is_empty() {
        target.push('/');
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        target.push('#');
        target.push_str(fragment);
    }
    target
}

/// Two URIs share an origin when scheme, host and effective port all
/// match. Redirections crossing origins lose their credentials.
pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_requires_absolute_targets() {
        assert!(canonicalize("http://example.com/a").is_ok());
        assert!(matches!(canonicalize("/a"), Err(Error::InvalidTarget(_))));
        assert!(matches!(canonicalize("mailto:a@b"), Err(Error::InvalidTarget(_))));
        assert!(matches!(canonicalize("ftp://example.com/"), Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn key_follows_scheme_and_port_precedence() {
        let url = canonicalize("https://example.com/x").unwrap();
        let key = client_key(&url, None).unwrap();
        assert_eq!(key.host, "example.com");
        assert_eq!(key.port, 443);
        assert_eq!(key.transport, Transport::Tls);

        let url = canonicalize("http://example.com:8080/x").unwrap();
        let key = client_key(&url, Some(9999)).unwrap();
        assert_eq!(key.port, 8080);

        let url = canonicalize("http://example.com/x").unwrap();
        let key = client_key(&url, Some(9999)).unwrap();
        assert_eq!(key.port, 9999);

        let url = canonicalize("ws://example.com/chat").unwrap();
        let key = client_key(&url, None).unwrap();
        assert_eq!(key.port, 80);
        assert_eq!(key.transport, Transport::Tcp);
    }

    #[test]
    fn send_target_is_origin_form() {
        let url = canonicalize("http://example.com").unwrap();
        assert_eq!(send_target(&url), "/");

        let url = canonicalize("http://example.com/a/b?x=1&y=2").unwrap();
        assert_eq!(send_target(&url), "/a/b?x=1&y=2");

        let url = canonicalize("http://example.com/a#frag").unwrap();
        assert_eq!(send_target(&url), "/a#frag");
    }

    #[test]
    fn origin_comparison_uses_effective_ports() {
        let a = canonicalize("http://example.com/a").unwrap();
        let b = canonicalize("http://example.com:80/b").unwrap();
        let c = canonicalize("https://example.com/a").unwrap();
        let d = canonicalize("http://other.com/a").unwrap();

        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
        assert!(!same_origin(&a, &d));
    }

    #[test]
    fn idna_hosts_are_normalized() {
        let url = canonicalize("http://bücher.example/").unwrap();
        let key = client_key(&url, None).unwrap();
        assert_eq!(key.host, "xn--bcher-kva.example");
    }
}
