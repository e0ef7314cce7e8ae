//! Client-level request finalization.
//!
//! The last mutation a request undergoes before encoding. Everything
//! here depends on the client's options and its connection, so it
//! runs inside the client, not the pool.

use base64::prelude::*;

use crate::client::{ClientOptions, Credentials};
use crate::request::Request;

/// Apply client-level fixes, in order: compression advertisement,
/// configured default fields, credentials, `Host`, `Content-Length`.
///
/// `Host` is applied after the defaults so a user-supplied default
/// can never override it.
pub(crate) fn finalize_request(mut req: Request, options: &ClientOptions) -> Request {
    if options.compression && !req.header.contains("Accept-Encoding") {
        req.header.append("Accept-Encoding", "gzip");
    }

    // prepend the default fields as a block, preserving their
    // configured order
    for (name, value) in options.header.iter().rev() {
        req.header.add(name, value);
    }

    if let Some(credentials) = &options.credentials {
        req.header
            .add_if_missing("Authorization", authorization_value(credentials));
    }

    req.header.set("Host", host_value(options));

    if !req.body.is_empty()
        && !req.header.contains("Content-Length")
        && !req.header.contains("Transfer-Encoding")
    {
        req.header.append("Content-Length", req.body.len().to_string());
    }

    req
}

/// `host` or `host:port`, the port elided when it is the transport
/// default.
fn host_value(options: &ClientOptions) -> String {
    if options.port == options.transport.default_port() {
        options.host.clone()
    } else {
        format!("{}:{}", options.host, options.port)
    }
}

fn authorization_value(credentials: &Credentials) -> String {
    match credentials {
        Credentials::Basic { user, password } => {
            format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::connect::Transport;
    use crate::header::HeaderSet;

    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            host: "example.com".into(),
            ..ClientOptions::default()
        }
    }

    #[test]
    fn advertises_gzip_when_compression_is_enabled() {
        let mut opts = options();
        opts.compression = true;

        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(req.header.find("Accept-Encoding"), Some("gzip"));

        let user_req = Request::get("/").with_header("Accept-Encoding", "identity");
        let req = finalize_request(user_req, &opts);
        assert_eq!(req.header.find_all("Accept-Encoding"), vec!["identity"]);
    }

    #[test]
    fn prepends_default_fields_in_configured_order() {
        let mut opts = options();
        opts.header = HeaderSet::from_iter([("User-Agent", "gannet"), ("X-A", "1")]);

        let req = finalize_request(Request::get("/").with_header("X-B", "2"), &opts);
        let names: Vec<_> = req.header.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "User-Agent", "X-A", "X-B"]);
    }

    #[test]
    fn host_elides_default_ports() {
        let mut opts = options();
        opts.port = 80;
        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(req.header.find("Host"), Some("example.com"));

        opts.port = 8080;
        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(req.header.find("Host"), Some("example.com:8080"));

        opts.transport = Transport::Tls;
        opts.port = 443;
        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(req.header.find("Host"), Some("example.com"));
    }

    #[test]
    fn host_wins_over_user_supplied_defaults() {
        let mut opts = options();
        opts.header = HeaderSet::from_iter([("Host", "spoofed.example")]);

        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(req.header.find_all("Host"), vec!["example.com"]);
    }

    #[test]
    fn adds_content_length_for_non_empty_bodies() {
        let req = finalize_request(Request::get("/"), &options());
        assert!(!req.header.contains("Content-Length"));

        let req = finalize_request(Request::get("/").with_body("hello"), &options());
        assert_eq!(req.header.find("Content-Length"), Some("5"));
    }

    #[test]
    fn never_combines_content_length_with_chunked() {
        let user_req = Request::get("/")
            .with_header("Transfer-Encoding", "chunked")
            .with_body("hello");
        let req = finalize_request(user_req, &options());
        assert!(!req.header.contains("Content-Length"));
    }

    #[test]
    fn injects_basic_credentials_without_overriding() {
        let mut opts = options();
        opts.credentials = Some(Credentials::Basic {
            user: "alice".into(),
            password: "s3cret".into(),
        });

        let req = finalize_request(Request::get("/"), &opts);
        assert_eq!(
            req.header.find("Authorization"),
            Some("Basic YWxpY2U6czNjcmV0")
        );

        let user_req = Request::get("/").with_header("Authorization", "Bearer tok");
        let req = finalize_request(user_req, &opts);
        assert_eq!(req.header.find_all("Authorization"), vec!["Bearer tok"]);
    }
}
