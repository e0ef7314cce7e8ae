//! `.netrc` credential store.
//!
//! The pool consults it when `use_netrc` is enabled: a host match
//! yields basic-auth credentials and, optionally, a port override for
//! the connection key.

use std::io;
use std::path::{Path, PathBuf};

use crate::client::Credentials;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Entry {
    /// `None` for a `default` entry.
    pub machine: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    /// Raw `port` token; resolved lazily by [`Entry::port_override`].
    pub port: Option<String>,
}

impl Entry {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.login, &self.password) {
            (Some(user), Some(password)) => Some(Credentials::Basic {
                user: user.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Resolve the `port` token to a connection port.
    ///
    /// Numeric ports are used as-is; of the textual service names only
    /// `http` and `https` are recognized. Anything else is logged and
    /// ignored so the URI-derived port applies.
    pub fn port_override(&self) -> Option<u16> {
        let raw = self.port.as_deref()?;
        if let Ok(port) = raw.parse::<u16>() {
            return Some(port);
        }
        match raw {
            "http" => Some(80),
            "https" => Some(443),
            other => {
                log::warn!(
                    target: "gannet::client",
                    "unknown port {other:?} in credential entry, using the request port"
                );
                None
            }
        }
    }
}

/// First entry whose machine matches `host`, falling back to a
/// `default` entry.
pub(crate) fn lookup<'a>(entries: &'a [Entry], host: &str) -> Option<&'a Entry> {
    entries
        .iter()
        .find(|entry| entry.machine.as_deref() == Some(host))
        .or_else(|| entries.iter().find(|entry| entry.machine.is_none()))
}

pub(crate) fn load(path: &Path) -> io::Result<Vec<Entry>> {
    Ok(parse(&std::fs::read_to_string(path)?))
}

/// `~/.netrc`, when a home directory is known.
pub(crate) fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".netrc"))
}

pub(crate) fn parse(text: &str) -> Vec<Entry> {
    let mut tokens = Vec::new();
    let mut in_macdef = false;

    for line in text.lines() {
        // a macro definition body extends to the next blank line
        if in_macdef {
            if line.trim().is_empty() {
                in_macdef = false;
            }
            continue;
        }
        for word in line.split_whitespace() {
            if word == "macdef" {
                in_macdef = true;
                break;
            }
            if word.starts_with('#') {
                break;
            }
            tokens.push(word.to_string());
        }
    }

    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        match token.as_str() {
            "machine" => {
                entries.extend(current.take());
                current = Some(Entry {
                    machine: tokens.next(),
                    ..Entry::default()
                });
            }
            "default" => {
                entries.extend(current.take());
                current = Some(Entry::default());
            }
            "login" => {
                if let Some(entry) = current.as_mut() {
                    entry.login = tokens.next();
                }
            }
            "password" => {
                if let Some(entry) = current.as_mut() {
                    entry.password = tokens.next();
                }
            }
            "port" => {
                if let Some(entry) = current.as_mut() {
                    entry.port = tokens.next();
                }
            }
            "account" => {
                // recognized but unused
                tokens.next();
            }
            _ => {}
        }
    }
    entries.extend(current);

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_and_multi_line_entries() {
        let entries = parse(
            "machine example.com login alice password s3cret port 8080\n\
             machine other.org\n  login bob\n  password hunter2\n",
        );

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].machine.as_deref(), Some("example.com"));
        assert_eq!(entries[0].login.as_deref(), Some("alice"));
        assert_eq!(entries[0].password.as_deref(), Some("s3cret"));
        assert_eq!(entries[0].port.as_deref(), Some("8080"));
        assert_eq!(entries[1].machine.as_deref(), Some("other.org"));
    }

    #[test]
    fn lookup_prefers_exact_match_over_default() {
        let entries = parse(
            "machine example.com login alice password a\n\
             default login anon password b\n",
        );

        assert_eq!(
            lookup(&entries, "example.com").unwrap().login.as_deref(),
            Some("alice")
        );
        assert_eq!(
            lookup(&entries, "unknown.net").unwrap().login.as_deref(),
            Some("anon")
        );
    }

    #[test]
    fn skips_comments_and_macdefs() {
        let entries = parse(
            "# credentials\n\
             macdef init\n\
             machine not-an-entry.example\n\
             \n\
             machine real.example login a password b # trailing comment\n",
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].machine.as_deref(), Some("real.example"));
    }

    #[test]
    fn textual_ports_recognize_http_and_https_only() {
        let entry = |port: &str| Entry {
            machine: Some("example.com".into()),
            port: Some(port.into()),
            ..Entry::default()
        };

        assert_eq!(entry("8080").port_override(), Some(8080));
        assert_eq!(entry("http").port_override(), Some(80));
        assert_eq!(entry("https").port_override(), Some(443));
        assert_eq!(entry("gopher").port_override(), None);
    }

    #[test]
    fn credentials_require_login_and_password() {
        let entries = parse("machine example.com login alice\n");
        assert_eq!(entries[0].credentials(), None);

        let entries = parse("machine example.com login alice password x\n");
        assert_eq!(
            entries[0].credentials(),
            Some(Credentials::Basic {
                user: "alice".into(),
                password: "x".into()
            })
        );
    }
}
