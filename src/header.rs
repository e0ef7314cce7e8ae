//! Ordered, case-insensitive multimap for HTTP header fields.
//!
//! Field order is preserved, duplicate names are allowed, and name
//! comparison is ASCII case-insensitive. Lookups return the first
//! matching field, so [`HeaderSet::add`] (which prepends) makes the
//! newest value win without erasing older ones.

use derive_more::Display;

/// An ordered sequence of `(name, value)` header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    fields: Vec<(String, String)>,
}

/// Body length resolution for a message, per RFC 7230 §3.3.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body follows the header section.
    None,
    /// The body is exactly this many bytes.
    ContentLength(u64),
    /// The body uses chunked transfer coding.
    Chunked,
}

/// Errors resolving the `Content-Length` field.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ContentLengthError {
    #[display("missing Content-Length header field")]
    NotFound,
    #[display("invalid Content-Length header field")]
    Invalid,
    #[display("multiple Content-Length header fields")]
    Multiple,
}

impl std::error::Error for ContentLengthError {}

/// Errors resolving the body framing of a message.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// `chunked` was present in `Transfer-Encoding` but not as the
    /// final coding; the connection cannot be read coherently.
    #[display("chunked is not the final transfer coding")]
    InvalidIntermediaryChunked,
    #[display("{}", _0)]
    ContentLength(ContentLengthError),
}

impl std::error::Error for FramingError {}

impl HeaderSet {
    pub fn new() -> HeaderSet {
        HeaderSet { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Append a field, after any existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Prepend a field so that subsequent lookups see it first.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(0, (name.into(), value.into()));
    }

    /// Prepend a field unless one with the same name already exists.
    pub fn add_if_missing(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.add(name, value);
        }
    }

    /// Remove all fields named `name`, then prepend the new value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.add(name, value);
    }

    /// Delete all fields named `name`.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Delete all fields matching any of `names`.
    pub fn remove_all(&mut self, names: &[&str]) {
        self.fields
            .retain(|(n, _)| !names.iter().any(|name| n.eq_ignore_ascii_case(name)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// First value for `name`.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn find_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// All values for `name` joined with `", "`.
    pub fn find_all_concat(&self, name: &str) -> String {
        self.find_all(name).join(", ")
    }

    /// All values for `name`, each split on commas, tokens trimmed of
    /// ASCII spaces and tabs. Empty tokens are dropped.
    pub fn find_all_split(&self, name: &str) -> Vec<String> {
        self.find_all(name)
            .iter()
            .flat_map(|v| v.split(','))
            .map(|token| token.trim_matches([' ', '\t']).to_string())
            .filter(|token| !token.is_empty())
            .collect()
    }

    /// As [`find_all_split`](Self::find_all_split), lowercased.
    pub fn find_token_list(&self, name: &str) -> Vec<String> {
        self.find_all_split(name)
            .into_iter()
            .map(|token| token.to_ascii_lowercase())
            .collect()
    }

    /// Resolve the `Content-Length` field.
    pub fn content_length(&self) -> Result<u64, ContentLengthError> {
        let values = self.find_all("Content-Length");
        match values.len() {
            0 => Err(ContentLengthError::NotFound),
            1 => values[0]
                .trim()
                .parse::<u64>()
                .map_err(|_| ContentLengthError::Invalid),
            _ => Err(ContentLengthError::Multiple),
        }
    }

    /// `Transfer-Encoding` codings, lowercased, in order.
    pub fn transfer_encoding(&self) -> Vec<String> {
        self.find_token_list("Transfer-Encoding")
    }

    /// `Content-Encoding` codings, lowercased, in order.
    pub fn content_encoding(&self) -> Vec<String> {
        self.find_token_list("Content-Encoding")
    }

    /// True iff any `Connection` token equals `close`.
    pub fn has_connection_close(&self) -> bool {
        self.find_token_list("Connection").iter().any(|t| t == "close")
    }

    /// Decide the body framing per RFC 7230 §3.3.3.
    ///
    /// `Transfer-Encoding` wins over `Content-Length`; `chunked`
    /// anywhere but last is a hard error since the message end cannot
    /// be located.
    pub fn body_framing(&self) -> Result<BodyFraming, FramingError> {
        let codings = self.transfer_encoding();
        if let Some(last) = codings.last() {
            if last == "chunked" {
                return Ok(BodyFraming::Chunked);
            }
            if codings.iter().any(|c| c == "chunked") {
                return Err(FramingError::InvalidIntermediaryChunked);
            }
        }

        match self.content_length() {
            Ok(len) => Ok(BodyFraming::ContentLength(len)),
            Err(ContentLengthError::NotFound) => Ok(BodyFraming::None),
            Err(err) => Err(FramingError::ContentLength(err)),
        }
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderSet {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        HeaderSet {
            fields: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive_and_ordered() {
        let mut header = HeaderSet::new();
        header.append("Accept", "text/html");
        header.append("accept", "application/json");

        assert!(header.contains("ACCEPT"));
        assert_eq!(header.find("Accept"), Some("text/html"));
        assert_eq!(header.find_all("accept"), vec!["text/html", "application/json"]);
        assert_eq!(header.find_all_concat("accept"), "text/html, application/json");
    }

    #[test]
    fn add_prepends_and_wins() {
        let mut header = HeaderSet::new();
        header.append("X-Test", "old");
        header.add("x-test", "new");

        assert_eq!(header.find("X-Test"), Some("new"));
        assert_eq!(header.len(), 2);

        header.add_if_missing("X-Test", "ignored");
        assert_eq!(header.len(), 2);

        header.set("X-Test", "only");
        assert_eq!(header.find_all("x-test"), vec!["only"]);
    }

    #[test]
    fn remove_deletes_all_matches() {
        let mut header = HeaderSet::new();
        header.append("Cookie", "a=1");
        header.append("COOKIE", "b=2");
        header.append("Host", "example.com");
        header.remove("cookie");

        assert_eq!(header.len(), 1);
        assert_eq!(header.find("Host"), Some("example.com"));
    }

    #[test]
    fn token_lists_are_split_and_trimmed() {
        let mut header = HeaderSet::new();
        header.append("Connection", "Keep-Alive, \tUpgrade");
        header.append("Connection", "TE");

        assert_eq!(
            header.find_all_split("connection"),
            vec!["Keep-Alive", "Upgrade", "TE"]
        );
        assert_eq!(
            header.find_token_list("connection"),
            vec!["keep-alive", "upgrade", "te"]
        );
        assert!(!header.has_connection_close());

        header.add("Connection", "close");
        assert!(header.has_connection_close());
    }

    #[test]
    fn content_length_resolution() {
        let mut header = HeaderSet::new();
        assert_eq!(header.content_length(), Err(ContentLengthError::NotFound));

        header.append("Content-Length", "42");
        assert_eq!(header.content_length(), Ok(42));

        header.set("Content-Length", "nope");
        assert_eq!(header.content_length(), Err(ContentLengthError::Invalid));

        header.set("Content-Length", "1");
        header.append("content-length", "2");
        assert_eq!(header.content_length(), Err(ContentLengthError::Multiple));
    }

    #[test]
    fn framing_prefers_final_chunked() {
        let mut header = HeaderSet::new();
        header.append("Transfer-Encoding", "gzip, chunked");
        header.append("Content-Length", "10");
        assert_eq!(header.body_framing(), Ok(BodyFraming::Chunked));
    }

    #[test]
    fn framing_rejects_intermediary_chunked() {
        let mut header = HeaderSet::new();
        header.append("Transfer-Encoding", "gzip, chunked, identity");
        assert_eq!(
            header.body_framing(),
            Err(FramingError::InvalidIntermediaryChunked)
        );
    }

    #[test]
    fn framing_falls_back_to_content_length() {
        let mut header = HeaderSet::new();
        header.append("Content-Length", "5");
        assert_eq!(header.body_framing(), Ok(BodyFraming::ContentLength(5)));

        header.append("Content-Length", "5");
        assert_eq!(
            header.body_framing(),
            Err(FramingError::ContentLength(ContentLengthError::Multiple))
        );

        let header = HeaderSet::new();
        assert_eq!(header.body_framing(), Ok(BodyFraming::None));
    }
}
