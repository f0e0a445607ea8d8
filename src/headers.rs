//! A case-insensitive, order-preserving, multi-valued header map (C1).
//!
//! This is deliberately not `http::HeaderMap`: that type doesn't restore a
//! Title-Case spelling on serialization, which the initial composer
//! (`proto::compose`) relies on for every outgoing message.

use std::fmt;

/// A header name, stored canonicalized (ASCII-lowercased) so lookups are
/// case-insensitive. [`HeaderName::title_case`] reconstructs the
/// `Title-Case` spelling used on the wire, regardless of how the name was
/// originally cased by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeaderName(String);

impl HeaderName {
    pub fn from_str(name: &str) -> HeaderName {
        HeaderName(name.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders `content-length` as `Content-Length`, matching the
    /// composer's mandatory "Title-Case names" rule.
    pub fn title_case(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut capitalize_next = true;
        for c in self.0.chars() {
            if c == '-' {
                out.push(c);
                capitalize_next = true;
            } else if capitalize_next {
                out.extend(c.to_uppercase());
                capitalize_next = false;
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> From<&'a str> for HeaderName {
    fn from(s: &'a str) -> HeaderName {
        HeaderName::from_str(s)
    }
}

impl From<String> for HeaderName {
    fn from(s: String) -> HeaderName {
        HeaderName::from_str(&s)
    }
}

/// An insertion-order-preserving, case-insensitive multimap from header
/// name to value.
///
/// [`HeaderMap::freeze`] produces a copy that rejects further mutation;
/// the parser and composer both hand frozen maps to application code, so a
/// stray mutation afterwards is a logic error worth panicking on rather
/// than silently ignoring.
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(HeaderName, String)>,
    frozen: bool,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap {
            entries: Vec::new(),
            frozen: false,
        }
    }

    pub fn with_capacity(cap: usize) -> HeaderMap {
        HeaderMap {
            entries: Vec::with_capacity(cap),
            frozen: false,
        }
    }

    fn assert_mutable(&self) {
        assert!(!self.frozen, "cannot mutate a frozen HeaderMap");
    }

    /// Replaces any existing value(s) for `name` with a single value, in
    /// the first position that name previously occupied (or at the end, if
    /// it's new). This mirrors Python `dict`-style assignment, which the
    /// reference composer relies on to keep `Host`/`Connection` overrides
    /// from reordering the header block.
    pub fn insert<N: Into<HeaderName>>(&mut self, name: N, value: impl Into<String>) {
        self.assert_mutable();
        let name = name.into();
        let value = value.into();

        let mut seen_first = false;
        self.entries.retain(|(n, _)| {
            if *n == name {
                if seen_first {
                    false
                } else {
                    seen_first = true;
                    true
                }
            } else {
                true
            }
        });

        if let Some(existing) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Appends another value for `name`, preserving any existing ones.
    pub fn add<N: Into<HeaderName>>(&mut self, name: N, value: impl Into<String>) {
        self.assert_mutable();
        self.entries.push((name.into(), value.into()));
    }

    /// Inserts `name: value` only if `name` isn't already present.
    pub fn set_default<N: Into<HeaderName>>(&mut self, name: N, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(name.clone()) {
            self.insert(name, value);
        }
    }

    pub fn remove<N: Into<HeaderName>>(&mut self, name: N) {
        self.assert_mutable();
        let name = name.into();
        self.entries.retain(|(n, _)| *n != name);
    }

    pub fn contains<N: Into<HeaderName>>(&self, name: N) -> bool {
        let name = name.into();
        self.entries.iter().any(|(n, _)| *n == name)
    }

    /// The first value for `name`, in insertion order.
    pub fn get_first<N: Into<HeaderName>>(&self, name: N) -> Option<&str> {
        let name = name.into();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a, N: Into<HeaderName>>(&'a self, name: N) -> impl Iterator<Item = &'a str> {
        let name = name.into();
        self.entries
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &str)> {
        self.entries.iter().map(|(n, v)| (n, v.as_str()))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Consumes this map and returns a copy that rejects further mutation.
    pub fn freeze(mut self) -> HeaderMap {
        self.frozen = true;
        self
    }
}

impl FromIterator<(HeaderName, String)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (HeaderName, String)>>(iter: T) -> HeaderMap {
        HeaderMap {
            entries: iter.into_iter().collect(),
            frozen: false,
        }
    }
}

/// Equality ignores insertion order, comparing only the multiset of
/// `(name, value)` pairs — this is what the test suite relies on to assert
/// two differently-ordered maps describe the same headers.
impl PartialEq for HeaderMap {
    fn eq(&self, other: &HeaderMap) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }

        let mut mine: Vec<&(HeaderName, String)> = self.entries.iter().collect();
        let mut theirs: Vec<&(HeaderName, String)> = other.entries.iter().collect();
        mine.sort_by(|a, b| (a.0.as_str(), a.1.as_str()).cmp(&(b.0.as_str(), b.1.as_str())));
        theirs.sort_by(|a, b| (a.0.as_str(), a.1.as_str()).cmp(&(b.0.as_str(), b.1.as_str())));
        mine == theirs
    }
}

impl Eq for HeaderMap {}

#[cfg(test)]
mod tests {
    use super::HeaderMap;

    #[test]
    fn lookups_are_case_insensitive() {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get_first("content-type"), Some("text/plain"));
        assert_eq!(h.get_first("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut h = HeaderMap::new();
        h.add("a", "1");
        h.insert("b", "2");
        h.insert("a", "3");
        let order: Vec<_> = h
            .iter()
            .map(|(n, v)| (n.as_str().to_string(), v.to_string()))
            .collect();
        assert_eq!(
            order,
            vec![("a".into(), "3".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn add_preserves_multiple_values() {
        let mut h = HeaderMap::new();
        h.add("set-cookie", "a=1");
        h.add("set-cookie", "b=2");
        let all: Vec<_> = h.get_all("Set-Cookie").collect();
        assert_eq!(all, vec!["a=1", "b=2"]);
    }

    #[test]
    fn title_case_output() {
        let name = super::HeaderName::from_str("x-request-id");
        assert_eq!(name.title_case(), "X-Request-Id");
    }

    #[test]
    fn equality_ignores_order() {
        let mut a = HeaderMap::new();
        a.add("a", "1");
        a.add("b", "2");

        let mut b = HeaderMap::new();
        b.add("b", "2");
        b.add("a", "1");

        assert_eq!(a, b);
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn frozen_map_rejects_mutation() {
        let h = HeaderMap::new();
        let mut frozen = h.freeze();
        frozen.insert("b", "2");
    }
}
