//! HTTP header map with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, multi-value HTTP header map.
///
/// Preserves insertion order, which matters for the relay because the
/// response head is written verbatim before the first SSE frame.
///
/// # Examples
///
/// ```
/// use ai_relay::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/event-stream");
/// headers.insert("Vary", "Origin");
/// headers.insert("Vary", "Accept-Encoding");
///
/// assert_eq!(headers.get("content-type"), Some("text/event-stream"));
/// let vary: Vec<_> = headers.get_all("vary").collect();
/// assert_eq!(vary, vec!["Origin", "Accept-Encoding"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single new value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given name. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("X-Accel-Buffering", "no");
        assert_eq!(h.get("x-accel-buffering"), Some("no"));
        assert_eq!(h.get("X-ACCEL-BUFFERING"), Some("no"));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.insert("Connection", "keep-alive");
        h.insert("connection", "upgrade");
        h.set("Connection", "close");
        let vals: Vec<_> = h.get_all("connection").collect();
        assert_eq!(vals, vec!["close"]);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("Origin", "http://localhost:3000");
        assert!(h.remove("origin"));
        assert!(h.is_empty());
        assert!(!h.remove("origin"));
    }

    #[test]
    fn display_writes_wire_lines() {
        let mut h = Headers::new();
        h.insert("Cache-Control", "no-cache, no-transform");
        assert_eq!(h.to_string(), "Cache-Control: no-cache, no-transform\r\n");
    }
}
