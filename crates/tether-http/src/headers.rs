//! Case-insensitive, multi-value header container.
//!
//! Names are matched case-insensitively; the casing of the first
//! occurrence is kept for enumeration and serialization. A container can
//! be sealed, after which every mutation fails with [`HeaderError::Sealed`]
//! until an unsealed copy is taken with [`Headers::unsealed`].
//!
//! Containers built from a raw response header block defer parsing until
//! the first access. The parse runs at most once and bypasses the seal,
//! so a sealed, deferred container still initializes correctly.

use std::sync::OnceLock;

use crate::error::HeaderError;

/// One header name with all of its stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    name: String,
    values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HeaderEntries {
    entries: Vec<HeaderEntry>,
}

impl HeaderEntries {
    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    fn find(&self, name: &str) -> Option<&HeaderEntry> {
        self.position(name).map(|idx| &self.entries[idx])
    }

    /// Replace the values stored under `name`, keeping first-seen casing.
    fn replace(&mut self, name: &str, values: Vec<String>) {
        match self.position(name) {
            Some(idx) => self.entries[idx].values = values,
            None => self.entries.push(HeaderEntry {
                name: name.to_string(),
                values,
            }),
        }
    }

    fn push(&mut self, name: &str, value: String) {
        match self.position(name) {
            Some(idx) => self.entries[idx].values.push(value),
            None => self.entries.push(HeaderEntry {
                name: name.to_string(),
                values: vec![value],
            }),
        }
    }

    fn remove(&mut self, name: &str) {
        self.entries.retain(|e| !e.name.eq_ignore_ascii_case(name));
    }
}

#[derive(Debug, Clone)]
enum HeaderState {
    /// Raw `Name: value` lines awaiting their one-time parse.
    Deferred {
        raw: String,
        parsed: OnceLock<HeaderEntries>,
    },
    Initialized(HeaderEntries),
}

/// An HTTP header container with optional sealing and lazy parsing.
#[derive(Debug, Clone)]
pub struct Headers {
    state: HeaderState,
    sealed: bool,
}

impl Default for Headers {
    fn default() -> Self {
        Self::new()
    }
}

impl Headers {
    /// Create an empty, unsealed container.
    pub fn new() -> Self {
        Self {
            state: HeaderState::Initialized(HeaderEntries::default()),
            sealed: false,
        }
    }

    /// Create a container from a raw response header block.
    ///
    /// Lines are separated by `\n`. A line contributes a header only when a
    /// `:` appears after at least one character; the value is trimmed.
    /// Repeated names keep the last value. Parsing is deferred until the
    /// container is first used.
    pub fn from_response_text(raw: impl Into<String>) -> Self {
        Self {
            state: HeaderState::Deferred {
                raw: raw.into(),
                parsed: OnceLock::new(),
            },
            sealed: false,
        }
    }

    fn entries(&self) -> &HeaderEntries {
        match &self.state {
            HeaderState::Initialized(entries) => entries,
            HeaderState::Deferred { raw, parsed } => parsed.get_or_init(|| parse_header_block(raw)),
        }
    }

    fn entries_mut(&mut self) -> &mut HeaderEntries {
        if let HeaderState::Deferred { raw, parsed } = &mut self.state {
            let entries = parsed.take().unwrap_or_else(|| parse_header_block(raw));
            self.state = HeaderState::Initialized(entries);
        }
        match &mut self.state {
            HeaderState::Initialized(entries) => entries,
            HeaderState::Deferred { .. } => unreachable!("deferred headers are initialized above"),
        }
    }

    fn writable(&mut self) -> Result<&mut HeaderEntries, HeaderError> {
        // Force the deferred parse first so its outcome is independent of the seal.
        let sealed = self.sealed;
        let entries = self.entries_mut();
        if sealed {
            return Err(HeaderError::Sealed);
        }
        Ok(entries)
    }

    /// Add a value to `name`, keeping any values already stored.
    pub fn append(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.writable()?.push(name, value.into());
        Ok(())
    }

    /// Replace every value of `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), HeaderError> {
        self.writable()?.replace(name, vec![value.into()]);
        Ok(())
    }

    /// Replace `name` with the comma-joined `values`, stored as one entry.
    ///
    /// Unlike [`append`](Headers::append) this collapses multiplicity. An
    /// empty slice leaves the container unchanged.
    pub fn set_all<S: AsRef<str>>(&mut self, name: &str, values: &[S]) -> Result<(), HeaderError> {
        self.writable()?;
        self.overlay(name, values);
        Ok(())
    }

    /// [`set_all`](Headers::set_all) without the seal check, for copies
    /// taken with [`unsealed`](Headers::unsealed).
    pub(crate) fn overlay<S: AsRef<str>>(&mut self, name: &str, values: &[S]) {
        if values.is_empty() {
            return;
        }
        let joined = values
            .iter()
            .map(|v| v.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        self.entries_mut().replace(name, vec![joined]);
    }

    /// Remove `name` and all of its values.
    pub fn delete(&mut self, name: &str) -> Result<(), HeaderError> {
        self.writable()?.remove(name);
        Ok(())
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries()
            .find(name)
            .and_then(|e| e.values.first())
            .map(String::as_str)
    }

    /// All values stored under `name`.
    pub fn get_all(&self, name: &str) -> Option<&[String]> {
        self.entries().find(name).map(|e| e.values.as_slice())
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries().find(name).is_some()
    }

    /// Header names in their first-seen casing, in insertion order.
    pub fn keys(&self) -> Vec<&str> {
        self.entries()
            .entries
            .iter()
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Visit each header with its values and original-case name.
    pub fn for_each(&self, mut f: impl FnMut(&[String], &str)) {
        for entry in &self.entries().entries {
            f(&entry.values, &entry.name);
        }
    }

    /// Iterate over `(name, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries()
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().entries.is_empty()
    }

    /// Render as a name → values record. Stored values are split on `,`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut record = serde_json::Map::new();
        for entry in &self.entries().entries {
            let split: Vec<serde_json::Value> = entry
                .values
                .iter()
                .flat_map(|v| v.split(','))
                .map(|v| serde_json::Value::String(v.to_string()))
                .collect();
            record.insert(entry.name.clone(), serde_json::Value::Array(split));
        }
        serde_json::Value::Object(record)
    }

    /// A deep, unsealed copy of this container.
    pub fn unsealed(&self) -> Headers {
        Headers {
            state: HeaderState::Initialized(self.entries().clone()),
            sealed: false,
        }
    }

    /// Forbid further mutation of this instance.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn sealed(mut self) -> Self {
        self.seal();
        self
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

/// Build a container from a name → value record. Values for repeated
/// names accumulate, so multiplicity is preserved.
impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries = HeaderEntries::default();
        for (name, value) in iter {
            entries.push(name.as_ref(), value.into());
        }
        Headers {
            state: HeaderState::Initialized(entries),
            sealed: false,
        }
    }
}

fn parse_header_block(raw: &str) -> HeaderEntries {
    let mut entries = HeaderEntries::default();
    for line in raw.split('\n') {
        if let Some(idx) = line.find(':')
            && idx > 0
        {
            let name = &line[..idx];
            let value = line[idx + 1..].trim();
            entries.replace(name, vec![value.to_string()]);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/html").unwrap();
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert!(headers.has("content-TYPE"));
    }

    #[test]
    fn first_seen_casing_is_kept() {
        let mut headers = Headers::new();
        headers.append("X-Trace", "a").unwrap();
        headers.append("x-trace", "b").unwrap();
        headers.set("X-TRACE", "c").unwrap();
        assert_eq!(headers.keys(), vec!["X-Trace"]);
        assert_eq!(headers.get_all("x-trace").unwrap(), ["c"]);
    }

    #[test]
    fn append_preserves_multiplicity() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1").unwrap();
        headers.append("Set-Cookie", "b=2").unwrap();
        assert_eq!(headers.get("set-cookie"), Some("a=1"));
        assert_eq!(headers.get_all("set-cookie").unwrap(), ["a=1", "b=2"]);
    }

    #[test]
    fn set_all_collapses_into_one_value() {
        let mut headers = Headers::new();
        headers.set_all("Accept", &["text/html", "application/json"]).unwrap();
        assert_eq!(headers.get_all("accept").unwrap(), ["text/html,application/json"]);

        headers.set_all::<&str>("X-Empty", &[]).unwrap();
        assert!(!headers.has("x-empty"));
    }

    #[test]
    fn delete_forgets_name_and_casing() {
        let mut headers = Headers::new();
        headers.set("X-Old", "1").unwrap();
        headers.delete("x-old").unwrap();
        assert!(!headers.has("X-Old"));
        headers.set("x-OLD", "2").unwrap();
        assert_eq!(headers.keys(), vec!["x-OLD"]);
    }

    #[test]
    fn missing_names_return_none() {
        let headers = Headers::new();
        assert_eq!(headers.get("X-Missing"), None);
        assert_eq!(headers.get_all("X-Missing"), None);
        assert!(headers.is_empty());
    }

    #[test]
    fn sealed_container_rejects_mutation() {
        let mut headers: Headers = [("Accept", "*/*")].into_iter().collect();
        headers.seal();

        assert_eq!(headers.append("A", "1"), Err(HeaderError::Sealed));
        assert_eq!(headers.set("A", "1"), Err(HeaderError::Sealed));
        assert_eq!(headers.delete("Accept"), Err(HeaderError::Sealed));
        assert_eq!(headers.get("accept"), Some("*/*"));
    }

    #[test]
    fn unsealed_copy_is_independent() {
        let mut original: Headers = [("Accept", "*/*")].into_iter().collect();
        original.seal();

        let mut copy = original.unsealed();
        assert!(!copy.is_sealed());
        copy.set("X-New", "1").unwrap();

        assert!(copy.has("x-new"));
        assert!(!original.has("x-new"));
    }

    #[test]
    fn record_constructor_accumulates_values() {
        let headers: Headers = vec![
            ("Host", "example.com".to_string()),
            ("Vary", "Accept".to_string()),
            ("vary", "Origin".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_all("VARY").unwrap(), ["Accept", "Origin"]);
    }

    #[test]
    fn response_text_is_parsed_lazily() {
        let headers = Headers::from_response_text(
            "Content-Type: application/json\nX-Request-URL:  /final \n: bogus\nno-colon\n",
        );
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("x-request-url"), Some("/final"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn sealed_deferred_container_still_initializes() {
        let mut headers = Headers::from_response_text("ETag: abc");
        headers.seal();

        assert_eq!(headers.get("etag"), Some("abc"));
        assert_eq!(headers.set("etag", "def"), Err(HeaderError::Sealed));
        assert!(headers.is_sealed());
        assert_eq!(headers.get("etag"), Some("abc"));
    }

    #[test]
    fn first_mutation_of_deferred_container_sees_parsed_values() {
        let mut headers = Headers::from_response_text("A: 1\nB: 2");
        headers.append("a", "3").unwrap();
        assert_eq!(headers.get_all("A").unwrap(), ["1", "3"]);
        assert_eq!(headers.keys(), vec!["A", "B"]);
    }

    #[test]
    fn to_json_splits_stored_values() {
        let mut headers = Headers::new();
        headers.set_all("Accept", &["a", "b"]).unwrap();
        headers.append("X-One", "1").unwrap();
        assert_eq!(
            headers.to_json(),
            serde_json::json!({ "Accept": ["a", "b"], "X-One": ["1"] })
        );
    }

    #[test]
    fn equality_ignores_seal_state() {
        let a: Headers = [("A", "1")].into_iter().collect();
        let b = a.clone().sealed();
        assert_eq!(a, b);
    }

    #[test]
    fn for_each_visits_original_names() {
        let headers: Headers = [("X-A", "1"), ("X-B", "2")].into_iter().collect();
        let mut seen = Vec::new();
        headers.for_each(|values, name| seen.push(format!("{name}={}", values.join(","))));
        assert_eq!(seen, vec!["X-A=1", "X-B=2"]);
    }
}
