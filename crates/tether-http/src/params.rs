//! Ordered, multi-valued URL query parameters.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Encodes query keys and values when rendering a [`UrlParams`].
pub trait QueryEncoder: Send + Sync {
    fn encode_key(&self, key: &str) -> String;
    fn encode_value(&self, value: &str) -> String;
}

/// Percent-encodes like `encodeURIComponent`, then restores the characters
/// that are legal inside a query component (`@ : $ , ; + = ? /`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEncoder;

impl QueryEncoder for StandardEncoder {
    fn encode_key(&self, key: &str) -> String {
        encode_query_component(key)
    }

    fn encode_value(&self, value: &str) -> String {
        encode_query_component(value)
    }
}

/// `encodeURIComponent` leaves ASCII alphanumerics and `-_.!~*'()` alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const QUERY_COMPONENT: &AsciiSet = &COMPONENT
    .remove(b'@')
    .remove(b':')
    .remove(b'$')
    .remove(b',')
    .remove(b';')
    .remove(b'+')
    .remove(b'=')
    .remove(b'?')
    .remove(b'/');

/// `encodeURIComponent`.
pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

fn encode_query_component(s: &str) -> String {
    utf8_percent_encode(s, QUERY_COMPONENT).to_string()
}

/// Decode `%XX` escapes. Malformed escapes are kept verbatim and invalid
/// UTF-8 is replaced.
pub fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Query parameters, ordered by first appearance of each key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlParams {
    entries: Vec<(String, Vec<String>)>,
}

impl UrlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a=1&b=2&a=3`. A leading `?` is ignored; a pair without `=`
    /// maps to the empty string.
    pub fn parse(raw: &str) -> Self {
        let mut params = Self::new();
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        for pair in raw.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = match pair.find('=') {
                Some(idx) => (&pair[..idx], &pair[idx + 1..]),
                None => (pair, ""),
            };
            params.append(&decode_component(key), decode_component(value));
        }
        params
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> Option<&[String]> {
        self.position(key).map(|idx| self.entries[idx].1.as_slice())
    }

    /// Replace every value of `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.replace(key, vec![value.into()]);
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        match self.position(key) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((key.to_string(), vec![value.into()])),
        }
    }

    pub fn delete(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// For every key in `other`, keep only its first value here.
    pub fn set_all(&mut self, other: &UrlParams) {
        for (key, values) in &other.entries {
            if let Some(first) = values.first() {
                self.set(key, first.clone());
            }
        }
    }

    /// Append every value of `other`.
    pub fn append_all(&mut self, other: &UrlParams) {
        for (key, values) in &other.entries {
            for value in values {
                self.append(key, value.clone());
            }
        }
    }

    /// For every key in `other`, replace the values here with all of its values.
    pub fn replace_all(&mut self, other: &UrlParams) {
        for (key, values) in &other.entries {
            self.replace(key, values.clone());
        }
    }

    fn replace(&mut self, key: &str, values: Vec<String>) {
        match self.position(key) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((key.to_string(), values)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render through `encoder` as `key=value` pairs joined by `&`.
    pub fn to_string_with(&self, encoder: &dyn QueryEncoder) -> String {
        self.entries
            .iter()
            .flat_map(|(key, values)| {
                let key = encoder.encode_key(key);
                values
                    .iter()
                    .map(move |value| format!("{key}={}", encoder.encode_value(value)))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for UrlParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(&StandardEncoder))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for UrlParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.append(k.as_ref(), v);
        }
        params
    }
}
