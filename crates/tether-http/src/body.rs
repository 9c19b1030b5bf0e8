//! Request and response body shapes.
//!
//! A request [`Body`] keeps the runtime shape the caller supplied so the
//! client can decide how to put it on the wire ([`SerializedBody`]) and
//! which `Content-Type` to infer. A [`ResponseBody`] is the decoded payload
//! selected by the request's [`ResponseType`].

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Content type inferred for form-data bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// The shape the caller expects the response body to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    ArrayBuffer,
    Blob,
    #[default]
    Json,
    Text,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Blob => "blob",
            ResponseType::Json => "json",
            ResponseType::Text => "text",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arraybuffer" => Ok(ResponseType::ArrayBuffer),
            "blob" => Ok(ResponseType::Blob),
            "json" => Ok(ResponseType::Json),
            "text" => Ok(ResponseType::Text),
            other => Err(ConfigError::InvalidResponseType(other.to_string())),
        }
    }
}

/// Binary data with an optional media type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob {
    pub data: Bytes,
    pub content_type: Option<String>,
}

impl Blob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    pub fn with_type(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: Some(content_type.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Ordered form fields, written url-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormData {
    fields: Vec<(String, String)>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Render as `name=value&...` with both sides percent-encoded.
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    crate::params::encode_component(k),
                    crate::params::encode_component(v)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormData {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// An outgoing request body in the shape the caller supplied it.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    ArrayBuffer(Bytes),
    Blob(Blob),
    FormData(FormData),
    Text(String),
    /// Any JSON value. A request drops a `null` body entirely.
    Json(serde_json::Value),
}

impl Body {
    pub fn is_null(&self) -> bool {
        matches!(self, Body::Json(serde_json::Value::Null))
    }

    /// Build a JSON body from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    /// The wire representation of this body.
    ///
    /// Binary, blob, form-data and string bodies pass through verbatim;
    /// every other JSON value is rendered as JSON text.
    pub fn serialize(&self) -> SerializedBody {
        match self {
            Body::ArrayBuffer(bytes) => SerializedBody::ArrayBuffer(bytes.clone()),
            Body::Blob(blob) => SerializedBody::Blob(blob.clone()),
            Body::FormData(form) => SerializedBody::FormData(form.clone()),
            Body::Text(text) => SerializedBody::Text(text.clone()),
            Body::Json(serde_json::Value::String(text)) => SerializedBody::Text(text.clone()),
            Body::Json(value) => SerializedBody::Text(value.to_string()),
        }
    }

    /// The `Content-Type` implied by this body, when one can be inferred.
    pub fn content_type(&self) -> Option<String> {
        match self {
            Body::FormData(_) => Some(FORM_CONTENT_TYPE.to_string()),
            Body::Blob(blob) => blob.content_type.clone(),
            Body::ArrayBuffer(_) => None,
            Body::Text(_) | Body::Json(serde_json::Value::String(_)) => {
                Some("text/plain".to_string())
            }
            Body::Json(serde_json::Value::Bool(_)) => None,
            Body::Json(_) => Some("application/json".to_string()),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::ArrayBuffer(bytes)
    }
}

impl From<Blob> for Body {
    fn from(blob: Blob) -> Self {
        Body::Blob(blob)
    }
}

impl From<FormData> for Body {
    fn from(form: FormData) -> Self {
        Body::FormData(form)
    }
}

/// A request body ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializedBody {
    ArrayBuffer(Bytes),
    Blob(Blob),
    FormData(FormData),
    Text(String),
}

impl SerializedBody {
    /// Number of bytes this body occupies on the wire.
    pub fn len(&self) -> usize {
        match self {
            SerializedBody::ArrayBuffer(bytes) => bytes.len(),
            SerializedBody::Blob(blob) => blob.len(),
            SerializedBody::FormData(form) => form.encode().len(),
            SerializedBody::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            SerializedBody::ArrayBuffer(bytes) => bytes,
            SerializedBody::Blob(blob) => blob.data,
            SerializedBody::FormData(form) => Bytes::from(form.encode()),
            SerializedBody::Text(text) => Bytes::from(text),
        }
    }
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    ArrayBuffer(Bytes),
    Blob(Blob),
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            ResponseBody::ArrayBuffer(bytes) => Some(bytes),
            ResponseBody::Blob(blob) => Some(&blob.data),
            _ => None,
        }
    }

    /// Whether this body has the runtime shape `response_type` promises.
    /// Every shape is acceptable for JSON, which may decode to anything.
    pub fn matches(&self, response_type: ResponseType) -> bool {
        match response_type {
            ResponseType::ArrayBuffer => matches!(self, ResponseBody::ArrayBuffer(_)),
            ResponseType::Blob => matches!(self, ResponseBody::Blob(_)),
            ResponseType::Text => matches!(self, ResponseBody::Text(_)),
            ResponseType::Json => true,
        }
    }

    /// Deserialize a JSON body into `T`.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => T::deserialize(value),
            ResponseBody::Text(text) => serde_json::from_str(text),
            ResponseBody::ArrayBuffer(bytes) => serde_json::from_slice(bytes),
            ResponseBody::Blob(blob) => serde_json::from_slice(&blob.data),
        }
    }
}
