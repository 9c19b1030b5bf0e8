use crate::body::{Body, ResponseType, SerializedBody};
use crate::headers::Headers;
use crate::params::UrlParams;

/// Method sentinel routed to the JSONP backend.
pub const JSONP_METHOD: &str = "JSONP";

/// Append rendered query parameters to `url`, using `?` or `&` as needed.
pub fn append_params(url: &str, params: &UrlParams) -> String {
    let query = params.to_string();
    if query.is_empty() {
        return url.to_string();
    }
    let sep = match url.find('?') {
        None => "?",
        Some(idx) if idx < url.len() - 1 => "&",
        Some(_) => "",
    };
    format!("{url}{sep}{query}")
}

/// Optional settings for a new [`Request`].
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub headers: Option<Headers>,
    pub report_progress: bool,
    pub with_credentials: bool,
    pub response_type: ResponseType,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_report_progress(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }
}

/// Overrides layered over an existing request by [`Request::clone_with`].
///
/// `None` leaves a field as it is. For the body, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct RequestUpdate {
    pub method: Option<String>,
    pub url: Option<String>,
    pub response_type: Option<ResponseType>,
    pub body: Option<Option<Body>>,
    pub with_credentials: Option<bool>,
    pub report_progress: Option<bool>,
    pub headers: Option<Headers>,
    /// Headers set on an unsealed copy of the resulting container.
    pub set_headers: Option<Vec<(String, Vec<String>)>>,
}

impl RequestUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn body(mut self, body: Option<Body>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), vec![value.into()]));
        self
    }
}

/// An immutable outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: String,
    url: String,
    body: Option<Body>,
    headers: Headers,
    report_progress: bool,
    with_credentials: bool,
    response_type: ResponseType,
}

impl Request {
    /// A `GET` request with default settings.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url, RequestInit::default())
    }

    /// A request without a body.
    pub fn new(method: &str, url: impl Into<String>, init: RequestInit) -> Self {
        Self::with_body(method, url, None, init)
    }

    /// A request carrying `body`, whatever the method.
    pub fn with_body(
        method: &str,
        url: impl Into<String>,
        body: Option<Body>,
        init: RequestInit,
    ) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.into(),
            body: body.filter(|b| !b.is_null()),
            headers: init.headers.unwrap_or_default().sealed(),
            report_progress: init.report_progress,
            with_credentials: init.with_credentials,
            response_type: init.response_type,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn report_progress(&self) -> bool {
        self.report_progress
    }

    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// The body in a form a transport can send, or `None` without a body.
    pub fn serialize_body(&self) -> Option<SerializedBody> {
        self.body.as_ref().map(Body::serialize)
    }

    /// The `Content-Type` implied by the body. `None` without a body or when
    /// nothing can be inferred.
    pub fn detect_content_type_header(&self) -> Option<String> {
        self.body.as_ref().and_then(Body::content_type)
    }

    /// A new request with `update` layered over this one.
    pub fn clone_with(&self, update: RequestUpdate) -> Request {
        let mut headers = update.headers.unwrap_or_else(|| self.headers.clone());
        if let Some(set_headers) = update.set_headers {
            headers = headers.unsealed();
            for (name, values) in &set_headers {
                headers.overlay(name, values.as_slice());
            }
        }
        let method = update.method.unwrap_or_else(|| self.method.clone());
        let body = match update.body {
            Some(body) => body,
            None => self.body.clone(),
        };
        Request::with_body(
            &method,
            update.url.unwrap_or_else(|| self.url.clone()),
            body,
            RequestInit {
                headers: Some(headers),
                report_progress: update.report_progress.unwrap_or(self.report_progress),
                with_credentials: update.with_credentials.unwrap_or(self.with_credentials),
                response_type: update.response_type.unwrap_or(self.response_type),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_has_no_body() {
        let req = Request::get("/api/items");
        assert_eq!(req.method(), "GET");
        assert!(req.body().is_none());
        assert!(req.serialize_body().is_none());
        assert!(req.detect_content_type_header().is_none());
        assert_eq!(req.response_type(), ResponseType::Json);
    }

    #[test]
    fn method_is_uppercased() {
        let req = Request::new("post", "/x", RequestInit::default());
        assert_eq!(req.method(), "POST");
    }

    #[test]
    fn headers_are_sealed() {
        let req = Request::get("/x");
        assert!(req.headers().is_sealed());
        assert!(req.headers().is_empty());

        let headers: Headers = [("Accept", "text/html")].into_iter().collect();
        let req = Request::new("GET", "/x", RequestInit::new().with_headers(headers));
        assert!(req.headers().is_sealed());
        assert_eq!(req.headers().get("accept"), Some("text/html"));
    }

    #[test]
    fn explicit_body_is_kept_for_bodiless_methods() {
        let req = Request::with_body(
            "DELETE",
            "/x",
            Some(Body::from("gone")),
            RequestInit::default(),
        );
        assert_eq!(req.body(), Some(&Body::from("gone")));
    }

    #[test]
    fn body_serialization_and_content_type() {
        let req = Request::with_body(
            "POST",
            "/x",
            Some(Body::Json(json!({ "a": 1 }))),
            RequestInit::default(),
        );
        assert_eq!(
            req.serialize_body(),
            Some(SerializedBody::Text(r#"{"a":1}"#.into()))
        );
        assert_eq!(
            req.detect_content_type_header().as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn empty_clone_is_equal() {
        let req = Request::with_body(
            "PUT",
            "/x",
            Some(Body::from("b")),
            RequestInit::new().with_report_progress(true),
        );
        let copy = req.clone_with(RequestUpdate::default());
        assert_eq!(copy, req);
        assert_eq!(copy.body(), req.body());
    }

    #[test]
    fn json_null_body_is_no_body() {
        let req = Request::with_body(
            "POST",
            "/x",
            Some(Body::Json(serde_json::Value::Null)),
            RequestInit::default(),
        );
        assert!(req.body().is_none());
        assert!(req.serialize_body().is_none());
        assert!(req.detect_content_type_header().is_none());

        let replaced =
            Request::get("/x").clone_with(RequestUpdate::new().body(Some(json!(null).into())));
        assert!(replaced.body().is_none());
    }

    #[test]
    fn clone_can_clear_body() {
        let req = Request::with_body("PUT", "/x", Some(Body::from("b")), RequestInit::default());
        let cleared = req.clone_with(RequestUpdate::new().body(None));
        assert!(cleared.body().is_none());
    }

    #[test]
    fn clone_distinguishes_false_from_unset() {
        let req = Request::new("GET", "/x", RequestInit::new().with_credentials(true));
        let same = req.clone_with(RequestUpdate::default());
        assert!(same.with_credentials());

        let off = req
            .clone_with(RequestUpdate {
                with_credentials: Some(false),
                ..Default::default()
            });
        assert!(!off.with_credentials());
    }

    #[test]
    fn clone_sets_headers_on_a_copy() {
        let headers: Headers = [("Accept", "text/html")].into_iter().collect();
        let req = Request::new("GET", "/x", RequestInit::new().with_headers(headers));
        let updated = req
            .clone_with(RequestUpdate::new().set_header("X-Trace", "1").url("/y"));

        assert_eq!(updated.url(), "/y");
        assert_eq!(updated.headers().get("x-trace"), Some("1"));
        assert_eq!(updated.headers().get("accept"), Some("text/html"));
        assert!(updated.headers().is_sealed());
        assert!(!req.headers().has("x-trace"));
    }

    #[test]
    fn clone_joins_multi_valued_set_headers() {
        let req = Request::get("/x");
        let updated = req
            .clone_with(RequestUpdate {
                set_headers: Some(vec![(
                    "Accept".into(),
                    vec!["text/html".into(), "application/json".into()],
                )]),
                ..Default::default()
            });
        assert_eq!(updated.headers().get("accept"), Some("text/html,application/json"));
    }

    #[test]
    fn params_are_appended() {
        let params = UrlParams::parse("a=1");
        assert_eq!(append_params("/x", &params), "/x?a=1");
        assert_eq!(append_params("/x?b=2", &params), "/x?b=2&a=1");
        assert_eq!(append_params("/x?", &params), "/x?a=1");
        assert_eq!(append_params("/x", &UrlParams::new()), "/x");
    }
}
