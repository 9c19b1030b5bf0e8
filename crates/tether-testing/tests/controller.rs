use futures_util::StreamExt;
use serde_json::json;

use tether_http::{
    Event, EventType, Headers, HttpError, Progress, RequestOptions, ResponseBase, ResponseBody,
    ResponseType, TransportError,
};
use tether_testing::{
    ErrorOptions, FlushBody, FlushOptions, RequestMatch, TestingError, VerifyOptions,
    testing_client,
};

#[tokio::test]
async fn flush_delivers_body_and_completes() {
    let (client, backend) = testing_client();
    let mut sub = client.get("/api/items", RequestOptions::new()).events();
    assert!(matches!(sub.next().await, Some(Ok(Event::Sent))));

    let req = backend.expect_one("/api/items").unwrap();
    assert_eq!(req.request().method(), "GET");
    req.flush(json!([1, 2, 3]), FlushOptions::new()).unwrap();

    let Some(Ok(Event::Response(res))) = sub.next().await else {
        panic!("expected a response");
    };
    assert_eq!(res.status(), 200);
    assert_eq!(res.status_text(), "OK");
    assert_eq!(res.url(), Some("/api/items"));
    assert_eq!(res.body(), Some(&ResponseBody::Json(json!([1, 2, 3]))));
    assert!(sub.next().await.is_none());

    backend.verify(VerifyOptions::default()).unwrap();
}

#[tokio::test]
async fn null_text_body_defaults_to_no_content() {
    let (client, backend) = testing_client();
    let options = RequestOptions::new().response_type(ResponseType::Text);
    let mut sub = client.delete("/items/1", options).responses();
    let pending = tokio::spawn(async move { sub.next().await });
    while backend.open_count() == 0 {
        tokio::task::yield_now().await;
    }

    backend
        .expect_one(RequestMatch::method("delete", "/items/1"))
        .unwrap()
        .flush(FlushBody::Null, FlushOptions::new())
        .unwrap();

    let res = pending.await.unwrap().unwrap().unwrap();
    assert_eq!(res.status(), 204);
    assert_eq!(res.status_text(), "No Content");
    assert_eq!(res.body(), None);
}

#[tokio::test]
async fn error_status_flush_fails_the_stream() {
    let (client, backend) = testing_client();
    let mut sub = client.get("/missing", RequestOptions::new()).events();
    sub.next().await;

    let headers: Headers = [("X-Reason", "gone")].into_iter().collect();
    backend
        .expect_one("/missing")
        .unwrap()
        .flush(
            json!({ "error": "not found" }),
            FlushOptions::new().status(404, "Not Found").headers(headers),
        )
        .unwrap();

    let Some(Err(HttpError::Response(err))) = sub.next().await else {
        panic!("expected an error response");
    };
    assert_eq!(err.status(), 404);
    assert_eq!(err.message(), "Http failure response for /missing: 404 Not Found");
    assert_eq!(err.headers().get("x-reason"), Some("gone"));
    assert!(sub.next().await.is_none());
}

#[tokio::test]
async fn custom_status_needs_status_text() {
    let (client, backend) = testing_client();
    let mut sub = client.get("/x", RequestOptions::new()).events();
    sub.next().await;

    let req = backend.expect_one("/x").unwrap();
    assert_eq!(
        req.flush(json!({}), FlushOptions::new().status_code(202)),
        Err(TestingError::MissingStatusText)
    );
}

#[tokio::test]
async fn error_reports_transport_failures() {
    let (client, backend) = testing_client();
    let mut sub = client.get("/flaky", RequestOptions::new()).events();
    sub.next().await;

    let req = backend.expect_one("/flaky").unwrap();
    assert_eq!(
        req.error(TransportError::Aborted, ErrorOptions::new().status(201, "Created")),
        Err(TestingError::SuccessfulStatus)
    );
    req.error(
        TransportError::Network("connection reset".into()),
        ErrorOptions::new(),
    )
    .unwrap();

    let Some(Err(HttpError::Response(err))) = sub.next().await else {
        panic!("expected an error response");
    };
    assert_eq!(err.status(), 0);
    assert_eq!(err.status_text(), "Unknown Error");
    assert_eq!(err.message(), "Http failure response for /flaky: 0 Unknown Error");
}

#[tokio::test]
async fn events_pass_through_without_completing() {
    let (client, backend) = testing_client();
    let mut sub = client
        .post("/upload", tether_http::Body::from("data"), RequestOptions::new())
        .events();
    sub.next().await;

    let req = backend.expect_one(RequestMatch::method("POST", "/upload")).unwrap();
    req.event(Event::UploadProgress(Progress {
        loaded: 2,
        total: Some(4),
    }))
    .unwrap();
    let next = sub.next().await.unwrap().unwrap();
    assert_eq!(next.kind(), EventType::UploadProgress);
    assert!(!req.is_cancelled());
}

#[tokio::test]
async fn cancelled_requests_reject_answers() {
    let (client, backend) = testing_client();
    let mut sub = client.get("/gone", RequestOptions::new()).events();
    sub.next().await;
    drop(sub);

    assert!(matches!(
        backend.verify(VerifyOptions::default()),
        Err(TestingError::OpenRequests { count: 1, .. })
    ));
    backend
        .verify(VerifyOptions {
            ignore_cancelled: true,
        })
        .unwrap();

    let req = backend.expect_one("/gone").unwrap();
    assert!(req.is_cancelled());
    assert_eq!(
        req.flush(json!(null), FlushOptions::new()),
        Err(TestingError::FlushCancelled)
    );
    assert_eq!(
        req.error(TransportError::Aborted, ErrorOptions::new()),
        Err(TestingError::ErrorCancelled)
    );
    assert_eq!(req.event(Event::Sent), Err(TestingError::EventCancelled));
}

#[tokio::test]
async fn matching_removes_requests_from_the_open_list() {
    let (client, backend) = testing_client();
    let mut subs = Vec::new();
    for url in ["/a?page=1", "/a?page=2", "/b"] {
        let mut sub = client.get(url, RequestOptions::new()).events();
        sub.next().await;
        subs.push(sub);
    }

    assert_eq!(
        backend
            .expect_one(RequestMatch::predicate(|req| req.url().starts_with("/a")))
            .unwrap_err(),
        TestingError::ExpectedOneFoundMany(2)
    );
    assert_eq!(backend.expect_one("/a?page=1").unwrap_err(), TestingError::ExpectedOneFoundNone);
    assert_eq!(
        backend.expect_none("/b").unwrap_err(),
        TestingError::ExpectedNone(1)
    );
    backend.verify(VerifyOptions::default()).unwrap();
}

#[tokio::test]
async fn verify_lists_open_urls_without_query() {
    let (client, backend) = testing_client();
    let options = RequestOptions::new().param("q", "rust");
    let mut sub = client.get("/search", options).events();
    sub.next().await;

    let err = backend.verify(VerifyOptions::default()).unwrap_err();
    assert_eq!(err.to_string(), "expected no open requests, found 1: /search");

    let by_method = RequestMatch::Method {
        method: Some("GET".into()),
        url: None,
    };
    assert_eq!(backend.match_requests(by_method).len(), 1);
    backend.verify(VerifyOptions::default()).unwrap();
}

#[tokio::test]
async fn arraybuffer_requests_only_accept_bytes() {
    let (client, backend) = testing_client();
    let options = RequestOptions::new().response_type(ResponseType::ArrayBuffer);
    let mut sub = client.get("/bin", options).events();
    sub.next().await;

    let req = backend.expect_one("/bin").unwrap();
    assert!(matches!(
        req.flush("text", FlushOptions::new()),
        Err(TestingError::Conversion {
            target: "ArrayBuffer",
            ..
        })
    ));
    req.flush(bytes::Bytes::from_static(b"\x00\x01"), FlushOptions::new())
        .unwrap();
    let Some(Ok(Event::Response(res))) = sub.next().await else {
        panic!("expected a response");
    };
    assert_eq!(
        res.body(),
        Some(&ResponseBody::ArrayBuffer(bytes::Bytes::from_static(b"\x00\x01")))
    );
}
