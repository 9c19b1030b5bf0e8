//! `tether <METHOD> <URL>`: one request over the reqwest transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use tracing::info;

use tether_http::{
    Body, ClientConfig, ErrorCause, Event, Headers, HttpClient, Observe, Observed,
    ReqwestXhrFactory, RequestOptions, ResponseBase, ResponseBody, ResponseType,
};

pub struct RequestArgs {
    pub method: String,
    pub url: String,
    pub headers: Vec<String>,
    pub data: Option<String>,
    pub json: bool,
    pub observe: Observe,
    pub response_type: ResponseType,
    pub progress: bool,
    pub with_credentials: bool,
    pub config: Option<PathBuf>,
}

pub async fn run(args: RequestArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let client = HttpClient::builder()
        .xhr(Arc::new(ReqwestXhrFactory::new()))
        .config(config)
        .build()?;

    let options = options(&args)?;
    info!(method = %args.method, url = %args.url, "sending request");
    let mut items = client
        .request(&args.method, &args.url, options)
        .observe(args.observe);

    while let Some(item) = items.next().await {
        match item {
            Ok(observed) => println!("{}", render_observed(&observed)),
            Err(e) => {
                if let Some(res) = e.response()
                    && let Some(ErrorCause::Body(body)) = res.error()
                {
                    println!("{}", render_body(Some(body)));
                }
                return Err(e.into());
            }
        }
    }
    Ok(())
}

fn options(args: &RequestArgs) -> Result<RequestOptions> {
    let mut headers = Headers::new();
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        headers.append(name, value)?;
    }

    let mut options = RequestOptions::new()
        .headers(headers)
        .response_type(args.response_type)
        .report_progress(args.progress)
        .with_credentials(args.with_credentials);
    if let Some(data) = &args.data {
        let body = if args.json {
            Body::Json(serde_json::from_str(data).context("--data is not valid JSON")?)
        } else {
            Body::Text(data.clone())
        };
        options = options.body(body);
    }
    Ok(options)
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => bail!("invalid header {raw:?}, expected NAME:VALUE"),
    }
}

fn render_observed(observed: &Observed) -> String {
    match observed {
        Observed::Body(body) => render_body(body.as_ref()),
        Observed::Response(res) => format!(
            "{} {}\n{}",
            res.status(),
            res.status_text(),
            render_body(res.body())
        ),
        Observed::Event(event) => render_event(event),
    }
}

fn render_event(event: &Event) -> String {
    match event {
        Event::Sent => "sent".to_string(),
        Event::UploadProgress(p) => format!("upload {}/{}", p.loaded, total(p.total)),
        Event::ResponseHeader(head) => format!("headers {} {}", head.status(), head.status_text()),
        Event::DownloadProgress(p) => format!("download {}/{}", p.loaded, total(p.total)),
        Event::Response(res) => format!(
            "response {} {} {}",
            res.status(),
            res.status_text(),
            render_body(res.body())
        ),
        Event::User(value) => format!("user {value}"),
    }
}

fn total(total: Option<u64>) -> String {
    total.map_or_else(|| "?".to_string(), |t| t.to_string())
}

fn render_body(body: Option<&ResponseBody>) -> String {
    match body {
        None => "null".to_string(),
        Some(ResponseBody::Json(value)) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        Some(ResponseBody::Text(text)) => text.clone(),
        Some(ResponseBody::ArrayBuffer(data)) => String::from_utf8_lossy(data).into_owned(),
        Some(ResponseBody::Blob(blob)) => String::from_utf8_lossy(&blob.data).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_http::{Progress, Response, ResponseInit};

    fn args() -> RequestArgs {
        RequestArgs {
            method: "POST".into(),
            url: "http://localhost/items".into(),
            headers: vec!["X-Trace: 1".into(), "Accept:text/plain".into()],
            data: Some(r#"{"a":1}"#.into()),
            json: true,
            observe: Observe::Body,
            response_type: ResponseType::Text,
            progress: false,
            with_credentials: false,
            config: None,
        }
    }

    #[test]
    fn parses_headers() {
        assert_eq!(parse_header("X-A: b:c").unwrap(), ("X-A", "b:c"));
        assert!(parse_header("novalue").is_err());
        assert!(parse_header(": empty").is_err());
    }

    #[test]
    fn builds_options_from_args() {
        let options = options(&args()).unwrap();
        let headers = options.headers.unwrap();
        assert_eq!(headers.get("x-trace"), Some("1"));
        assert_eq!(headers.get("accept"), Some("text/plain"));
        assert_eq!(options.body, Some(Body::Json(json!({ "a": 1 }))));
        assert_eq!(options.response_type, ResponseType::Text);
    }

    #[test]
    fn rejects_invalid_json_data() {
        let mut args = args();
        args.data = Some("{".into());
        assert!(options(&args).is_err());

        args.json = false;
        let options = options(&args).unwrap();
        assert_eq!(options.body, Some(Body::Text("{".into())));
    }

    #[test]
    fn renders_events() {
        assert_eq!(render_event(&Event::Sent), "sent");
        assert_eq!(
            render_event(&Event::UploadProgress(Progress {
                loaded: 3,
                total: None
            })),
            "upload 3/?"
        );
        let res = Response::new(
            ResponseInit::new().with_status(201),
            Some(ResponseBody::Text("made".into())),
        );
        assert_eq!(render_event(&Event::Response(res)), "response 201 OK made");
    }

    #[test]
    fn renders_bodies() {
        assert_eq!(render_body(None), "null");
        assert_eq!(
            render_body(Some(&ResponseBody::Json(json!({ "a": 1 })))),
            "{\n  \"a\": 1\n}"
        );
        assert_eq!(
            render_body(Some(&ResponseBody::ArrayBuffer(b"raw"[..].to_vec().into()))),
            "raw"
        );
    }
}
