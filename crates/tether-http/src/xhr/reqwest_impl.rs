use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{ListenerId, ProgressSignal, Xhr, XhrEventKind, XhrFactory, XhrListener, XhrSignal};
use crate::body::{Blob, ResponseBody, ResponseType, SerializedBody};
use crate::error::TransportError;

/// Builds [`ReqwestXhr`] transports sharing one `reqwest::Client`.
#[derive(Clone, Default)]
pub struct ReqwestXhrFactory {
    client: reqwest::Client,
}

impl ReqwestXhrFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl XhrFactory for ReqwestXhrFactory {
    fn build(&self) -> Arc<dyn Xhr> {
        Arc::new(ReqwestXhr::new(self.client.clone()))
    }
}

#[derive(Default)]
struct State {
    method: String,
    url: String,
    with_credentials: bool,
    request_headers: Vec<(String, String)>,
    response_type: ResponseType,
    status: u16,
    status_text: String,
    response_url: Option<String>,
    response_headers: Vec<(String, String)>,
    body: BytesMut,
    done: bool,
}

struct Inner {
    client: reqwest::Client,
    state: Mutex<State>,
    listeners: Mutex<Vec<(XhrEventKind, ListenerId, XhrListener)>>,
    next_id: AtomicU64,
}

impl Inner {
    /// Invoke listeners for `kind` without holding any lock.
    fn fire(&self, kind: XhrEventKind, signal: XhrSignal) {
        let listeners: Vec<XhrListener> = self
            .listeners
            .lock()
            .expect("listeners lock")
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&signal);
        }
    }

    async fn execute(self: Arc<Self>, body: Option<SerializedBody>) -> anyhow::Result<()> {
        let (method, url, headers, with_credentials) = {
            let state = self.state.lock().expect("state lock");
            (
                state.method.clone(),
                state.url.clone(),
                state.request_headers.clone(),
                state.with_credentials,
            )
        };
        debug!(%method, %url, with_credentials, "sending over reqwest");

        let method = reqwest::Method::from_bytes(method.as_bytes())?;
        let mut request = self.client.request(method, &url);
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        let upload_len = body.as_ref().map(|b| b.len() as u64);
        if let Some(body) = body {
            request = request.body(body.into_bytes());
        }

        let response = request.send().await?;
        // reqwest does not expose per-chunk upload progress. Once the
        // response has started the whole body is known to be written.
        if let Some(len) = upload_len.filter(|len| *len > 0) {
            self.fire(
                XhrEventKind::UploadProgress,
                XhrSignal::Progress(ProgressSignal {
                    loaded: len,
                    total: Some(len),
                }),
            );
        }

        let total = response.content_length();
        {
            let mut state = self.state.lock().expect("state lock");
            state.status = response.status().as_u16();
            state.status_text = response
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string();
            state.response_url = Some(response.url().to_string());
            state.response_headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
        }
        debug!(%url, status = response.status().as_u16(), "response headers received");

        let mut loaded = 0u64;
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            loaded += chunk.len() as u64;
            self.state
                .lock()
                .expect("state lock")
                .body
                .extend_from_slice(&chunk);
            trace!(loaded, "received chunk");
            self.fire(
                XhrEventKind::DownloadProgress,
                XhrSignal::Progress(ProgressSignal { loaded, total }),
            );
        }

        self.state.lock().expect("state lock").done = true;
        self.fire(XhrEventKind::Load, XhrSignal::Load);
        Ok(())
    }
}

/// An [`Xhr`] backed by a tokio task running a `reqwest` request.
///
/// `json` and `text` response types expose the body through
/// `response_text`, leaving XSSI stripping and JSON decoding to the backend.
///
/// Upload progress is coarse: a non-empty body produces one signal with
/// `loaded == total`, fired when the response starts.
pub struct ReqwestXhr {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReqwestXhr {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                state: Mutex::new(State::default()),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
            task: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("state lock")
    }
}

impl Xhr for ReqwestXhr {
    fn open(&self, method: &str, url: &str) {
        let mut state = self.state();
        state.method = method.to_string();
        state.url = url.to_string();
    }

    fn set_with_credentials(&self, with_credentials: bool) {
        // Cookie handling belongs to the reqwest client configuration.
        self.state().with_credentials = with_credentials;
    }

    fn set_request_header(&self, name: &str, value: &str) {
        self.state()
            .request_headers
            .push((name.to_string(), value.to_string()));
    }

    fn set_response_type(&self, response_type: ResponseType) {
        self.state().response_type = response_type;
    }

    fn send(&self, body: Option<SerializedBody>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.fire(
                    XhrEventKind::Error,
                    XhrSignal::Error(TransportError::Network(e.to_string())),
                );
                return;
            }
        };
        let inner = self.inner.clone();
        let task = handle.spawn(async move {
            if let Err(e) = inner.clone().execute(body).await {
                debug!(error = %e, "transport failed");
                inner.fire(
                    XhrEventKind::Error,
                    XhrSignal::Error(TransportError::Network(e.to_string())),
                );
            }
        });
        *self.task.lock().expect("task lock") = Some(task);
    }

    fn abort(&self) {
        if let Some(task) = self.task.lock().expect("task lock").take() {
            task.abort();
        }
    }

    fn status(&self) -> u16 {
        self.state().status
    }

    fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    fn response(&self) -> Option<ResponseBody> {
        let state = self.state();
        if !state.done {
            return None;
        }
        let data = Bytes::copy_from_slice(&state.body);
        match state.response_type {
            ResponseType::ArrayBuffer => Some(ResponseBody::ArrayBuffer(data)),
            ResponseType::Blob => {
                let content_type = state
                    .response_headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                    .map(|(_, value)| value.clone());
                Some(ResponseBody::Blob(Blob { data, content_type }))
            }
            ResponseType::Json | ResponseType::Text => None,
        }
    }

    fn response_text(&self) -> Option<String> {
        let state = self.state();
        match state.response_type {
            ResponseType::Json | ResponseType::Text => {
                Some(String::from_utf8_lossy(&state.body).into_owned())
            }
            _ => None,
        }
    }

    fn response_url(&self) -> Option<String> {
        self.state().response_url.clone()
    }

    fn all_response_headers(&self) -> String {
        self.state()
            .response_headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn response_header(&self, name: &str) -> Option<String> {
        let values: Vec<String> = self
            .state()
            .response_headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    fn add_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .expect("listeners lock")
            .push((kind, id, listener));
        id
    }

    fn remove_listener(&self, _kind: XhrEventKind, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .expect("listeners lock")
            .retain(|(_, existing, _)| *existing != id);
    }
}
