//! Scriptable stand-in for the XHR-like transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tether_http::body::SerializedBody;
use tether_http::xhr::{ListenerId, ProgressSignal, XhrEventKind, XhrListener, XhrSignal};
use tether_http::{Headers, ResponseBody, ResponseType, TransportError, Xhr, XhrFactory};

/// Hands out [`MockXhr`]s and keeps every one it built.
#[derive(Default)]
pub struct MockXhrFactory {
    built: Mutex<Vec<Arc<MockXhr>>>,
    no_upload: AtomicBool,
}

impl MockXhrFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn built(&self) -> Vec<Arc<MockXhr>> {
        self.built.lock().expect("built lock").clone()
    }

    /// Whether transports built from now on expose upload progress.
    pub fn set_has_upload(&self, has_upload: bool) {
        self.no_upload.store(!has_upload, Ordering::SeqCst);
    }

    /// The most recently built transport.
    pub fn last(&self) -> Option<Arc<MockXhr>> {
        self.built.lock().expect("built lock").last().cloned()
    }
}

impl XhrFactory for MockXhrFactory {
    fn build(&self) -> Arc<dyn Xhr> {
        let xhr = Arc::new(MockXhr::default());
        xhr.state().no_upload = self.no_upload.load(Ordering::SeqCst);
        self.built.lock().expect("built lock").push(xhr.clone());
        xhr
    }
}

#[derive(Default)]
struct MockState {
    method: String,
    url: String,
    with_credentials: bool,
    request_headers: Vec<(String, String)>,
    response_type: ResponseType,
    body: Option<SerializedBody>,
    sent: bool,
    aborted: bool,

    status: u16,
    status_text: String,
    response_url: Option<String>,
    response_headers: String,
    response: Option<ResponseBody>,
    response_text: Option<String>,
    no_upload: bool,
}

/// Records what the backend wrote and lets a test drive the response.
#[derive(Default)]
pub struct MockXhr {
    state: Mutex<MockState>,
    listeners: Mutex<Vec<(XhrEventKind, ListenerId, XhrListener)>>,
    next_id: AtomicU64,
}

impl MockXhr {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock xhr lock")
    }

    // ── What the backend wrote ──

    pub fn method(&self) -> String {
        self.state().method.clone()
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn with_credentials(&self) -> bool {
        self.state().with_credentials
    }

    pub fn request_headers(&self) -> Vec<(String, String)> {
        self.state().request_headers.clone()
    }

    /// The first value written for `name`, matched case-insensitively.
    pub fn request_header(&self, name: &str) -> Option<String> {
        self.state()
            .request_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn requested_type(&self) -> ResponseType {
        self.state().response_type
    }

    pub fn body(&self) -> Option<SerializedBody> {
        self.state().body.clone()
    }

    pub fn is_sent(&self) -> bool {
        self.state().sent
    }

    pub fn is_aborted(&self) -> bool {
        self.state().aborted
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listeners lock").len()
    }

    // ── What the test scripts ──

    pub fn set_status(&self, status: u16, status_text: &str) {
        let mut state = self.state();
        state.status = status;
        state.status_text = status_text.to_string();
    }

    /// Raw `Name: value` lines.
    pub fn set_response_headers(&self, raw: &str) {
        self.state().response_headers = raw.to_string();
    }

    pub fn set_response_url(&self, url: Option<&str>) {
        self.state().response_url = url.map(str::to_string);
    }

    /// A decoded body, as for `arraybuffer` and `blob` requests.
    pub fn set_response(&self, body: Option<ResponseBody>) {
        self.state().response = body;
    }

    pub fn set_response_text(&self, text: Option<&str>) {
        self.state().response_text = text.map(str::to_string);
    }

    /// Complete with `status` and a text body.
    pub fn respond(&self, status: u16, status_text: &str, text: &str) {
        self.set_status(status, status_text);
        self.set_response_text(Some(text));
        self.fire_load();
    }

    pub fn fire_load(&self) {
        self.fire(XhrEventKind::Load, XhrSignal::Load);
    }

    pub fn fire_error(&self, error: TransportError) {
        self.fire(XhrEventKind::Error, XhrSignal::Error(error));
    }

    pub fn fire_download_progress(&self, loaded: u64, total: Option<u64>) {
        self.fire(
            XhrEventKind::DownloadProgress,
            XhrSignal::Progress(ProgressSignal { loaded, total }),
        );
    }

    pub fn fire_upload_progress(&self, loaded: u64, total: Option<u64>) {
        self.fire(
            XhrEventKind::UploadProgress,
            XhrSignal::Progress(ProgressSignal { loaded, total }),
        );
    }

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
}

impl Xhr for MockXhr {
    fn open(&self, method: &str, url: &str) {
        let mut state = self.state();
        state.method = method.to_string();
        state.url = url.to_string();
    }

    fn set_with_credentials(&self, with_credentials: bool) {
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
        let mut state = self.state();
        state.body = body;
        state.sent = true;
    }

    fn abort(&self) {
        self.state().aborted = true;
    }

    fn status(&self) -> u16 {
        self.state().status
    }

    fn status_text(&self) -> String {
        self.state().status_text.clone()
    }

    fn response(&self) -> Option<ResponseBody> {
        self.state().response.clone()
    }

    fn response_text(&self) -> Option<String> {
        self.state().response_text.clone()
    }

    fn response_url(&self) -> Option<String> {
        self.state().response_url.clone()
    }

    fn all_response_headers(&self) -> String {
        self.state().response_headers.clone()
    }

    fn response_header(&self, name: &str) -> Option<String> {
        Headers::from_response_text(self.all_response_headers())
            .get(name)
            .map(str::to_string)
    }

    fn add_listener(&self, kind: XhrEventKind, listener: XhrListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("listeners lock")
            .push((kind, id, listener));
        id
    }

    fn remove_listener(&self, _kind: XhrEventKind, id: ListenerId) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .retain(|(_, existing, _)| *existing != id);
    }

    fn has_upload(&self) -> bool {
        !self.state().no_upload
    }
}
