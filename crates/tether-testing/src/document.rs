//! Scriptable stand-in for the document that hosts JSONP scripts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use tether_http::jsonp::{ScriptEventKind, ScriptListener, ScriptListenerId, ScriptSignal};
use tether_http::{Document, JsonpContext, ScriptElement};

/// Records every script it creates and which are attached.
#[derive(Default)]
pub struct MockDocument {
    scripts: Mutex<Vec<Arc<MockScript>>>,
}

impl MockDocument {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripts(&self) -> Vec<Arc<MockScript>> {
        self.scripts.lock().expect("scripts lock").clone()
    }

    pub fn last_script(&self) -> Option<Arc<MockScript>> {
        self.scripts.lock().expect("scripts lock").last().cloned()
    }

    pub fn attached_count(&self) -> usize {
        self.scripts
            .lock()
            .expect("scripts lock")
            .iter()
            .filter(|script| script.is_attached())
            .count()
    }
}

impl Document for MockDocument {
    fn create_script(&self) -> Arc<dyn ScriptElement> {
        let script = Arc::new(MockScript::default());
        self.scripts.lock().expect("scripts lock").push(script.clone());
        script
    }

    fn append_to_body(&self, script: &Arc<dyn ScriptElement>) {
        // Scripts only come from `create_script`, so match by address.
        let target = Arc::as_ptr(script) as *const ();
        if let Some(found) = self
            .scripts
            .lock()
            .expect("scripts lock")
            .iter()
            .find(|s| Arc::as_ptr(*s) as *const () == target)
        {
            found.state.lock().expect("script lock").attached = true;
        }
    }
}

#[derive(Default)]
struct ScriptState {
    src: String,
    attached: bool,
    removed: bool,
}

/// A script element whose "loading" is driven by the test.
#[derive(Default)]
pub struct MockScript {
    state: Mutex<ScriptState>,
    listeners: Mutex<Vec<(ScriptEventKind, ScriptListenerId, ScriptListener)>>,
    next_id: AtomicU64,
}

impl MockScript {
    pub fn src(&self) -> String {
        self.state.lock().expect("script lock").src.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().expect("script lock").attached
    }

    /// Whether the script was ever detached.
    pub fn is_removed(&self) -> bool {
        self.state.lock().expect("script lock").removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listeners lock").len()
    }

    /// The query value in `src` naming a callback registered in `context`.
    pub fn callback_name(&self, context: &JsonpContext) -> Option<String> {
        let src = self.src();
        let (_, query) = src.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('=').map(|(_, v)| v.to_string()))
            .find(|name| context.contains(name))
    }

    /// Run the script: invoke its callback with `payload`, then fire load.
    /// Returns whether a registered callback was found.
    pub fn execute(&self, context: &JsonpContext, payload: Value) -> bool {
        let invoked = self
            .callback_name(context)
            .is_some_and(|name| context.invoke(&name, payload));
        self.fire_load();
        invoked
    }

    pub fn fire_load(&self) {
        self.fire(ScriptEventKind::Load, ScriptSignal::Load);
    }

    pub fn fire_error(&self, message: &str) {
        self.fire(ScriptEventKind::Error, ScriptSignal::Error(message.to_string()));
    }

    fn fire(&self, kind: ScriptEventKind, signal: ScriptSignal) {
        let listeners: Vec<ScriptListener> = self
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

impl ScriptElement for MockScript {
    fn set_src(&self, url: &str) {
        self.state.lock().expect("script lock").src = url.to_string();
    }

    fn add_listener(&self, kind: ScriptEventKind, listener: ScriptListener) -> ScriptListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("listeners lock")
            .push((kind, id, listener));
        id
    }

    fn remove_listener(&self, _kind: ScriptEventKind, id: ScriptListenerId) {
        self.listeners
            .lock()
            .expect("listeners lock")
            .retain(|(_, existing, _)| *existing != id);
    }

    fn remove(&self) {
        let mut state = self.state.lock().expect("script lock");
        if state.attached {
            state.attached = false;
            state.removed = true;
        }
    }
}
