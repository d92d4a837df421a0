use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::analytics::error::{script_load_error, tracker_error, AnalyticsResult};
use crate::analytics::{
    AmbientPayload, LocationProvider, ScriptLoader, ScriptRequest, TrackFuture, Tracker,
    TrackerInput,
};

/// The page snapshot every fake tracker hands to callbacks.
pub fn sample_ambient() -> AmbientPayload {
    AmbientPayload {
        hostname: "example.com".into(),
        language: "en-US".into(),
        referrer: "".into(),
        screen: "1920x1080".into(),
        title: "Home".into(),
        url: "/stale".into(),
        website: "site-123".into(),
        extra: Map::new(),
    }
}

/// Records every input and acknowledges it with `event-<n>`.
#[derive(Clone, Default)]
pub struct RecordingTracker {
    calls: Arc<Mutex<Vec<TrackerInput>>>,
}

impl RecordingTracker {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Payloads as they would leave the page, with callbacks applied to [`sample_ambient`].
    pub fn sent(&self) -> Vec<Value> {
        self.sent_with(sample_ambient())
    }

    /// Payloads as they would leave a page reporting `ambient`.
    pub fn sent_with(&self, ambient: AmbientPayload) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|input| input.resolve(ambient.clone()))
            .collect()
    }
}

impl Tracker for RecordingTracker {
    fn track(&self, input: TrackerInput) -> TrackFuture {
        let mut calls = self.calls.lock().unwrap();
        calls.push(input);
        let id = format!("event-{}", calls.len());
        Box::pin(futures::future::ready(Ok(id)))
    }
}

#[derive(Clone, Copy, Default)]
pub struct FailingTracker;

impl Tracker for FailingTracker {
    fn track(&self, _input: TrackerInput) -> TrackFuture {
        Box::pin(futures::future::ready(Err(tracker_error("tracker offline"))))
    }
}

/// Loader whose completion is driven by the test through a channel.
pub struct ManualScriptLoader {
    requests: Arc<Mutex<Vec<ScriptRequest>>>,
    signal: async_channel::Receiver<AnalyticsResult<()>>,
}

impl ManualScriptLoader {
    pub fn requests(&self) -> Vec<ScriptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn manual_script_loader() -> (
    Arc<ManualScriptLoader>,
    async_channel::Sender<AnalyticsResult<()>>,
) {
    let (sender, receiver) = async_channel::unbounded();
    let loader = ManualScriptLoader {
        requests: Arc::new(Mutex::new(Vec::new())),
        signal: receiver,
    };
    (Arc::new(loader), sender)
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ScriptLoader for ManualScriptLoader {
    async fn load(&self, request: &ScriptRequest) -> AnalyticsResult<()> {
        self.requests.lock().unwrap().push(request.clone());
        self.signal
            .recv()
            .await
            .unwrap_or_else(|_| Err(script_load_error("load signal dropped")))
    }
}

/// Location provider whose path can be moved between assertions.
pub struct FixedLocation {
    path: Mutex<String>,
}

impl FixedLocation {
    pub fn new(path: &str) -> Arc<Self> {
        Arc::new(Self {
            path: Mutex::new(path.to_string()),
        })
    }

    pub fn set(&self, path: &str) {
        *self.path.lock().unwrap() = path.to_string();
    }
}

impl LocationProvider for FixedLocation {
    fn pathname(&self) -> String {
        self.path.lock().unwrap().clone()
    }
}
