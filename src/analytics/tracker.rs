//! Contract of the tracker object the Umami script installs on the page.
//!
//! The crate never talks to the network itself. Everything it produces ends up in a single
//! [`Tracker::track`] call, mirroring `umami.track(payloadOrCallback)` from the browser script.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analytics::error::AnalyticsResult;

/// Acknowledgment handed back by the tracker, resolving to the identifier it reports.
#[cfg(not(target_arch = "wasm32"))]
pub type TrackFuture = futures::future::BoxFuture<'static, AnalyticsResult<String>>;
#[cfg(target_arch = "wasm32")]
pub type TrackFuture = futures::future::LocalBoxFuture<'static, AnalyticsResult<String>>;

/// Rewrites the payload the tracker collected from the page before it is sent.
pub type TrackCallback = Arc<dyn Fn(AmbientPayload) -> Value + Send + Sync + 'static>;

/// Attributes the tracker collects from the page at call time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientPayload {
    pub hostname: String,
    pub language: String,
    pub referrer: String,
    pub screen: String,
    pub title: String,
    pub url: String,
    pub website: String,
    /// Any other field the tracker supplies (`tag`, `id`, ...), forwarded untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AmbientPayload {
    pub fn into_map(self) -> Map<String, Value> {
        let mut map = self.extra;
        map.insert("hostname".into(), Value::String(self.hostname));
        map.insert("language".into(), Value::String(self.language));
        map.insert("referrer".into(), Value::String(self.referrer));
        map.insert("screen".into(), Value::String(self.screen));
        map.insert("title".into(), Value::String(self.title));
        map.insert("url".into(), Value::String(self.url));
        map.insert("website".into(), Value::String(self.website));
        map
    }
}

/// The two argument forms accepted by the tracker.
#[derive(Clone)]
pub enum TrackerInput {
    /// Sent as-is; the caller owns the whole shape.
    Payload(Value),
    Callback(TrackCallback),
}

impl TrackerInput {
    /// Produces the payload that would be transmitted for the given page snapshot.
    pub fn resolve(&self, ambient: AmbientPayload) -> Value {
        match self {
            TrackerInput::Payload(value) => value.clone(),
            TrackerInput::Callback(callback) => callback(ambient),
        }
    }
}

impl fmt::Debug for TrackerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerInput::Payload(value) => f.debug_tuple("Payload").field(value).finish(),
            TrackerInput::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// The external tracker object.
///
/// `track` must start the transmission before returning; the returned future only reports
/// the tracker's acknowledgment and is never awaited by this crate.
pub trait Tracker: Send + Sync {
    fn track(&self, input: TrackerInput) -> TrackFuture;
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use browser::GlobalUmamiTracker;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
mod browser {
    use js_sys::{Function, Promise, Reflect, JSON};
    use serde_json::Value;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;

    use super::{AmbientPayload, TrackFuture, Tracker, TrackerInput};
    use crate::analytics::constants::UMAMI_GLOBAL;
    use crate::analytics::error::{tracker_error, AnalyticsResult};

    /// Forwards to the `window.umami` object installed by the tracker script.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct GlobalUmamiTracker;

    impl Tracker for GlobalUmamiTracker {
        fn track(&self, input: TrackerInput) -> TrackFuture {
            let started = call_track(input);
            Box::pin(async move {
                let promise = started?;
                let value = JsFuture::from(promise)
                    .await
                    .map_err(|err| tracker_error(js_error_message(err)))?;
                Ok(value.as_string().unwrap_or_default())
            })
        }
    }

    fn call_track(input: TrackerInput) -> AnalyticsResult<Promise> {
        let umami = Reflect::get(&js_sys::global(), &JsValue::from_str(UMAMI_GLOBAL))
            .map_err(|err| tracker_error(js_error_message(err)))?;
        if umami.is_null() || umami.is_undefined() {
            return Err(tracker_error("window.umami is not available"));
        }
        let track = Reflect::get(&umami, &JsValue::from_str("track"))
            .map_err(|err| tracker_error(js_error_message(err)))?
            .dyn_into::<Function>()
            .map_err(|_| tracker_error("umami.track is not a function"))?;

        let argument = match input {
            TrackerInput::Payload(value) => to_js(&value)?,
            TrackerInput::Callback(callback) => {
                Closure::once_into_js(move |props: JsValue| -> JsValue {
                    // An unreadable snapshot goes out as the tracker built it.
                    let Some(ambient) = from_js(&props) else {
                        return props;
                    };
                    match to_js(&callback(ambient)) {
                        Ok(shaped) => shaped,
                        Err(err) => {
                            log::debug!("failed to convert shaped payload: {err}");
                            props
                        }
                    }
                })
            }
        };

        let returned = track
            .call1(&umami, &argument)
            .map_err(|err| tracker_error(js_error_message(err)))?;
        Ok(match returned.dyn_into::<Promise>() {
            Ok(promise) => promise,
            Err(other) => Promise::resolve(&other),
        })
    }

    fn to_js(value: &Value) -> AnalyticsResult<JsValue> {
        let serialized = serde_json::to_string(value)
            .map_err(|err| tracker_error(format!("failed to serialize payload: {err}")))?;
        JSON::parse(&serialized).map_err(|err| tracker_error(js_error_message(err)))
    }

    fn from_js(value: &JsValue) -> Option<AmbientPayload> {
        let serialized = JSON::stringify(value).ok()?.as_string()?;
        match serde_json::from_str(&serialized) {
            Ok(ambient) => Some(ambient),
            Err(err) => {
                log::debug!("unexpected umami payload shape: {err}");
                None
            }
        }
    }

    fn js_error_message(value: JsValue) -> String {
        if let Some(error) = value.dyn_ref::<js_sys::Error>() {
            String::from(error.message())
        } else if let Some(text) = value.as_string() {
            text
        } else {
            format!("{value:?}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tracker_fields_survive_into_map() {
        let ambient: AmbientPayload = serde_json::from_value(json!({
            "hostname": "example.com",
            "language": "en-US",
            "referrer": "",
            "screen": "1920x1080",
            "title": "Home",
            "url": "/home",
            "website": "site-123",
            "tag": "campaign-a",
            "id": "user-42"
        }))
        .unwrap();
        assert_eq!(ambient.website, "site-123");
        assert_eq!(ambient.extra.len(), 2);

        let map = ambient.into_map();
        assert_eq!(map["tag"], "campaign-a");
        assert_eq!(map["id"], "user-42");
        assert_eq!(map["url"], "/home");
        assert_eq!(map.len(), 9);
    }
}
