//! The overloaded `track` entry point.
//!
//! A [`TrackDispatcher`] accepts four call shapes, modelled by [`TrackCall`]:
//!
//! * [`TrackCall::PageView`] sends the page snapshot collected by the tracker;
//! * [`TrackCall::Event`] sends a named event, which must be part of the dispatcher's catalog;
//! * [`TrackCall::Custom`] sends a caller-built payload verbatim;
//! * [`TrackCall::Callback`] lets the caller rewrite the snapshot itself.
//!
//! Page views and named events get URL rewriting; the two low-level shapes never do.
//!
//! Malformed custom payloads are programmer errors and fail synchronously with `Err`. An
//! unknown event name is treated as a recoverable condition: `track` returns `Ok` with a
//! [`TrackHandle`] that resolves to an `unsupported-event` error, without contacting the
//! tracker.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::analytics::constants::LOGGER;
use crate::analytics::error::{
    invalid_argument, invalid_website, missing_website, unsupported_event,
    unsupported_parameters, AnalyticsError, AnalyticsResult,
};
use crate::analytics::tracker::{AmbientPayload, TrackCallback, TrackFuture, Tracker, TrackerInput};

/// Maps the URL reported for page views and named events.
pub type UrlRewriter = Arc<dyn Fn(&str) -> String + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct TrackingOptions {
    /// Path to report instead of the tracker's own url, set when auto tracking is off.
    pub pathname: Option<String>,
    pub url_rewriter: Option<UrlRewriter>,
}

impl fmt::Debug for TrackingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingOptions")
            .field("pathname", &self.pathname)
            .field("url_rewriter", &self.url_rewriter.is_some())
            .finish()
    }
}

/// A typed event: the name it is sent under and the data it carries.
///
/// ```
/// use serde::Serialize;
/// use umami_rs_sdk::analytics::TrackEvent;
///
/// #[derive(Serialize)]
/// struct Signup {
///     plan: &'static str,
/// }
///
/// impl TrackEvent for Signup {
///     const NAME: &'static str = "signup";
/// }
/// ```
pub trait TrackEvent: Serialize {
    const NAME: &'static str;
}

/// Arguments of one `track` call.
#[derive(Clone)]
pub enum TrackCall {
    PageView,
    Event { name: String, data: Option<Value> },
    Custom(Value),
    Callback(TrackCallback),
}

impl TrackCall {
    pub fn event(name: impl Into<String>, data: Option<Value>) -> Self {
        TrackCall::Event {
            name: name.into(),
            data,
        }
    }

    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(AmbientPayload) -> Value + Send + Sync + 'static,
    {
        TrackCall::Callback(Arc::new(callback))
    }

    /// Classifies untyped arguments: `null` is a page view, a string an event name, and
    /// anything else a custom payload.
    pub fn from_json(first: Value, data: Option<Value>) -> Self {
        match first {
            Value::Null => TrackCall::PageView,
            Value::String(name) => TrackCall::Event { name, data },
            other => TrackCall::Custom(other),
        }
    }

    fn into_kind(self) -> CallKind {
        match self {
            TrackCall::PageView => CallKind::PageView,
            TrackCall::Event { name, data } => CallKind::EventName { name, data },
            TrackCall::Custom(Value::Object(payload)) => CallKind::CustomPayload(payload),
            TrackCall::Custom(_) => CallKind::Invalid,
            TrackCall::Callback(callback) => CallKind::Callback(callback),
        }
    }
}

impl fmt::Debug for TrackCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackCall::PageView => f.write_str("PageView"),
            TrackCall::Event { name, data } => f
                .debug_struct("Event")
                .field("name", name)
                .field("data", data)
                .finish(),
            TrackCall::Custom(payload) => f.debug_tuple("Custom").field(payload).finish(),
            TrackCall::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

enum CallKind {
    PageView,
    EventName { name: String, data: Option<Value> },
    CustomPayload(Map<String, Value>),
    Callback(TrackCallback),
    Invalid,
}

/// Pending acknowledgment of a forwarded call.
#[must_use = "a TrackHandle reports whether the tracker accepted the call"]
pub struct TrackHandle {
    future: TrackFuture,
}

impl TrackHandle {
    fn forwarded(future: TrackFuture) -> Self {
        Self { future }
    }

    fn rejected(error: AnalyticsError) -> Self {
        Self {
            future: Box::pin(futures::future::ready(Err(error))),
        }
    }
}

impl Future for TrackHandle {
    type Output = AnalyticsResult<String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrackHandle(..)")
    }
}

/// Validates `track` calls against a fixed event catalog and forwards them to a [`Tracker`].
#[derive(Clone)]
pub struct TrackDispatcher {
    event_names: Arc<[String]>,
    options: TrackingOptions,
    tracker: Arc<dyn Tracker>,
}

impl TrackDispatcher {
    pub fn new<I, S>(event_names: I, options: TrackingOptions, tracker: Arc<dyn Tracker>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            event_names: event_names.into_iter().map(Into::into).collect(),
            options,
            tracker,
        }
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn supports(&self, event_name: &str) -> bool {
        self.event_names.iter().any(|name| name == event_name)
    }

    pub fn options(&self) -> &TrackingOptions {
        &self.options
    }

    pub fn track(&self, call: TrackCall) -> AnalyticsResult<TrackHandle> {
        match call.into_kind() {
            CallKind::PageView => Ok(self.forward(self.shaped(None, None))),
            CallKind::EventName { name, data } => {
                if !self.supports(&name) {
                    LOGGER.warn(format!("Dropping unsupported event \"{name}\""));
                    return Ok(TrackHandle::rejected(unsupported_event(&name)));
                }
                let data = data.filter(is_truthy);
                Ok(self.forward(self.shaped(Some(name), data)))
            }
            CallKind::CustomPayload(payload) => {
                let website = payload.get("website").ok_or_else(missing_website)?;
                if !website.is_string() {
                    return Err(invalid_website());
                }
                Ok(self.forward(TrackerInput::Payload(Value::Object(payload))))
            }
            CallKind::Callback(callback) => Ok(self.forward(TrackerInput::Callback(callback))),
            CallKind::Invalid => Err(unsupported_parameters()),
        }
    }

    pub fn page_view(&self) -> AnalyticsResult<TrackHandle> {
        self.track(TrackCall::PageView)
    }

    pub fn event(&self, name: &str, data: Option<Value>) -> AnalyticsResult<TrackHandle> {
        self.track(TrackCall::event(name, data))
    }

    /// Serializes `event` and sends it under [`TrackEvent::NAME`].
    pub fn track_event<E>(&self, event: &E) -> AnalyticsResult<TrackHandle>
    where
        E: TrackEvent,
    {
        let data = serde_json::to_value(event).map_err(|err| {
            invalid_argument(format!("Failed to serialize data for {}: {err}", E::NAME))
        })?;
        self.track(TrackCall::event(E::NAME, Some(data)))
    }

    fn forward(&self, input: TrackerInput) -> TrackHandle {
        TrackHandle::forwarded(self.tracker.track(input))
    }

    fn shaped(&self, name: Option<String>, data: Option<Value>) -> TrackerInput {
        let pathname = self.options.pathname.clone();
        let rewriter = self.options.url_rewriter.clone();
        TrackerInput::Callback(Arc::new(move |ambient: AmbientPayload| {
            let url = resolve_url(&ambient.url, pathname.as_deref(), rewriter.as_ref());
            let mut payload = ambient.into_map();
            if let Some(data) = &data {
                payload.insert("data".into(), data.clone());
            }
            if let Some(name) = &name {
                payload.insert("name".into(), Value::String(name.clone()));
            }
            payload.insert("url".into(), Value::String(url));
            Value::Object(payload)
        }))
    }
}

impl fmt::Debug for TrackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackDispatcher")
            .field("event_names", &self.event_names)
            .field("options", &self.options)
            .finish()
    }
}

fn resolve_url(ambient_url: &str, pathname: Option<&str>, rewriter: Option<&UrlRewriter>) -> String {
    match (rewriter, pathname) {
        (Some(rewrite), pathname) => rewrite(pathname.unwrap_or(ambient_url)),
        (None, Some(pathname)) => pathname.to_string(),
        (None, None) => ambient_url.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
