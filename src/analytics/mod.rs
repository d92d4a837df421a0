mod api;
mod config;
mod constants;
pub mod error;
mod location;
mod script;
mod track;
mod tracker;

pub use api::{AnalyticsConsumer, AnalyticsContext, AnalyticsProvider};
pub use config::AnalyticsOptions;
pub use constants::{ATTR_AUTO_TRACK, ATTR_DOMAINS, ATTR_WEBSITE_ID, UMAMI_GLOBAL};
pub use location::LocationProvider;
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use location::WindowLocation;
pub use script::{ScriptLoader, ScriptRequest};
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use script::DomScriptLoader;
pub use track::{TrackCall, TrackDispatcher, TrackEvent, TrackHandle, TrackingOptions, UrlRewriter};
pub use tracker::{AmbientPayload, TrackCallback, TrackFuture, Tracker, TrackerInput};
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use tracker::GlobalUmamiTracker;
