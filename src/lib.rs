//! Typed Rust bindings for the [Umami](https://umami.is) analytics tracker script.
//!
//! An [`AnalyticsProvider`](analytics::AnalyticsProvider) injects the tracker script and, once
//! it has loaded, hands out a [`TrackDispatcher`](analytics::TrackDispatcher) that validates
//! page views and events before forwarding them to `window.umami`.
//!
//! ```no_run
//! # #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
//! # fn main() -> Result<(), umami_rs_sdk::analytics::error::AnalyticsError> {
//! use umami_rs_sdk::analytics::{AnalyticsOptions, AnalyticsProvider};
//!
//! let options = AnalyticsOptions::new("94db1cb1-74f4-4a40-ad6c-962362670409", "https://cloud.umami.is/script.js")
//!     .with_auto_track(false);
//! let provider = AnalyticsProvider::for_browser(options, ["signup", "purchase"])?;
//! provider.mount();
//!
//! if let Some(track) = provider.use_tracker() {
//!     let _ack = track.event("signup", None)?;
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
//! # fn main() {}
//! ```

pub mod analytics;
pub mod logger;
pub mod platform;

#[cfg(test)]
pub mod test_support;
