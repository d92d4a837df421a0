use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_lock::OnceCell;

use crate::analytics::config::AnalyticsOptions;
use crate::analytics::constants::LOGGER;
use crate::analytics::error::{context_misuse, AnalyticsError, AnalyticsResult};
use crate::analytics::location::LocationProvider;
use crate::analytics::script::{ScriptLoader, ScriptRequest};
use crate::analytics::track::{TrackDispatcher, TrackingOptions, UrlRewriter};
use crate::analytics::tracker::Tracker;
use crate::platform::runtime::spawn_detached;

/// Owns the tracker script lifecycle and hands out tracking capabilities once it has loaded.
///
/// Creating a provider validates the options but injects nothing; call
/// [`mount`](Self::mount) to request the script. Components that only need to track events
/// should receive an [`AnalyticsConsumer`] rather than the provider itself.
#[derive(Clone)]
pub struct AnalyticsProvider {
    inner: Arc<ProviderInner>,
}

impl fmt::Debug for AnalyticsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsProvider")
            .field("website_id", &self.inner.options.website_id())
            .field("loaded", &self.inner.is_loaded())
            .finish()
    }
}

struct ProviderInner {
    options: AnalyticsOptions,
    event_names: Vec<String>,
    loader: Arc<dyn ScriptLoader>,
    tracker: Arc<dyn Tracker>,
    location: Arc<dyn LocationProvider>,
    loaded: OnceCell<()>,
    mounted: AtomicBool,
    load_error: Mutex<Option<AnalyticsError>>,
    memo: Mutex<Option<MemoizedTracker>>,
}

struct MemoizedTracker {
    pathname: Option<String>,
    dispatcher: Arc<TrackDispatcher>,
}

/// Read-only snapshot of a provider's configuration and readiness.
#[derive(Clone)]
pub struct AnalyticsContext {
    pub auto_track: bool,
    pub loaded: bool,
    pub script_src: String,
    pub website_id: String,
    pub domains: Option<Vec<String>>,
    pub url_rewriter: Option<UrlRewriter>,
}

impl fmt::Debug for AnalyticsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsContext")
            .field("auto_track", &self.auto_track)
            .field("loaded", &self.loaded)
            .field("script_src", &self.script_src)
            .field("website_id", &self.website_id)
            .field("domains", &self.domains)
            .field("url_rewriter", &self.url_rewriter.is_some())
            .finish()
    }
}

impl AnalyticsProvider {
    /// Fails with `analytics/missing-configuration` when the script source or website id is
    /// empty.
    pub fn new<I, S>(
        options: AnalyticsOptions,
        event_names: I,
        loader: Arc<dyn ScriptLoader>,
        tracker: Arc<dyn Tracker>,
        location: Arc<dyn LocationProvider>,
    ) -> AnalyticsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        options.validate()?;
        let inner = ProviderInner {
            options,
            event_names: event_names.into_iter().map(Into::into).collect(),
            loader,
            tracker,
            location,
            loaded: OnceCell::new(),
            mounted: AtomicBool::new(false),
            load_error: Mutex::new(None),
            memo: Mutex::new(None),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Wires the provider to the page: `<script>` injection, `window.umami` and
    /// `window.location`.
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    pub fn for_browser<I, S>(options: AnalyticsOptions, event_names: I) -> AnalyticsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        use crate::analytics::location::WindowLocation;
        use crate::analytics::script::DomScriptLoader;
        use crate::analytics::tracker::GlobalUmamiTracker;

        Self::new(
            options,
            event_names,
            Arc::new(DomScriptLoader),
            Arc::new(GlobalUmamiTracker),
            Arc::new(WindowLocation),
        )
    }

    /// Requests injection of the tracker script. Only the first call has an effect.
    pub fn mount(&self) {
        if self.inner.mounted.swap(true, Ordering::SeqCst) {
            return;
        }

        let request = ScriptRequest::from_options(&self.inner.options);
        LOGGER.debug(format!("Injecting tracker script {}", request.src));

        let loader = Arc::clone(&self.inner.loader);
        let state = Arc::downgrade(&self.inner);
        spawn_detached(async move {
            let outcome = loader.load(&request).await;
            let Some(inner) = state.upgrade() else {
                return;
            };
            match outcome {
                Ok(()) => {
                    let _ = inner.loaded.set(()).await;
                    LOGGER.debug(format!("Tracker script {} loaded", request.src));
                }
                Err(err) => {
                    LOGGER.error(format!("Tracker script {} failed to load: {err}", request.src));
                    *lock(&inner.load_error) = Some(err);
                }
            }
        });
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }

    /// Resolves once the script has loaded. Never resolves if loading failed.
    pub async fn wait_until_loaded(&self) {
        self.inner.loaded.wait().await;
    }

    /// The error reported by the script loader, if injection failed.
    pub fn load_error(&self) -> Option<AnalyticsError> {
        lock(&self.inner.load_error).clone()
    }

    pub fn options(&self) -> &AnalyticsOptions {
        &self.inner.options
    }

    pub fn context(&self) -> AnalyticsContext {
        self.inner.context()
    }

    /// Returns the tracking capability, or `None` until the script has loaded.
    pub fn use_tracker(&self) -> Option<Arc<TrackDispatcher>> {
        self.inner.tracker_capability()
    }

    /// A handle for code that should only observe this provider.
    pub fn consumer(&self) -> AnalyticsConsumer {
        AnalyticsConsumer {
            provider: Arc::downgrade(&self.inner),
        }
    }
}

impl ProviderInner {
    fn is_loaded(&self) -> bool {
        self.loaded.is_initialized()
    }

    fn context(&self) -> AnalyticsContext {
        AnalyticsContext {
            auto_track: self.options.auto_track(),
            loaded: self.is_loaded(),
            script_src: self.options.script_src().to_string(),
            website_id: self.options.website_id().to_string(),
            domains: self.options.domains().map(<[String]>::to_vec),
            url_rewriter: self.options.url_rewriter().cloned(),
        }
    }

    fn tracker_capability(&self) -> Option<Arc<TrackDispatcher>> {
        if !self.is_loaded() {
            return None;
        }

        // The script keeps its own url current only while auto tracking.
        let pathname = (!self.options.auto_track()).then(|| self.location.pathname());

        let mut memo = lock(&self.memo);
        if let Some(cached) = memo.as_ref().filter(|cached| cached.pathname == pathname) {
            return Some(Arc::clone(&cached.dispatcher));
        }

        let dispatcher = Arc::new(TrackDispatcher::new(
            self.event_names.iter().cloned(),
            TrackingOptions {
                pathname: pathname.clone(),
                url_rewriter: self.options.url_rewriter().cloned(),
            },
            Arc::clone(&self.tracker),
        ));
        *memo = Some(MemoizedTracker {
            pathname,
            dispatcher: Arc::clone(&dispatcher),
        });
        Some(dispatcher)
    }
}

/// Non-owning access to an [`AnalyticsProvider`].
///
/// Every accessor fails with `analytics/context-misuse` when the consumer was not obtained
/// from a provider, or when that provider has been dropped.
#[derive(Clone, Default)]
pub struct AnalyticsConsumer {
    provider: Weak<ProviderInner>,
}

impl fmt::Debug for AnalyticsConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsConsumer")
            .field("attached", &(self.provider.strong_count() > 0))
            .finish()
    }
}

impl AnalyticsConsumer {
    /// A consumer outside of any provider.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn context(&self) -> AnalyticsResult<AnalyticsContext> {
        Ok(self.provider()?.context())
    }

    pub fn use_tracker(&self) -> AnalyticsResult<Option<Arc<TrackDispatcher>>> {
        Ok(self.provider()?.tracker_capability())
    }

    fn provider(&self) -> AnalyticsResult<Arc<ProviderInner>> {
        self.provider.upgrade().ok_or_else(context_misuse)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::error::{script_load_error, AnalyticsErrorCode};
    use crate::test_support::{manual_script_loader, FixedLocation, RecordingTracker};

    const EVENTS: [&str; 1] = ["signup"];

    fn options() -> AnalyticsOptions {
        AnalyticsOptions::new("site-123", "https://cdn.example/script.js")
    }

    fn provider_with(
        options: AnalyticsOptions,
        location: Arc<FixedLocation>,
    ) -> (
        AnalyticsProvider,
        Arc<crate::test_support::ManualScriptLoader>,
        async_channel::Sender<AnalyticsResult<()>>,
        RecordingTracker,
    ) {
        let (loader, signal) = manual_script_loader();
        let tracker = RecordingTracker::default();
        let provider = AnalyticsProvider::new(
            options,
            EVENTS,
            loader.clone(),
            Arc::new(tracker.clone()),
            location,
        )
        .unwrap();
        (provider, loader, signal, tracker)
    }

    #[test]
    fn construction_requires_source_and_website() {
        let (loader, _signal) = manual_script_loader();
        for options in [
            AnalyticsOptions::new("site-123", ""),
            AnalyticsOptions::new("", "https://cdn.example/script.js"),
        ] {
            let err = AnalyticsProvider::new(
                options,
                EVENTS,
                loader.clone(),
                Arc::new(RecordingTracker::default()),
                FixedLocation::new("/"),
            )
            .unwrap_err();
            assert_eq!(err.code, AnalyticsErrorCode::MissingConfiguration);
        }
        assert!(loader.requests().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tracker_is_available_only_after_load() {
        let (provider, loader, signal, _tracker) =
            provider_with(options(), FixedLocation::new("/"));

        assert!(provider.use_tracker().is_none());
        provider.mount();
        tokio::task::yield_now().await;
        assert!(provider.use_tracker().is_none());
        assert!(!provider.context().loaded);

        signal.send(Ok(())).await.unwrap();
        provider.wait_until_loaded().await;

        assert!(provider.is_loaded());
        assert!(provider.context().loaded);
        assert!(provider.use_tracker().is_some());
        assert_eq!(loader.requests().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn mount_injects_once_with_script_attributes() {
        let (provider, loader, signal, _tracker) = provider_with(
            options().with_auto_track(false).with_domains(["a.com", "b.com"]),
            FixedLocation::new("/"),
        );

        provider.mount();
        provider.mount();
        signal.send(Ok(())).await.unwrap();
        provider.wait_until_loaded().await;
        provider.mount();
        tokio::task::yield_now().await;

        let requests = loader.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0],
            ScriptRequest {
                src: "https://cdn.example/script.js".into(),
                website_id: "site-123".into(),
                auto_track: false,
                domains: Some("a.com,b.com".into()),
                is_async: true,
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn manual_tracking_follows_the_current_path() {
        let location = FixedLocation::new("/p1");
        let (provider, _loader, signal, tracker) = provider_with(
            options()
                .with_auto_track(false)
                .with_url_rewriter(|url| format!("https://app.example{url}")),
            location.clone(),
        );
        provider.mount();
        signal.send(Ok(())).await.unwrap();
        provider.wait_until_loaded().await;

        let first = provider.use_tracker().unwrap();
        assert!(Arc::ptr_eq(&first, &provider.use_tracker().unwrap()));
        first.page_view().unwrap().await.unwrap();

        location.set("/p2");
        let second = provider.use_tracker().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().pathname.as_deref(), Some("/p2"));
        second.event("signup", None).unwrap().await.unwrap();

        let sent = tracker.sent();
        assert_eq!(sent[0]["url"], "https://app.example/p1");
        assert_eq!(sent[1]["url"], "https://app.example/p2");
        assert_eq!(sent[1]["name"], "signup");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn auto_tracking_ignores_the_current_path() {
        let location = FixedLocation::new("/p1");
        let (provider, _loader, signal, tracker) = provider_with(options(), location.clone());
        provider.mount();
        signal.send(Ok(())).await.unwrap();
        provider.wait_until_loaded().await;

        let track = provider.use_tracker().unwrap();
        assert_eq!(track.options().pathname, None);
        location.set("/p2");
        assert!(Arc::ptr_eq(&track, &provider.use_tracker().unwrap()));

        track.page_view().unwrap().await.unwrap();
        assert_eq!(tracker.sent()[0]["url"], "/stale");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn consumers_require_a_live_provider() {
        let err = AnalyticsConsumer::detached().use_tracker().unwrap_err();
        assert_eq!(err.code, AnalyticsErrorCode::ContextMisuse);

        let (provider, _loader, signal, _tracker) =
            provider_with(options().with_domains(["a.com"]), FixedLocation::new("/"));
        let consumer = provider.consumer();
        assert!(consumer.use_tracker().unwrap().is_none());

        provider.mount();
        signal.send(Ok(())).await.unwrap();
        provider.wait_until_loaded().await;

        assert!(consumer.use_tracker().unwrap().is_some());
        let context = consumer.context().unwrap();
        assert!(context.loaded && context.auto_track);
        assert_eq!(context.website_id, "site-123");
        assert_eq!(context.script_src, "https://cdn.example/script.js");
        assert_eq!(context.domains, Some(vec!["a.com".to_string()]));
        assert!(context.url_rewriter.is_none());

        drop(provider);
        let err = consumer.context().unwrap_err();
        assert_eq!(err.code, AnalyticsErrorCode::ContextMisuse);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_injection_is_reported_and_stays_unloaded() {
        let (provider, _loader, signal, _tracker) =
            provider_with(options(), FixedLocation::new("/"));
        provider.mount();
        signal
            .send(Err(script_load_error("blocked by client")))
            .await
            .unwrap();

        for _ in 0..10 {
            if provider.load_error().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let err = provider.load_error().expect("load error recorded");
        assert_eq!(err.code, AnalyticsErrorCode::ScriptLoad);
        assert!(!provider.is_loaded());
        assert!(provider.use_tracker().is_none());
    }
}
