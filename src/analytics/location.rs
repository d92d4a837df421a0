/// Reports the host page's current path.
///
/// Only consulted when auto tracking is disabled, where the tracker script no longer follows
/// client-side navigation on its own.
pub trait LocationProvider: Send + Sync {
    fn pathname(&self) -> String;
}

impl<F> LocationProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn pathname(&self) -> String {
        self()
    }
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use browser::WindowLocation;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
mod browser {
    use super::LocationProvider;

    /// Reads `window.location.pathname`.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct WindowLocation;

    impl LocationProvider for WindowLocation {
        fn pathname(&self) -> String {
            web_sys::window()
                .and_then(|window| window.location().pathname().ok())
                .unwrap_or_else(|| "/".to_string())
        }
    }
}
