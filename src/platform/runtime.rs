use std::future::Future;

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Without the browser bindings there is no event loop to hand the task to, so it is driven to
/// completion in place.
#[cfg(all(target_arch = "wasm32", not(feature = "wasm-web")))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    futures::executor::block_on(future);
}

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("umami-background")
            .build()
            .map_err(|err| log::debug!("failed to build background runtime: {err}"))
            .ok()
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(runtime) = BACKGROUND_RUNTIME.as_ref() {
        runtime.spawn(future);
    } else {
        futures::executor::block_on(future);
    }
}
