//! Injection of the Umami tracker script.
//!
//! The provider describes what to inject with a [`ScriptRequest`]; a [`ScriptLoader`] performs
//! the injection and resolves once the script reports that it finished loading.

use async_trait::async_trait;

use crate::analytics::config::AnalyticsOptions;
use crate::analytics::constants::{ATTR_AUTO_TRACK, ATTR_DOMAINS, ATTR_WEBSITE_ID};
use crate::analytics::error::AnalyticsResult;

/// Everything a loader needs to inject the tracker script tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptRequest {
    pub src: String,
    pub website_id: String,
    pub auto_track: bool,
    /// Comma-joined allow-list; `None` when no (or an empty) list was configured.
    pub domains: Option<String>,
    pub is_async: bool,
}

impl ScriptRequest {
    pub fn from_options(options: &AnalyticsOptions) -> Self {
        let domains = options
            .domains()
            .filter(|domains| !domains.is_empty())
            .map(|domains| domains.join(","));
        Self {
            src: options.script_src().to_string(),
            website_id: options.website_id().to_string(),
            auto_track: options.auto_track(),
            domains,
            is_async: true,
        }
    }

    /// The `data-*` attributes to set on the script element, in insertion order.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attributes = vec![
            (ATTR_AUTO_TRACK, self.auto_track.to_string()),
            (ATTR_WEBSITE_ID, self.website_id.clone()),
        ];
        if let Some(domains) = &self.domains {
            attributes.push((ATTR_DOMAINS, domains.clone()));
        }
        attributes
    }
}

/// Injects the tracker script and waits for its load signal.
///
/// Implementations must resolve at most once per request; an `Err` reports that the script
/// could not be loaded.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ScriptLoader: Send + Sync {
    async fn load(&self, request: &ScriptRequest) -> AnalyticsResult<()>;
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub use browser::DomScriptLoader;

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
mod browser {
    use std::cell::RefCell;
    use std::rc::Rc;

    use async_trait::async_trait;
    use futures::channel::oneshot;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};

    use super::{ScriptLoader, ScriptRequest};
    use crate::analytics::constants::UMAMI_GLOBAL;
    use crate::analytics::error::{script_load_error, AnalyticsResult};

    /// Appends a `<script>` element to the current document.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct DomScriptLoader;

    #[async_trait(?Send)]
    impl ScriptLoader for DomScriptLoader {
        async fn load(&self, request: &ScriptRequest) -> AnalyticsResult<()> {
            let window =
                web_sys::window().ok_or_else(|| script_load_error("Window not available"))?;
            let document = window
                .document()
                .ok_or_else(|| script_load_error("Document not available"))?;

            let already_present = document
                .query_selector(&format!("script[src=\"{}\"]", request.src))
                .ok()
                .flatten()
                .is_some();
            if already_present && tracker_installed() {
                return Ok(());
            }

            let script = document
                .create_element("script")
                .map_err(|err| script_load_error(format!("Failed to create script: {err:?}")))?
                .dyn_into::<web_sys::HtmlScriptElement>()
                .map_err(|_| script_load_error("Script element has wrong type"))?;
            script.set_src(&request.src);
            script.set_async(request.is_async);
            for (name, value) in request.attributes() {
                script.set_attribute(name, &value).map_err(|err| {
                    script_load_error(format!("Failed to set {name}: {err:?}"))
                })?;
            }

            let (sender, receiver) = oneshot::channel::<AnalyticsResult<()>>();
            let sender = Rc::new(RefCell::new(Some(sender)));

            let success_sender = sender.clone();
            let onload = Closure::wrap(Box::new(move || {
                if let Some(tx) = success_sender.borrow_mut().take() {
                    let _ = tx.send(Ok(()));
                }
            }) as Box<dyn FnMut()>);

            let error_sender = sender.clone();
            let src = request.src.clone();
            let onerror = Closure::wrap(Box::new(move || {
                if let Some(tx) = error_sender.borrow_mut().take() {
                    let _ = tx.send(Err(script_load_error(format!(
                        "Failed to load tracker script: {src}"
                    ))));
                }
            }) as Box<dyn FnMut()>);

            script.set_onload(Some(onload.as_ref().unchecked_ref()));
            script.set_onerror(Some(onerror.as_ref().unchecked_ref()));
            onload.forget();
            onerror.forget();

            if let Some(head) = document.head() {
                head.append_child(&script).map_err(|err| {
                    script_load_error(format!("Failed to append script to <head>: {err:?}"))
                })?;
            } else if let Some(body) = document.body() {
                body.append_child(&script).map_err(|err| {
                    script_load_error(format!("Failed to append script to <body>: {err:?}"))
                })?;
            } else {
                return Err(script_load_error("No <head> or <body> element found"));
            }

            receiver
                .await
                .map_err(|_| script_load_error("Script loading channel dropped"))?
        }
    }

    fn tracker_installed() -> bool {
        js_sys::Reflect::get(&js_sys::global(), &JsValue::from_str(UMAMI_GLOBAL))
            .map(|value| !value.is_undefined() && !value.is_null())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_include_domains_only_when_configured() {
        let options = AnalyticsOptions::new("site-1", "https://cdn.example/script.js")
            .with_domains(["a.com", "b.com"]);
        let request = ScriptRequest::from_options(&options);
        assert!(request.is_async);
        assert_eq!(request.src, "https://cdn.example/script.js");
        assert_eq!(
            request.attributes(),
            vec![
                ("data-auto-track", "true".to_string()),
                ("data-website-id", "site-1".to_string()),
                ("data-domains", "a.com,b.com".to_string()),
            ]
        );

        let bare = AnalyticsOptions::new("site-1", "https://cdn.example/script.js")
            .with_auto_track(false)
            .with_domains(Vec::<String>::new());
        let request = ScriptRequest::from_options(&bare);
        assert_eq!(request.domains, None);
        assert_eq!(
            request.attributes(),
            vec![
                ("data-auto-track", "false".to_string()),
                ("data-website-id", "site-1".to_string()),
            ]
        );
    }
}
