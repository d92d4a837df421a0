//! Runtime discovery of default tracker settings.
//!
//! Sources, in increasing priority: the `__UMAMI_DEFAULTS__` object (environment variable, file
//! referenced by `__UMAMI_DEFAULTS_PATH`, or a global on the page), the `UMAMI_CONFIG` variable,
//! and finally the individual `UMAMI_*` variables.

use std::env;
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

use serde_json::{Map, Value};

fn umami_defaults() -> Option<Value> {
    defaults_from_env()
        .or_else(defaults_from_path)
        .or_else(defaults_from_global)
}

fn defaults_from_env() -> Option<Value> {
    let raw = env::var("__UMAMI_DEFAULTS__").ok()?;
    parse_json_object(&raw)
}

fn defaults_from_path() -> Option<Value> {
    let path = env::var("__UMAMI_DEFAULTS_PATH").ok()?;
    let content = fs::read_to_string(path).ok()?;
    parse_json_object(&content)
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
fn defaults_from_global() -> Option<Value> {
    use wasm_bindgen::JsValue;

    let global = js_sys::global();
    let value = js_sys::Reflect::get(&global, &JsValue::from_str("__UMAMI_DEFAULTS__")).ok()?;
    if value.is_null() || value.is_undefined() {
        return None;
    }
    let serialized = js_sys::JSON::stringify(&value).ok()?.as_string()?;
    parse_json_object(&serialized)
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
fn defaults_from_global() -> Option<Value> {
    None
}

fn parse_json_object(raw: &str) -> Option<Value> {
    serde_json::from_str::<Value>(raw)
        .ok()
        .filter(Value::is_object)
}

/// Accepts inline JSON, a path to a JSON file, or `key=value` pairs separated by `;`.
fn parse_config_source(raw: &str) -> Option<Value> {
    if let Some(json) = parse_json_object(raw) {
        return Some(json);
    }

    if let Some(path) = treat_as_path(raw) {
        if let Some(json) = fs::read_to_string(&path)
            .ok()
            .and_then(|contents| parse_json_object(&contents))
        {
            return Some(json);
        }
    }

    parse_key_value_config(raw)
}

#[cfg(not(target_arch = "wasm32"))]
fn treat_as_path(raw: &str) -> Option<String> {
    if raw.contains('=') {
        return None;
    }
    let trimmed = raw.trim();
    Path::new(trimmed).exists().then(|| trimmed.to_string())
}

#[cfg(target_arch = "wasm32")]
fn treat_as_path(_raw: &str) -> Option<String> {
    None
}

// `;` keeps comma-joined domain lists intact.
fn parse_key_value_config(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    for entry in raw.split(';') {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
    (!map.is_empty()).then_some(Value::Object(map))
}

fn config_from_vars<F>(lookup: F) -> Map<String, Value>
where
    F: Fn(&str) -> Option<String>,
{
    let mut map = lookup("UMAMI_CONFIG")
        .and_then(|raw| parse_config_source(&raw))
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();

    let overrides = [
        ("UMAMI_WEBSITE_ID", "websiteId"),
        ("UMAMI_SCRIPT_SRC", "src"),
        ("UMAMI_AUTO_TRACK", "autoTrack"),
        ("UMAMI_DOMAINS", "domains"),
    ];
    for (variable, key) in overrides {
        if let Some(value) = lookup(variable).filter(|value| !value.trim().is_empty()) {
            map.insert(key.to_string(), Value::String(value.trim().to_string()));
        }
    }
    map
}

/// Returns the merged default tracker configuration as a JSON map, if any source provided one.
pub fn default_analytics_config_json() -> Option<Map<String, Value>> {
    let mut merged = umami_defaults()
        .and_then(|defaults| defaults.as_object().cloned())
        .unwrap_or_default();
    merged.extend(config_from_vars(|name| env::var(name).ok()));
    (!merged.is_empty()).then_some(merged)
}

/// Serializes tests that mutate the process environment.
#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

#[cfg(test)]
const UMAMI_VARS: [&str; 7] = [
    "__UMAMI_DEFAULTS__",
    "__UMAMI_DEFAULTS_PATH",
    "UMAMI_CONFIG",
    "UMAMI_WEBSITE_ID",
    "UMAMI_SCRIPT_SRC",
    "UMAMI_AUTO_TRACK",
    "UMAMI_DOMAINS",
];

/// Unsets every variable read here, returning the previous values. Hold [`ENV_GUARD`].
#[cfg(test)]
pub(crate) fn clear_umami_vars() -> Vec<(&'static str, String)> {
    UMAMI_VARS
        .iter()
        .filter_map(|name| {
            let previous = env::var(name).ok()?;
            env::remove_var(name);
            Some((*name, previous))
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn restore_umami_vars(previous: Vec<(&'static str, String)>) {
    for (name, value) in previous {
        env::set_var(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_key_value_configs() {
        let value = parse_key_value_config("websiteId=abc; domains=a.com,b.com").unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.get("websiteId").unwrap().as_str(), Some("abc"));
        assert_eq!(map.get("domains").unwrap().as_str(), Some("a.com,b.com"));
    }

    #[test]
    fn parse_config_source_accepts_files_and_json() {
        let json = parse_config_source("{\"websiteId\":\"abc\"}").unwrap();
        assert_eq!(json["websiteId"], "abc");

        let mut path = std::env::temp_dir();
        path.push(format!(
            "umami_rs_sdk_test_{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        fs::write(&path, "{\"src\":\"https://cdn.example/script.js\"}").unwrap();
        let file_json = parse_config_source(&path.to_string_lossy()).unwrap();
        assert_eq!(file_json["src"], "https://cdn.example/script.js");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn individual_variables_override_umami_config() {
        let vars = HashMap::from([
            ("UMAMI_CONFIG", "websiteId=from-config;src=https://a/script.js"),
            ("UMAMI_WEBSITE_ID", "from-variable"),
            ("UMAMI_AUTO_TRACK", "false"),
            ("UMAMI_DOMAINS", "  "),
        ]);
        let map = config_from_vars(|name| vars.get(name).map(|value| value.to_string()));
        assert_eq!(map["websiteId"], "from-variable");
        assert_eq!(map["src"], "https://a/script.js");
        assert_eq!(map["autoTrack"], "false");
        assert!(!map.contains_key("domains"));
    }

    #[test]
    fn variables_override_defaults_from_env() {
        let _guard = ENV_GUARD.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let cleared = clear_umami_vars();
        env::set_var(
            "__UMAMI_DEFAULTS__",
            r#"{"websiteId":"from-defaults","src":"https://cdn.example/script.js"}"#,
        );
        env::set_var("UMAMI_WEBSITE_ID", "from-variable");

        let merged = default_analytics_config_json();
        env::remove_var("__UMAMI_DEFAULTS__");
        env::remove_var("UMAMI_WEBSITE_ID");
        restore_umami_vars(cleared);

        let merged = merged.unwrap();
        assert_eq!(merged["websiteId"], "from-variable");
        assert_eq!(merged["src"], "https://cdn.example/script.js");
    }
}
