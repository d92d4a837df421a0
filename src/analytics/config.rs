use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::analytics::error::{invalid_argument, missing_configuration, AnalyticsResult};
use crate::analytics::track::UrlRewriter;
use crate::platform::environment::default_analytics_config_json;

/// Configuration of one [`AnalyticsProvider`](crate::analytics::AnalyticsProvider).
///
/// `website_id` and `script_src` are validated when the provider is created, not here, so the
/// builder can be assembled in any order.
#[derive(Clone)]
pub struct AnalyticsOptions {
    website_id: String,
    script_src: String,
    auto_track: bool,
    domains: Option<Vec<String>>,
    url_rewriter: Option<UrlRewriter>,
}

impl AnalyticsOptions {
    pub fn new(website_id: impl Into<String>, script_src: impl Into<String>) -> Self {
        Self {
            website_id: website_id.into(),
            script_src: script_src.into(),
            auto_track: true,
            domains: None,
            url_rewriter: None,
        }
    }

    /// When disabled the tracker script stops following navigation, and page views are
    /// attributed to the path reported by the host's location provider instead.
    pub fn with_auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = auto_track;
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_url_rewriter<F>(mut self, rewriter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.url_rewriter = Some(Arc::new(rewriter));
        self
    }

    /// Builds options from `__UMAMI_DEFAULTS__`, `UMAMI_CONFIG` and the `UMAMI_*` variables.
    pub fn from_environment() -> AnalyticsResult<Self> {
        let config = default_analytics_config_json()
            .ok_or_else(|| missing_configuration("No Umami configuration found in environment"))?;
        let defaults: EnvironmentDefaults = serde_json::from_value(Value::Object(config))
            .map_err(|err| invalid_argument(format!("Invalid Umami configuration: {err}")))?;
        defaults.into_options()
    }

    pub fn website_id(&self) -> &str {
        &self.website_id
    }

    pub fn script_src(&self) -> &str {
        &self.script_src
    }

    pub fn auto_track(&self) -> bool {
        self.auto_track
    }

    pub fn domains(&self) -> Option<&[String]> {
        self.domains.as_deref()
    }

    pub fn url_rewriter(&self) -> Option<&UrlRewriter> {
        self.url_rewriter.as_ref()
    }

    pub(crate) fn validate(&self) -> AnalyticsResult<()> {
        if self.script_src.is_empty() {
            return Err(missing_configuration("Script source is required"));
        }
        if self.website_id.is_empty() {
            return Err(missing_configuration("websiteId is required"));
        }
        Ok(())
    }
}

impl fmt::Debug for AnalyticsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsOptions")
            .field("website_id", &self.website_id)
            .field("script_src", &self.script_src)
            .field("auto_track", &self.auto_track)
            .field("domains", &self.domains)
            .field("url_rewriter", &self.url_rewriter.is_some())
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentDefaults {
    #[serde(default)]
    website_id: String,
    #[serde(default, alias = "scriptSrc")]
    src: String,
    #[serde(default)]
    auto_track: Option<Value>,
    #[serde(default)]
    domains: Option<Value>,
}

impl EnvironmentDefaults {
    fn into_options(self) -> AnalyticsResult<AnalyticsOptions> {
        let mut options = AnalyticsOptions::new(self.website_id, self.src);
        if let Some(auto_track) = self.auto_track {
            options = options.with_auto_track(parse_flag(&auto_track)?);
        }
        if let Some(domains) = self.domains {
            options = options.with_domains(parse_domains(domains)?);
        }
        Ok(options)
    }
}

fn parse_flag(value: &Value) -> AnalyticsResult<bool> {
    match value {
        Value::Bool(flag) => Ok(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(invalid_argument(format!("Invalid autoTrack value \"{other}\""))),
        },
        other => Err(invalid_argument(format!("Invalid autoTrack value {other}"))),
    }
}

fn parse_domains(value: Value) -> AnalyticsResult<Vec<String>> {
    match value {
        Value::String(text) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .map(str::to_string)
            .collect()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(domain) => Ok(domain),
                other => Err(invalid_argument(format!("Invalid domain entry {other}"))),
            })
            .collect(),
        other => Err(invalid_argument(format!("Invalid domains value {other}"))),
    }
}
