use std::sync::LazyLock;

use crate::logger::Logger;

pub(crate) const ANALYTICS_LOGGER_NAME: &str = "@umami/analytics";

pub(crate) static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new(ANALYTICS_LOGGER_NAME));

/// Name of the global object the Umami script installs on `window`.
pub const UMAMI_GLOBAL: &str = "umami";

pub const ATTR_WEBSITE_ID: &str = "data-website-id";
pub const ATTR_AUTO_TRACK: &str = "data-auto-track";
pub const ATTR_DOMAINS: &str = "data-domains";
