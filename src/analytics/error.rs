use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalyticsErrorCode {
    /// A required provider option (website id, script source) is missing or empty.
    MissingConfiguration,
    /// The tracker hook was used without a live provider.
    ContextMisuse,
    /// A custom payload without a `website` field.
    MissingWebsite,
    /// A custom payload whose `website` field is not a string.
    InvalidWebsite,
    UnsupportedParameters,
    /// The event name is not part of the dispatcher's catalog.
    UnsupportedEvent,
    ScriptLoad,
    Tracker,
    InvalidArgument,
}

impl AnalyticsErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsErrorCode::MissingConfiguration => "analytics/missing-configuration",
            AnalyticsErrorCode::ContextMisuse => "analytics/context-misuse",
            AnalyticsErrorCode::MissingWebsite => "analytics/missing-website",
            AnalyticsErrorCode::InvalidWebsite => "analytics/invalid-website",
            AnalyticsErrorCode::UnsupportedParameters => "analytics/unsupported-parameters",
            AnalyticsErrorCode::UnsupportedEvent => "analytics/unsupported-event",
            AnalyticsErrorCode::ScriptLoad => "analytics/script-load",
            AnalyticsErrorCode::Tracker => "analytics/tracker",
            AnalyticsErrorCode::InvalidArgument => "analytics/invalid-argument",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyticsError {
    pub code: AnalyticsErrorCode,
    message: String,
}

impl AnalyticsError {
    pub fn new(code: AnalyticsErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Errors raised synchronously because the caller broke a payload contract.
    pub fn is_payload_shape_error(&self) -> bool {
        matches!(
            self.code,
            AnalyticsErrorCode::MissingWebsite
                | AnalyticsErrorCode::InvalidWebsite
                | AnalyticsErrorCode::UnsupportedParameters
        )
    }
}

impl Display for AnalyticsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for AnalyticsError {}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

pub fn missing_configuration(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::new(AnalyticsErrorCode::MissingConfiguration, message)
}

pub fn context_misuse() -> AnalyticsError {
    AnalyticsError::new(
        AnalyticsErrorCode::ContextMisuse,
        "AnalyticsProvider must be used to access the context",
    )
}

pub fn missing_website() -> AnalyticsError {
    AnalyticsError::new(
        AnalyticsErrorCode::MissingWebsite,
        "Custom payload must include a string website",
    )
}

pub fn invalid_website() -> AnalyticsError {
    AnalyticsError::new(AnalyticsErrorCode::InvalidWebsite, "Website must be a string")
}

pub fn unsupported_parameters() -> AnalyticsError {
    AnalyticsError::new(
        AnalyticsErrorCode::UnsupportedParameters,
        "unsupported parameters",
    )
}

pub fn unsupported_event(event_name: &str) -> AnalyticsError {
    AnalyticsError::new(
        AnalyticsErrorCode::UnsupportedEvent,
        format!("Event {event_name} not supported"),
    )
}

pub fn script_load_error(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::new(AnalyticsErrorCode::ScriptLoad, message)
}

pub fn tracker_error(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::new(AnalyticsErrorCode::Tracker, message)
}

pub fn invalid_argument(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::new(AnalyticsErrorCode::InvalidArgument, message)
}
