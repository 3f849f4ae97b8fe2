//! User-facing failure messages
//!
//! Turns a raw `(status code, detail)` pair into a single human-readable sentence.
//! Upstream generation providers report their failures as free text inside the
//! `detail` field, so provider and cause are recovered by keyword matching.
//!
//! Everything here is a pure function of its inputs.

/// Upstream generation provider named in an error detail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini
    Gemini,
    /// DeepSeek
    DeepSeek,
}

impl Provider {
    fn name(self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::DeepSeek => "DeepSeek",
        }
    }
}

/// Cause of an upstream provider failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Invalid or rejected provider API key
    Authentication,
    /// Provider rate limit hit
    RateLimit,
    /// Provider request timed out
    Timeout,
    /// Generic provider-side API error
    ApiError,
    /// Nothing recognizable in the detail text
    Unknown,
}

/// Result of [`parse_provider_error`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderError {
    /// Provider mentioned in the detail, if any
    pub provider: Option<Provider>,
    /// Classified cause
    pub kind: ProviderErrorKind,
    /// Message suitable for display
    pub message: String,
    /// The detail text as received
    pub original: String,
}

/// Fallback used when the server gave no usable detail
pub const GENERIC_ERROR: &str = "An error occurred";

/// Classify a provider failure from its detail text
///
/// ```
/// use bookgen_client::user_message::{parse_provider_error, Provider, ProviderErrorKind};
///
/// let parsed = parse_provider_error("Gemini rate limit reached");
/// assert_eq!(parsed.provider, Some(Provider::Gemini));
/// assert_eq!(parsed.kind, ProviderErrorKind::RateLimit);
/// assert_eq!(parsed.message, "Gemini API rate limit exceeded. Please try again later.");
/// ```
pub fn parse_provider_error(detail: &str) -> ProviderError {
    let lower = detail.to_lowercase();

    let provider = if lower.contains("gemini") {
        Some(Provider::Gemini)
    } else if lower.contains("deepseek") {
        Some(Provider::DeepSeek)
    } else {
        None
    };

    let kind = if lower.contains("invalid api key") || lower.contains("authentication") {
        ProviderErrorKind::Authentication
    } else if lower.contains("rate limit") {
        ProviderErrorKind::RateLimit
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ProviderErrorKind::Timeout
    } else if lower.contains("api error") {
        ProviderErrorKind::ApiError
    } else {
        ProviderErrorKind::Unknown
    };

    let message = match (kind, provider) {
        (ProviderErrorKind::Authentication, Some(p)) => {
            format!("Your {} API key is invalid.", p.name())
        }
        (ProviderErrorKind::Authentication, None) => "Your API key is invalid.".to_string(),
        (ProviderErrorKind::RateLimit, Some(p)) => format!(
            "{} API rate limit exceeded. Please try again later.",
            p.name()
        ),
        (ProviderErrorKind::RateLimit, None) => {
            "API rate limit exceeded. Please try again later.".to_string()
        }
        (ProviderErrorKind::Timeout, Some(p)) => {
            format!("{} API request timed out. Please try again.", p.name())
        }
        (ProviderErrorKind::Timeout, None) => {
            "API request timed out. Please try again.".to_string()
        }
        (ProviderErrorKind::ApiError, Some(p)) => {
            format!("{} API error occurred. Please try again later.", p.name())
        }
        (ProviderErrorKind::ApiError, None) => {
            "API error occurred. Please try again later.".to_string()
        }
        (ProviderErrorKind::Unknown, _) => detail.to_string(),
    };

    ProviderError {
        provider,
        kind,
        message,
        original: detail.to_string(),
    }
}

/// Map an HTTP status code and server detail to the message shown to a user
///
/// Status 0 stands for "no response" (transport failure) and passes the detail through.
pub fn friendly_message(status: u16, detail: &str) -> String {
    let detail = if detail.trim().is_empty() {
        GENERIC_ERROR
    } else {
        detail
    };

    // Account configuration problems are already phrased for the user
    if detail.contains("API key configured") {
        return detail.to_string();
    }

    match status {
        401 => {
            let parsed = parse_provider_error(detail);
            if parsed.kind == ProviderErrorKind::Unknown {
                "Authentication failed. Please login again.".to_string()
            } else {
                parsed.message
            }
        }
        429 | 502 | 504 => parse_provider_error(detail).message,
        403 => "Access denied. You do not have permission to perform this action.".to_string(),
        500 => "Server error. Please try again later.".to_string(),
        _ => detail.to_string(),
    }
}
