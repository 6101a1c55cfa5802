use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Seconds to wait when the provider throttles us without saying for how long
const DEFAULT_RETRY_AFTER: u64 = 5;

/// Error reasons Gmail attaches to throttling responses (usually HTTP 403)
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Error types for the sweeper
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403) for reasons other than throttling
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Listing message ids failed part-way through pagination
    #[error("Failed to list messages (page {page}): {source}")]
    ListingFailed {
        page: usize,
        #[source]
        source: Box<GmailError>,
    },

    /// Every attempt of a bulk modification was throttled
    #[error("Gave up after {attempts} rate-limited attempts")]
    RetriesExhausted { attempts: u32 },

    /// A scan or deletion is already running
    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// State management errors
    #[error("State error: {0}")]
    StateError(String),

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            GmailError::RateLimitExceeded { .. }
            | GmailError::ServerError { .. }
            | GmailError::NetworkError(_) => true,
            GmailError::ListingFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if the provider asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GmailError::RateLimitExceeded { .. })
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Falls back to 5 seconds when the header is missing, invalid or in the past.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

/// Map a Gmail JSON error body onto our error taxonomy
///
/// Gmail reports errors as
/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`.
/// Throttling is signalled either by HTTP 429 or by a 403 carrying one of
/// the rate-limit reasons, so the reasons are checked before the status code.
pub fn classify_error_body(body: &serde_json::Value) -> GmailError {
    let error = &body["error"];
    let code = error["code"].as_u64().unwrap_or(0) as u16;
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    let throttled = error["errors"]
        .as_array()
        .map(|errors| {
            errors.iter().any(|e| {
                e["reason"]
                    .as_str()
                    .map(|reason| RATE_LIMIT_REASONS.contains(&reason))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    if throttled || code == 429 {
        return GmailError::RateLimitExceeded {
            retry_after: DEFAULT_RETRY_AFTER,
        };
    }

    match code {
        400 => GmailError::BadRequest(message),
        401 => GmailError::AuthError(message),
        403 => GmailError::Forbidden(message),
        404 => GmailError::MessageNotFound(message),
        500..=599 => GmailError::ServerError {
            status: code,
            message,
        },
        _ => GmailError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // Non-success response whose body was JSON
            google_gmail1::Error::BadRequest(ref body) => classify_error_body(body),
            // Non-success response without a JSON body
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    401 => GmailError::AuthError(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
