//! Request parameters: well-known keys, error codes, and typed accessors.
//!
//! Parameters arrive as a flat JSON object from brokers. Key names are part
//! of the broker contract and must not change.

use serde_json::Value;

pub use ipc::Parameters;

// =============================================================================
// KEYS
// =============================================================================

pub mod keys {
    pub const REQUEST_ID: &str = "RequestId";
    pub const OPEN_URL: &str = "OpenUrl";
    pub const FINAL_URL: &str = "FinalUrl";
    pub const URL_RESPONSE: &str = "UrlResponse";
    pub const CLIENT_DATA: &str = "ClientData";
    pub const WINDOW_ID: &str = "WindowId";
    pub const EMBEDDED: &str = "Embedded";
    pub const ALLOWED_SCHEMES: &str = "AllowedSchemes";
    pub const IDENTITY: &str = "Identity";
    pub const METHOD: &str = "Method";
    pub const MECHANISM: &str = "Mechanism";
    pub const ERROR: &str = "QueryErrorCode";
    pub const USERNAME: &str = "UserName";
    pub const PASSWORD: &str = "Secret";
    pub const QUERY_USERNAME: &str = "QueryUserName";
    pub const QUERY_PASSWORD: &str = "QueryPassword";
    pub const CAPTION: &str = "Caption";
    pub const TITLE: &str = "Title";
    pub const MESSAGE: &str = "QueryMessage";
    pub const MESSAGE_ID: &str = "QueryMessageId";
    pub const DISPLAY_NAME: &str = "DisplayName";
}

// =============================================================================
// QUERY ERRORS
// =============================================================================

/// Reply-level error codes carried under [`keys::ERROR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum QueryError {
    NoError = 0,
    General = 1,
    NoSignonUi = 2,
    BadParameters = 3,
    Canceled = 4,
    NotAvailable = 5,
    BadUrl = 6,
    BadCaptcha = 7,
    BadCaptchaUrl = 8,
    RefreshFailed = 9,
    Forbidden = 10,
    ForgotPassword = 11,
}

impl QueryError {
    #[must_use]
    pub fn code(self) -> i64 {
        self as i64
    }

    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::NoError,
            1 => Self::General,
            2 => Self::NoSignonUi,
            3 => Self::BadParameters,
            4 => Self::Canceled,
            5 => Self::NotAvailable,
            6 => Self::BadUrl,
            7 => Self::BadCaptcha,
            8 => Self::BadCaptchaUrl,
            9 => Self::RefreshFailed,
            10 => Self::Forbidden,
            11 => Self::ForgotPassword,
            _ => return None,
        })
    }
}

/// A reply carrying only an error code.
#[must_use]
pub fn error_result(err: QueryError) -> Parameters {
    let mut map = Parameters::new();
    map.insert(keys::ERROR.into(), Value::from(err.code()));
    map
}

/// The reply every canceled request produces.
#[must_use]
pub fn canceled_result() -> Parameters {
    error_result(QueryError::Canceled)
}

/// Error code of a reply, if it carries one.
#[must_use]
pub fn result_error(result: &Parameters) -> Option<QueryError> {
    result.get(keys::ERROR).and_then(Value::as_i64).and_then(QueryError::from_code)
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Unwrap transport variant wrappers: top-level values, and the values of
/// top-level maps, that arrive as `{"signature": .., "value": ..}` are
/// replaced by their `value`.
#[must_use]
pub fn expand_arguments(parameters: Parameters) -> Parameters {
    parameters
        .into_iter()
        .map(|(key, value)| {
            let value = match unwrap_variant(value) {
                Value::Object(inner) => {
                    Value::Object(inner.into_iter().map(|(k, v)| (k, unwrap_variant(v))).collect())
                }
                other => other,
            };
            (key, value)
        })
        .collect()
}

fn unwrap_variant(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 2 && map.contains_key("signature") && map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

#[must_use]
pub fn get_str<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Unsigned 32-bit value. Accepts integers and integral floats.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn get_u32(params: &Parameters, key: &str) -> Option<u32> {
    let value = params.get(key)?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&f)).then_some(f as u32)
}

#[must_use]
pub fn get_bool(params: &Parameters, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[must_use]
pub fn get_map<'a>(params: &'a Parameters, key: &str) -> Option<&'a Parameters> {
    params.get(key).and_then(Value::as_object)
}

/// String list. Absent or malformed lists yield `None`.
#[must_use]
pub fn get_str_list(params: &Parameters, key: &str) -> Option<Vec<String>> {
    let items = params.get(key)?.as_array()?;
    items.iter().map(|v| v.as_str().map(str::to_owned)).collect()
}

#[cfg(test)]
#[path = "params_test.rs"]
mod tests;
