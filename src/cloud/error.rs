//! API errors
//!
//! Typed errors for REST calls, the not-found conversions used by read
//! operations, and a combined error for best-effort batches.

use serde_json::Value;
use std::fmt;

/// Body text the CBR checkpoint endpoint returns with a 401 for unknown ids
const MALFORMED_URL_MESSAGE: &str = "malformed request url";

/// A non-success HTTP response
#[derive(Debug, Clone, thiserror::Error)]
#[error("API request failed: {status}{}", code_suffix(.error_code, .error_msg))]
pub struct ApiError {
    pub status: u16,
    pub body: String,
    pub error_code: Option<String>,
    pub error_msg: Option<String>,
}

fn code_suffix(code: &Option<String>, msg: &Option<String>) -> String {
    match (code, msg) {
        (Some(c), Some(m)) => format!(" [{}] {}", c, m),
        (Some(c), None) => format!(" [{}]", c),
        (None, Some(m)) => format!(" {}", m),
        (None, None) => String::new(),
    }
}

impl ApiError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let error_code = first_str(&parsed, &["error_code", "errCode", "error.code", "code"]);
        let error_msg = first_str(&parsed, &["error_msg", "errMsg", "error.message", "message"]);

        Self {
            status,
            body,
            error_code,
            error_msg,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Look up a string field in the JSON body
    pub fn body_field(&self, key: &str) -> Option<String> {
        let parsed: Value = serde_json::from_str(&self.body).ok()?;
        first_str(&parsed, &[key])
    }
}

fn first_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| {
        let found = crate::resource::path::path_search(path, value, Value::Null);
        match found {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

/// HTTP status of an error chain, if it came from the API
pub fn status_of(err: &anyhow::Error) -> Option<u16> {
    err.chain()
        .find_map(|e| e.downcast_ref::<ApiError>())
        .map(|e| e.status)
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    status_of(err) == Some(404)
}

/// Reinterpret an error with HTTP `status` as a 404 when the body field `key`
/// holds one of `codes`
pub fn convert_expected_into_404(
    err: anyhow::Error,
    status: u16,
    key: &str,
    codes: &[&str],
) -> anyhow::Error {
    let Some(api) = err.chain().find_map(|e| e.downcast_ref::<ApiError>()) else {
        return err;
    };
    if api.status != status {
        return err;
    }

    match api.body_field(key) {
        Some(code) if codes.contains(&code.as_str()) => {
            tracing::debug!("treating {} with {}={} as not found", status, key, code);
            anyhow::Error::new(ApiError {
                status: 404,
                ..api.clone()
            })
        },
        _ => err,
    }
}

/// Reinterpret a 401 whose body reports a malformed request url as a 404.
///
/// The checkpoint endpoint answers unknown ids this way instead of 404.
pub fn convert_malformed_url_401_into_404(err: anyhow::Error) -> anyhow::Error {
    let Some(api) = err.chain().find_map(|e| e.downcast_ref::<ApiError>()) else {
        return err;
    };
    if api.status != 401 || !api.body.to_lowercase().contains(MALFORMED_URL_MESSAGE) {
        return err;
    }

    tracing::debug!("treating 401 malformed request url as not found");
    anyhow::Error::new(ApiError {
        status: 404,
        ..api.clone()
    })
}

/// Failures collected from operations that all run regardless of each other
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<anyhow::Error>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: anyhow::Error) {
        self.errors.push(err);
    }

    /// Record the error of a result, if any
    pub fn append<T>(&mut self, result: anyhow::Result<T>) {
        if let Err(e) = result {
            self.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }

    /// `Ok` when nothing failed
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::Error::new(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s) occurred:", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "\t* {:#}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_api_error_parses_vendor_fields() {
        let err = ApiError::new(
            400,
            r#"{"error_code":"BackupService.6302","error_msg":"bad vault"}"#,
        );
        assert_eq!(err.error_code.as_deref(), Some("BackupService.6302"));
        assert_eq!(err.error_msg.as_deref(), Some("bad vault"));
        assert_eq!(
            err.to_string(),
            "API request failed: 400 [BackupService.6302] bad vault"
        );

        let nested = ApiError::new(403, r#"{"error":{"code":"APIGW.0301","message":"denied"}}"#);
        assert_eq!(nested.error_code.as_deref(), Some("APIGW.0301"));

        let plain = ApiError::new(500, "oops");
        assert_eq!(plain.to_string(), "API request failed: 500");
    }

    #[test]
    fn test_status_survives_context() {
        let err = anyhow::Error::new(ApiError::new(404, "")).context("error retrieving vault");
        assert_eq!(status_of(&err), Some(404));
        assert!(is_not_found(&err));

        let local: anyhow::Result<()> = Err(anyhow::anyhow!("bad id")).context("x");
        assert_eq!(status_of(&local.unwrap_err()), None);
    }

    #[test]
    fn test_expected_codes_become_404() {
        let err = anyhow::Error::new(ApiError::new(401, r#"{"error_code":"SVCSTG.00100401"}"#));
        let converted = convert_expected_into_404(err, 401, "error_code", &["SVCSTG.00100401"]);
        assert!(is_not_found(&converted));

        let other = anyhow::Error::new(ApiError::new(401, r#"{"error_code":"IAM.0001"}"#));
        let kept = convert_expected_into_404(other, 401, "error_code", &["SVCSTG.00100401"]);
        assert_eq!(status_of(&kept), Some(401));

        let gone = anyhow::Error::new(ApiError::new(400, r#"{"error_code":"SWR.400003"}"#))
            .context("error deleting SWR retention policy");
        let converted = convert_expected_into_404(gone, 400, "error_code", &["SWR.400003"]);
        assert!(is_not_found(&converted));

        let wrong_status = anyhow::Error::new(ApiError::new(401, r#"{"error_code":"SWR.400003"}"#));
        let kept = convert_expected_into_404(wrong_status, 400, "error_code", &["SWR.400003"]);
        assert_eq!(status_of(&kept), Some(401));
    }

    #[test]
    fn test_malformed_url_401_becomes_404() {
        let err = anyhow::Error::new(ApiError::new(
            401,
            concat!(
                r#"{"error_code":"APIGW.0101","#,
                r#""error_msg":"The API does not exist or has not been published: "#,
                r#"Malformed Request URL"}"#
            ),
        ));
        assert!(is_not_found(&convert_malformed_url_401_into_404(err)));

        let real_auth = anyhow::Error::new(ApiError::new(401, r#"{"error_msg":"token expired"}"#));
        assert_eq!(
            status_of(&convert_malformed_url_401_into_404(real_auth)),
            Some(401)
        );

        let forbidden = anyhow::Error::new(ApiError::new(403, "malformed request url"));
        assert_eq!(
            status_of(&convert_malformed_url_401_into_404(forbidden)),
            Some(403)
        );
    }

    #[test]
    fn test_multi_error_collects_all() {
        let mut errs = MultiError::new();
        errs.append(Ok::<_, anyhow::Error>(()));
        assert!(errs.is_empty());

        errs.append::<()>(Err(anyhow::anyhow!("member a failed")));
        errs.append::<()>(Err(anyhow::anyhow!("member b failed")));
        assert_eq!(errs.len(), 2);

        let message = errs.into_result().unwrap_err().to_string();
        assert!(message.starts_with("2 error(s) occurred:"));
        assert!(message.contains("member a failed"));
        assert!(message.contains("member b failed"));
    }
}
