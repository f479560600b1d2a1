//! Validating extractors for API routes

use std::ops::Deref;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use super::types::{ApiError, FieldError};

/// Validation rejection with structured error response
pub enum ValidationRejection {
    /// Failed to parse query string
    Query(QueryRejection),
    /// Failed to parse JSON body
    Json(JsonRejection),
    /// Validation constraints not satisfied
    Validation(ValidationErrors),
}

impl IntoResponse for ValidationRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Query(rejection) => {
                ApiError::bad_request("QUERY_PARSE_ERROR", rejection.body_text())
            }
            // Well-formed JSON with a bad field value is a validation failure
            Self::Json(JsonRejection::JsonDataError(rejection)) => {
                let text = rejection.body_text();
                match data_error_field(&text) {
                    Some(field) => ApiError::Validation(vec![field]),
                    None => ApiError::bad_request("JSON_PARSE_ERROR", text),
                }
            }
            Self::Json(rejection) => {
                ApiError::bad_request("JSON_PARSE_ERROR", rejection.body_text())
            }
            Self::Validation(errors) => ApiError::Validation(flatten_validation_errors(&errors)),
        }
        .into_response()
    }
}

/// Flatten nested validator output into `{path, message}` pairs
///
/// Paths use the wire (camelCase) field names; list elements contribute
/// their index, e.g. `events.2.traceId`.
pub fn flatten_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    collect_errors(errors, "", &mut out);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn collect_errors(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = join_path(prefix, &to_camel_case(field));
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{}: validation failed ({})", path, e.code));
                    out.push(FieldError {
                        path: path.clone(),
                        message,
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_errors(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_errors(nested, &join_path(&path, &index.to_string()), out);
                }
            }
        }
    }
}

/// Field error for a JSON body that parsed but did not fit the target type
///
/// The rejection text reads `<prefix>: events[0].inputTokens: <reason> at
/// line L column C`. Returns `None` when no field can be named.
fn data_error_field(text: &str) -> Option<FieldError> {
    let (_, detail) = text.split_once(": ")?;
    let (path, reason) = match detail.split_once(": ") {
        Some((path, reason)) if is_field_path(path) => (wire_path(path), reason),
        _ => (String::new(), detail),
    };
    let reason = reason.rsplit_once(" at line ").map_or(reason, |(r, _)| r);

    let path = match reason
        .strip_prefix("missing field `")
        .and_then(|rest| rest.strip_suffix('`'))
    {
        Some(field) => join_path(&path, field),
        None => path,
    };
    if path.is_empty() {
        return None;
    }

    Some(FieldError {
        message: format!("{}: {}", path, reason),
        path,
    })
}

fn is_field_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']'))
}

/// `events[0].inputTokens` -> `events.0.inputTokens`
fn wire_path(path: &str) -> String {
    path.replace('[', ".")
        .replace(']', "")
        .trim_start_matches('.')
        .to_string()
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

fn to_camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Query extractor with automatic validation.
///
/// Deserializes query parameters and validates them using the `validator` crate.
/// Returns a `ValidationRejection` on parse or validation failure.
#[derive(Debug)]
pub struct ValidatedQuery<T>(pub T);

impl<T> Deref for ValidatedQuery<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ValidationRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(ValidationRejection::Query)?;
        value.validate().map_err(ValidationRejection::Validation)?;
        Ok(Self(value))
    }
}

/// JSON body extractor with automatic validation.
///
/// Deserializes JSON body and validates it using the `validator` crate.
/// Returns a `ValidationRejection` on parse or validation failure.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T> Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ValidationRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidationRejection::Json)?;
        value.validate().map_err(ValidationRejection::Validation)?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costscope::{BatchEventRequest, LlmEvent, Provider};

    fn event() -> LlmEvent {
        LlmEvent {
            trace_id: "tr_1".into(),
            span_id: "sp_1".into(),
            parent_span_id: None,
            feature: "chat".into(),
            user_id: None,
            provider: Provider::Anthropic,
            model: "claude-3-5-haiku-20241022".into(),
            input_tokens: 1,
            output_tokens: 1,
            cached_tokens: 0,
            latency_ms: 1.0,
            estimated_cost_usd: 0.0,
            timestamp: chrono::Utc::now(),
            metadata: None,
            is_streaming: false,
            error_code: None,
            retry_count: 0,
            is_error: false,
        }
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("trace_id"), "traceId");
        assert_eq!(to_camel_case("estimated_cost_usd"), "estimatedCostUsd");
        assert_eq!(to_camel_case("events"), "events");
    }

    #[test]
    fn test_nested_errors_get_indexed_paths() {
        let mut bad = event();
        bad.model.clear();
        bad.latency_ms = -5.0;
        let batch = BatchEventRequest {
            events: vec![event(), bad],
        };
        let errors = batch.validate().unwrap_err();
        let details = flatten_validation_errors(&errors);

        let paths: Vec<&str> = details.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["events.1.latencyMs", "events.1.model"]);
        assert_eq!(details[1].message, "model must not be empty");
    }

    #[test]
    fn test_data_error_names_field() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    events[0].inputTokens: invalid value: integer `-5`, expected u64 \
                    at line 1 column 120";
        let field = data_error_field(text).unwrap();
        assert_eq!(field.path, "events.0.inputTokens");
        assert_eq!(
            field.message,
            "events.0.inputTokens: invalid value: integer `-5`, expected u64"
        );
    }

    #[test]
    fn test_data_error_missing_field_appended_to_path() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    events[2]: missing field `model` at line 1 column 80";
        assert_eq!(data_error_field(text).unwrap().path, "events.2.model");

        let text = "Failed to deserialize the JSON body into the target type: \
                    missing field `events` at line 1 column 2";
        assert_eq!(data_error_field(text).unwrap().path, "events");
    }

    #[test]
    fn test_data_error_without_field_is_none() {
        let text = "Failed to deserialize the JSON body into the target type: \
                    invalid type: sequence, expected struct BatchEventRequest at line 1 column 0";
        assert!(data_error_field(text).is_none());
    }

    #[test]
    fn test_empty_batch_error_on_events_field() {
        let batch = BatchEventRequest { events: vec![] };
        let errors = batch.validate().unwrap_err();
        let details = flatten_validation_errors(&errors);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].path, "events");
        assert_eq!(
            details[0].message,
            "events must contain between 1 and 500 items"
        );
    }
}
