//! Validated JSON extractor.
//!
//! Deserializes the body and runs `validator` rules on it. Both kinds of
//! failure answer 400 inside the standard response envelope.

use crate::responses::ApiResponse;
use adpulse_core::ErrorResponse;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

/// JSON extractor that validates the deserialized value.
///
/// ```ignore
/// #[derive(Deserialize, Validate)]
/// struct CreateJobRequest {
///     #[validate(length(min = 1))]
///     file_path: String,
/// }
///
/// async fn create_job(ValidatedJson(request): ValidatedJson<CreateJobRequest>) {}
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection type for validated JSON extraction.
#[derive(Debug)]
pub enum ValidatedJsonRejection {
    /// Body missing, not JSON, or of the wrong shape.
    JsonError(JsonRejection),
    /// Deserialized, but a field rule failed.
    ValidationError(ValidationErrors),
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        let error = match self {
            Self::JsonError(rejection) => ErrorResponse {
                code: "INVALID_JSON".to_string(),
                message: format!("Invalid JSON: {}", rejection.body_text()),
                trace_id: None,
            },
            Self::ValidationError(errors) => ErrorResponse {
                code: "VALIDATION_ERROR".to_string(),
                message: describe_validation_errors(&errors),
                trace_id: None,
            },
        };
        (StatusCode::BAD_REQUEST, Json(ApiResponse::<()>::error(error))).into_response()
    }
}

/// Flattens field errors into one message, fields in alphabetical order.
fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, field_errs)| {
            field_errs.iter().map(move |err| {
                err.message.as_ref().map_or_else(
                    || format!("{field}: failed {}", err.code),
                    |message| format!("{field}: {message}"),
                )
            })
        })
        .collect();
    messages.sort();
    format!("Request validation failed: {}", messages.join("; "))
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}
