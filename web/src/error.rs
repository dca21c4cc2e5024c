use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use entity_api::error::{EntityApiErrorKind, Error as EntityApiError};
use log::*;
use serde_json::json;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(EntityApiError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{}", self.0)
    }
}

// Every failure body has the shape {"error": "<description>"}.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.0.error_kind {
            EntityApiErrorKind::ValidationError(_) => StatusCode::BAD_REQUEST,
            EntityApiErrorKind::RecordNotFound => StatusCode::NOT_FOUND,
            EntityApiErrorKind::SystemError | EntityApiErrorKind::Other => {
                error!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for Error
where
    E: Into<EntityApiError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests_with_their_description() {
        let response = Error::from(EntityApiError::validation(
            "Invalid after timestamp format. Use RFC3339 format.",
        ))
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Invalid after timestamp format. Use RFC3339 format."})
        );
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let response = Error::from(EntityApiError::not_found()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn database_failures_are_internal_errors() {
        let err = sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal("refused".to_string()));
        let response = Error::from(err).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"].is_string());
    }
}
