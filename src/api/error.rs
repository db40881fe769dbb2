use gotcha::axum::http::StatusCode;
use gotcha::axum::response::{IntoResponse, Response};
use gotcha::oas;
use gotcha::{Json, Schematic};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::event_bus::{InvalidEvent, StoreError};

#[derive(Debug, Serialize, Schematic)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => Self::bad_request(e.to_string()),
            StoreError::Unavailable(_) => Self::unavailable(e.to_string()),
            StoreError::Database(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<InvalidEvent> for ApiError {
    fn from(e: InvalidEvent) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl gotcha::Responsible for ApiError {
    fn response() -> oas::Responses {
        let mut response = oas::Responses {
            default: None,
            data: BTreeMap::default(),
        };
        response.data.insert(
            "4XX".to_string(),
            oas::Referenceable::Data(oas::Response {
                description: "Error response".to_string(),
                headers: None,
                content: Some(BTreeMap::from([(
                    "application/json".to_string(),
                    oas::MediaType {
                        schema: Some(oas::Referenceable::Data(
                            ErrorResponse::generate_schema().schema,
                        )),
                        example: None,
                        examples: None,
                        encoding: None,
                    },
                )])),
                links: None,
            }),
        );
        response
    }
}
