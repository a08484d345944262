//! Extractors that report rejected input through [`AppError`].
//!
//! Axum's stock `Json` and `Query` reject with plain-text bodies and a mix of
//! 400/415/422 codes. Handlers use these wrappers instead so that every
//! shape violation is a 422 carrying the standard error envelope.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::AppError;

/// JSON request body
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

/// Query string parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Params(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    let reason = match &rejection {
        JsonRejection::JsonDataError(_) => "body does not match the expected shape",
        JsonRejection::JsonSyntaxError(_) => "body is not valid JSON",
        JsonRejection::MissingJsonContentType(_) => "expected an application/json body",
        _ => "body could not be read",
    };
    AppError::validation(
        vec![json!({"location": "body", "error": rejection.body_text()})],
        reason,
    )
}

fn query_rejection(rejection: QueryRejection) -> AppError {
    AppError::validation(
        vec![json!({"location": "query", "error": rejection.body_text()})],
        "query string does not match the expected shape",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Card {
        number: String,
    }

    #[derive(Debug, Deserialize)]
    struct Filter {
        kind: Option<String>,
    }

    fn json_request(body: &str, content_type: Option<&str>) -> Request {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn payload_accepts_well_formed_json() {
        let req = json_request(r#"{"number":"123456"}"#, Some("application/json"));
        let Payload(card) = Payload::<Card>::from_request(req, &()).await.unwrap();
        assert_eq!(card.number, "123456");
    }

    #[tokio::test]
    async fn payload_missing_field_is_unprocessable() {
        let req = json_request("{}", Some("application/json"));
        let err = Payload::<Card>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn payload_without_content_type_is_unprocessable() {
        let req = json_request(r#"{"number":"123456"}"#, None);
        let err = Payload::<Card>::from_request(req, &()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn params_parse_optional_values() {
        let req = Request::builder().uri("/?kind=x").body(Body::empty()).unwrap();
        let (mut parts, _) = req.into_parts();
        let Params(filter) = Params::<Filter>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(filter.kind.as_deref(), Some("x"));
    }
}
