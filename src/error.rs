use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::forms::FieldErrors;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    form: &'a serde_json::Value,
    errors: &'a FieldErrors,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    /// Anonymous caller on a login-only page; `next` is where to come back to.
    #[error("login required")] Unauthenticated { next: String },
    /// Authenticated but not allowed here; sent to a read-only view instead.
    #[error("not allowed")] Unauthorized { location: String },
    #[error("invalid form")] Validation { form: serde_json::Value, errors: FieldErrors },
    #[error("forbidden")] Forbidden,
    #[error("conflict")] Conflict,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn validation(form: impl Serialize, errors: FieldErrors) -> Self {
        let form = serde_json::to_value(form).unwrap_or(serde_json::Value::Null);
        ApiError::Validation { form, errors }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Internal(msg) => {
                log::error!("storage failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

/// Login entry point carrying the return path. Slashes stay readable, as in
/// `/auth/login/?next=/create/`.
pub fn login_url(next: &str) -> String {
    format!("/auth/login/?next={}", urlencoding::encode(next).replace("%2F", "/"))
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated { .. } | ApiError::Unauthorized { .. } => StatusCode::FOUND,
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Unauthenticated { next } => HttpResponse::Found()
                .insert_header((header::LOCATION, login_url(next)))
                .finish(),
            ApiError::Unauthorized { location } => HttpResponse::Found()
                .insert_header((header::LOCATION, location.as_str()))
                .finish(),
            ApiError::Validation { form, errors } => {
                HttpResponse::BadRequest().json(ValidationBody { form, errors })
            }
            _ => HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_keeps_slashes_and_escapes_query() {
        assert_eq!(login_url("/create/"), "/auth/login/?next=/create/");
        assert_eq!(login_url("/follow/?page=2"), "/auth/login/?next=/follow/%3Fpage%3D2");
    }

    #[test]
    fn redirects_carry_location() {
        let resp = ApiError::Unauthorized { location: "/posts/7/".into() }.error_response();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/posts/7/");
    }
}
