use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tracing::error;

use kindred_types::api::{ErrorBody, QuotaSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("content must be between {min} and {max} characters")]
    LengthOutOfRange { min: usize, max: usize },

    #[error("a channel query parameter is required")]
    MissingChannel,

    #[error("not a member of this circle")]
    Forbidden,

    #[error("not a member of this circle")]
    NotMember,

    #[error("only members of the circle can report")]
    NotAllowed,

    #[error("you cannot report yourself")]
    SelfReport,

    #[error("you cannot block yourself")]
    SelfBlock,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no circle with free capacity, try again")]
    CircleFull,

    #[error("this circle is no longer active")]
    CircleClosed,

    #[error("you already responded to this letter")]
    DuplicateResponse,

    #[error("daily message limit reached")]
    QuotaExceeded(QuotaSnapshot),

    #[error("storage backend unavailable")]
    Unavailable(#[source] anyhow::Error),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::LengthOutOfRange { .. } => "LENGTH_OUT_OF_RANGE",
            Self::MissingChannel => "MISSING_CHANNEL",
            Self::Forbidden => "FORBIDDEN",
            Self::NotMember => "NOT_MEMBER",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::SelfReport => "SELF_REPORT",
            Self::SelfBlock => "SELF_BLOCK",
            Self::NotFound(_) => "NOT_FOUND",
            Self::CircleFull => "CIRCLE_FULL",
            Self::CircleClosed => "CIRCLE_CLOSED",
            Self::DuplicateResponse => "DUPLICATE_RESPONSE",
            Self::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Self::Unavailable(_) => "BACKEND_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_)
            | Self::LengthOutOfRange { .. }
            | Self::MissingChannel
            | Self::SelfReport
            | Self::SelfBlock => StatusCode::BAD_REQUEST,
            Self::Forbidden | Self::NotMember | Self::NotAllowed => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CircleFull | Self::CircleClosed | Self::DuplicateResponse => StatusCode::CONFLICT,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Storage detail stays in the logs, never in the body.
        match &self {
            Self::Internal(e) => error!("Request failed: {:#}", e),
            Self::Unavailable(e) => error!("Storage unavailable: {:#}", e),
            _ => {}
        }

        let status = self.status();
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            quota: match self {
                Self::QuotaExceeded(snapshot) => Some(snapshot),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejection is an [`ApiError`], so malformed bodies
/// get the same error shape as everything else.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::InvalidPayload(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` extractor with [`ApiError`] rejections.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    Path<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::InvalidPayload(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query` extractor with [`ApiError`] rejections.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::InvalidPayload(rejection.body_text()))?;
        Ok(Self(value))
    }
}
