//! Caller identity extraction.
//!
//! Authentication happens at the gateway, which forwards the verified user id
//! in [`USER_ID_HEADER`]. Handlers that take a [`User`] reject requests
//! without it.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
}

impl User {
    fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
        let raw = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or(AppError::Unauthorized)?
            .to_str()
            .map_err(|_| AppError::Unauthorized)?;
        let id = Uuid::parse_str(raw.trim()).map_err(|_| AppError::Unauthorized)?;
        Ok(User { id })
    }
}

impl FromRequest for User {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req).map_err(Error::from))
    }
}
