//! Request Extractors
//!
//! Axum extractors for visitor request metadata and the vendor identity used
//! by the dashboard.

use crate::error::ApiError;
use crate::services::RequestMeta;
use crate::AnalyticsApp;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_str = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let ip = header_str("X-Forwarded-For")
            .map(|s| s.split(',').next().unwrap_or(s.as_str()).trim().to_string())
            .or_else(|| header_str("X-Real-IP"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });

        let visitor_cookie = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|h| h.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == crate::client::identity::VISITOR_ID_KEY)
            .map(|(_, value)| value.to_string())
            .filter(|v| !v.is_empty());

        Ok(RequestMeta {
            user_agent: header_str(header::USER_AGENT.as_str()),
            referrer: header_str(header::REFERER.as_str()),
            ip,
            visitor_cookie,
        })
    }
}

/// Claims carried by vendor bearer tokens issued by the storefront's login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorClaims {
    pub sub: String,
    pub business_id: i64,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// The business whose dashboard is being requested.
///
/// An upstream auth layer may insert this into request extensions; otherwise
/// it is read from a `Bearer` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedBusiness {
    pub business_id: i64,
}

#[async_trait]
impl FromRequestParts<Arc<AnalyticsApp>> for AuthenticatedBusiness {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        app: &Arc<AnalyticsApp>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(business) = parts.extensions.get::<AuthenticatedBusiness>() {
            return Ok(*business);
        }

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let config = &app.config;
        let Some(secret) = config.jwt_secret.as_deref() else {
            tracing::error!("JWT_SECRET is not set; dashboard tokens cannot be verified");
            return Err(ApiError::Config("JWT_SECRET not set".into()));
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_audience(&[config.jwt_audience.as_str()]);

        let token_data = decode::<VendorClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;

        Ok(AuthenticatedBusiness {
            business_id: token_data.claims.business_id,
        })
    }
}
