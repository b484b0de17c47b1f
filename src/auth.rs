use crate::error::TokenError;
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// The set of bearer tokens a deployment accepts. LogCar has no concept of
/// users or applications (those belonged to the teacher's multi-tenant
/// permission model) — every valid token can exercise the full `/records`
/// surface, the same way the storage engine itself draws no distinction
/// between callers (spec §4.7 scopes access by deployment, not by caller).
#[derive(Clone, Default)]
pub struct ApiTokens(pub Arc<Vec<String>>);

/// Proof that a request carried one of the configured tokens. Carried over
/// from the teacher's `AuthenticatedUser` extractor, stripped of the
/// per-user/per-app lookup this crate has no use for.
pub struct AuthenticatedCaller;

impl FromRequest for AuthenticatedCaller {
    type Error = TokenError;
    type Future = BoxFuture<'static, actix_web::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req.headers().get("Authorization").cloned();
        let tokens = req.app_data::<web::Data<ApiTokens>>().cloned();

        async move {
            let Some(Ok(token)) = token.map(|t| t.to_str().map(ToOwned::to_owned)) else {
                return Err(TokenError::MissingToken);
            };

            let Some(token) = token.strip_prefix("Bearer ") else {
                return Err(TokenError::InvalidToken);
            };

            let allowed = tokens.map(|t| t.0.iter().any(|t| t == token)).unwrap_or(false);
            if allowed {
                Ok(AuthenticatedCaller)
            } else {
                Err(TokenError::InvalidToken)
            }
        }
        .boxed()
    }
}
