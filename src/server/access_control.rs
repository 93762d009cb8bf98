//! Access-control filter: the per-request authentication and authorization gate.
//!
//! A three-mode state machine keyed on a per-sub-queue bearer claim rather
//! than a single shared secret.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::auth::TokenProvider;
use crate::config::AuthenticationMode;
use crate::domain::restriction::RestrictionBackend;
use crate::error::AppError;
use crate::metrics::AUTH_REJECTED_TOTAL;

use super::AppState;

/// The sub-queue claim (if any) carried by the caller's bearer token,
/// placed in the request's extensions by [`access_control_middleware`]
/// and read back out by handlers via `Extension<RequestContext>`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub claimed_sub_queue: Option<String>,
}

pub struct AccessControl {
    mode: AuthenticationMode,
    token_provider: Arc<TokenProvider>,
    restriction: Arc<dyn RestrictionBackend>,
}

impl AccessControl {
    pub fn new(
        mode: AuthenticationMode,
        token_provider: Arc<TokenProvider>,
        restriction: Arc<dyn RestrictionBackend>,
    ) -> Self {
        Self {
            mode,
            token_provider,
            restriction,
        }
    }

    pub fn mode(&self) -> AuthenticationMode {
        self.mode
    }

    /// Decode and verify the bearer token on an inbound request. Returns
    /// the context to place in request extensions.
    fn extract_context(&self, req: &Request<Body>) -> Result<RequestContext, AppError> {
        let Some(header_value) = req.headers().get(header::AUTHORIZATION) else {
            return Ok(RequestContext::default());
        };
        let header_str = header_value.to_str().map_err(|_| AppError::AuthFormat)?;
        let Some(token) = header_str.strip_prefix("Bearer ") else {
            return Err(AppError::AuthFormat);
        };

        match self.token_provider.verify(token) {
            Ok(sub_queue) => Ok(RequestContext {
                claimed_sub_queue: Some(sub_queue),
            }),
            Err(_) if self.mode == AuthenticationMode::Restricted => Err(AppError::AuthInvalid),
            Err(_) => Ok(RequestContext::default()),
        }
    }

    /// Step 4: the per-operation gate. Looks up whether `target_sub_queue`
    /// is restricted and applies the mode's policy.
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        target_sub_queue: &str,
    ) -> Result<(), AppError> {
        match self.mode {
            AuthenticationMode::None => Ok(()),
            AuthenticationMode::Hybrid => {
                if !self.restriction.is_restricted(target_sub_queue).await? {
                    return Ok(());
                }
                self.require_matching_claim(ctx, target_sub_queue)
            }
            AuthenticationMode::Restricted => self.require_matching_claim(ctx, target_sub_queue),
        }
    }

    fn require_matching_claim(
        &self,
        ctx: &RequestContext,
        target_sub_queue: &str,
    ) -> Result<(), AppError> {
        match &ctx.claimed_sub_queue {
            Some(claimed) if claimed == target_sub_queue => Ok(()),
            Some(_) => {
                AUTH_REJECTED_TOTAL.with_label_values(&["not_authorized"]).inc();
                Err(AppError::NotAuthorized(target_sub_queue.to_string()))
            }
            None => {
                AUTH_REJECTED_TOTAL.with_label_values(&["missing"]).inc();
                Err(AppError::AuthMissing)
            }
        }
    }
}

/// Middleware: decode the bearer token (if any) and place the resulting
/// [`RequestContext`] into request extensions for handlers to consult via
/// [`AccessControl::authorize`].
pub async fn access_control_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = state.access_control.extract_context(&req)?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Middleware guarding administrative endpoints (restriction management,
/// token issuance) with a separate static bearer credential distinct from
/// per-sub-queue tokens.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &state.settings.admin_token else {
        // No administrator credential configured: admin endpoints are
        // open (development-mode fallback).
        return Ok(next.run(req).await);
    };

    let supplied = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match supplied {
        Some(token) if token == expected => Ok(next.run(req).await),
        Some(_) => {
            AUTH_REJECTED_TOTAL.with_label_values(&["admin_invalid"]).inc();
            Err(AppError::AuthInvalid)
        }
        None => {
            AUTH_REJECTED_TOTAL.with_label_values(&["admin_missing"]).inc();
            Err(AppError::AuthMissing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::restriction::MemoryRestrictionBackend;

    fn provider() -> Arc<TokenProvider> {
        Arc::new(TokenProvider::new(&crate::config::TokenConfig {
            secret: Some("test-secret".to_string()),
            default_ttl_seconds: 3600,
        }))
    }

    #[tokio::test]
    async fn none_mode_authorizes_any_target_without_a_token() {
        let ac = AccessControl::new(
            AuthenticationMode::None,
            provider(),
            Arc::new(MemoryRestrictionBackend::new()),
        );
        let ctx = RequestContext::default();
        assert!(ac.authorize(&ctx, "orders").await.is_ok());
    }

    #[tokio::test]
    async fn hybrid_mode_requires_a_matching_token_only_for_restricted_sub_queues() {
        let restriction = Arc::new(MemoryRestrictionBackend::new());
        restriction.add("secure").await.unwrap();
        let ac = AccessControl::new(AuthenticationMode::Hybrid, provider(), restriction);

        let no_token = RequestContext::default();
        assert!(ac.authorize(&no_token, "orders").await.is_ok());
        assert!(matches!(
            ac.authorize(&no_token, "secure").await,
            Err(AppError::AuthMissing)
        ));

        let wrong = RequestContext {
            claimed_sub_queue: Some("other".to_string()),
        };
        assert!(matches!(
            ac.authorize(&wrong, "secure").await,
            Err(AppError::NotAuthorized(_))
        ));

        let right = RequestContext {
            claimed_sub_queue: Some("secure".to_string()),
        };
        assert!(ac.authorize(&right, "secure").await.is_ok());
    }

    #[tokio::test]
    async fn restricted_mode_requires_a_matching_token_for_every_sub_queue() {
        let ac = AccessControl::new(
            AuthenticationMode::Restricted,
            provider(),
            Arc::new(MemoryRestrictionBackend::new()),
        );

        assert!(matches!(
            ac.authorize(&RequestContext::default(), "orders").await,
            Err(AppError::AuthMissing)
        ));

        let right = RequestContext {
            claimed_sub_queue: Some("orders".to_string()),
        };
        assert!(ac.authorize(&right, "orders").await.is_ok());
    }
}
