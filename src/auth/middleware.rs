//! Bearer auth middleware
//!
//! Extracts the party identity from the JWT and inserts it into request
//! extensions. Write handlers call `AuthParty::can_act_as` against the
//! claimed owner before any side effect.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::auth::jwt::validate_token;
use crate::utils::response::AppError;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthParty {
    pub party: String,
    pub act_as: Vec<String>,
}

impl AuthParty {
    pub fn can_act_as(&self, party: &str) -> bool {
        self.party == party || self.act_as.iter().any(|p| p == party)
    }

    pub fn is_operator(&self, operator_party: &str) -> bool {
        self.can_act_as(operator_party)
    }
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(AppError::unauthorized("missing bearer token")),
    };

    let claims = validate_token(token, &state.config.jwt_secret)
        .map_err(|_| AppError::unauthorized("invalid or expired token"))?;

    request.extensions_mut().insert(AuthParty {
        party: claims.sub,
        act_as: claims.act_as,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn act_as_includes_own_party() {
        let auth = AuthParty {
            party: "alice".into(),
            act_as: vec!["desk-a".into()],
        };
        assert!(auth.can_act_as("alice"));
        assert!(auth.can_act_as("desk-a"));
        assert!(!auth.can_act_as("bob"));
    }
}
