use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Identity of the operator, taken from `x-admin-actor` when present.
#[derive(Clone, Debug)]
pub struct AdminActor(pub Option<String>);

/// Shared-secret guard for administrative and webhook routes. With no
/// secret configured every request is rejected.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.admin_secret.as_deref() else {
        tracing::warn!("Administrative request rejected: ADMIN_SECRET is not configured");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let provided = req
        .headers()
        .get(ADMIN_SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    if !provided.is_some_and(|p| constant_time_eq(p.as_bytes(), expected.as_bytes())) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let actor = req
        .headers()
        .get("x-admin-actor")
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    req.extensions_mut().insert(AdminActor(actor));

    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }
}
