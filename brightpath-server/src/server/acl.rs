use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use brightpath_shared::auth::Role;
use brightpath_shared::jwt::JwtClaims;
use percent_encoding::percent_decode_str;

/// Role/route gate that runs after bearer auth. Parents get the parent route
/// table; children only reach routes scoped to their own child id. Ownership
/// of a child by a particular parent is the engine's concern, not the ACL's:
/// the storage layer reports unlinked children as not found.
pub async fn enforce_acl(
    State(_state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let api_prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&api_prefix) {
        tracing::warn!(?segs, "ACL: path outside API scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[api_prefix.len()..];

    let decision = match claims.role {
        Role::Parent => allow_parent(&method, rest),
        Role::Child => allow_child(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_child = ?claims.child_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_parent(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["children"] if *method == Method::GET => Ok(()),
        ["children", "link"] if *method == Method::POST => Ok(()),
        ["modules"] if *method == Method::GET => Ok(()),
        ["children", _, "assignments"] if *method == Method::GET || *method == Method::POST => {
            Ok(())
        }
        ["children", _, "tasks"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["children", _, "xp"] if *method == Method::POST => Ok(()),
        ["children", _, "avatar"] if *method == Method::POST => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["modules"] if *method == Method::GET => Ok(()),
        ["children", child, "assignments"] if *method == Method::GET => {
            ensure_child(claims, child)
        }
        ["children", child, "progress", _] if *method == Method::PUT => {
            ensure_child(claims, child)
        }
        ["children", child, "tasks"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "tasks", _] if *method == Method::PUT => ensure_child(claims, child),
        ["children", child, "xp"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "avatar"] if *method == Method::POST => ensure_child(claims, child),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_child(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.child_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_claims(child: &str) -> JwtClaims {
        JwtClaims {
            sub: "kid".into(),
            jti: "j".into(),
            exp: 0,
            role: Role::Child,
            child_id: Some(child.into()),
        }
    }

    #[test]
    fn parent_table() {
        assert!(allow_parent(&Method::GET, &["children"]).is_ok());
        assert!(allow_parent(&Method::POST, &["children", "link"]).is_ok());
        assert!(allow_parent(&Method::POST, &["children", "alice", "assignments"]).is_ok());
        assert!(allow_parent(&Method::POST, &["children", "alice", "tasks"]).is_ok());
        assert!(allow_parent(&Method::POST, &["children", "alice", "xp"]).is_ok());
        // Children-only operations are closed to parents
        assert!(allow_parent(&Method::PUT, &["children", "alice", "progress", "m1"]).is_err());
        assert!(allow_parent(&Method::PUT, &["children", "alice", "tasks", "1"]).is_err());
        assert!(allow_parent(&Method::DELETE, &["children"]).is_err());
    }

    #[test]
    fn child_table_is_self_scoped() {
        let claims = child_claims("alice");
        assert!(allow_child(&Method::GET, &["modules"], &claims).is_ok());
        assert!(allow_child(&Method::GET, &["children", "alice", "assignments"], &claims).is_ok());
        assert!(
            allow_child(
                &Method::PUT,
                &["children", "alice", "progress", "m1"],
                &claims
            )
            .is_ok()
        );
        assert!(allow_child(&Method::PUT, &["children", "alice", "tasks", "7"], &claims).is_ok());
        // Another child's scope is off limits
        assert!(allow_child(&Method::GET, &["children", "bob", "assignments"], &claims).is_err());
        assert!(allow_child(&Method::POST, &["children", "bob", "xp"], &claims).is_err());
        // Parent-only operations are closed to children
        assert!(allow_child(&Method::GET, &["children"], &claims).is_err());
        assert!(allow_child(&Method::POST, &["children", "link"], &claims).is_err());
        assert!(
            allow_child(
                &Method::POST,
                &["children", "alice", "assignments"],
                &claims
            )
            .is_err()
        );
    }

    #[test]
    fn percent_encoded_child_segment_matches_claim() {
        let claims = child_claims("kid one");
        assert!(
            allow_child(
                &Method::GET,
                &["children", "kid%20one", "assignments"],
                &claims
            )
            .is_ok()
        );
    }
}
