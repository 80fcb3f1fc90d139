//! Portal service - read-only access tokens for students, teachers and parents.
//!
//! New tokens are HS256 JWTs whose `jti` points at a `portal_tokens` row, so a
//! token stops working as soon as that row is deactivated. Legacy tokens are
//! opaque UUIDs looked up by their SHA-256 hash; they are still issued on
//! request and still accepted.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, Header, Validation};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::hash_secret,
    models::{
        fee::StudentFeeResponse,
        portal::{
            IssuePortalTokenRequest, IssuedPortalToken, PortalClaims, PortalContext, PortalRole,
            PortalTokenRecord,
        },
    },
    services::fee_service,
    state::PortalKeys,
};

const MAX_TTL_HOURS: i64 = 24 * 366;

const TOKEN_COLUMNS: &str = "id, center_id, role, subject_id";

/// Sign portal claims with the center-independent portal secret.
pub fn sign_claims(keys: &PortalKeys, claims: &PortalClaims) -> Result<String, AppError> {
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &keys.encoding,
    )?)
}

/// Check a JWT's signature and expiry. Revocation is checked separately.
pub fn decode_claims(keys: &PortalKeys, token: &str) -> Option<PortalClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<PortalClaims>(token, &keys.decoding, &validation)
        .ok()
        .map(|data| data.claims)
}

/// Issue a portal token for one subject of a center.
///
/// # Process
///
/// 1. Validate the lifetime (defaults to `PORTAL_TOKEN_TTL_HOURS`)
/// 2. For student and parent tokens, check the student belongs to the center
/// 3. Store the token row and sign the JWT (or mint the legacy UUID) in one transaction
///
/// The token string is only returned here; the database keeps its `jti` or hash.
///
/// # Errors
///
/// - `InvalidRequest`: lifetime out of range
/// - `StudentNotFound`: subject is not a student of this center
/// - `Database`, `Token`: storage or signing failed
pub async fn issue(
    pool: &DbPool,
    keys: &PortalKeys,
    center_id: Uuid,
    request: IssuePortalTokenRequest,
) -> Result<IssuedPortalToken, AppError> {
    let ttl_hours = request.ttl_hours.unwrap_or(keys.default_ttl_hours);
    if !(1..=MAX_TTL_HOURS).contains(&ttl_hours) {
        return Err(AppError::InvalidRequest(format!(
            "ttl_hours must be between 1 and {MAX_TTL_HOURS}"
        )));
    }

    // Parent tokens are scoped to their child's student record
    if request.role != PortalRole::Teacher {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM students WHERE id = $1 AND center_id = $2)",
        )
        .bind(request.subject_id)
        .bind(center_id)
        .fetch_one(pool)
        .await?;

        if !exists {
            return Err(AppError::StudentNotFound);
        }
    }

    let issued_at = Utc::now();
    let expires_at = issued_at + Duration::hours(ttl_hours);

    let mut tx = pool.begin().await?;

    let (id, token, token_kind) = if request.legacy {
        let token = Uuid::new_v4().to_string();

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO portal_tokens (center_id, role, subject_id, token_kind, token_hash, expires_at)
            VALUES ($1, $2, $3, 'legacy', $4, $5)
            RETURNING id
            "#,
        )
        .bind(center_id)
        .bind(request.role.as_str())
        .bind(request.subject_id)
        .bind(hash_secret(&token))
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        (id, token, "legacy")
    } else {
        let jti = Uuid::new_v4();

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO portal_tokens (center_id, role, subject_id, token_kind, jti, expires_at)
            VALUES ($1, $2, $3, 'jwt', $4, $5)
            RETURNING id
            "#,
        )
        .bind(center_id)
        .bind(request.role.as_str())
        .bind(request.subject_id)
        .bind(jti)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        let claims = PortalClaims {
            sub: request.subject_id,
            center_id,
            role: request.role,
            jti,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        (id, sign_claims(keys, &claims)?, "jwt")
    };

    tx.commit().await?;

    tracing::info!(
        %center_id,
        token_id = %id,
        role = %request.role,
        token_kind,
        "portal token issued"
    );

    Ok(IssuedPortalToken {
        success: true,
        id,
        token,
        token_kind: token_kind.to_string(),
        role: request.role,
        subject_id: request.subject_id,
        expires_at,
    })
}

/// Resolve a presented portal token to the identity it grants.
///
/// JWTs are checked first (signature, expiry, then the stored row must still be
/// active). Anything that is not a valid JWT is tried as a legacy token.
///
/// # Errors
///
/// - `InvalidPortalToken`: unknown, expired, or revoked token
pub async fn verify(pool: &DbPool, keys: &PortalKeys, token: &str) -> Result<PortalContext, AppError> {
    let record = match decode_claims(keys, token) {
        Some(claims) => {
            let record = sqlx::query_as::<_, PortalTokenRecord>(&format!(
                "SELECT {TOKEN_COLUMNS} FROM portal_tokens
                 WHERE jti = $1 AND token_kind = 'jwt' AND is_active = true AND expires_at > NOW()"
            ))
            .bind(claims.jti)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::InvalidPortalToken)?;

            if record.center_id != claims.center_id || record.subject_id != claims.sub {
                return Err(AppError::InvalidPortalToken);
            }
            record
        }
        None => sqlx::query_as::<_, PortalTokenRecord>(&format!(
            "SELECT {TOKEN_COLUMNS} FROM portal_tokens
             WHERE token_hash = $1 AND token_kind = 'legacy' AND is_active = true AND expires_at > NOW()"
        ))
        .bind(hash_secret(token))
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::InvalidPortalToken)?,
    };

    let role = record
        .role
        .parse::<PortalRole>()
        .map_err(|_| AppError::InvalidPortalToken)?;

    Ok(PortalContext {
        token_id: record.id,
        center_id: record.center_id,
        role,
        subject_id: record.subject_id,
    })
}

/// Deactivate a portal token of this center. Works for both token kinds.
pub async fn revoke(pool: &DbPool, center_id: Uuid, token_id: Uuid) -> Result<(), AppError> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE portal_tokens
        SET is_active = false
        WHERE id = $1 AND center_id = $2
        RETURNING id
        "#,
    )
    .bind(token_id)
    .bind(center_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::PortalTokenNotFound)?;

    tracing::info!(%center_id, %token_id, "portal token revoked");

    Ok(())
}

/// Fees visible to a portal session.
///
/// Student and parent tokens see the subject student's fees. Teacher tokens
/// have no fee view.
pub async fn portal_fees(
    pool: &DbPool,
    context: &PortalContext,
) -> Result<Vec<StudentFeeResponse>, AppError> {
    match context.role {
        PortalRole::Student | PortalRole::Parent => {
            fee_service::list_student_fees(pool, context.center_id, context.subject_id).await
        }
        PortalRole::Teacher => Err(AppError::InvalidPortalToken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> PortalKeys {
        PortalKeys::from_secret("test-portal-secret", 24)
    }

    fn claims(exp_offset_secs: i64) -> PortalClaims {
        let now = Utc::now().timestamp();
        PortalClaims {
            sub: Uuid::new_v4(),
            center_id: Uuid::new_v4(),
            role: PortalRole::Parent,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + exp_offset_secs,
        }
    }

    #[test]
    fn signed_claims_decode_back() {
        let keys = keys();
        let claims = claims(3600);

        let token = sign_claims(&keys, &claims).unwrap();

        assert_eq!(decode_claims(&keys, &token), Some(claims));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = keys();
        let token = sign_claims(&keys, &claims(-60)).unwrap();

        assert_eq!(decode_claims(&keys, &token), None);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let other = PortalKeys::from_secret("another-secret", 24);
        let token = sign_claims(&other, &claims(3600)).unwrap();

        assert_eq!(decode_claims(&keys(), &token), None);
    }

    #[test]
    fn legacy_uuid_is_not_a_jwt() {
        assert_eq!(decode_claims(&keys(), &Uuid::new_v4().to_string()), None);
    }

    #[test]
    fn role_serializes_lowercase_in_claims() {
        let value = serde_json::to_value(claims(3600)).unwrap();
        assert_eq!(value["role"], "parent");
    }
}
