use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use corkboard_types::api::Claims;

const TOKEN_TTL_DAYS: i64 = 30;

/// Sign an HS256 token for `user_id`. Issuance belongs to the identity
/// service; this exists for local tooling and tests.
pub fn issue_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature and expiry. `None` for anything that is not a valid
/// token for a real user.
pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    (!data.claims.sub.is_nil()).then_some(data.claims)
}
