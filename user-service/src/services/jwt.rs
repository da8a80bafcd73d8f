use chrono::{Duration, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::JwtConfig;
use crate::models::Role;
use service_core::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Token-type tag carried in access-token claims.
pub const TOKEN_TYPE_ACCESS: &str = "access";

/// Timestamp format for `expiresAt` strings (rendered in the configured
/// fixed offset).
const EXPIRES_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Token issuance and verification.
///
/// Access tokens are HS256-signed JWTs. Refresh tokens are not stored
/// anywhere: they are derived as `hex(HMAC-SHA256(refresh_secret, user_id))`
/// and recomputed on demand, so rotating the refresh secret is the only
/// revocation mechanism.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    refresh_secret: Vec<u8>,
    access_ttl_secs: i64,
    display_offset: FixedOffset,
}

/// Claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user id)
    pub sub: String,
    /// Role(s) granted to the subject
    pub role: RoleClaim,
    /// Token-type tag, always "access"
    pub token_type: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A role claim is a single role or a list of roles; membership checks
/// treat both uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    One(Role),
    Many(Vec<Role>),
}

impl RoleClaim {
    /// True when any held role is in `required`.
    pub fn intersects(&self, required: &[Role]) -> bool {
        match self {
            RoleClaim::One(role) => required.contains(role),
            RoleClaim::Many(roles) => roles.iter().any(|r| required.contains(r)),
        }
    }
}

impl From<Role> for RoleClaim {
    fn from(role: Role) -> Self {
        RoleClaim::One(role)
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, AppError> {
        if config.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT signing secret is not set"
            )));
        }

        if config.refresh_secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Refresh token secret is not set"
            )));
        }

        let display_offset = FixedOffset::east_opt(config.tz_offset_hours * 3600).ok_or_else(
            || AppError::ConfigError(anyhow::anyhow!("Invalid timezone offset")),
        )?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            refresh_secret: config.refresh_secret.as_bytes().to_vec(),
            access_ttl_secs: config.access_ttl_secs,
            display_offset,
        })
    }

    /// Generate a signed access token for a user.
    pub fn generate_access_token(
        &self,
        user_id: &str,
        role: RoleClaim,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_ttl_secs);

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            role,
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(token)
    }

    /// Validate and decode an access token. With `ignore_expiration` an
    /// expired-but-otherwise-valid token is accepted; only the refresh flow
    /// uses that mode.
    pub fn verify_access_token(
        &self,
        token: &str,
        ignore_expiration: bool,
    ) -> Result<AccessTokenClaims, anyhow::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = !ignore_expiration;
        validation.leeway = 0;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow::anyhow!("Invalid access token: {}", e))?;

        if token_data.claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(anyhow::anyhow!("Not an access token"));
        }

        Ok(token_data.claims)
    }

    /// Derive the stateless refresh token for a user: a keyed hash of the
    /// user id under the server refresh secret, as a hex digest. Stable per
    /// (secret, user) with no expiry.
    pub fn derive_refresh_token(&self, user_id: &str) -> Result<String, anyhow::Error> {
        let mut mac = HmacSha256::new_from_slice(&self.refresh_secret)
            .map_err(|e| anyhow::anyhow!("Failed to key refresh-token hash: {}", e))?;
        mac.update(user_id.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Recompute the expected refresh token and compare in constant time.
    pub fn verify_refresh_token(&self, candidate: &str, user_id: &str) -> bool {
        match self.derive_refresh_token(user_id) {
            Ok(expected) => candidate.as_bytes().ct_eq(expected.as_bytes()).into(),
            Err(e) => {
                tracing::error!(error = %e, "Refresh token derivation failed");
                false
            }
        }
    }

    /// Expiry of a token issued now, formatted in the configured fixed
    /// timezone offset.
    pub fn access_token_expires_at(&self) -> String {
        let exp = Utc::now() + Duration::seconds(self.access_ttl_secs);
        exp.with_timezone(&self.display_offset)
            .format(EXPIRES_AT_FORMAT)
            .to_string()
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-signing-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl_secs: 900,
            tz_offset_hours: 7,
        }
    }

    fn service_with(config: JwtConfig) -> JwtService {
        JwtService::new(&config).expect("Failed to create JWT service")
    }

    #[test]
    fn empty_secret_is_config_error() {
        let mut config = test_config();
        config.secret = String::new();
        assert!(matches!(
            JwtService::new(&config),
            Err(AppError::ConfigError(_))
        ));

        let mut config = test_config();
        config.refresh_secret = String::new();
        assert!(matches!(
            JwtService::new(&config),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn access_token_round_trip() {
        let service = service_with(test_config());

        let token = service
            .generate_access_token("user_123", Role::Admin.into())
            .unwrap();
        assert!(!token.is_empty());

        let claims = service.verify_access_token(&token, false).unwrap();
        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS);
        assert!(claims.role.intersects(&[Role::Admin]));
        assert!(!claims.role.intersects(&[Role::User]));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampered_token_rejected() {
        let service = service_with(test_config());
        let token = service
            .generate_access_token("user_123", Role::User.into())
            .unwrap();

        let mut tampered = token.clone();
        tampered.pop();
        assert!(service.verify_access_token(&tampered, false).is_err());
        assert!(service.verify_access_token(&tampered, true).is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let service = service_with(test_config());
        let token = service
            .generate_access_token("user_123", Role::User.into())
            .unwrap();

        let mut other_config = test_config();
        other_config.secret = "another-signing-secret".to_string();
        let other = service_with(other_config);

        assert!(other.verify_access_token(&token, false).is_err());
    }

    #[test]
    fn expired_token_needs_ignore_expiration() {
        let mut config = test_config();
        config.access_ttl_secs = -120;
        let service = service_with(config);

        let token = service
            .generate_access_token("user_123", Role::User.into())
            .unwrap();

        assert!(service.verify_access_token(&token, false).is_err());

        let claims = service
            .verify_access_token(&token, true)
            .expect("expired token should decode with ignore_expiration");
        assert_eq!(claims.sub, "user_123");
    }

    #[test]
    fn refresh_token_is_deterministic() {
        let service = service_with(test_config());

        let first = service.derive_refresh_token("user_123").unwrap();
        let second = service.derive_refresh_token("user_123").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let other = service.derive_refresh_token("user_456").unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn refresh_token_verification() {
        let service = service_with(test_config());
        let token = service.derive_refresh_token("user_123").unwrap();

        assert!(service.verify_refresh_token(&token, "user_123"));
        assert!(!service.verify_refresh_token(&token, "user_456"));
        assert!(!service.verify_refresh_token("deadbeef", "user_123"));
    }

    #[test]
    fn secret_rotation_invalidates_refresh_tokens() {
        let service = service_with(test_config());
        let old_token = service.derive_refresh_token("user_123").unwrap();

        let mut rotated_config = test_config();
        rotated_config.refresh_secret = "rotated-refresh-secret".to_string();
        let rotated = service_with(rotated_config);

        assert!(!rotated.verify_refresh_token(&old_token, "user_123"));
        assert!(rotated.verify_refresh_token(
            &rotated.derive_refresh_token("user_123").unwrap(),
            "user_123"
        ));
    }

    #[test]
    fn role_claim_accepts_list_form() {
        let json = r#"{"sub":"u","role":["USER","ADMIN"],"token_type":"access","iat":0,"exp":0}"#;
        let claims: AccessTokenClaims = serde_json::from_str(json).unwrap();
        assert!(claims.role.intersects(&[Role::Admin]));

        let json = r#"{"sub":"u","role":"USER","token_type":"access","iat":0,"exp":0}"#;
        let claims: AccessTokenClaims = serde_json::from_str(json).unwrap();
        assert!(claims.role.intersects(&[Role::User]));
        assert!(!claims.role.intersects(&[Role::Admin]));
    }

    #[test]
    fn expires_at_uses_display_offset() {
        let service = service_with(test_config());
        let rendered = service.access_token_expires_at();
        assert!(rendered.ends_with("+0700"));

        let parsed = chrono::DateTime::parse_from_str(&rendered, "%Y-%m-%d %H:%M:%S %z")
            .expect("expiresAt should parse back");
        assert!(parsed.timestamp() > Utc::now().timestamp());
    }
}
