//! HS256 access-token validation.
//!
//! Tokens are issued by the identity service and carry a [`Claims`]
//! payload. [`generate_access_token`] exists so tests and operator tooling
//! can mint tokens signed with the same secret. When `JWT_ISSUER` is set,
//! tokens without a matching `iss` claim are rejected.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coursecast_core::types::DbId;

/// JWT claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: DbId,
    /// The user's role name (`"admin"`, `"instructor"`, `"student"`).
    pub role: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier.
    pub jti: String,
    /// Issuing service, checked only when [`JwtConfig::issuer`] is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Configuration for JWT validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret shared with the identity service.
    pub secret: String,
    /// Lifetime of tokens minted by [`generate_access_token`] (default: 15).
    pub access_token_expiry_mins: i64,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
    /// Expected `iss` claim.
    pub issuer: Option<String>,
}

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
const DEFAULT_LEEWAY_SECS: u64 = 60;

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `15`    |
    /// | `JWT_LEEWAY_SECS`        | no       | `60`    |
    /// | `JWT_ISSUER`             | no       | unset   |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let access_token_expiry_mins: i64 = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64");

        let leeway_secs: u64 = std::env::var("JWT_LEEWAY_SECS")
            .unwrap_or_else(|_| DEFAULT_LEEWAY_SECS.to_string())
            .parse()
            .expect("JWT_LEEWAY_SECS must be a valid u64");

        let issuer = std::env::var("JWT_ISSUER")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            secret,
            access_token_expiry_mins,
            leeway_secs,
            issuer,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.leeway = self.leeway_secs;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }
}

/// Mint an HS256 access token for the given user.
pub fn generate_access_token(
    user_id: DbId,
    role: &str,
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        role: role.to_string(),
        exp: now + config.access_token_expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
        iss: config.issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode an access token. Checks signature, expiry within
/// the configured leeway, and the issuer when one is configured.
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &config.validation(),
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursecast_core::types::new_id;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
            leeway_secs: 60,
            issuer: None,
        }
    }

    fn signed(claims: &Claims, config: &JwtConfig) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_expiring_in(secs: i64, iss: Option<&str>) -> Claims {
        let now = chrono::Utc::now().timestamp();
        Claims {
            sub: new_id(),
            role: "student".to_string(),
            exp: now + secs,
            iat: now - 600,
            jti: Uuid::new_v4().to_string(),
            iss: iss.map(str::to_string),
        }
    }

    #[test]
    fn generated_token_validates() {
        let config = test_config();
        let user = new_id();
        let token = generate_access_token(user, "instructor", &config).unwrap();

        let claims = validate_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.role, "instructor");
        assert!(claims.exp > claims.iat);
        assert!(claims.iss.is_none());
    }

    #[test]
    fn expiry_honours_leeway() {
        let config = test_config();
        let just_expired = signed(&claims_expiring_in(-30, None), &config);
        assert!(validate_token(&just_expired, &config).is_ok());

        let strict = JwtConfig {
            leeway_secs: 0,
            ..test_config()
        };
        assert!(validate_token(&just_expired, &strict).is_err());

        let long_expired = signed(&claims_expiring_in(-300, None), &config);
        assert!(validate_token(&long_expired, &config).is_err());
    }

    #[test]
    fn different_secret_fails() {
        let signer = JwtConfig {
            secret: "secret-alpha".to_string(),
            ..test_config()
        };
        let verifier = JwtConfig {
            secret: "secret-bravo".to_string(),
            ..test_config()
        };
        let token = generate_access_token(new_id(), "student", &signer).unwrap();

        assert!(validate_token(&token, &verifier).is_err());
    }

    #[test]
    fn configured_issuer_is_enforced() {
        let config = JwtConfig {
            issuer: Some("coursecast-identity".to_string()),
            ..test_config()
        };

        let minted = generate_access_token(new_id(), "admin", &config).unwrap();
        let claims = validate_token(&minted, &config).unwrap();
        assert_eq!(claims.iss.as_deref(), Some("coursecast-identity"));

        let foreign = signed(&claims_expiring_in(600, Some("someone-else")), &config);
        assert!(validate_token(&foreign, &config).is_err());

        let missing = signed(&claims_expiring_in(600, None), &config);
        assert!(validate_token(&missing, &config).is_err());
    }
}
