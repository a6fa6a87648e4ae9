//! Session Creation Guard
//!
//! Decides whether an HTTP caller may create sessions. Identity lives with
//! an external auth provider; this server only checks the JWT that provider
//! issued (`Authorization: Bearer` header or `session` cookie).
//! With no key configured the guard lets everyone through.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// Cookie carrying the token when no bearer header is sent.
pub const SESSION_COOKIE: &str = "session";

/// Salt mixed into caller fingerprints.
const CALLER_SALT: &[u8] = b"huruf-caller:";

/// Where session creators' tokens come from.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Required `iss` claim, if any.
    pub issuer: Option<String>,
    /// Required `aud` claim, if any.
    pub audience: Option<String>,
    /// RS256 public key (PEM). Takes precedence over `secret`.
    pub public_key_pem: Option<String>,
    /// HS256 shared secret.
    pub secret: Option<String>,
    /// Accept expired tokens. Local development only.
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Read `AUTH_*` environment variables. Blank values count as unset.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            issuer: var("AUTH_ISSUER"),
            audience: var("AUTH_AUDIENCE"),
            public_key_pem: var("AUTH_PUBLIC_KEY_PEM"),
            secret: var("AUTH_SECRET"),
            skip_expiry: matches!(var("AUTH_SKIP_EXPIRY").as_deref(), Some("true" | "1")),
        }
    }

    /// Whether a verification key is present.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// The claims a creator token must carry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatorClaims {
    /// Provider-side user id.
    pub sub: String,
}

impl CreatorClaims {
    /// Short salted fingerprint of `sub`, safe to log.
    pub fn caller_id(&self) -> String {
        let digest = Sha256::new()
            .chain_update(CALLER_SALT)
            .chain_update(self.sub.as_bytes())
            .finalize();
        hex::encode(&digest[..8])
    }
}

/// Reasons a creator is turned away.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer header or session cookie.
    #[error("missing token")]
    MissingToken,
    /// Not a decodable JWT.
    #[error("malformed token")]
    Malformed,
    /// Signature does not verify against the configured key.
    #[error("bad signature")]
    BadSignature,
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// `iss` differs from the configured issuer.
    #[error("wrong issuer")]
    WrongIssuer,
    /// `aud` differs from the configured audience.
    #[error("wrong audience")]
    WrongAudience,
    /// `sub` is empty.
    #[error("token has no subject")]
    MissingSubject,
    /// Configured key could not be parsed.
    #[error("unusable verification key: {0}")]
    InvalidKey(String),
    /// Any other decoding failure.
    #[error("token rejected: {0}")]
    Rejected(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::InvalidIssuer => AuthError::WrongIssuer,
            ErrorKind::InvalidAudience => AuthError::WrongAudience,
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::Malformed
            }
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => AuthError::InvalidKey(err.to_string()),
            _ => AuthError::Rejected(err.to_string()),
        }
    }
}

// =============================================================================
// TOKEN EXTRACTION
// =============================================================================

/// Pull a token out of an `Authorization` header or `Cookie` header.
///
/// The bearer header wins when both are present.
pub fn extract_token(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    if let Some(token) = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    cookie?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

// =============================================================================
// GUARDS
// =============================================================================

/// Who created a session, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Validated token holder, by fingerprint.
    User(String),
    /// Open guard, no identity.
    Anonymous,
}

/// Authorization check for session creation.
pub trait CreationGuard: Send + Sync {
    /// Accept or reject a caller presenting `token`.
    fn authorize(&self, token: Option<&str>) -> Result<Caller, AuthError>;
}

/// Accepts callers holding a valid JWT.
pub struct JwtGuard {
    key: DecodingKey,
    validation: Validation,
}

impl JwtGuard {
    /// Build the decoding key and validation rules once.
    ///
    /// RS256 when a PEM key is set, HS256 with the secret otherwise.
    pub fn new(config: AuthConfig) -> Result<Self, AuthError> {
        let (key, algorithm) = match (&config.public_key_pem, &config.secret) {
            (Some(pem), _) => (DecodingKey::from_rsa_pem(pem.as_bytes())?, Algorithm::RS256),
            (None, Some(secret)) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
            (None, None) => return Err(AuthError::InvalidKey("no key configured".into())),
        };

        let mut validation = Validation::new(algorithm);
        // `exp` is checked when present, never required
        validation.required_spec_claims = HashSet::new();
        validation.leeway = 0;
        validation.validate_exp = !config.skip_expiry;
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self { key, validation })
    }

    /// Decode and check `token`.
    pub fn verify(&self, token: &str) -> Result<CreatorClaims, AuthError> {
        let claims = decode::<CreatorClaims>(token, &self.key, &self.validation)?.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(claims)
    }
}

impl CreationGuard for JwtGuard {
    fn authorize(&self, token: Option<&str>) -> Result<Caller, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        Ok(Caller::User(self.verify(token)?.caller_id()))
    }
}

/// Accepts everyone. Used when no key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGuard;

impl CreationGuard for OpenGuard {
    fn authorize(&self, _token: Option<&str>) -> Result<Caller, AuthError> {
        Ok(Caller::Anonymous)
    }
}

/// Guard for a configuration: JWT when a key is set, open otherwise.
pub fn guard_for(config: AuthConfig) -> Result<Arc<dyn CreationGuard>, AuthError> {
    if config.is_configured() {
        Ok(Arc::new(JwtGuard::new(config)?))
    } else {
        warn!("no AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set, session creation is open to anyone");
        Ok(Arc::new(OpenGuard))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    const SECRET: &str = "test-secret-key-256-bits-long!!";

    fn now_secs() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    fn sign(claims: &Value, secret: &str) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims() -> Value {
        json!({
            "sub": "user123",
            "exp": now_secs() + 3600,
            "iss": "test-issuer",
            "aud": "test-audience",
        })
    }

    fn guard(config: AuthConfig) -> JwtGuard {
        JwtGuard::new(AuthConfig {
            secret: Some(SECRET.into()),
            ..config
        })
        .unwrap()
    }

    #[test]
    fn test_valid_token_accepted() {
        let verified = guard(AuthConfig::default()).verify(&sign(&claims(), SECRET)).unwrap();
        assert_eq!(verified.sub, "user123");
    }

    #[test]
    fn test_token_without_exp_accepted() {
        let token = sign(&json!({"sub": "user123"}), SECRET);
        assert!(guard(AuthConfig::default()).verify(&token).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut expired = claims();
        expired["exp"] = json!(1);
        let token = sign(&expired, SECRET);

        assert!(matches!(guard(AuthConfig::default()).verify(&token), Err(AuthError::Expired)));

        let lenient = guard(AuthConfig {
            skip_expiry: true,
            ..Default::default()
        });
        assert!(lenient.verify(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(&claims(), "another-secret-key-entirely!!");
        assert!(matches!(guard(AuthConfig::default()).verify(&token), Err(AuthError::BadSignature)));
    }

    #[test]
    fn test_blank_subject_rejected() {
        let mut blank = claims();
        blank["sub"] = json!("  ");
        let token = sign(&blank, SECRET);
        assert!(matches!(guard(AuthConfig::default()).verify(&token), Err(AuthError::MissingSubject)));
    }

    #[test]
    fn test_issuer_and_audience_checked() {
        let token = sign(&claims(), SECRET);

        let issuer = guard(AuthConfig {
            issuer: Some("someone-else".into()),
            ..Default::default()
        });
        assert!(matches!(issuer.verify(&token), Err(AuthError::WrongIssuer)));

        let audience = guard(AuthConfig {
            audience: Some("other-app".into()),
            ..Default::default()
        });
        assert!(matches!(audience.verify(&token), Err(AuthError::WrongAudience)));

        let matching = guard(AuthConfig {
            issuer: Some("test-issuer".into()),
            audience: Some("test-audience".into()),
            ..Default::default()
        });
        assert!(matching.verify(&token).is_ok());
    }

    #[test]
    fn test_caller_id_is_stable_fingerprint() {
        let a = CreatorClaims { sub: "user123".into() };
        let b = CreatorClaims { sub: "user456".into() };

        assert_eq!(a.caller_id(), a.caller_id());
        assert_ne!(a.caller_id(), b.caller_id());
        assert_eq!(a.caller_id().len(), 16);
        assert!(!a.caller_id().contains("user"));
    }

    #[test]
    fn test_bad_pem_rejected_at_startup() {
        let result = JwtGuard::new(AuthConfig {
            public_key_pem: Some("not a key".into()),
            ..Default::default()
        });
        assert!(matches!(result, Err(AuthError::InvalidKey(_))));
    }

    #[test]
    fn test_extract_token_sources() {
        assert_eq!(extract_token(Some("Bearer abc.def.ghi"), None).as_deref(), Some("abc.def.ghi"));
        assert_eq!(
            extract_token(None, Some("theme=dark; session=tok123; lang=ar")).as_deref(),
            Some("tok123")
        );
        assert_eq!(
            extract_token(Some("Bearer header"), Some("session=cookie")).as_deref(),
            Some("header")
        );
        assert_eq!(extract_token(Some("Basic dXNlcjpwYXNz"), None), None);
        assert_eq!(extract_token(Some("Bearer "), Some("session=")), None);
        assert_eq!(extract_token(None, None), None);
    }

    #[test]
    fn test_jwt_guard() {
        let guard = guard(AuthConfig::default());
        let token = sign(&claims(), SECRET);

        assert!(matches!(guard.authorize(Some(&token)), Ok(Caller::User(_))));
        assert!(matches!(guard.authorize(None), Err(AuthError::MissingToken)));
        assert!(matches!(guard.authorize(Some("garbage")), Err(AuthError::Malformed)));
    }

    #[test]
    fn test_unconfigured_guard_is_open() {
        let guard = guard_for(AuthConfig::default()).unwrap();
        assert_eq!(guard.authorize(None).unwrap(), Caller::Anonymous);
    }
}
