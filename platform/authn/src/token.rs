use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::settings::{AuthSettings, DEFAULT_TOKEN_TTL_MINUTES, MAX_TOKEN_TTL_MINUTES};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token issuer mismatch")]
    WrongIssuer,
    #[error("token audience mismatch")]
    WrongAudience,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
            ErrorKind::InvalidAudience => TokenError::WrongAudience,
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Claims carried by a session token.
///
/// `sub` is the primary actor identifier; `UserId` repeats it for clients
/// that look up the custom claim instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(rename = "UserId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "unique_name", default)]
    pub username: String,
    #[serde(default)]
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Actor id from `sub`, or from `UserId` when `sub` is absent.
    pub fn actor_id(&self) -> Option<Uuid> {
        self.sub
            .as_deref()
            .or(self.user_id.as_deref())
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }
}

/// The identity facts a token asserts.
#[derive(Clone, Copy, Debug)]
pub struct TokenSubject<'a> {
    pub actor_id: Uuid,
    pub username: &'a str,
    pub role_label: &'a str,
}

/// Issues and validates HS256 session tokens.
#[derive(Clone)]
pub struct SessionTokens {
    issuer: String,
    audience: String,
    ttl: Duration,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionTokens {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            issuer: settings.jwt_issuer.clone(),
            audience: settings.jwt_audience.clone(),
            ttl: token_ttl(settings.token_ttl_minutes),
            encoding: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &TokenSubject<'_>) -> Result<String, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    /// Issue a token as if minted at `issued_at`.
    pub fn issue_at(
        &self,
        subject: &TokenSubject<'_>,
        issued_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Signing("token expiry out of range".into()))?;
        let actor_id = subject.actor_id.to_string();
        let claims = SessionClaims {
            sub: Some(actor_id.clone()),
            user_id: Some(actor_id),
            username: subject.username.to_string(),
            role: subject.role_label.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Verify signature, issuer, audience and expiry (no leeway).
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Boundary form of [`SessionTokens::decode`]: any failure is `None`.
    pub fn validate(&self, token: &str) -> Option<SessionClaims> {
        match self.decode(token) {
            Ok(claims) => Some(claims),
            Err(err) => {
                tracing::debug!(error = %err, "session token rejected");
                None
            }
        }
    }
}

fn token_ttl(minutes: i64) -> Duration {
    let minutes = if (1..=MAX_TOKEN_TTL_MINUTES).contains(&minutes) {
        minutes
    } else {
        tracing::warn!(minutes, "token lifetime out of range; using default");
        DEFAULT_TOKEN_TTL_MINUTES
    };
    Duration::try_minutes(minutes).unwrap_or_else(|| Duration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> AuthSettings {
        AuthSettings {
            jwt_secret: secret.into(),
            token_ttl_minutes: 30,
            ..AuthSettings::default()
        }
    }

    fn subject(actor_id: Uuid) -> TokenSubject<'static> {
        TokenSubject {
            actor_id,
            username: "dr.house",
            role_label: "Doctor",
        }
    }

    #[test]
    fn issued_token_validates_with_same_actor() {
        let tokens = SessionTokens::new(&settings("secret-a"));
        let actor_id = Uuid::new_v4();
        let token = tokens.issue(&subject(actor_id)).unwrap();
        let claims = tokens.validate(&token).expect("token should validate");
        assert_eq!(claims.actor_id(), Some(actor_id));
        assert_eq!(claims.username, "dr.house");
        assert_eq!(claims.role, "Doctor");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn out_of_range_lifetime_never_panics() {
        let tokens = SessionTokens::new(&AuthSettings {
            token_ttl_minutes: i64::MAX,
            ..AuthSettings::default()
        });
        assert_eq!(tokens.ttl(), Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES));
    }

    #[test]
    fn overflowing_expiry_is_an_error() {
        let tokens = SessionTokens::new(&settings("secret-a"));
        let result = tokens.issue_at(&subject(Uuid::new_v4()), DateTime::<Utc>::MAX_UTC);
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn expired_token_is_invalid() {
        let tokens = SessionTokens::new(&settings("secret-a"));
        let issued = Utc::now() - Duration::minutes(31);
        let token = tokens.issue_at(&subject(Uuid::new_v4()), issued).unwrap();
        assert_eq!(tokens.decode(&token), Err(TokenError::Expired));
        assert!(tokens.validate(&token).is_none());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = SessionTokens::new(&settings("secret-a"));
        let theirs = SessionTokens::new(&settings("secret-b"));
        let token = theirs.issue(&subject(Uuid::new_v4())).unwrap();
        assert_eq!(ours.decode(&token), Err(TokenError::BadSignature));
        assert!(ours.validate(&token).is_none());
    }

    #[test]
    fn issuer_and_audience_must_match_exactly() {
        let ours = SessionTokens::new(&settings("shared"));
        let other_issuer = SessionTokens::new(&AuthSettings {
            jwt_issuer: "someone-else".into(),
            ..settings("shared")
        });
        let other_audience = SessionTokens::new(&AuthSettings {
            jwt_audience: "another-app".into(),
            ..settings("shared")
        });
        let token = other_issuer.issue(&subject(Uuid::new_v4())).unwrap();
        assert_eq!(ours.decode(&token), Err(TokenError::WrongIssuer));
        let token = other_audience.issue(&subject(Uuid::new_v4())).unwrap();
        assert_eq!(ours.decode(&token), Err(TokenError::WrongAudience));
    }

    #[test]
    fn garbage_is_invalid_not_a_panic() {
        let tokens = SessionTokens::new(&settings("secret-a"));
        assert!(tokens.validate("").is_none());
        assert!(tokens.validate("not.a.jwt").is_none());
    }

    #[test]
    fn actor_id_falls_back_to_user_id_claim() {
        let actor_id = Uuid::new_v4();
        let claims: SessionClaims = serde_json::from_value(serde_json::json!({
            "UserId": actor_id.to_string(),
            "iss": "warden",
            "aud": "warden-clients",
            "iat": 0,
            "exp": 0,
        }))
        .unwrap();
        assert_eq!(claims.actor_id(), Some(actor_id));

        let claims = SessionClaims {
            sub: Some("not-a-uuid".into()),
            ..claims
        };
        assert_eq!(claims.actor_id(), None);
    }
}
