use crate::{cipher::FieldCipher, token::SessionTokens};

pub const DEFAULT_JWT_SECRET: &str = "warden-dev-signing-secret-change-me";
pub const DEFAULT_JWT_ISSUER: &str = "warden";
pub const DEFAULT_JWT_AUDIENCE: &str = "warden-clients";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;
/// One year; longer lifetimes are treated as misconfiguration.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 365;
/// Not safe outside development; persisted ciphertext is only as secret as this key.
pub const DEFAULT_FIELD_CIPHER_KEY: &str = "warden-dev-field-key-change-me";

/// Secrets and token parameters for the identity primitives.
#[derive(Clone, Debug)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub token_ttl_minutes: i64,
    pub field_cipher_key: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.into(),
            jwt_issuer: DEFAULT_JWT_ISSUER.into(),
            jwt_audience: DEFAULT_JWT_AUDIENCE.into(),
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            field_cipher_key: DEFAULT_FIELD_CIPHER_KEY.into(),
        }
    }
}

impl AuthSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let token_ttl_minutes = lookup("AUTH_TOKEN_TTL_MINUTES")
            .and_then(|value| {
                let minutes = value.trim().parse::<i64>().ok();
                let valid = minutes.filter(|m| (1..=MAX_TOKEN_TTL_MINUTES).contains(m));
                if valid.is_none() {
                    tracing::warn!(
                        value = %value.trim(),
                        default = DEFAULT_TOKEN_TTL_MINUTES,
                        "AUTH_TOKEN_TTL_MINUTES out of range; using default"
                    );
                }
                valid
            })
            .unwrap_or(DEFAULT_TOKEN_TTL_MINUTES);
        Self {
            jwt_secret: read("AUTH_JWT_SECRET", DEFAULT_JWT_SECRET),
            jwt_issuer: read("AUTH_JWT_ISSUER", DEFAULT_JWT_ISSUER),
            jwt_audience: read("AUTH_JWT_AUDIENCE", DEFAULT_JWT_AUDIENCE),
            token_ttl_minutes,
            field_cipher_key: read("FIELD_CIPHER_KEY", DEFAULT_FIELD_CIPHER_KEY),
        }
    }

    /// Names of the secrets still at their built-in development values.
    pub fn defaults_in_use(&self) -> Vec<&'static str> {
        let mut defaults = Vec::new();
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            defaults.push("AUTH_JWT_SECRET");
        }
        if self.field_cipher_key == DEFAULT_FIELD_CIPHER_KEY {
            defaults.push("FIELD_CIPHER_KEY");
        }
        defaults
    }

    pub fn warn_on_defaults(&self) {
        for key in self.defaults_in_use() {
            tracing::warn!(key, "using insecure built-in default; set it before production use");
        }
    }

    pub fn session_tokens(&self) -> SessionTokens {
        SessionTokens::new(self)
    }

    pub fn field_cipher(&self) -> FieldCipher {
        FieldCipher::new(&self.field_cipher_key)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_values_fall_back_and_are_flagged() {
        let settings = AuthSettings::from_lookup(lookup(&[]));
        assert_eq!(settings.jwt_issuer, DEFAULT_JWT_ISSUER);
        assert_eq!(settings.token_ttl_minutes, DEFAULT_TOKEN_TTL_MINUTES);
        assert_eq!(
            settings.defaults_in_use(),
            vec!["AUTH_JWT_SECRET", "FIELD_CIPHER_KEY"]
        );
    }

    #[test]
    fn explicit_values_win() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("AUTH_JWT_SECRET", "prod-secret"),
            ("AUTH_JWT_ISSUER", "clinic"),
            ("AUTH_JWT_AUDIENCE", "clinic-web"),
            ("AUTH_TOKEN_TTL_MINUTES", "5"),
            ("FIELD_CIPHER_KEY", "prod-field-key"),
        ]));
        assert_eq!(settings.jwt_secret, "prod-secret");
        assert_eq!(settings.jwt_issuer, "clinic");
        assert_eq!(settings.jwt_audience, "clinic-web");
        assert_eq!(settings.token_ttl_minutes, 5);
        assert!(settings.defaults_in_use().is_empty());
    }

    #[test]
    fn bad_ttl_and_blank_secret_use_defaults() {
        let settings = AuthSettings::from_lookup(lookup(&[
            ("AUTH_JWT_SECRET", "   "),
            ("AUTH_TOKEN_TTL_MINUTES", "-3"),
        ]));
        assert_eq!(settings.jwt_secret, DEFAULT_JWT_SECRET);
        assert_eq!(settings.token_ttl_minutes, DEFAULT_TOKEN_TTL_MINUTES);

        let settings = AuthSettings::from_lookup(lookup(&[("AUTH_TOKEN_TTL_MINUTES", "soon")]));
        assert_eq!(settings.token_ttl_minutes, DEFAULT_TOKEN_TTL_MINUTES);
    }

    #[test]
    fn oversized_ttl_falls_back_to_default() {
        for value in ["9223372036854775807", "525601"] {
            let settings =
                AuthSettings::from_lookup(lookup(&[("AUTH_TOKEN_TTL_MINUTES", value)]));
            assert_eq!(settings.token_ttl_minutes, DEFAULT_TOKEN_TTL_MINUTES);
            assert_eq!(settings.session_tokens().ttl().num_minutes(), DEFAULT_TOKEN_TTL_MINUTES);
        }
        let longest = MAX_TOKEN_TTL_MINUTES.to_string();
        let settings =
            AuthSettings::from_lookup(lookup(&[("AUTH_TOKEN_TTL_MINUTES", longest.as_str())]));
        assert_eq!(settings.token_ttl_minutes, MAX_TOKEN_TTL_MINUTES);
    }
}
