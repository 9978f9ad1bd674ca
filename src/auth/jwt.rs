//! JWT claims and validation
//!
//! Bearer tokens carry the caller's party in `sub` and the set of parties
//! the token may act as. Write operations check `act_as` against the
//! claimed owner.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Primary party of the caller.
    pub sub: String,
    /// Parties this token is authorised to act as.
    #[serde(default)]
    pub act_as: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn can_act_as(&self, party: &str) -> bool {
        self.sub == party || self.act_as.iter().any(|p| p == party)
    }
}

/// Standalone validation used by HTTP middleware and the WS handshake.
pub fn validate_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data: TokenData<Claims> = decode(token, &decoding_key, &Validation::default())?;
    Ok(token_data.claims)
}

pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl JwtManager {
    pub fn new(secret: &str, expiry_seconds: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        }
    }

    pub fn generate_token(&self, party: &str, act_as: &[String]) -> anyhow::Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiry_seconds as i64);

        let claims = Claims {
            sub: party.to_string(),
            act_as: act_as.to_vec(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> anyhow::Result<Claims> {
        let token_data: TokenData<Claims> =
            decode(token, &self.decoding_key, &Validation::default())?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_roundtrip_with_act_as() {
        let manager = JwtManager::new("test_secret", 3600);
        let token = manager
            .generate_token("alice::12ab", &["alice::12ab".to_string()])
            .unwrap();
        let claims = manager.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "alice::12ab");
        assert!(claims.can_act_as("alice::12ab"));
        assert!(!claims.can_act_as("bob::34cd"));
    }

    #[test]
    fn invalid_secret_rejected() {
        let manager = JwtManager::new("secret_a", 3600);
        let token = manager.generate_token("alice", &[]).unwrap();
        assert!(validate_token(&token, "secret_b").is_err());
        assert!(validate_token(&token, "secret_a").is_ok());
    }
}
