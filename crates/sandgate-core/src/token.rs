//! HMAC bearer tokens carried on the connection URL.
//!
//! The gateway does not issue tokens to end users — an external auth
//! service does, sharing the HMAC secret. The gateway only verifies
//! signature and expiry and extracts the subject.
//!
//! Format: `v1.<hex user_id>.<expiry unix secs>.<hex HMAC-SHA256>`

use crate::error::{GatewayError, GatewayResult};
use ring::hmac;

const TOKEN_VERSION: &str = "v1";

fn signing_input(user_id: &str, expiry: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(user_id.len() + 9);
    data.extend_from_slice(user_id.as_bytes());
    data.push(0);
    data.extend_from_slice(&expiry.to_be_bytes());
    data
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Create a bearer token binding `user_id` to an expiry `ttl_secs` from now.
pub fn create_token(secret: &[u8], user_id: &str, ttl_secs: u64) -> String {
    let expiry = now_secs() + ttl_secs;
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, &signing_input(user_id, expiry));
    format!(
        "{TOKEN_VERSION}.{}.{expiry}.{}",
        hex::encode(user_id.as_bytes()),
        hex::encode(tag.as_ref())
    )
}

/// Verify a bearer token's signature and expiry, returning the subject.
pub fn verify_token(secret: &[u8], token: &str) -> GatewayResult<String> {
    let mut parts = token.split('.');
    let (version, user_hex, expiry_str, sig_hex) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(v), Some(u), Some(e), Some(s), None) => (v, u, e, s),
        _ => return Err(GatewayError::Token("malformed token".into())),
    };

    if version != TOKEN_VERSION {
        return Err(GatewayError::Token(format!(
            "unsupported token version: {version}"
        )));
    }

    let user_bytes = hex::decode(user_hex)
        .map_err(|_| GatewayError::Token("invalid subject encoding".into()))?;
    let user_id = String::from_utf8(user_bytes)
        .map_err(|_| GatewayError::Token("subject is not UTF-8".into()))?;
    let expiry: u64 = expiry_str
        .parse()
        .map_err(|_| GatewayError::Token("invalid expiry".into()))?;
    let sig = hex::decode(sig_hex)
        .map_err(|_| GatewayError::Token("invalid signature encoding".into()))?;

    if now_secs() > expiry {
        return Err(GatewayError::Token("token expired".into()));
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, &signing_input(&user_id, expiry), &sig)
        .map_err(|_| GatewayError::Token("invalid token signature".into()))?;

    Ok(user_id)
}

/// Generate a random shared secret (32 bytes).
pub fn generate_secret() -> Vec<u8> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    let mut secret = vec![0u8; 32];
    rng.fill(&mut secret).expect("RNG failure");
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_verify() {
        let secret = generate_secret();
        let token = create_token(&secret, "user-1", 3600);
        assert_eq!(verify_token(&secret, &token).unwrap(), "user-1");
    }

    #[test]
    fn wrong_secret() {
        let secret1 = generate_secret();
        let secret2 = generate_secret();
        let token = create_token(&secret1, "user-1", 3600);
        assert!(verify_token(&secret2, &token).is_err());
    }

    #[test]
    fn tampered_subject() {
        let secret = generate_secret();
        let token = create_token(&secret, "user-1", 3600);
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = hex::encode(b"user-2");
        parts[1] = &forged;
        assert!(verify_token(&secret, &parts.join(".")).is_err());
    }

    #[test]
    fn tampered_expiry() {
        let secret = generate_secret();
        let token = create_token(&secret, "user-1", 1);
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[2] = "99999999999".into();
        assert!(verify_token(&secret, &parts.join(".")).is_err());
    }

    #[test]
    fn expired_token() {
        let secret = generate_secret();
        // Build a token whose expiry is already in the past.
        let expiry = now_secs() - 10;
        let key = hmac::Key::new(hmac::HMAC_SHA256, &secret);
        let tag = hmac::sign(&key, &signing_input("user-1", expiry));
        let token = format!(
            "v1.{}.{expiry}.{}",
            hex::encode(b"user-1"),
            hex::encode(tag.as_ref())
        );
        assert!(matches!(
            verify_token(&secret, &token),
            Err(GatewayError::Token(msg)) if msg.contains("expired")
        ));
    }

    #[test]
    fn malformed_tokens() {
        let secret = generate_secret();
        for bad in ["", "v1", "v1.zz.10", "v2.aa.10.bb", "not a token at all"] {
            assert!(verify_token(&secret, bad).is_err(), "accepted: {bad}");
        }
    }
}
