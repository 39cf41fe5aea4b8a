//! Media credential minting
//!
//! Issues the short-lived, channel-bound tokens the external RTC
//! provider requires to join a channel. The signing secret is held
//! server-side only; clients obtain credentials through the API
//! surface, never by signing locally.

use crate::domain::shared::error::SignalingError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ChannelName, UserId};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Role the credential grants inside the media channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaRole {
    /// May publish and subscribe
    Publisher,
    /// May only subscribe
    Subscriber,
}

impl MediaRole {
    pub fn as_str(&self) -> &str {
        match self {
            MediaRole::Publisher => "publisher",
            MediaRole::Subscriber => "subscriber",
        }
    }
}

/// Signed claims bound into a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaClaims {
    /// Media provider app identifier
    pub app_id: String,
    /// Channel the credential is valid for
    pub channel_name: String,
    /// Subject user
    pub uid: UserId,
    pub role: MediaRole,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl MediaClaims {
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// A minted credential plus the descriptor fields a client needs to
/// hand the media provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCredential {
    pub token: String,
    pub app_id: String,
    pub channel_name: ChannelName,
    pub uid: UserId,
    pub role: MediaRole,
    pub expires_at: DateTime<Utc>,
}

/// Port the orchestrator mints through. Server-side this is the
/// `CredentialMinter` itself; a client deployment substitutes an HTTP
/// adapter against the credential endpoint so the secret never leaves
/// the server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(
        &self,
        channel: &ChannelName,
        uid: &UserId,
        role: MediaRole,
    ) -> Result<MediaCredential>;
}

/// Server-side credential minter
///
/// Token layout: `base64url(claims json) . hex(hmac-sha256)` over the
/// encoded claims, keyed by the server secret. Unforgeable without the
/// secret; rejected on expiry or channel mismatch.
pub struct CredentialMinter {
    app_id: String,
    secret: String,
    default_ttl: Duration,
}

impl CredentialMinter {
    pub fn new(app_id: String, secret: String, default_ttl_secs: i64) -> Result<Self> {
        if app_id.is_empty() {
            return Err(SignalingError::ValidationError(
                "media app id must not be empty".to_string(),
            ));
        }
        if secret.len() < 16 {
            return Err(SignalingError::ValidationError(
                "credential secret must be at least 16 bytes".to_string(),
            ));
        }
        if default_ttl_secs <= 0 {
            return Err(SignalingError::ValidationError(
                "credential ttl must be positive".to_string(),
            ));
        }
        Ok(Self {
            app_id,
            secret,
            default_ttl: Duration::seconds(default_ttl_secs),
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Mint a credential binding (app id, channel, uid, role, expiry).
    /// `ttl_seconds` should be scoped to the expected call lifetime.
    pub fn mint(
        &self,
        channel: &ChannelName,
        uid: &UserId,
        role: MediaRole,
        ttl_seconds: i64,
    ) -> Result<MediaCredential> {
        if ttl_seconds <= 0 {
            return Err(SignalingError::ValidationError(
                "credential ttl must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds);
        let claims = MediaClaims {
            app_id: self.app_id.clone(),
            channel_name: channel.as_str().to_string(),
            uid: *uid,
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| SignalingError::MintFailure(format!("claims encoding: {}", e)))?;
        let encoded = URL_SAFE_NO_PAD.encode(payload);
        let signature = self.sign(encoded.as_bytes())?;

        Ok(MediaCredential {
            token: format!("{}.{}", encoded, signature),
            app_id: self.app_id.clone(),
            channel_name: channel.clone(),
            uid: *uid,
            role,
            expires_at,
        })
    }

    /// Provider-side check: signature, expiry and channel binding
    pub fn verify(&self, token: &str, channel: &ChannelName) -> Result<MediaClaims> {
        let (encoded, signature) = token.split_once('.').ok_or_else(|| {
            SignalingError::Unauthorized("malformed credential".to_string())
        })?;

        let signature = hex::decode(signature)
            .map_err(|_| SignalingError::Unauthorized("malformed credential".to_string()))?;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SignalingError::MintFailure(format!("hmac init: {}", e)))?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).map_err(|_| {
            SignalingError::Unauthorized("credential signature mismatch".to_string())
        })?;

        let payload = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SignalingError::Unauthorized("malformed credential".to_string()))?;
        let claims: MediaClaims = serde_json::from_slice(&payload)
            .map_err(|_| SignalingError::Unauthorized("malformed credential".to_string()))?;

        if claims.is_expired() {
            return Err(SignalingError::Unauthorized("credential expired".to_string()));
        }
        if claims.channel_name != channel.as_str() {
            return Err(SignalingError::Unauthorized(
                "credential bound to another channel".to_string(),
            ));
        }

        Ok(claims)
    }

    fn sign(&self, data: &[u8]) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SignalingError::MintFailure(format!("hmac init: {}", e)))?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl CredentialIssuer for CredentialMinter {
    async fn issue(
        &self,
        channel: &ChannelName,
        uid: &UserId,
        role: MediaRole,
    ) -> Result<MediaCredential> {
        self.mint(channel, uid, role, self.default_ttl.num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> CredentialMinter {
        CredentialMinter::new(
            "test-app".to_string(),
            "0123456789abcdef0123456789abcdef".to_string(),
            7200,
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_weak_configuration() {
        assert!(CredentialMinter::new("".to_string(), "x".repeat(32), 60).is_err());
        assert!(CredentialMinter::new("app".to_string(), "short".to_string(), 60).is_err());
        assert!(CredentialMinter::new("app".to_string(), "x".repeat(32), 0).is_err());
    }

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let minter = minter();
        let channel = ChannelName::generate();
        let uid = UserId::new();

        let credential = minter
            .mint(&channel, &uid, MediaRole::Publisher, 600)
            .unwrap();
        assert_eq!(credential.app_id, "test-app");
        assert_eq!(credential.channel_name, channel);

        let claims = minter.verify(&credential.token, &channel).unwrap();
        assert_eq!(claims.uid, uid);
        assert_eq!(claims.role, MediaRole::Publisher);
        assert_eq!(claims.channel_name, channel.as_str());
    }

    #[test]
    fn test_verify_rejects_expired() {
        let minter = minter();
        let channel = ChannelName::generate();
        let uid = UserId::new();

        // Sign backdated claims directly; mint() refuses non-positive ttls
        let now = Utc::now();
        let claims = MediaClaims {
            app_id: "test-app".to_string(),
            channel_name: channel.as_str().to_string(),
            uid,
            role: MediaRole::Publisher,
            iat: (now - Duration::seconds(120)).timestamp(),
            exp: (now - Duration::seconds(60)).timestamp(),
        };
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let signature = minter.sign(encoded.as_bytes()).unwrap();
        let token = format!("{}.{}", encoded, signature);

        let err = minter.verify(&token, &channel).unwrap_err();
        assert!(matches!(err, SignalingError::Unauthorized(_)));
    }

    #[test]
    fn test_verify_rejects_channel_mismatch() {
        let minter = minter();
        let channel = ChannelName::generate();
        let other = ChannelName::generate();

        let credential = minter
            .mint(&channel, &UserId::new(), MediaRole::Publisher, 600)
            .unwrap();
        let err = minter.verify(&credential.token, &other).unwrap_err();
        assert!(matches!(err, SignalingError::Unauthorized(_)));
    }

    #[test]
    fn test_verify_rejects_tampered_token() {
        let minter = minter();
        let channel = ChannelName::generate();

        let credential = minter
            .mint(&channel, &UserId::new(), MediaRole::Subscriber, 600)
            .unwrap();

        let mut tampered = credential.token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert!(minter.verify(&tampered, &channel).is_err());
        assert!(minter.verify("not-a-token", &channel).is_err());
    }

    #[tokio::test]
    async fn test_issuer_uses_default_ttl() {
        let minter = minter();
        let channel = ChannelName::generate();

        let credential = minter
            .issue(&channel, &UserId::new(), MediaRole::Publisher)
            .await
            .unwrap();

        let remaining = credential.expires_at - Utc::now();
        assert!(remaining <= Duration::seconds(7200));
        assert!(remaining > Duration::seconds(7100));
    }
}
