//! Bearer token issuance and validation.
//!
//! Tokens are 32 random bytes from the OS generator, base64 encoded. They live
//! only in memory and expire after a fixed validity. Expired tokens are removed
//! lazily on validation and in bulk by a periodic sweep.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// Thread-safe token store backed by DashMap.
#[derive(Debug)]
pub struct TokenStore {
    /// Token to expiry instant.
    tokens: DashMap<String, Instant>,
    validity: Duration,
}

impl TokenStore {
    /// Create an empty store issuing tokens valid for `validity`.
    pub fn new(validity: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            validity,
        }
    }

    /// How long issued tokens stay valid.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a fresh token.
    pub fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = BASE64.encode(bytes);

        self.tokens
            .insert(token.clone(), Instant::now() + self.validity);

        tracing::info!(
            token_id = %fingerprint(&token),
            validity_secs = self.validity.as_secs(),
            "Issued token"
        );
        token
    }

    /// Whether `token` is known and not yet expired.
    ///
    /// An expired token is removed as a side effect.
    pub fn validate(&self, token: &str) -> bool {
        let now = Instant::now();
        let expired = match self.tokens.get(token) {
            Some(expires_at) if *expires_at > now => return true,
            Some(_) => true,
            None => false,
        };

        if expired {
            // Re-check under the entry lock in case the token was reissued.
            self.tokens
                .remove_if(token, |_, expires_at| *expires_at <= now);
            tracing::debug!(token_id = %fingerprint(token), "Removed expired token");
        }
        false
    }

    /// Remove every expired token. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, expires_at| *expires_at > now);
        let removed = before.saturating_sub(self.tokens.len());

        if removed > 0 {
            tracing::info!(removed, remaining = self.tokens.len(), "Swept expired tokens");
        }
        removed
    }

    /// Number of stored tokens, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the store holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Start a background task that sweeps expired tokens every `interval`
    /// until `cancel` fires.
    pub fn start_sweep_task(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Token sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.sweep();
                    }
                }
            }
        })
    }
}

/// Short, log-safe identifier for a token: the first 8 bytes of its SHA-256
/// digest, hex encoded.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}
