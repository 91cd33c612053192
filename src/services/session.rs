use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tokio::sync::watch;

use crate::models::auth::{Claims, Identity};

pub const SESSION_FILE: &str = "session.json";

/// Mints an HS256 bearer token for `user_id`.
pub fn issue_token(
    user_id: &str,
    email: Option<&str>,
    secret: &str,
    ttl_seconds: u64,
) -> anyhow::Result<String> {
    let now = Utc::now().timestamp() as usize;
    let exp = usize::try_from(ttl_seconds)
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| anyhow::anyhow!("token lifetime of {ttl_seconds}s is too long"))?;
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        iat: now,
        exp,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Reads the claims of a token without checking its signature. The client
/// never holds the signing secret; the backend verifies every request.
pub fn identity_from_token(token: &str) -> anyhow::Result<Identity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    let claims = data.claims;
    if claims.sub.trim().is_empty() {
        anyhow::bail!("token has an empty subject");
    }
    let expires_at = Utc.timestamp_opt(claims.exp as i64, 0).single();

    Ok(Identity {
        user_id: claims.sub,
        email: claims.email,
        token: token.to_string(),
        expires_at,
    })
}

/// Observable sign-in state. Cloud operations read it; local edits ignore it.
#[derive(Clone)]
pub struct AuthSession {
    tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AuthSession {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!("Signed in as {}", identity.display_name());
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
    }

    /// Current identity, or `None` when signed out or expired.
    pub fn current(&self) -> Option<Identity> {
        self.current_at(Utc::now())
    }

    pub fn current_at(&self, now: DateTime<Utc>) -> Option<Identity> {
        self.tx
            .borrow()
            .as_ref()
            .filter(|id| !id.is_expired_at(now))
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}

pub fn load_session_file(path: &Path) -> Option<Identity> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&text) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::warn!("Ignoring unreadable session file {}: {}", path.display(), e);
            None
        }
    }
}

/// The stored identity if it is still valid. An expired session file is
/// deleted.
pub fn load_live_session(path: &Path, now: DateTime<Utc>) -> anyhow::Result<Option<Identity>> {
    match load_session_file(path) {
        Some(identity) if identity.is_expired_at(now) => {
            tracing::info!("Stored session for {} has expired", identity.user_id);
            save_session_file(path, None)?;
            Ok(None)
        }
        other => Ok(other),
    }
}

pub fn save_session_file(path: &Path, identity: Option<&Identity>) -> anyhow::Result<()> {
    match identity {
        Some(identity) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_vec_pretty(identity)?)?;
        }
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        },
    }
    Ok(())
}
