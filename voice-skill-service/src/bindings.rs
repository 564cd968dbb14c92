use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::kv::KvStore;
use crate::models::CredentialBundle;

/// Login index entries live for a year
pub const LOGIN_INDEX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub fn pairing_key(code: &str) -> String {
    format!("pairing:{}", code.trim())
}

pub fn binding_key(user_id: &str) -> String {
    format!("binding:{}", user_id.trim())
}

pub fn login_index_key(login: &str) -> String {
    format!("loginIndex:{}", login.trim().to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Redeemed(CredentialBundle),
    NotFound,
}

/// State of a user's stored binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingLookup {
    Bound(CredentialBundle),
    Unbound,
    /// A record exists but cannot authenticate
    Corrupted,
}

/// What was written when a user was bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOutcome {
    pub binding_stored: bool,
    pub login_indexed: bool,
}

/// Pairing codes, user bindings and the login reverse index
#[derive(Clone)]
pub struct BindingStore {
    kv: Arc<dyn KvStore>,
}

impl BindingStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Look up the credentials a pairing code was issued for.
    ///
    /// Codes are not consumed: the record stays until its own TTL runs out.
    pub async fn redeem_pairing_code(&self, code: &str) -> Redemption {
        let Some(raw) = self.kv.get(&pairing_key(code)).await else {
            return Redemption::NotFound;
        };
        match CredentialBundle::parse_trusted(&raw) {
            Some(bundle) => {
                info!(login = %bundle.normalized_login(), "Pairing code redeemed, record left in place");
                Redemption::Redeemed(bundle)
            }
            None => {
                warn!("Pairing record is malformed, treating code as unknown");
                Redemption::NotFound
            }
        }
    }

    /// Promote credentials into a durable binding for `user_id`
    pub async fn bind_user(&self, user_id: &str, bundle: &CredentialBundle) -> BindOutcome {
        let payload = match serde_json::to_string(bundle) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not serialize credential bundle");
                return BindOutcome {
                    binding_stored: false,
                    login_indexed: false,
                };
            }
        };

        let binding_stored = self.kv.set(&binding_key(user_id), &payload, None).await;

        let login = bundle.normalized_login();
        let login_indexed = if login.is_empty() {
            false
        } else {
            self.kv
                .set(&login_index_key(&login), user_id.trim(), Some(LOGIN_INDEX_TTL))
                .await
        };

        info!(
            user_id = %user_id,
            binding_stored,
            login_indexed,
            "User bound to credentials"
        );
        BindOutcome {
            binding_stored,
            login_indexed,
        }
    }

    pub async fn lookup_binding(&self, user_id: &str) -> BindingLookup {
        let Some(raw) = self.kv.get(&binding_key(user_id)).await else {
            return BindingLookup::Unbound;
        };
        match CredentialBundle::parse_trusted(&raw) {
            Some(bundle) => BindingLookup::Bound(bundle),
            None => {
                warn!(user_id = %user_id, "Stored binding is malformed, ignoring it");
                BindingLookup::Corrupted
            }
        }
    }

    /// Credentials bound to `user_id`; malformed records count as absent
    pub async fn load_binding(&self, user_id: &str) -> Option<CredentialBundle> {
        match self.lookup_binding(user_id).await {
            BindingLookup::Bound(bundle) => Some(bundle),
            BindingLookup::Unbound | BindingLookup::Corrupted => None,
        }
    }

    /// Voice-platform user id last bound to `login`
    pub async fn user_for_login(&self, login: &str) -> Option<String> {
        let login = login.trim();
        if login.is_empty() {
            return None;
        }
        self.kv.get(&login_index_key(login)).await
    }
}
