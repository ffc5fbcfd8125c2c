use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};
use tokio::sync::RwLock;

use crate::{admin::CredentialVerifier, payments::PaymentConfig, store::PageStore};

/// A logged-in admin session, keyed by its cookie token.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub username: String,
    pub last_seen: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub site_root: PathBuf,
    /// Canonicalized (symlink-resolved) version of `site_root`.
    /// Used for security checks when serving the public site.
    pub canonical_root: PathBuf,
    pub store: PageStore,
    pub sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    /// Credential verifier; `None` disables the admin API.
    pub verifier: Option<Arc<dyn CredentialVerifier>>,
    /// Payment bridge configuration; `None` disables the endpoint.
    pub payments: Option<PaymentConfig>,
}
