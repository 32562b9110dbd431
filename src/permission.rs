use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Camera authorization state as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Authorized,
    NotDetermined,
    Denied,
    Restricted,
    /// A state this build does not know about
    Unrecognized(i32),
}

/// Result of checking (and possibly requesting) camera access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionOutcome {
    Granted,
    DeniedByUser,
    DeniedPreviously,
    RestrictedByPolicy,
    Unknown,
}

/// Platform permission subsystem
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current authorization state, without prompting
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Prompt the user; resolves once they answer
    async fn request_access(&self) -> bool;
}

/// Maps platform authorization states onto [`PermissionOutcome`].
#[derive(Clone)]
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self { provider }
    }

    /// Check camera access, prompting only when the state is undetermined.
    pub async fn check_and_request_access(&self) -> PermissionOutcome {
        let status = self.provider.authorization_status();
        debug!("Camera authorization status: {:?}", status);

        match status {
            AuthorizationStatus::Authorized => PermissionOutcome::Granted,
            AuthorizationStatus::NotDetermined => {
                info!("Requesting camera access");
                if self.provider.request_access().await {
                    info!("Camera access granted");
                    PermissionOutcome::Granted
                } else {
                    warn!("Camera access denied by user");
                    PermissionOutcome::DeniedByUser
                }
            }
            // Platforms forbid prompting again after a denial
            AuthorizationStatus::Denied => PermissionOutcome::DeniedPreviously,
            AuthorizationStatus::Restricted => PermissionOutcome::RestrictedByPolicy,
            AuthorizationStatus::Unrecognized(code) => {
                warn!("Unrecognized camera authorization state {}", code);
                PermissionOutcome::Unknown
            }
        }
    }
}

/// Config-driven permission provider.
///
/// Reports a fixed authorization state; a prompt answers with `grant` and
/// moves the state to authorized or denied like the real platform does.
pub struct StaticPermissions {
    status: Mutex<AuthorizationStatus>,
    grant: bool,
    requests: AtomicU32,
}

impl StaticPermissions {
    pub fn new(status: AuthorizationStatus, grant: bool) -> Self {
        Self {
            status: Mutex::new(status),
            grant,
            requests: AtomicU32::new(0),
        }
    }

    /// Number of times the user was prompted
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock()
    }

    async fn request_access(&self) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        tokio::task::yield_now().await;

        *self.status.lock() = if self.grant {
            AuthorizationStatus::Authorized
        } else {
            AuthorizationStatus::Denied
        };
        self.grant
    }
}
