use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Microphone permission predicate consulted before a session starts
///
/// Platforms without a permission model use [`AlwaysGranted`].
#[async_trait::async_trait]
pub trait PermissionGate: Send + Sync {
    /// Whether permission is already granted
    async fn check_granted(&self) -> bool;

    /// Ask the user for permission; returns whether it was granted
    async fn request_grant(&self) -> bool;
}

/// Permission gate for platforms without a permission model
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait::async_trait]
impl PermissionGate for AlwaysGranted {
    async fn check_granted(&self) -> bool {
        true
    }

    async fn request_grant(&self) -> bool {
        true
    }
}

/// Fixed-answer permission gate that counts how often it was consulted
#[derive(Debug, Default)]
pub struct StaticPermission {
    granted: AtomicBool,
    grant_on_request: bool,
    checks: AtomicUsize,
    requests: AtomicUsize,
}

impl StaticPermission {
    /// `granted`: initial state; `grant_on_request`: answer to a request
    pub fn new(granted: bool, grant_on_request: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            grant_on_request,
            checks: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Permission permanently refused
    pub fn denied() -> Self {
        Self::new(false, false)
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PermissionGate for StaticPermission {
    async fn check_granted(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.granted.load(Ordering::SeqCst)
    }

    async fn request_grant(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.grant_on_request {
            self.granted.store(true, Ordering::SeqCst);
        }
        self.grant_on_request
    }
}
