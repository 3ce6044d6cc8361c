//! Recording role-registry double.

use async_trait::async_trait;
use signet_service::errors::BackendError;
use signet_service::models::MountConfig;
use signet_service::registry::RoleRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory [`RoleRegistry`] that records every call and can be switched
/// into a failing mode, for exercising the two-phase role write.
#[derive(Default)]
pub struct RecordingRegistry {
    upserts: Mutex<Vec<String>>,
    removals: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a registry error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn upserted_roles(&self) -> Vec<String> {
        self.upserts.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn removed_roles(&self) -> Vec<String> {
        self.removals.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RoleRegistry for RecordingRegistry {
    async fn upsert_role(&self, _config: &MountConfig, role: &str) -> Result<(), BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Registry("injected registry failure".to_string()));
        }
        if let Ok(mut upserts) = self.upserts.lock() {
            upserts.push(role.to_string());
        }
        Ok(())
    }

    async fn remove_role(&self, _config: &MountConfig, role: &str) -> Result<(), BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Registry("injected registry failure".to_string()));
        }
        if let Ok(mut removals) = self.removals.lock() {
            removals.push(role.to_string());
        }
        Ok(())
    }
}
