//! Shared helpers for identity tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify};
use uuid::Uuid;

use super::{
    IdentityConfig, IdentityService, Mailer, MemorySessionCache, Message, NewAccount, Principal,
    Registration, SessionCache, SessionEntry,
};
use crate::store::{Device, MemoryStore};

/// Keeps every message instead of delivering it.
#[derive(Debug, Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<Message>>,
}

impl RecordingMailer {
    pub(crate) async fn sent(&self) -> Vec<Message> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Cache whose backend is always down.
#[derive(Debug, Default)]
pub(crate) struct UnavailableCache;

#[async_trait]
impl SessionCache for UnavailableCache {
    async fn put(&self, _entry: SessionEntry) -> Result<()> {
        Err(anyhow!("cache unavailable"))
    }

    async fn get(&self, _session_id: Uuid) -> Result<Option<SessionEntry>> {
        Err(anyhow!("cache unavailable"))
    }

    async fn remove(&self, _session_id: Uuid) -> Result<()> {
        Err(anyhow!("cache unavailable"))
    }

    async fn purge_account(&self, _account_id: Uuid, _at: DateTime<Utc>) -> Result<usize> {
        Err(anyhow!("cache unavailable"))
    }
}

/// In-memory cache that can hold the next `put` until released.
#[derive(Debug, Default)]
pub(crate) struct GatedCache {
    inner: MemorySessionCache,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub held: Notify,
}

impl GatedCache {
    /// Hold the next `put`; it proceeds once the returned sender fires or drops.
    pub(crate) async fn arm(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.lock().await = Some(gate);
        release
    }
}

#[async_trait]
impl SessionCache for GatedCache {
    async fn put(&self, entry: SessionEntry) -> Result<()> {
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            self.held.notify_one();
            let _ = gate.await;
        }
        self.inner.put(entry).await
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<SessionEntry>> {
        self.inner.get(session_id).await
    }

    async fn remove(&self, session_id: Uuid) -> Result<()> {
        self.inner.remove(session_id).await
    }

    async fn purge_account(&self, account_id: Uuid, at: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_account(account_id, at).await
    }
}

pub(crate) fn config() -> IdentityConfig {
    IdentityConfig::new(SecretString::from("test-signing-secret".to_string()))
        .with_password_cost(64, 1)
}

pub(crate) struct TestHarness {
    pub service: IdentityService,
    pub mailer: Arc<RecordingMailer>,
}

impl TestHarness {
    pub(crate) fn new() -> Result<Self> {
        Self::build(config(), Arc::new(MemorySessionCache::new()))
    }

    pub(crate) fn without_verification() -> Result<Self> {
        Self::build(
            config().with_require_verification(false),
            Arc::new(MemorySessionCache::new()),
        )
    }

    pub(crate) fn with_broken_cache() -> Result<Self> {
        Self::build(config(), Arc::new(UnavailableCache))
    }

    pub(crate) fn with_cache(cache: Arc<dyn SessionCache>) -> Result<Self> {
        Self::build(config(), cache)
    }

    pub(crate) fn with_config(config: IdentityConfig) -> Result<Self> {
        Self::build(config, Arc::new(MemorySessionCache::new()))
    }

    fn build(config: IdentityConfig, cache: Arc<dyn SessionCache>) -> Result<Self> {
        let mailer = Arc::new(RecordingMailer::default());
        let service = IdentityService::new(
            config,
            Arc::new(MemoryStore::new()),
            cache,
            mailer.clone(),
        )?;
        Ok(Self { service, mailer })
    }

    pub(crate) fn principal(&self, access_token: &str) -> Result<Principal> {
        Ok(self.service.tokens().verify(access_token)?.principal())
    }
}

pub(crate) fn device(device_id: &str) -> Device {
    Device {
        device_id: device_id.to_string(),
        device_type: "web".to_string(),
        user_agent: "test-agent/1.0".to_string(),
    }
}

pub(crate) fn new_account(name: &str, username: &str, email: &str) -> NewAccount {
    NewAccount {
        name: name.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password: "secret123".to_string(),
        avatar: None,
    }
}

pub(crate) async fn register_alice(service: &IdentityService) -> Result<Registration> {
    Ok(service
        .register(new_account("Alice", "alice", "a@x.com"), device("desktop"))
        .await?)
}
