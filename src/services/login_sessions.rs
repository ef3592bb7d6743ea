use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::principal::Principal;

/// A container login session: who signed in and until when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    /// The authenticated user.
    pub principal: Principal,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl LoginSession {
    /// Opens a session for `principal` lasting `duration`.
    pub fn open(principal: Principal, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            principal,
            created_at: now,
            expires_at: now + duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Where the container keeps its login sessions.
#[async_trait]
pub trait LoginSessionStore: Send + Sync {
    async fn get(&self, session_id: &Uuid) -> Result<Option<LoginSession>>;
    async fn put(&self, session_id: &Uuid, session: &LoginSession) -> Result<()>;
    async fn remove(&self, session_id: &Uuid) -> Result<()>;
}

/// Login sessions stored in Redis under `session:{id}` with a TTL.
#[derive(Clone)]
pub struct RedisLoginSessions {
    redis: ConnectionManager,
}

impl RedisLoginSessions {
    /// Connects to Redis at `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");
        Ok(Self { redis })
    }

    fn key(session_id: &Uuid) -> String {
        format!("session:{}", session_id)
    }
}

#[async_trait]
impl LoginSessionStore for RedisLoginSessions {
    async fn get(&self, session_id: &Uuid) -> Result<Option<LoginSession>> {
        let mut redis = self.redis.clone();
        let session_json: Option<String> = redis.get(Self::key(session_id)).await?;

        let Some(session_json) = session_json else {
            return Ok(None);
        };

        let session: LoginSession = sonic_rs::from_str(&session_json).map_err(|e| {
            AppError::Internal(format!("Invalid session JSON: {}", e))
        })?;

        if session.is_expired() {
            tracing::debug!("⌛ Login session expired for {}", session.principal.name);
            let _: () = redis.del(Self::key(session_id)).await.unwrap_or(());
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn put(&self, session_id: &Uuid, session: &LoginSession) -> Result<()> {
        let session_json = sonic_rs::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session serialization failed: {}", e)))?;

        let ttl = (session.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let mut redis = self.redis.clone();
        let _: () = redis
            .set_ex(Self::key(session_id), &session_json, ttl)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed: {}", e);
                AppError::Redis(e)
            })?;

        tracing::debug!("✅ Login session saved to Redis: session:{}", session_id);
        Ok(())
    }

    async fn remove(&self, session_id: &Uuid) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(Self::key(session_id)).await?;
        Ok(())
    }
}

/// Login sessions kept in process memory.
#[derive(Clone, Default)]
pub struct MemoryLoginSessions {
    sessions: Arc<RwLock<HashMap<Uuid, LoginSession>>>,
}

impl MemoryLoginSessions {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginSessionStore for MemoryLoginSessions {
    async fn get(&self, session_id: &Uuid) -> Result<Option<LoginSession>> {
        let session = self.sessions.read().await.get(session_id).cloned();
        match session {
            Some(session) if session.is_expired() => {
                self.sessions.write().await.remove(session_id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, session_id: &Uuid, session: &LoginSession) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(*session_id, session.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &Uuid) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryLoginSessions::new();
        let id = Uuid::new_v4();
        let session = LoginSession::open(Principal::new("jesse@example.org", ["PORTAL"]), Duration::days(7));

        store.put(&id, &session).await.unwrap();
        let found = store.get(&id).await.unwrap().unwrap();
        assert_eq!(found.principal.name, "jesse@example.org");

        store.remove(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_drops_expired_sessions() {
        let store = MemoryLoginSessions::new();
        let id = Uuid::new_v4();
        let session = LoginSession::open(Principal::new("jesse@example.org", ["PORTAL"]), Duration::seconds(-1));

        store.put(&id, &session).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }
}
