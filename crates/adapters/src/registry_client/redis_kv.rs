// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key/value registry client backed by Redis, grounded in
//! `original_source/__init__.py`'s `RedisStateProxy`: host and match state
//! are sub-keys of two well-known hashes.

use super::{RegistryClient, RegistryError, HOSTS_KEY, MATCHES_KEY};
use async_trait::async_trait;
use dsh_core::MatchId;
use redis::AsyncCommands;
use tokio::sync::Mutex;

pub struct RedisRegistryClient {
    conn: Mutex<redis::aio::MultiplexedConnection>,
}

impl RedisRegistryClient {
    pub async fn connect(url: &str) -> Result<Self, RegistryError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl RegistryClient for RedisRegistryClient {
    async fn put_host(&self, server_id: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().await;
        conn.hset::<_, _, _, ()>(HOSTS_KEY, server_id, body.to_string())
            .await?;
        Ok(())
    }

    async fn put_match(&self, match_id: &MatchId, body: serde_json::Value) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().await;
        conn.hset::<_, _, _, ()>(MATCHES_KEY, match_id.as_str(), body.to_string())
            .await?;
        Ok(())
    }

    async fn delete_match(&self, match_id: &MatchId) -> Result<(), RegistryError> {
        let mut conn = self.conn.lock().await;
        conn.hdel::<_, _, ()>(MATCHES_KEY, match_id.as_str()).await?;
        Ok(())
    }

    async fn auth_header(&self) -> Option<(String, String)> {
        None
    }
}
