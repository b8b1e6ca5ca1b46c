// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::models::robots_policy::RobotsPolicy;
use crate::domain::repositories::robots_cache_repository::RobotsCacheRepository;
use crate::utils::errors::RepositoryError;

/// JSON 文件 robots 策略缓存
///
/// 首次访问时把整个文件加载到内存，每次写入后整体落盘。
pub struct JsonFileRobotsCache {
    path: PathBuf,
    entries: RwLock<Option<HashMap<String, RobotsPolicy>>>,
}

impl JsonFileRobotsCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(None),
        }
    }

    async fn load(&self) -> Result<HashMap<String, RobotsPolicy>, RepositoryError> {
        match fs::read(&self.path).await {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    // 损坏的缓存直接丢弃，下次写入时覆盖
                    warn!(
                        "Discarding unreadable robots cache {}: {}",
                        self.path.display(),
                        e
                    );
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(RepositoryError::Io(e)),
        }
    }

    async fn ensure_loaded(&self) -> Result<(), RepositoryError> {
        if self.entries.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.entries.write().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        Ok(())
    }

    async fn persist(&self, entries: &HashMap<String, RobotsPolicy>) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(entries)?).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RobotsCacheRepository for JsonFileRobotsCache {
    async fn get(&self, domain: &str) -> Result<Option<RobotsPolicy>, RepositoryError> {
        self.ensure_loaded().await?;
        let guard = self.entries.read().await;
        Ok(guard.as_ref().and_then(|map| map.get(domain).cloned()))
    }

    async fn put(&self, policy: &RobotsPolicy) -> Result<(), RepositoryError> {
        self.ensure_loaded().await?;
        let mut guard = self.entries.write().await;
        let map = guard.get_or_insert_with(HashMap::new);
        map.insert(policy.domain.clone(), policy.clone());
        self.persist(map).await
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        self.ensure_loaded().await?;
        let now = Utc::now();
        let mut guard = self.entries.write().await;
        let map = guard.get_or_insert_with(HashMap::new);
        let before = map.len();
        map.retain(|_, policy| !policy.is_expired(now));
        let removed = (before - map.len()) as u64;
        if removed > 0 {
            self.persist(map).await?;
        }
        Ok(removed)
    }
}

/// 内存 robots 策略缓存
#[derive(Default)]
pub struct InMemoryRobotsCache {
    entries: parking_lot::RwLock<HashMap<String, RobotsPolicy>>,
}

impl InMemoryRobotsCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RobotsCacheRepository for InMemoryRobotsCache {
    async fn get(&self, domain: &str) -> Result<Option<RobotsPolicy>, RepositoryError> {
        Ok(self.entries.read().get(domain).cloned())
    }

    async fn put(&self, policy: &RobotsPolicy) -> Result<(), RepositoryError> {
        self.entries
            .write()
            .insert(policy.domain.clone(), policy.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, policy| !policy.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}
