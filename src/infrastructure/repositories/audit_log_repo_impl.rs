// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::repositories::rate_audit_repository::{AuditEntry, RateAuditRepository};
use crate::utils::errors::RepositoryError;

/// JSON Lines 文件审计日志实现
///
/// 每行一个 `AuditEntry`；无法解析的行会被跳过并记录警告。
pub struct JsonLinesAuditRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesAuditRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<AuditEntry>, RepositoryError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RepositoryError::Io(e)),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Skipping malformed audit line {} in {}: {}",
                    line_no + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}

fn encode_lines(entries: &[AuditEntry]) -> Result<Vec<u8>, RepositoryError> {
    let mut buf = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buf, entry)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

#[async_trait]
impl RateAuditRepository for JsonLinesAuditRepository {
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError> {
        if entries.is_empty() {
            return Ok(());
        }
        let buf = encode_lines(entries)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let entries = self.read_all().await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.timestamp >= since)
            .collect())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let entries = self.read_all().await?;
        let before = entries.len();
        let kept: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|entry| entry.timestamp >= cutoff)
            .collect();
        let removed = (before - kept.len()) as u64;
        if removed == 0 {
            return Ok(0);
        }

        // 先写临时文件再重命名，保证日志文件不会处于半写状态
        let tmp_path = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, encode_lines(&kept)?).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(removed)
    }
}

/// 内存审计日志实现（用于测试和无持久化运行）
#[derive(Default)]
pub struct InMemoryAuditRepository {
    entries: parking_lot::Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl RateAuditRepository for InMemoryAuditRepository {
    async fn append(&self, entries: &[AuditEntry]) -> Result<(), RepositoryError> {
        self.entries.lock().extend_from_slice(entries);
        Ok(())
    }

    async fn load_since(&self, since: DateTime<Utc>) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}
