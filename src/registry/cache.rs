//! 端点缓存
//!
//! 发现服务的结果以 JSON 形式落盘，超过有效期即视为不存在。

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::error::Result;
use crate::registry::endpoint::{BatchConfig, EndpointDescriptor, EndpointRegistry};
use crate::utils;

/// 缓存文件格式
#[derive(Debug, Serialize, Deserialize)]
struct CachedEndpoints {
    /// Unix 时间戳 (秒，允许小数)
    timestamp: f64,
    api_endpoints: Vec<EndpointDescriptor>,
    batch_config: BatchConfig,
}

/// 缓存条目摘要
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub saved_at: DateTime<Utc>,
    pub expired: bool,
    pub registry: EndpointRegistry,
}

pub struct EndpointCache {
    path: PathBuf,
    ttl: TimeDelta,
}

impl EndpointCache {
    pub fn new(path: impl Into<PathBuf>, ttl_days: u64) -> Self {
        Self {
            path: path.into(),
            ttl: i64::try_from(ttl_days)
                .ok()
                .and_then(TimeDelta::try_days)
                .unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取未过期的缓存
    pub async fn load(&self) -> Option<EndpointRegistry> {
        self.load_at(Utc::now()).await
    }

    async fn load_at(&self, now: DateTime<Utc>) -> Option<EndpointRegistry> {
        let entry = self.inspect_at(now).await?;
        if entry.expired {
            info!("保存的端点已过期 (超过 {} 天)，需要重新获取", self.ttl.num_days());
            return None;
        }
        debug!(
            "从本地加载端点配置: {} 个端点，批量下载{}",
            entry.registry.list_endpoints().len(),
            if entry.registry.batch().is_some() { "启用" } else { "禁用" }
        );
        Some(entry.registry)
    }

    /// 读取缓存 (无论是否过期)，文件缺失或损坏时返回 None
    pub async fn inspect(&self) -> Option<CacheEntry> {
        self.inspect_at(Utc::now()).await
    }

    async fn inspect_at(&self, now: DateTime<Utc>) -> Option<CacheEntry> {
        let text = fs::read_to_string(&self.path).await.ok()?;
        let cached: CachedEndpoints = match serde_json::from_str(&text) {
            Ok(cached) => cached,
            Err(e) => {
                warn!("端点缓存损坏，忽略: {}", e);
                return None;
            }
        };

        let saved_at = DateTime::from_timestamp_millis((cached.timestamp * 1000.0) as i64)?;
        Some(CacheEntry {
            saved_at,
            expired: now - saved_at > self.ttl,
            registry: EndpointRegistry::new(cached.api_endpoints, cached.batch_config),
        })
    }

    /// 保存注册表快照
    pub async fn save(&self, registry: &EndpointRegistry) -> Result<()> {
        self.save_at(registry, Utc::now()).await
    }

    async fn save_at(&self, registry: &EndpointRegistry, now: DateTime<Utc>) -> Result<()> {
        let cached = CachedEndpoints {
            timestamp: now.timestamp_millis() as f64 / 1000.0,
            api_endpoints: registry.list_endpoints().to_vec(),
            batch_config: registry.batch_config().clone(),
        };
        let json = serde_json::to_vec_pretty(&cached)?;
        utils::write_atomic(&self.path, &json).await?;
        info!("端点配置已保存到: {}", self.path.display());
        Ok(())
    }

    /// 删除缓存，返回文件是否存在过
    pub async fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// 人类可读的时间差
pub fn describe_age(saved_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now - saved_at;
    if diff.num_days() > 0 {
        format!("{}天前", diff.num_days())
    } else if diff.num_hours() > 0 {
        format!("{}小时前", diff.num_hours())
    } else if diff.num_minutes() > 0 {
        format!("{}分钟前", diff.num_minutes())
    } else {
        "刚刚".to_string()
    }
}
