pub mod cache;
pub mod discovery;
pub mod endpoint;

pub use cache::EndpointCache;
pub use discovery::DiscoveryClient;
pub use endpoint::{BATCH_SOURCE, BatchConfig, EndpointDescriptor, EndpointRegistry};

use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::network::HttpService;

/// 准备本次任务使用的注册表快照
///
/// 优先读取未过期的缓存；`refresh` 或缓存失效时重新发现，非空结果写回缓存。
pub async fn prepare_registry(config: &AppConfig, http: &HttpService, refresh: bool) -> EndpointRegistry {
    let cache = EndpointCache::new(config.discovery.cache_file(), config.discovery.cache_ttl_days);

    if !refresh {
        if let Some(registry) = cache.load().await {
            return registry.with_tuning(&config.batch);
        }
    }

    let Some(client) = DiscoveryClient::new(http.clone(), &config.discovery) else {
        info!("未配置内容源发现服务，使用内置回退源");
        return EndpointRegistry::default();
    };

    let registry = client.discover().await;
    if !registry.is_empty() {
        if let Err(e) = cache.save(&registry).await {
            warn!("保存端点缓存失败: {}", e);
        }
    }
    registry.with_tuning(&config.batch)
}
