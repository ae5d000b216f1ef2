use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::interfaces::{BatchSource, ContentSource};
use crate::network::HttpService;
use crate::registry::{EndpointDescriptor, EndpointRegistry};

pub mod adapters;
pub mod fanqie;
pub mod normalizer;

use adapters::{FanqieSdkSource, FqwebSource, LsjkSource, QyuingBatch, QyuingSource};

// ============================================================================
// 内容源注册表
// ============================================================================

type SourceFactory = Box<dyn Fn(HttpService, EndpointDescriptor) -> Arc<dyn ContentSource> + Send + Sync>;

/// 适配器工厂，按变体名称构造内容源
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("fanqie_sdk", |http, ep| Arc::new(FanqieSdkSource::new(http, ep)));
        registry.register("fqweb", |http, ep| Arc::new(FqwebSource::new(http, ep)));
        registry.register("qyuing", |http, ep| Arc::new(QyuingSource::new(http, ep)));
        registry.register("lsjk", |http, ep| Arc::new(LsjkSource::new(http, ep)));
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(HttpService, EndpointDescriptor) -> Arc<dyn ContentSource> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(&self, http: &HttpService, endpoint: &EndpointDescriptor) -> Option<Arc<dyn ContentSource>> {
        self.factories
            .get(&endpoint.name)
            .map(|f| f(http.clone(), endpoint.clone()))
    }

    /// 按注册表顺序构造内容源，未知变体跳过
    pub fn build_all(&self, http: &HttpService, registry: &EndpointRegistry) -> Vec<Arc<dyn ContentSource>> {
        registry
            .list_endpoints()
            .iter()
            .filter_map(|endpoint| {
                let source = self.create(http, endpoint);
                if source.is_none() {
                    warn!("未知的内容源类型 '{}'，已跳过", endpoint.name);
                }
                source
            })
            .collect()
    }

    /// 注册表为空时使用的内置回退源
    pub fn fallback(&self, http: &HttpService, url_template: &str) -> Arc<dyn ContentSource> {
        Arc::new(FqwebSource::new(
            http.clone(),
            EndpointDescriptor::new("fqweb", url_template),
        ))
    }

    /// 批量接口 (仅在配置有效时)
    pub fn batch(&self, http: &HttpService, registry: &EndpointRegistry) -> Option<Arc<dyn BatchSource>> {
        let config = registry.batch()?;
        QyuingBatch::new(http.clone(), config).map(|b| Arc::new(b) as Arc<dyn BatchSource>)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
