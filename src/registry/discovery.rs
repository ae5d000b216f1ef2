//! 内容源发现客户端
//!
//! 发现服务需要人机验证时不做交互，只记录验证链接并返回空注册表；
//! 令牌通过配置或 `FANQIE_DISCOVERY__VERIFICATION_TOKEN` 带外提供。

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::config::DiscoveryConfig;
use crate::core::error::{DownloadError, Result};
use crate::network::HttpService;
use crate::registry::endpoint::EndpointRegistry;

const AUTH_HEADER: &str = "x-auth-token";
const VERIFICATION_HEADER: &str = "x-verification-token";

pub struct DiscoveryClient {
    http: HttpService,
    server_url: String,
    headers: HeaderMap,
}

impl DiscoveryClient {
    /// 未配置服务地址时返回 None
    pub fn new(http: HttpService, config: &DiscoveryConfig) -> Option<Self> {
        let server_url = config.server_url.as_deref()?.trim_end_matches('/').to_string();
        if server_url.is_empty() {
            return None;
        }

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, AUTH_HEADER, config.auth_token.as_deref());
        insert_header(&mut headers, VERIFICATION_HEADER, config.verification_token.as_deref());

        Some(Self {
            http,
            server_url,
            headers,
        })
    }

    /// 获取端点列表
    ///
    /// 任何失败都收敛为空注册表，空注册表是合法结果。
    pub async fn discover(&self) -> EndpointRegistry {
        match self.fetch_sources().await {
            Ok(sources) => {
                let registry = EndpointRegistry::from_sources(&sources);
                info!("成功从服务器获取 {} 个内容源", registry.list_endpoints().len());
                registry
            }
            Err(DownloadError::Status(code)) => {
                warn!("内容源服务响应异常: HTTP {}", code);
                self.report_challenge().await;
                EndpointRegistry::default()
            }
            Err(e) => {
                warn!("获取内容源时发生错误: {}", e);
                EndpointRegistry::default()
            }
        }
    }

    async fn fetch_sources(&self) -> Result<Vec<Value>> {
        let url = format!("{}/api/sources", self.server_url);
        let rb = self.http.request(Method::GET, &url).headers(self.headers.clone());
        let text = self.http.send_text(rb).await?;
        let data: Value = serde_json::from_str(&text)?;

        Ok(data
            .get("sources")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// 拉取人机验证链接并提示用户
    async fn report_challenge(&self) {
        let url = format!("{}/api/get-captcha-challenge", self.server_url);
        let rb = self.http.request(Method::GET, &url).headers(self.headers.clone());

        let challenge = match self.http.send_text(rb).await {
            Ok(text) => serde_json::from_str::<Value>(&text).ok(),
            Err(e) => {
                warn!("获取验证链接失败: {}", e);
                return;
            }
        };

        match challenge
            .as_ref()
            .and_then(|v| v.get("challenge_url"))
            .and_then(Value::as_str)
        {
            Some(link) => warn!(
                "需要人机验证: 请在浏览器中打开 {} 完成验证，并通过 FANQIE_DISCOVERY__VERIFICATION_TOKEN 提供令牌",
                link
            ),
            None => warn!("验证服务未返回 challenge_url"),
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: Option<&str>) {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return;
    };
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => warn!("忽略非法请求头 {}", name),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::network::stub::StubServer;

    fn config(server: &StubServer, verification: Option<&str>) -> DiscoveryConfig {
        DiscoveryConfig {
            server_url: Some(server.base_url.clone()),
            auth_token: Some("auth".into()),
            verification_token: verification.map(str::to_string),
            ..DiscoveryConfig::default()
        }
    }

    fn http() -> HttpService {
        HttpService::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn discovers_sources_with_auth_headers() {
        let server = StubServer::spawn(|req| match req.path() {
            "/api/sources" => (
                200,
                json!({"sources": [
                    {"name": "fqweb", "enabled": true, "single_url": "http://a/content?item_id={chapter_id}"},
                    {"name": "qyuing", "enabled": true, "single_url": "http://q/api/content?item_id={chapter_id}", "token": "t"}
                ]})
                .to_string(),
            ),
            _ => (404, String::new()),
        });

        let client = DiscoveryClient::new(http(), &config(&server, Some("verified"))).unwrap();
        let registry = client.discover().await;

        assert_eq!(registry.list_endpoints().len(), 2);
        assert!(registry.batch().is_some());

        let requests = server.requests();
        assert_eq!(requests[0].header("X-Auth-Token"), Some("auth"));
        assert_eq!(requests[0].header("X-Verification-Token"), Some("verified"));
    }

    #[tokio::test]
    async fn rejected_discovery_fetches_challenge_and_yields_empty() {
        let server = StubServer::spawn(|req| match req.path() {
            "/api/sources" => (403, "verification required".into()),
            "/api/get-captcha-challenge" => {
                (200, json!({"challenge_url": "http://verify/x"}).to_string())
            }
            _ => (404, String::new()),
        });

        let client = DiscoveryClient::new(http(), &config(&server, None)).unwrap();
        let registry = client.discover().await;

        assert!(registry.is_empty());
        let paths: Vec<_> = server.requests().iter().map(|r| r.path().to_string()).collect();
        assert_eq!(paths, ["/api/sources", "/api/get-captcha-challenge"]);
    }

    #[test]
    fn missing_server_url_disables_discovery() {
        assert!(DiscoveryClient::new(http(), &DiscoveryConfig::default()).is_none());
    }
}
