use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde_json::Value;
use tracing::warn;

use crate::core::error::{DownloadError, Result};
use crate::network::middleware::BrowserHeadersMiddleware;

/// HTTP 服务
///
/// 所有请求共享同一个连接池；每个请求都带固定超时，超时与其他传输错误同等对待。
#[derive(Clone)]
pub struct HttpService {
    client: ClientWithMiddleware,
}

impl HttpService {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(DownloadError::Network)?;

        Ok(Self {
            client: ClientBuilder::new(client)
                .with(BrowserHeadersMiddleware)
                .build(),
        })
    }

    /// 构造请求
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// 发送请求并在 2xx 时返回响应体文本
    pub async fn send_text(&self, rb: RequestBuilder) -> Result<String> {
        let resp = rb.send().await.map_err(DownloadError::Middleware)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        resp.text().await.map_err(DownloadError::Network)
    }

    /// 获取文本内容
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.send_text(self.request(Method::GET, url)).await
    }

    /// 获取 JSON
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let text = self.get_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST JSON 请求体并解析 JSON 响应
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let mut rb = self
            .request(Method::POST, url)
            .headers(headers)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(serde_json::to_vec(body)?);
        if let Some(timeout) = timeout {
            rb = rb.timeout(timeout);
        }
        let text = self.send_text(rb).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 获取二进制内容及其 Content-Type
    pub async fn get_bytes(&self, url: &str) -> Result<(Bytes, Option<String>)> {
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(DownloadError::Middleware)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp.bytes().await.map_err(DownloadError::Network)?;
        Ok((bytes, content_type))
    }
}

/// 有限次重试执行器
///
/// 用于目录、元数据等非内容请求；失败后按尝试次数线性退避。
pub async fn with_retry<F, Fut, T>(
    desc: impl std::fmt::Display,
    max_attempts: u32,
    base_delay: Duration,
    task: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match task().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(e);
                }

                let wait = base_delay * attempts;
                warn!(
                    "请求失败 [{}] (第 {}/{} 次): {}。将在 {:?} 后重试...",
                    desc, attempts, max_attempts, e, wait
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn with_retry_stops_after_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = with_retry("flaky", 5, Duration::ZERO, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(DownloadError::Status(503))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_returns_last_error() {
        let result: Result<()> = with_retry("down", 2, Duration::ZERO, || async {
            Err(DownloadError::Status(500))
        })
        .await;

        assert!(matches!(result, Err(DownloadError::Status(500))));
    }
}
