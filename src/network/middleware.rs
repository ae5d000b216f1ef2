use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};

use crate::network::headers::browser_headers;

/// 请求头注入中间件
///
/// 在每次发送前注入新的随机 UA 与浏览器头；调用方显式设置的头保持不变。
pub struct BrowserHeadersMiddleware;

#[async_trait::async_trait]
impl Middleware for BrowserHeadersMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let headers = req.headers_mut();
        for (name, value) in browser_headers().iter() {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        next.run(req, extensions).await
    }
}
