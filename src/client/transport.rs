use crate::protocol::{HttpRequest, Method};
use anyhow::Context;
use bytes::Bytes;
use futures_core::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::pin::Pin;
use tokio_stream::StreamExt;

pub type ByteStream = BoxStream<'static, anyhow::Result<Bytes>>;

pub struct HttpResponse {
    pub status: u16,
    pub body: ByteStream,
}

/// Runs one HTTP request and hands back the status plus a body stream.
///
/// Bytes are delivered as they arrive; nothing here buffers the body.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Transport for ReqwestTransport {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send>> {
        let http = self.http.clone();

        Box::pin(async move {
            let mut headers = HeaderMap::new();
            for (name, value) in &req.headers {
                let value = HeaderValue::from_str(value)
                    .with_context(|| format!("invalid value for header {name}"))?;
                headers.insert(HeaderName::from_static(*name), value);
            }

            let builder = match req.method {
                Method::Get => http.get(req.url),
                Method::Post => http.post(req.url),
            };
            let builder = match req.body {
                Some(body) => builder.headers(headers).body(body),
                None => builder.headers(headers),
            };

            let resp = builder.send().await.context("failed to send request")?;
            let status = resp.status().as_u16();
            let body = resp
                .bytes_stream()
                .map(|item| item.map_err(|e| anyhow::Error::new(e).context("network stream error")));

            Ok(HttpResponse {
                status,
                body: Box::pin(body),
            })
        })
    }
}
