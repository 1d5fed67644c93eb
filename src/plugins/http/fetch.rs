use crate::error::FetchError;
use crate::pipeline::model::LinkResponse;
use crate::plugins::registry::FetchContext;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Plain HTTP GET shared by resolvers and retrieval.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    ctx: FetchContext,
}

impl HttpFetcher {
    pub fn new(ctx: FetchContext) -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(Self::build_headers(&ctx))
            .build()
            .expect("reqwest client");
        Self { client, ctx }
    }

    fn build_headers(ctx: &FetchContext) -> HeaderMap {
        let mut h = HeaderMap::new();
        match HeaderValue::from_str(&ctx.user_agent) {
            Ok(v) => {
                h.insert(USER_AGENT, v);
            }
            Err(_) => warn!(user_agent = %ctx.user_agent, "ignoring invalid user agent"),
        }
        for (k, v) in &ctx.headers {
            match (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
                (Ok(name), Ok(value)) => {
                    h.insert(name, value);
                }
                _ => warn!(header = %k, "ignoring invalid header"),
            }
        }
        h
    }

    fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
    }

    async fn sleep_backoff(&self, attempt: u32) {
        let base = self.ctx.retry_backoff_ms.max(1);
        let mul = 1u64 << attempt.min(16);
        let ms = base.saturating_mul(mul).min(30_000);
        sleep(Duration::from_millis(ms)).await;
    }

    /// Fetches `url` following redirects. Any HTTP status is returned as a
    /// response; only transient statuses and transport errors are retried.
    pub async fn get(&self, url: &str) -> Result<LinkResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let mut last_err: Option<FetchError> = None;
        for attempt in 0..=self.ctx.retries {
            if attempt > 0 {
                self.sleep_backoff(attempt - 1).await;
            }

            let resp = match self
                .client
                .get(parsed.clone())
                .timeout(Duration::from_secs(self.ctx.timeout_secs))
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(%url, attempt, error = %e, "request failed");
                    last_err = Some(FetchError::transport(url, &e));
                    continue;
                }
            };

            let status = resp.status();
            if Self::should_retry_status(status) && attempt < self.ctx.retries {
                debug!(%url, attempt, %status, "retrying transient status");
                last_err = Some(FetchError::Status { url: url.to_string(), status });
                continue;
            }

            let final_url = resp.url().clone();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = match resp.bytes().await {
                Ok(b) => b,
                Err(e) => {
                    last_err = Some(FetchError::transport(url, &e));
                    continue;
                }
            };
            return Ok(LinkResponse::new(final_url, status, content_type, body));
        }

        Err(last_err.unwrap_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: StatusCode::REQUEST_TIMEOUT,
        }))
    }

    /// Like [`get`](Self::get) but any non-2xx status is an error.
    pub async fn get_ok(&self, url: &str) -> Result<LinkResponse, FetchError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: response.status() });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_ctx() -> FetchContext {
        FetchContext { retries: 2, retry_backoff_ms: 1, ..FetchContext::default() }
    }

    #[tokio::test]
    async fn returns_non_success_responses_from_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_ctx());
        let url = format!("{}/gone", server.uri());
        let resp = fetcher.get(&url).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let err = fetcher.get_ok(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn retries_transient_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "image/png"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(fast_ctx());
        let resp = fetcher.get(&format!("{}/flaky", server.uri())).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.content_type(), Some("image/png"));
    }

    #[tokio::test]
    async fn sends_configured_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "PaperScraper/test"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ctx = FetchContext { user_agent: "PaperScraper/test".into(), ..fast_ctx() };
        let resp = HttpFetcher::new(ctx).get(&server.uri()).await.unwrap();
        assert!(resp.is_success());
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected_without_network() {
        let err = HttpFetcher::new(fast_ctx()).get("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
