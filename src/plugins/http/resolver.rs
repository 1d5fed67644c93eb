use async_trait::async_trait;
use crate::error::ResolveError;
use crate::pipeline::extension;
use crate::pipeline::model::{LinkResponse, ResolvedUrls};
use crate::plugins::http::fetch::HttpFetcher;
use crate::plugins::registry::LinkResolver;

/// Links that already are the image (i.redd.it, i.imgur.com, artstation cdn, ...).
pub struct DirectImageResolver;

impl DirectImageResolver {
    pub fn new() -> Self { Self }
}

impl Default for DirectImageResolver {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl LinkResolver for DirectImageResolver {
    fn name(&self) -> &'static str { "direct-image" }

    fn recognizes(&self, response: &LinkResponse) -> bool {
        extension::is_image_extension(&extension::from_response(response))
    }

    async fn expand(&self, response: &LinkResponse, _fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        if !self.recognizes(response) {
            return Ok(ResolvedUrls::new());
        }
        Ok(std::iter::once(response.url().as_str()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::registry::FetchContext;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use url::Url;

    fn response(url: &str, content_type: Option<&str>) -> LinkResponse {
        LinkResponse::new(Url::parse(url).unwrap(), StatusCode::OK, content_type.map(str::to_string), Bytes::new())
    }

    #[tokio::test]
    async fn expands_to_its_own_final_url() {
        let r = response("https://i.redd.it/abc.jpg", Some("image/jpeg"));
        let resolver = DirectImageResolver::new();
        assert!(resolver.recognizes(&r));

        let urls = resolver.expand(&r, &HttpFetcher::new(FetchContext::default())).await.unwrap();
        assert_eq!(urls.iter().collect::<Vec<_>>(), vec!["https://i.redd.it/abc.jpg"]);
    }

    #[test]
    fn ignores_pages_and_other_media() {
        let resolver = DirectImageResolver::new();
        assert!(!resolver.recognizes(&response("https://imgur.com/abc", Some("text/html; charset=utf-8"))));
        assert!(!resolver.recognizes(&response("https://host/clip.mp4", Some("video/mp4"))));
        assert!(resolver.recognizes(&response("https://host/x.GIF", None)));
    }
}
