use async_trait::async_trait;
use crate::error::{FetchError, ResolveError};
use crate::pipeline::extension;
use crate::pipeline::model::{LinkResponse, ResolvedUrls};
use crate::plugins::http::fetch::HttpFetcher;
use crate::plugins::registry::LinkResolver;
use futures::future::join_all;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

/// Hosts serving imgur html pages. `i.imgur.com` serves the image bytes and
/// is left to the direct-image resolver.
const PAGE_HOSTS: [&str; 3] = ["imgur.com", "www.imgur.com", "m.imgur.com"];

const ALBUM_MEMBERS: &str = "div.post-images > div[id]";
const IMAGE_SOURCE: &str = r#"link[rel="image_src"]"#;

#[derive(Debug, Deserialize)]
struct GalleryDescriptor {
    data: GalleryData,
}

#[derive(Debug, Deserialize)]
struct GalleryData {
    image: GalleryImage,
}

#[derive(Debug, Deserialize)]
struct GalleryImage {
    is_album: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Album,
    Gallery,
    Single,
}

impl Shape {
    fn of(url: &Url) -> Self {
        let path = url.path();
        if path.starts_with("/a/") {
            Shape::Album
        } else if path.starts_with("/gallery/") {
            Shape::Gallery
        } else {
            Shape::Single
        }
    }
}

/// Imgur single-image pages, albums and galleries.
pub struct ImgurResolver {
    base: Url,
    hosts: Vec<String>,
}

impl ImgurResolver {
    pub fn new() -> Self {
        Self {
            base: Url::parse("https://imgur.com/").expect("static url"),
            hosts: PAGE_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    /// Resolver rooted at another origin; album members are looked up under `base`.
    pub fn with_base(base: Url) -> Self {
        let hosts = base.host_str().map(|h| vec![h.to_string()]).unwrap_or_default();
        Self { base, hosts }
    }

    fn selector(css: &'static str) -> Selector {
        Selector::parse(css).expect("static selector")
    }

    fn member_ids(html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let members = Self::selector(ALBUM_MEMBERS);
        document
            .select(&members)
            .filter_map(|div| div.value().attr("id"))
            .map(str::to_string)
            .collect()
    }

    fn image_source(html: &str, page: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        let link = Self::selector(IMAGE_SOURCE);
        let href = document.select(&link).find_map(|el| el.value().attr("href"))?;
        page.join(href).ok().map(String::from)
    }

    fn single_from_page(page: &LinkResponse) -> Result<String, ResolveError> {
        Self::image_source(&page.text(), page.url()).ok_or_else(|| ResolveError::MalformedPage {
            url: page.url().to_string(),
            missing: "image_src link",
        })
    }

    async fn single(&self, page_url: &str, fetcher: &HttpFetcher) -> Result<String, ResolveError> {
        let page = fetcher.get_ok(page_url).await?;
        Self::single_from_page(&page)
    }

    async fn album_from_page(&self, album: &LinkResponse, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        let ids = Self::member_ids(&album.text());
        if ids.is_empty() {
            return Err(ResolveError::MalformedPage {
                url: album.url().to_string(),
                missing: "album images",
            });
        }

        let pages = ids
            .iter()
            .map(|id| self.base.join(id).map(String::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| FetchError::InvalidUrl { url: self.base.to_string(), source })?;
        debug!(album = %album.url(), members = pages.len(), "expanding imgur album");

        let results = join_all(pages.iter().map(|p| self.single(p, fetcher))).await;

        let mut links = ResolvedUrls::new();
        let mut first_fetch_error = None;
        for (page, result) in pages.iter().zip(results) {
            match result {
                Ok(link) => {
                    links.insert(link);
                }
                Err(ResolveError::Fetch(e)) => {
                    warn!(album = %album.url(), member = %page, error = %e, "skipping unreachable album member");
                    first_fetch_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match first_fetch_error {
            Some(e) if links.is_empty() => Err(e.into()),
            _ => Ok(links),
        }
    }

    async fn album(&self, url: &Url, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        let page = fetcher.get_ok(url.as_str()).await?;
        self.album_from_page(&page, fetcher).await
    }

    async fn gallery(&self, url: &Url, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        let mut gallery = url.clone();
        gallery.set_query(None);
        gallery.set_fragment(None);

        let descriptor_url = format!("{}.json", gallery.as_str().trim_end_matches('/'));
        let descriptor: GalleryDescriptor = fetcher
            .get_ok(&descriptor_url)
            .await?
            .json()
            .map_err(|source| ResolveError::InvalidDescriptor { url: descriptor_url.clone(), source })?;

        if !descriptor.data.image.is_album {
            return Err(ResolveError::UnsupportedShape {
                url: url.to_string(),
                shape: "single-image gallery",
            });
        }

        let album_path = gallery.path().replacen("/gallery/", "/a/", 1);
        gallery.set_path(&album_path);
        self.album(&gallery, fetcher).await
    }
}

impl Default for ImgurResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkResolver for ImgurResolver {
    fn name(&self) -> &'static str {
        "imgur"
    }

    fn recognizes(&self, response: &LinkResponse) -> bool {
        let Some(host) = response.host() else {
            return false;
        };
        self.hosts.iter().any(|h| host.eq_ignore_ascii_case(h))
            && !extension::is_image_extension(&extension::from_response(response))
    }

    async fn expand(&self, response: &LinkResponse, fetcher: &HttpFetcher) -> Result<ResolvedUrls, ResolveError> {
        if !self.recognizes(response) {
            return Ok(ResolvedUrls::new());
        }
        match Shape::of(response.url()) {
            Shape::Album => self.album_from_page(response, fetcher).await,
            Shape::Gallery => self.gallery(response.url(), fetcher).await,
            Shape::Single => Ok(std::iter::once(Self::single_from_page(response)?).collect()),
        }
    }
}
