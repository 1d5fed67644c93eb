use crate::error::SourceError;
use crate::pipeline::model::PostMeta;
use crate::pipeline::post::Post;
use crate::source::PostSource;
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingDocument {
    Listing { data: ListingData },
    Children(Vec<Child>),
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    kind: String,
    data: ChildData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChildData {
    id: String,
    title: Option<String>,
    subreddit: String,
    url: Option<String>,
    author: String,
    over_18: bool,
    score: i64,
    created_utc: f64,
    is_self: bool,
}

/// Links back into the platform itself carry no media of their own.
fn is_platform_link(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "reddit.com" || h.ends_with(".reddit.com")))
        .unwrap_or(false)
}

fn to_meta(child: Child) -> Option<PostMeta> {
    if child.kind != "t3" || child.data.is_self {
        return None;
    }
    let data = child.data;
    let url = data.url.filter(|u| !u.is_empty() && !is_platform_link(u))?;
    Some(PostMeta {
        id: data.id,
        title: data.title.unwrap_or_default(),
        subcategory: data.subreddit,
        url,
        author: data.author,
        nsfw: data.over_18,
        score: data.score,
        created: DateTime::from_timestamp(data.created_utc as i64, 0).unwrap_or_default(),
    })
}

/// Posts read from an exported listing (`{"data": {"children": [...]}}` or a
/// bare array of children). Comments, self posts and platform-internal links are dropped.
/// A file cannot be edited back on the platform, so nothing is ever unsaved.
#[derive(Debug)]
pub struct ListingFileSource {
    pending: VecDeque<Post>,
}

impl ListingFileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|source| SourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&path.display().to_string(), &text)
    }

    pub fn from_json(label: &str, text: &str) -> Result<Self, SourceError> {
        let document: ListingDocument = serde_json::from_str(text).map_err(|source| SourceError::Parse {
            path: label.to_string(),
            source,
        })?;
        let children = match document {
            ListingDocument::Listing { data } => data.children,
            ListingDocument::Children(children) => children,
        };

        let total = children.len();
        let pending: VecDeque<Post> = children
            .into_iter()
            .filter_map(to_meta)
            .map(|meta| Post::new(meta, false))
            .collect();
        debug!(listing = label, total, kept = pending.len(), "loaded listing");
        Ok(Self { pending })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl PostSource for ListingFileSource {
    fn name(&self) -> &'static str {
        "listing-file"
    }

    fn can_unsave(&self) -> bool {
        false
    }

    async fn next_page(&mut self, limit: usize) -> Result<Vec<Post>, SourceError> {
        let n = limit.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    async fn unsave(&self, _post_id: &str) -> Result<(), SourceError> {
        Err(SourceError::ReadOnly(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
      "kind": "Listing",
      "data": {
        "children": [
          {"kind": "t3", "data": {"id": "p1", "title": "Lake \"at\" dawn", "subreddit": "EarthPorn",
            "url": "https://i.redd.it/abc.jpg", "author": "alice", "over_18": false, "score": 120,
            "created_utc": 1600000000.0, "is_self": false}},
          {"kind": "t3", "data": {"id": "p2", "title": "A question", "subreddit": "AskReddit",
            "url": "https://www.reddit.com/r/AskReddit/comments/p2/", "is_self": true}},
          {"kind": "t1", "data": {"id": "c1", "body": "a saved comment"}},
          {"kind": "t3", "data": {"id": "p3", "title": "Crosspost", "subreddit": "pics",
            "url": "https://www.reddit.com/r/pics/comments/zzz/"}},
          {"kind": "t3", "data": {"id": "p4", "title": "Album", "subreddit": "wallpapers",
            "url": "https://imgur.com/a/rSZlZ", "author": "bob", "score": 7}}
        ]
      }
    }"#;

    #[tokio::test]
    async fn keeps_only_link_posts() {
        let mut source = ListingFileSource::from_json("saved.json", LISTING).unwrap();
        assert_eq!(source.remaining(), 2);

        let page = source.next_page(10).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["p1", "p4"]);
        assert_eq!(page[0].subcategory(), "EarthPorn");
        assert_eq!(page[0].created().timestamp(), 1_600_000_000);
        assert!(!page[0].can_unsave());
        assert!(source.next_page(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pages_respect_the_limit() {
        let mut source = ListingFileSource::from_json("saved.json", LISTING).unwrap();
        assert_eq!(source.next_page(1).await.unwrap().len(), 1);
        assert_eq!(source.next_page(1).await.unwrap().len(), 1);
        assert_eq!(source.next_page(1).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn bare_child_arrays_are_accepted_and_unsave_is_refused() {
        let json = r#"[{"kind": "t3", "data": {"id": "x", "title": "t", "url": "https://i.redd.it/x.png"}}]"#;
        let source = ListingFileSource::from_json("inline", json).unwrap();
        assert_eq!(source.remaining(), 1);
        assert!(matches!(source.unsave("x").await, Err(SourceError::ReadOnly("listing-file"))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ListingFileSource::from_json("bad", "{\"nope\": 1}"),
            Err(SourceError::Parse { .. })
        ));
    }
}
