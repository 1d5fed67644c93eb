//! Where posts come from. Signing in and enumerating a platform happen behind
//! [`PostSource`]; the pipeline only pages through posts and asks for unsaves.

pub mod listing;

use crate::error::SourceError;
use crate::pipeline::post::Post;
use async_trait::async_trait;

#[async_trait]
pub trait PostSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether posts from this source live in a list we are allowed to edit.
    fn can_unsave(&self) -> bool;

    /// Up to `limit` more posts. An empty page means the source is exhausted.
    async fn next_page(&mut self, limit: usize) -> Result<Vec<Post>, SourceError>;

    async fn unsave(&self, post_id: &str) -> Result<(), SourceError>;
}
