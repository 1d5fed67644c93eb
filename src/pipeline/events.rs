use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    PostQueued { post_id: String, title: String, found: usize },
    PostSkipped { post_id: String, url: String, reason: String },
    ItemSaved { post_id: String, url: String, path: PathBuf },
    ItemFailed { post_id: String, url: String, reason: String },
    PostFinished { post_id: String, saved: usize, found: usize },
    Info { scope: String, message: String },
}
