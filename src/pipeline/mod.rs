pub mod batch;
pub mod engine;
pub mod events;
pub mod extension;
pub mod log;
pub mod model;
pub mod post;
pub mod retrieval;
pub mod title;
