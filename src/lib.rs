pub mod error;
pub mod pipeline;
pub mod plugins;
pub mod source;
