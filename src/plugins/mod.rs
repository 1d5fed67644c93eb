pub mod flickr;
pub mod gfycat;
pub mod http;
pub mod imgur;
pub mod registry;
