use crate::error::ResolveError;

/// Placeholder for flickr photo pages. There is no extraction rule yet, so
/// construction always fails instead of registering a resolver that never matches.
#[derive(Debug)]
pub struct FlickrResolver {
    _unconstructible: (),
}

impl FlickrResolver {
    pub const PROVIDER: &'static str = "flickr";
    pub const HOSTS: &'static [&'static str] = &["flickr.com", "www.flickr.com", "flic.kr"];

    pub fn new() -> Result<Self, ResolveError> {
        Err(ResolveError::NotImplemented { provider: Self::PROVIDER })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_construction() {
        let err = FlickrResolver::new().unwrap_err();
        assert!(matches!(err, ResolveError::NotImplemented { provider: "flickr" }));
    }
}
