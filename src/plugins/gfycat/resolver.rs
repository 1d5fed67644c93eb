use crate::error::ResolveError;

/// Placeholder for gfycat links; see [`FlickrResolver`](crate::plugins::flickr::resolver::FlickrResolver).
#[derive(Debug)]
pub struct GfycatResolver {
    _unconstructible: (),
}

impl GfycatResolver {
    pub const PROVIDER: &'static str = "gfycat";
    pub const HOSTS: &'static [&'static str] = &["gfycat.com", "www.gfycat.com", "thumbs.gfycat.com"];

    pub fn new() -> Result<Self, ResolveError> {
        Err(ResolveError::NotImplemented { provider: Self::PROVIDER })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_construction() {
        assert!(matches!(
            GfycatResolver::new(),
            Err(ResolveError::NotImplemented { provider: "gfycat" })
        ));
    }
}
