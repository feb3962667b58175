//! Reference routing by first path segment

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::node::{ReferenceResolver, ReferencedObject};

/// Dispatches a reference to the resolver registered for its first segment
///
/// `/content/site/page` goes to the `content` resolver; anything unrouted
/// goes to the default resolver. Routed resolvers share one ACL cache, so
/// their node keys must not overlap (see [`MemoryTree::with_namespace`]).
///
/// [`MemoryTree::with_namespace`]: crate::node::MemoryTree::with_namespace
pub struct PathReferenceResolver {
    routes: HashMap<String, Arc<dyn ReferenceResolver>>,
    default: Arc<dyn ReferenceResolver>,
}

impl PathReferenceResolver {
    pub fn new(default: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            routes: HashMap::new(),
            default,
        }
    }

    pub fn with_route(mut self, segment: impl Into<String>, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.register(segment, resolver);
        self
    }

    pub fn register(&mut self, segment: impl Into<String>, resolver: Arc<dyn ReferenceResolver>) {
        self.routes.insert(segment.into(), resolver);
    }

    fn route(&self, reference: &str) -> &Arc<dyn ReferenceResolver> {
        first_segment(reference)
            .and_then(|segment| self.routes.get(segment))
            .unwrap_or(&self.default)
    }
}

/// First non-empty `/`-separated segment of a reference
pub fn first_segment(reference: &str) -> Option<&str> {
    reference.split('/').find(|segment| !segment.is_empty())
}

#[async_trait]
impl ReferenceResolver for PathReferenceResolver {
    async fn resolve(&self, reference: &str) -> Arc<dyn ReferencedObject> {
        debug!(reference, segment = ?first_segment(reference), "Routing reference");
        self.route(reference).resolve(reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::EmptyObject;

    struct Tagged(&'static str);

    #[async_trait]
    impl ReferenceResolver for Tagged {
        async fn resolve(&self, reference: &str) -> Arc<dyn ReferencedObject> {
            Arc::new(EmptyObject::new(format!("{}:{}", self.0, reference)))
        }
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("/content/a"), Some("content"));
        assert_eq!(first_segment("content"), Some("content"));
        assert_eq!(first_segment("//users/x"), Some("users"));
        assert_eq!(first_segment("/"), None);
        assert_eq!(first_segment(""), None);
    }

    #[tokio::test]
    async fn test_routes_by_segment() {
        let resolver = PathReferenceResolver::new(Arc::new(Tagged("default")))
            .with_route("content", Arc::new(Tagged("content")));

        assert_eq!(resolver.resolve("/content/a").await.key(), "content:/content/a");
        assert_eq!(resolver.resolve("/users/a").await.key(), "default:/users/a");
        assert_eq!(resolver.resolve("/").await.key(), "default:/");
    }
}
