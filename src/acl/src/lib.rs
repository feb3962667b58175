//! # CretoAI ACL Engine
//!
//! Hierarchical access-control resolution for path-addressed resource trees.
//!
//! ## Features
//!
//! - **Inherited statements**: grants and denials propagate from ancestor nodes
//! - **First match wins**: a node's own statements are evaluated before inherited ones
//! - **Two-tier caching**: per-request decisions plus shared, invalidated merged ACLs
//! - **Async collaborators** for resource and principal resolution
//! - **Audit trail** of denials and Prometheus-style metrics
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cretoai_acl::{
//!     AccessControlStatement, AclConfig, AuthzResolver, CachingEnvironmentResolver,
//!     EnvironmentRecord, MemoryEnvironmentSource, MemoryTree, PermissionQuery, Session,
//!     SubjectStatement, TreeReferenceResolver,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tree = Arc::new(MemoryTree::new());
//!     tree.set_statements(
//!         "/content",
//!         &[AccessControlStatement::new("read", SubjectStatement::group("staff", ""), true, true)],
//!     )?;
//!     tree.create_node("/content/page")?;
//!
//!     let source = MemoryEnvironmentSource::new();
//!     source.insert("alice", EnvironmentRecord::new().with_group("staff"));
//!     let config = AclConfig::default();
//!     let environments = CachingEnvironmentResolver::from_config(Arc::new(source), &config)?;
//!
//!     let resolver = Arc::new(AuthzResolver::new(
//!         &config,
//!         Arc::new(TreeReferenceResolver::new(tree.clone())),
//!         Arc::new(environments),
//!     )?);
//!     tree.subscribe(resolver.clone());
//!
//!     let mut scope = resolver.begin_request(Session::new("req-1", "alice"));
//!     resolver
//!         .check(&mut scope, "/content/page", &PermissionQuery::single("read"))
//!         .await?;
//!     resolver.end_request(scope);
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod effective;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod node;
pub mod query;
pub mod resolver;
pub mod statement;
pub mod telemetry;

// Re-export commonly used types
pub use audit::{AuditLog, DenialRecord};
pub use cache::{AclCache, Cache, CacheConfig, CacheScope, CacheStats, MemoryCache, RequestScope};
pub use config::AclConfig;
pub use telemetry::{init_tracing, init_tracing_from_config};
pub use effective::EffectiveAcl;
pub use environment::{
    CachingEnvironmentResolver, EnvironmentRecord, EnvironmentSource, MemoryEnvironmentSource,
    Session, UserEnvironment, UserEnvironmentResolver,
};
pub use error::{AclError, DenialReason, PermissionDenied, Result};
pub use metrics::{AclMetrics, MetricsCollector};
pub use node::{
    qualify_key, AclChangeListener, EmptyObject, MemoryTree, NodeRecord, NodeStore,
    ReferenceResolver, ReferencedObject, TreeReferenceResolver,
};
pub use query::{PermissionQuery, QueryRegistry, QueryStatement};
pub use resolver::{AuthzResolver, PathReferenceResolver};
pub use statement::{AccessControlStatement, SubjectStatement, SubjectType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
