//! Audience resolution
//!
//! The audience of a content event is the originator's follower set at the moment
//! the event is processed. The social graph lives in another service; the pipeline
//! reaches it only through [`FollowerGraph`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use crate::notification::UserId;

/// Error returned by the social graph collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Graph service could not be reached or failed internally
    Unavailable(String),
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::Unavailable(msg) => write!(f, "Social graph unavailable: {}", msg),
        }
    }
}

impl std::error::Error for GraphError {}

/// Read access to the follow relation
pub trait FollowerGraph: Send + Sync + 'static {
    /// Users currently following `followee`
    fn list_followers(
        &self,
        followee: UserId,
    ) -> impl Future<Output = Result<Vec<UserId>, GraphError>> + Send;
}

/// Resolves the recipients of an event
pub struct AudienceResolver<G> {
    graph: Arc<G>,
}

impl<G: FollowerGraph> AudienceResolver<G> {
    pub fn new(graph: Arc<G>) -> Self {
        Self { graph }
    }

    /// The underlying graph
    pub fn graph(&self) -> &Arc<G> {
        &self.graph
    }

    /// Distinct followers of `origin`, in the order the graph returned them
    ///
    /// The follower set is taken as the graph reports it; a user following
    /// themselves is notified like any other follower.
    pub async fn resolve(&self, origin: UserId) -> Result<Vec<UserId>, GraphError> {
        let followers = self.graph.list_followers(origin).await?;
        let total = followers.len();

        let mut seen = HashSet::with_capacity(total);
        let audience: Vec<UserId> = followers
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();

        tracing::debug!(
            origin = origin,
            followers = total,
            audience = audience.len(),
            "Audience resolved"
        );
        Ok(audience)
    }
}

impl<G> Clone for AudienceResolver<G> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
        }
    }
}

/// Follow relation held in memory
///
/// Followers are kept in the order they followed.
#[derive(Debug, Default)]
pub struct MemoryFollowerGraph {
    followers: RwLock<HashMap<UserId, Vec<UserId>>>,
}

impl MemoryFollowerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `follower` follow `followee`. Returns false if already following.
    pub fn follow(&self, follower: UserId, followee: UserId) -> bool {
        let mut map = self.followers.write().unwrap_or_else(PoisonError::into_inner);
        let list = map.entry(followee).or_default();
        if list.contains(&follower) {
            return false;
        }
        list.push(follower);
        true
    }

    /// Remove the follow. Returns false if it did not exist.
    pub fn unfollow(&self, follower: UserId, followee: UserId) -> bool {
        let mut map = self.followers.write().unwrap_or_else(PoisonError::into_inner);
        match map.get_mut(&followee) {
            Some(list) => {
                let before = list.len();
                list.retain(|id| *id != follower);
                list.len() != before
            }
            None => false,
        }
    }

    /// Follow if not following, unfollow otherwise. Returns whether the follow
    /// exists afterwards.
    pub fn toggle_follow(&self, follower: UserId, followee: UserId) -> bool {
        if self.unfollow(follower, followee) {
            false
        } else {
            self.follow(follower, followee)
        }
    }

    /// Snapshot of `followee`'s followers
    pub fn followers_of(&self, followee: UserId) -> Vec<UserId> {
        self.followers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&followee)
            .cloned()
            .unwrap_or_default()
    }
}

impl FollowerGraph for MemoryFollowerGraph {
    async fn list_followers(&self, followee: UserId) -> Result<Vec<UserId>, GraphError> {
        Ok(self.followers_of(followee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGraph(Vec<UserId>);

    impl FollowerGraph for FixedGraph {
        async fn list_followers(&self, _followee: UserId) -> Result<Vec<UserId>, GraphError> {
            Ok(self.0.clone())
        }
    }

    struct DownGraph;

    impl FollowerGraph for DownGraph {
        async fn list_followers(&self, _followee: UserId) -> Result<Vec<UserId>, GraphError> {
            Err(GraphError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_resolve_dedupes_in_graph_order() {
        let resolver = AudienceResolver::new(Arc::new(FixedGraph(vec![3, 2, 3, 1, 2, 4])));

        let audience = resolver.resolve(1).await.unwrap();
        assert_eq!(audience, vec![3, 2, 1, 4]);
    }

    #[tokio::test]
    async fn test_resolve_keeps_self_follow() {
        let graph = Arc::new(MemoryFollowerGraph::new());
        graph.follow(1, 1);
        graph.follow(2, 1);

        let resolver = AudienceResolver::new(graph);
        assert_eq!(resolver.resolve(1).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_resolve_empty() {
        let resolver = AudienceResolver::new(Arc::new(MemoryFollowerGraph::new()));
        assert!(resolver.resolve(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_propagates_failure() {
        let resolver = AudienceResolver::new(Arc::new(DownGraph));
        assert!(matches!(
            resolver.resolve(1).await,
            Err(GraphError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_sees_current_membership() {
        let graph = Arc::new(MemoryFollowerGraph::new());
        let resolver = AudienceResolver::new(Arc::clone(&graph));

        graph.follow(2, 1);
        assert_eq!(resolver.resolve(1).await.unwrap(), vec![2]);

        graph.follow(3, 1);
        graph.unfollow(2, 1);
        assert_eq!(resolver.resolve(1).await.unwrap(), vec![3]);
    }

    #[test]
    fn test_follow_toggle() {
        let graph = MemoryFollowerGraph::new();

        assert!(graph.follow(2, 1));
        assert!(!graph.follow(2, 1));
        assert!(!graph.toggle_follow(2, 1));
        assert!(graph.followers_of(1).is_empty());
        assert!(graph.toggle_follow(2, 1));
        assert_eq!(graph.followers_of(1), vec![2]);
        assert!(!graph.unfollow(5, 9));
    }
}
