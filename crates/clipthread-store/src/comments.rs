//! Comment threads.
//!
//! Comments are stored flat with an optional `parent_id` and reassembled into
//! a forest on every read.  A comment whose parent is not among the fetched
//! comments means the tree in the database is broken (for instance a
//! hard-deleted parent); reads fail with [`StoreError::BrokenCommentTree`]
//! rather than dropping or re-rooting the orphan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use clipthread_shared::{Clock, RecordId};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::collaborators::ProfileLookup;
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Comment, PublicProfile, Share, User};
use crate::record::{Collection, Filter, Record, Sort};
use crate::shares::{ShareQuery, Shares};

#[derive(Debug, Clone, Default)]
pub struct CommentQuery {
    /// Author filter; together with `video_id` it is also the viewer whose
    /// incoming shares on that video are included.
    pub user_id: Option<RecordId>,
    pub video_id: Option<String>,
    /// Only meaningful with `recipient_id`: restrict to shares from this owner.
    pub owner_id: Option<RecordId>,
    /// List the comments shared with this user instead of authored ones.
    pub recipient_id: Option<RecordId>,
    pub populate: bool,
    pub limit: Option<u32>,
}

/// A comment with its replies, and when populated its author and the users
/// it was shared with.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shared_with: Vec<PublicProfile>,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    fn new(comment: Comment) -> Self {
        Self {
            comment,
            user: None,
            shared_with: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of comments below this one.
    pub fn descendants(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.descendants())
            .sum()
    }
}

pub struct Comments {
    collection: Collection<Comment>,
    shares: Arc<Shares>,
    profiles: Arc<dyn ProfileLookup>,
    clock: Arc<dyn Clock>,
}

impl Comments {
    pub fn new(
        db: Database,
        shares: Arc<Shares>,
        profiles: Arc<dyn ProfileLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collection: Collection::new(db),
            shares,
            profiles,
            clock,
        }
    }

    /// Post a comment.  A reply whose parent is missing or belongs to another
    /// video is refused with `None`.
    pub async fn add(
        &self,
        user_id: RecordId,
        video_id: &str,
        text: &str,
        parent_id: Option<RecordId>,
    ) -> Result<Option<RecordId>> {
        if let Some(parent_id) = parent_id {
            match self.collection.get(parent_id).await? {
                Some(parent) if parent.video_id == video_id => {}
                Some(_) => {
                    warn!(parent_id = %parent_id, video_id, "reply to a comment on another video refused");
                    return Ok(None);
                }
                None => {
                    warn!(parent_id = %parent_id, video_id, "reply to a missing comment refused");
                    return Ok(None);
                }
            }
        }

        let comment = Comment {
            id: RecordId::new(),
            user_id,
            video_id: video_id.to_string(),
            text: text.to_string(),
            parent_id,
            date: self.clock.now(),
        };
        let id = self.collection.insert(&comment).await?;
        debug!(user_id = %user_id, video_id, "comment posted");
        Ok(id)
    }

    /// Comment forest visible for `query`, roots oldest first.
    pub async fn list(&self, query: &CommentQuery) -> Result<Vec<CommentNode>> {
        let mut found = match query.recipient_id {
            Some(recipient) => {
                let shared = self
                    .shares
                    .list(&ShareQuery {
                        recipients: Some(vec![recipient]),
                        owner_id: query.owner_id,
                        ..ShareQuery::default()
                    })
                    .await?;
                self.collection.get_many(&comment_ids(&shared)).await?
            }
            None => {
                let mut filter = Filter::new();
                if let Some(user_id) = query.user_id {
                    filter = filter.eq("user_id", user_id);
                }
                if let Some(video_id) = &query.video_id {
                    filter = filter.eq("video_id", video_id.as_str());
                }
                self.collection
                    .list(filter, Some(Sort::asc("date")), query.limit)
                    .await?
            }
        };

        // Comments on this video that others shared with the viewer.
        if let (Some(video_id), Some(viewer)) = (&query.video_id, query.user_id) {
            let shared = self
                .shares
                .list(&ShareQuery {
                    video_id: Some(video_id.clone()),
                    recipients: Some(vec![viewer]),
                    ..ShareQuery::default()
                })
                .await?;
            found.extend(self.collection.get_many(&comment_ids(&shared)).await?);
        }

        let mut seen = HashSet::with_capacity(found.len());
        found.retain(|comment| seen.insert(comment.id));

        let nodes = if query.populate {
            self.populate(found).await?
        } else {
            found.into_iter().map(CommentNode::new).collect()
        };
        assemble(nodes)
    }

    async fn populate(&self, found: Vec<Comment>) -> Result<Vec<CommentNode>> {
        let ids: Vec<RecordId> = found.iter().map(|c| c.id).collect();
        let shares = self
            .shares
            .list(&ShareQuery {
                comments: Some(ids),
                ..ShareQuery::default()
            })
            .await?;

        let mut user_ids: Vec<RecordId> = found.iter().map(|c| c.user_id).collect();
        user_ids.extend(shares.iter().map(|s| s.recipient_id));
        let profiles: HashMap<RecordId, PublicProfile> = self
            .profiles
            .profiles(&user_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut recipients: HashMap<RecordId, Vec<&Share>> = HashMap::new();
        for share in &shares {
            recipients.entry(share.comment_id).or_default().push(share);
        }

        let profile = |id: RecordId| {
            profiles
                .get(&id)
                .cloned()
                .ok_or(StoreError::DanglingReference {
                    collection: User::COLLECTION,
                    id,
                })
        };

        found
            .into_iter()
            .map(|comment| {
                let user = profile(comment.user_id)?;
                let shared_with = recipients
                    .get(&comment.id)
                    .map(|shares| {
                        shares
                            .iter()
                            .filter(|s| s.video_id == comment.video_id)
                            .map(|s| profile(s.recipient_id))
                            .collect::<Result<Vec<_>>>()
                    })
                    .transpose()?
                    .unwrap_or_default();
                Ok(CommentNode {
                    user: Some(user),
                    shared_with,
                    ..CommentNode::new(comment)
                })
            })
            .collect()
    }
}

fn comment_ids(shares: &[Share]) -> Vec<RecordId> {
    shares.iter().map(|s| s.comment_id).collect()
}

/// Rebuild the reply forest of a flat comment list.
///
/// Roots are ordered by date (then id); replies keep the order of `comments`.
pub fn build_forest(comments: Vec<Comment>) -> Result<Vec<CommentNode>> {
    assemble(comments.into_iter().map(CommentNode::new).collect())
}

fn assemble(nodes: Vec<CommentNode>) -> Result<Vec<CommentNode>> {
    let index: HashMap<RecordId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.comment.id, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        match node.comment.parent_id {
            None => roots.push(i),
            Some(parent_id) => match index.get(&parent_id) {
                Some(&parent) => children[parent].push(i),
                None => return Err(broken(node.comment.id, parent_id)),
            },
        }
    }

    roots.sort_by_key(|&i| (nodes[i].comment.date, nodes[i].comment.id));

    let mut slots: Vec<Option<CommentNode>> = nodes.into_iter().map(Some).collect();
    let forest: Vec<CommentNode> = roots
        .into_iter()
        .filter_map(|root| attach(root, &mut slots, &children))
        .collect();

    // Anything not reachable from a root sits on a parent cycle.
    if let Some(orphan) = slots.into_iter().flatten().next() {
        let parent_id = orphan.comment.parent_id.unwrap_or(orphan.comment.id);
        return Err(broken(orphan.comment.id, parent_id));
    }

    Ok(forest)
}

fn attach(
    at: usize,
    slots: &mut [Option<CommentNode>],
    children: &[Vec<usize>],
) -> Option<CommentNode> {
    let mut node = slots[at].take()?;
    for &child in &children[at] {
        if let Some(child) = attach(child, slots, children) {
            node.children.push(child);
        }
    }
    Some(node)
}

fn broken(comment_id: RecordId, parent_id: RecordId) -> StoreError {
    error!(comment_id = %comment_id, parent_id = %parent_id, "inconsistent comment tree");
    StoreError::BrokenCommentTree {
        comment_id,
        parent_id,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use clipthread_shared::{Pbkdf2Hasher, StepClock};
    use serde_json::Map;

    use super::*;
    use crate::models::NewUser;
    use crate::notifications::Notifications;
    use crate::users::Users;

    fn comment(at: DateTime<Utc>, parent_id: Option<RecordId>) -> Comment {
        Comment {
            id: RecordId::new(),
            user_id: RecordId::new(),
            video_id: "v".to_string(),
            text: String::new(),
            parent_id,
            date: at,
        }
    }

    #[test]
    fn test_forest_shape_and_order() {
        let t0 = Utc::now();
        let late_root = comment(t0 + Duration::seconds(10), None);
        let early_root = comment(t0, None);
        let reply_a = comment(t0 + Duration::seconds(20), Some(late_root.id));
        let reply_b = comment(t0 + Duration::seconds(5), Some(late_root.id));
        let nested = comment(t0 + Duration::seconds(30), Some(reply_a.id));

        // Replies come before their parents in fetch order on purpose.
        let input = vec![
            nested.clone(),
            reply_a.clone(),
            late_root.clone(),
            reply_b.clone(),
            early_root.clone(),
        ];
        let forest = build_forest(input).unwrap();

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].comment.id, early_root.id);
        assert_eq!(forest[1].comment.id, late_root.id);

        let late = &forest[1];
        let order: Vec<RecordId> = late.children.iter().map(|n| n.comment.id).collect();
        assert_eq!(order, vec![reply_a.id, reply_b.id]);
        assert_eq!(late.children[0].children[0].comment.id, nested.id);

        let total: usize = forest.iter().map(CommentNode::descendants).sum();
        assert_eq!(total, 5 - forest.len());
    }

    #[test]
    fn test_missing_parent_is_broken_tree() {
        let orphan = comment(Utc::now(), Some(RecordId::new()));
        let err = build_forest(vec![orphan.clone()]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::BrokenCommentTree { comment_id, .. } if comment_id == orphan.id
        ));
    }

    #[test]
    fn test_parent_cycle_is_broken_tree() {
        let t0 = Utc::now();
        let mut a = comment(t0, None);
        let b = comment(t0, Some(a.id));
        a.parent_id = Some(b.id);

        let err = build_forest(vec![a, b]).unwrap_err();
        assert!(matches!(err, StoreError::BrokenCommentTree { .. }));

        let mut selfish = comment(t0, None);
        selfish.parent_id = Some(selfish.id);
        assert!(build_forest(vec![selfish]).is_err());
    }

    #[test]
    fn test_empty_forest() {
        assert!(build_forest(Vec::new()).unwrap().is_empty());
    }

    struct Thread {
        comments: Comments,
        shares: Arc<Shares>,
        users: Arc<Users>,
    }

    fn thread() -> Thread {
        let db = Database::open_in_memory().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(StepClock::new(Utc::now(), Duration::seconds(1)));
        let users = Arc::new(Users::new(db.clone(), Arc::new(Pbkdf2Hasher::new(1_000))));
        let notifications = Arc::new(Notifications::new(db.clone(), users.clone(), clock.clone()));
        let shares = Arc::new(Shares::new(db.clone(), notifications, clock.clone()));
        Thread {
            comments: Comments::new(db, shares.clone(), users.clone(), clock),
            shares,
            users,
        }
    }

    async fn user(users: &Users, email: &str) -> RecordId {
        users
            .add(email, "pw", NewUser::default())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reply_must_target_same_video() {
        let t = thread();
        let author = RecordId::new();
        let root = t.comments.add(author, "v1", "hi", None).await.unwrap().unwrap();

        assert!(t.comments.add(author, "v2", "re", Some(root)).await.unwrap().is_none());
        assert!(t
            .comments
            .add(author, "v1", "re", Some(RecordId::new()))
            .await
            .unwrap()
            .is_none());
        assert!(t.comments.add(author, "v1", "re", Some(root)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_video_listing_builds_tree() {
        let t = thread();
        let (u1, u2) = (RecordId::new(), RecordId::new());
        let root = t.comments.add(u1, "V", "hello", None).await.unwrap().unwrap();
        t.comments.add(u2, "V", "hi back", Some(root)).await.unwrap();
        t.comments.add(u1, "other", "elsewhere", None).await.unwrap();

        let forest = t
            .comments
            .list(&CommentQuery {
                video_id: Some("V".to_string()),
                ..CommentQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].comment.text, "hello");
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].comment.user_id, u2);
    }

    #[tokio::test]
    async fn test_viewer_sees_comments_shared_with_them() {
        let t = thread();
        let owner = user(&t.users, "owner@example.org").await;
        let viewer = user(&t.users, "viewer@example.org").await;

        let mine = t.comments.add(viewer, "V", "mine", None).await.unwrap().unwrap();
        let theirs = t.comments.add(owner, "V", "theirs", None).await.unwrap().unwrap();
        t.comments.add(owner, "V", "private", None).await.unwrap();
        t.shares
            .add("V", theirs, Map::new(), owner, viewer)
            .await
            .unwrap();

        let forest = t
            .comments
            .list(&CommentQuery {
                user_id: Some(viewer),
                video_id: Some("V".to_string()),
                populate: true,
                ..CommentQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<RecordId> = forest.iter().map(|n| n.comment.id).collect();
        assert_eq!(ids, vec![mine, theirs]);

        let shared = &forest[1];
        assert_eq!(shared.user.as_ref().unwrap().id, owner);
        assert_eq!(shared.shared_with.len(), 1);
        assert_eq!(shared.shared_with[0].id, viewer);
        assert!(forest[0].shared_with.is_empty());

        let inbox = t
            .comments
            .list(&CommentQuery {
                recipient_id: Some(viewer),
                owner_id: Some(owner),
                ..CommentQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].comment.id, theirs);
    }

    #[tokio::test]
    async fn test_populate_surfaces_missing_author() {
        let t = thread();
        t.comments.add(RecordId::new(), "V", "ghost", None).await.unwrap();

        let err = t
            .comments
            .list(&CommentQuery {
                video_id: Some("V".to_string()),
                populate: true,
                ..CommentQuery::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference { collection: "users", .. }));
    }

    #[tokio::test]
    async fn test_hard_deleted_parent_breaks_listing() {
        let t = thread();
        let author = RecordId::new();
        let root = t.comments.add(author, "V", "root", None).await.unwrap().unwrap();
        t.comments.add(author, "V", "reply", Some(root)).await.unwrap();

        t.comments.collection.delete(root).await.unwrap();

        let err = t
            .comments
            .list(&CommentQuery {
                video_id: Some("V".to_string()),
                ..CommentQuery::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::BrokenCommentTree { parent_id, .. } if parent_id == root
        ));
    }
}
