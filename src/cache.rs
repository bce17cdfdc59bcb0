use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{normalize_handle, Post, Profile};

/// Posts seen by any view, keyed by id. Entries are never evicted.
#[derive(Debug, Default, Clone)]
pub struct ContentCache {
    posts: Arc<RwLock<HashMap<String, Arc<Post>>>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Post>> {
        self.posts.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.posts.read().contains_key(id)
    }

    /// Stores `post` (and the original it boosts) and returns the shared
    /// record. A post already cached keeps its existing record so optimistic
    /// flag changes stay visible everywhere.
    pub fn register(&self, mut post: Post) -> Arc<Post> {
        if let Some(original) = post.boost_of.take() {
            post.boost_of = Some(self.register_shared(original));
        }
        let mut posts = self.posts.write();
        if let Some(existing) = posts.get(&post.id) {
            return existing.clone();
        }
        let post = Arc::new(post);
        posts.insert(post.id.clone(), post.clone());
        post
    }

    pub fn register_shared(&self, post: Arc<Post>) -> Arc<Post> {
        self.posts
            .write()
            .entry(post.id.clone())
            .or_insert(post)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walks the reply chain upward from `start` through cached posts,
    /// returning the ancestors in order (parent first) and the id of the
    /// first missing link, if any. At most `limit` ancestors are returned.
    pub fn reply_chain(&self, start: &Post, limit: usize) -> (Vec<Arc<Post>>, Option<String>) {
        let posts = self.posts.read();
        let mut chain = Vec::new();
        let mut next = start.in_reply_to_id.clone();
        while let Some(id) = next {
            if chain.len() >= limit {
                return (chain, None);
            }
            match posts.get(&id) {
                Some(parent) => {
                    next = parent.in_reply_to_id.clone();
                    chain.push(parent.clone());
                }
                None => return (chain, Some(id)),
            }
        }
        (chain, None)
    }
}

/// Author profiles keyed by lower-cased handle.
#[derive(Debug, Default, Clone)]
pub struct ProfileCache {
    profiles: Arc<RwLock<HashMap<String, Arc<Profile>>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &str) -> Option<Arc<Profile>> {
        self.profiles.read().get(&normalize_handle(handle)).cloned()
    }

    pub fn register(&self, profile: Profile) -> Arc<Profile> {
        let profile = Arc::new(profile);
        self.profiles
            .write()
            .insert(normalize_handle(&profile.handle), profile.clone());
        profile
    }

    pub fn set_following(&self, handle: &str, following: bool) {
        let key = normalize_handle(handle);
        let mut profiles = self.profiles.write();
        if let Some(existing) = profiles.get(&key) {
            let mut updated = Profile::clone(existing);
            updated.following = following;
            profiles.insert(key, Arc::new(updated));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sample_post;

    fn reply(id: &str, parent: &str) -> Post {
        let mut post = sample_post(id, "alice", id);
        post.in_reply_to_id = Some(parent.to_string());
        post
    }

    #[test]
    fn register_keeps_first_record() {
        let cache = ContentCache::new();
        let first = cache.register(sample_post("1", "alice", "one"));
        first.set_favourited(true);
        let second = cache.register(sample_post("1", "alice", "one again"));
        assert!(second.is_favourited());
        assert_eq!(second.text, "one");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn boosted_original_shares_cached_record() {
        let cache = ContentCache::new();
        let original = cache.register(sample_post("1", "alice", "hello"));
        let mut boost = sample_post("2", "bob", "");
        boost.boost_of = Some(Arc::new(sample_post("1", "alice", "hello")));
        let boost = cache.register(boost);
        boost.shown().set_boosted(true);
        assert!(original.is_boosted());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reply_chain_stops_at_missing_link() {
        let cache = ContentCache::new();
        cache.register(reply("2", "1"));
        cache.register(reply("3", "2"));
        let leaf = reply("4", "3");
        let (chain, missing) = cache.reply_chain(&leaf, 50);
        let ids: Vec<_> = chain.iter().map(|post| post.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(missing.as_deref(), Some("1"));
    }

    #[test]
    fn reply_chain_respects_limit() {
        let cache = ContentCache::new();
        for id in 1..10 {
            cache.register(reply(&id.to_string(), &(id - 1).to_string()));
        }
        let leaf = reply("10", "9");
        let (chain, missing) = cache.reply_chain(&leaf, 3);
        assert_eq!(chain.len(), 3);
        assert!(missing.is_none());
    }

    #[test]
    fn profiles_are_case_insensitive() {
        let cache = ProfileCache::new();
        cache.register(Profile {
            handle: "Alice".into(),
            ..Profile::default()
        });
        assert!(cache.get("@alice").is_some());
        cache.set_following("ALICE", true);
        assert!(cache.get("alice").unwrap().following);
    }
}
