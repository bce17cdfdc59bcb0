use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Author {
    pub id: String,
    pub handle: String,
    pub display_name: String,
}

/// A post as shown in a feed. Everything except the interaction flags is
/// immutable once the record is built; the flags flip optimistically while a
/// favourite or boost request is in flight.
#[derive(Debug)]
pub struct Post {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub replies_count: u64,
    pub boosts_count: u64,
    pub favourites_count: u64,
    pub in_reply_to_id: Option<String>,
    pub boost_of: Option<Arc<Post>>,
    pub url: Option<String>,
    pub links: Vec<String>,
    pub media_urls: Vec<String>,
    favourited: AtomicBool,
    boosted: AtomicBool,
}

impl Post {
    pub fn new(id: impl Into<String>, author: Author, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author,
            text: text.into(),
            created_at: Utc::now(),
            replies_count: 0,
            boosts_count: 0,
            favourites_count: 0,
            in_reply_to_id: None,
            boost_of: None,
            url: None,
            links: Vec::new(),
            media_urls: Vec::new(),
            favourited: AtomicBool::new(false),
            boosted: AtomicBool::new(false),
        }
    }

    pub fn with_flags(self, favourited: bool, boosted: bool) -> Self {
        self.favourited.store(favourited, Ordering::SeqCst);
        self.boosted.store(boosted, Ordering::SeqCst);
        self
    }

    /// The post whose body is displayed: the boosted original when this is a
    /// boost, otherwise the post itself.
    pub fn shown(&self) -> &Post {
        self.boost_of.as_deref().unwrap_or(self)
    }

    pub fn is_favourited(&self) -> bool {
        self.favourited.load(Ordering::SeqCst)
    }

    pub fn set_favourited(&self, value: bool) {
        self.favourited.store(value, Ordering::SeqCst);
    }

    pub fn is_boosted(&self) -> bool {
        self.boosted.load(Ordering::SeqCst)
    }

    pub fn set_boosted(&self, value: bool) {
        self.boosted.store(value, Ordering::SeqCst);
    }

    /// Every URL worth opening for this post: links in the body first, then
    /// the post's own page.
    pub fn openable_urls(&self) -> Vec<String> {
        let shown = self.shown();
        let mut urls = shown.links.clone();
        if urls.is_empty() {
            if let Some(url) = &shown.url {
                urls.push(url.clone());
            }
        }
        urls
    }
}

/// A post plus the cursor its feed pages by. Mentions and favourites page by
/// their own identifiers, so the cursor is not always the post id.
#[derive(Debug)]
pub struct FeedItem {
    pub cursor: String,
    pub post: Post,
}

impl FeedItem {
    pub fn new(post: Post) -> Self {
        Self {
            cursor: post.id.clone(),
            post,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub handle: String,
    pub display_name: String,
    pub bio: String,
    pub url: String,
    pub locked: bool,
    pub following: bool,
    pub posts_count: u64,
    pub following_count: u64,
    pub followers_count: u64,
}

/// A fetchable feed with its own pagination state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timeline {
    Home,
    Mentions,
    User(String),
    Favourites(String),
    List(String),
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeline::Home => write!(f, "home"),
            Timeline::Mentions => write!(f, "mentions"),
            Timeline::User(handle) => write!(f, "@{handle}"),
            Timeline::Favourites(handle) => write!(f, "favourites of @{handle}"),
            Timeline::List(name) => write!(f, "list {name}"),
        }
    }
}

pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
pub(crate) fn sample_post(id: &str, handle: &str, text: &str) -> Post {
    Post::new(
        id,
        Author {
            id: format!("{handle}-id"),
            handle: handle.to_string(),
            display_name: handle.to_uppercase(),
        },
        text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shown_unwraps_boosts() {
        let mut boost = sample_post("2", "bob", "");
        boost.boost_of = Some(Arc::new(sample_post("1", "alice", "hello")));
        assert_eq!(boost.shown().id, "1");
        assert_eq!(boost.shown().author.handle, "alice");
    }

    #[test]
    fn flags_flip_through_shared_reference() {
        let post = Arc::new(sample_post("1", "alice", "hi"));
        let other = post.clone();
        post.set_favourited(true);
        assert!(other.is_favourited());
        assert!(!other.is_boosted());
    }

    #[test]
    fn openable_urls_prefer_body_links() {
        let mut post = sample_post("1", "alice", "hi");
        post.url = Some("https://example.social/@alice/1".into());
        assert_eq!(post.openable_urls(), vec!["https://example.social/@alice/1"]);
        post.links = vec!["https://rust-lang.org".into()];
        assert_eq!(post.openable_urls(), vec!["https://rust-lang.org"]);
    }

    #[test]
    fn handles_normalize_case_and_at_sign() {
        assert_eq!(normalize_handle(" @Alice "), "alice");
    }
}
