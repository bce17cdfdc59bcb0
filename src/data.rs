use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::mastodon::{self, ApiError, ListingOptions};
use crate::model::{normalize_handle, Author, FeedItem, Post, Profile, Timeline};

pub trait FeedService: Send + Sync {
    /// Items newer than `since`, newest first; the latest page when `since`
    /// is `None`.
    fn fetch_newer(&self, timeline: &Timeline, since: Option<&str>) -> Result<Vec<FeedItem>>;
    /// Items strictly older than the `max` cursor, newest first.
    fn fetch_older(&self, timeline: &Timeline, max: &str) -> Result<Vec<FeedItem>>;
    fn fetch_single(&self, id: &str) -> Result<Post>;
    fn profile(&self, handle: &str) -> Result<Profile>;
    fn signed_in(&self) -> Result<Profile>;
}

pub trait InteractionService: Send + Sync {
    fn favourite(&self, id: &str) -> Result<()>;
    fn unfavourite(&self, id: &str) -> Result<()>;
    fn boost(&self, id: &str) -> Result<()>;
    fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Post>;
    fn follow(&self, handle: &str) -> Result<()>;
    fn unfollow(&self, handle: &str) -> Result<()>;
}

pub struct MastodonFeedService {
    client: Arc<mastodon::Client>,
}

impl MastodonFeedService {
    pub fn new(client: Arc<mastodon::Client>) -> Self {
        Self { client }
    }

    fn page(&self, timeline: &Timeline, opts: ListingOptions) -> Result<Vec<FeedItem>> {
        match timeline {
            Timeline::Home => Ok(statuses(self.client.home(opts).context("fetch home")?)),
            Timeline::Mentions => {
                let page = self.client.mentions(opts).context("fetch mentions")?;
                Ok(page
                    .items
                    .into_iter()
                    .filter_map(|notification| {
                        let cursor = notification.id;
                        notification.status.map(|status| FeedItem {
                            cursor,
                            post: status.into_post(),
                        })
                    })
                    .collect())
            }
            Timeline::User(handle) => {
                let id = self.client.account_id(handle)?;
                let page = self
                    .client
                    .account_statuses(&id, opts)
                    .with_context(|| format!("fetch timeline of @{handle}"))?;
                Ok(statuses(page))
            }
            Timeline::List(name) => {
                let id = self.client.list_id(name)?;
                let page = self
                    .client
                    .list_timeline(&id, opts)
                    .with_context(|| format!("fetch list {name}"))?;
                Ok(statuses(page))
            }
            Timeline::Favourites(handle) => {
                let me = self.client.verify_credentials()?;
                let wanted = normalize_handle(handle);
                if wanted != normalize_handle(&me.acct) && wanted != normalize_handle(&me.username)
                {
                    return Err(ApiError::ForeignFavourites(handle.clone()).into());
                }
                let page = self.client.favourites(opts).context("fetch favourites")?;
                Ok(favourites(page))
            }
        }
    }
}

fn statuses(page: mastodon::Page<mastodon::Status>) -> Vec<FeedItem> {
    page.items
        .into_iter()
        .map(|status| FeedItem::new(status.into_post()))
        .collect()
}

/// Favourites page by ids that only the `Link` header carries, so the first
/// and last items take those cursors. A one-item page keeps the older one.
fn favourites(page: mastodon::Page<mastodon::Status>) -> Vec<FeedItem> {
    let mastodon::Page {
        items,
        next_max_id,
        prev_min_id,
    } = page;
    let mut items: Vec<FeedItem> = items
        .into_iter()
        .map(|status| FeedItem::new(status.into_post()))
        .collect();
    if let (Some(first), Some(prev)) = (items.first_mut(), prev_min_id) {
        first.cursor = prev;
    }
    if let (Some(last), Some(next)) = (items.last_mut(), next_max_id) {
        last.cursor = next;
    }
    items
}

impl FeedService for MastodonFeedService {
    fn fetch_newer(&self, timeline: &Timeline, since: Option<&str>) -> Result<Vec<FeedItem>> {
        self.page(
            timeline,
            ListingOptions::newer(since, self.client.page_size()),
        )
    }

    fn fetch_older(&self, timeline: &Timeline, max: &str) -> Result<Vec<FeedItem>> {
        self.page(timeline, ListingOptions::older(max, self.client.page_size()))
    }

    fn fetch_single(&self, id: &str) -> Result<Post> {
        Ok(self
            .client
            .status(id)
            .with_context(|| format!("fetch post {id}"))?
            .into_post())
    }

    fn profile(&self, handle: &str) -> Result<Profile> {
        let account = self
            .client
            .lookup(handle)
            .with_context(|| format!("look up @{handle}"))?;
        let following = match self.client.relationship(&account.id) {
            Ok(relationship) => relationship.following,
            Err(err) => {
                warn!(error = %err, handle, "relationship lookup failed");
                false
            }
        };
        Ok(account.into_profile(following))
    }

    fn signed_in(&self) -> Result<Profile> {
        Ok(self
            .client
            .verify_credentials()
            .context("verify credentials")?
            .into_profile(false))
    }
}

pub struct MastodonInteractionService {
    client: Arc<mastodon::Client>,
}

impl MastodonInteractionService {
    pub fn new(client: Arc<mastodon::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for MastodonInteractionService {
    fn favourite(&self, id: &str) -> Result<()> {
        self.client.favourite(id)
    }

    fn unfavourite(&self, id: &str) -> Result<()> {
        self.client.unfavourite(id)
    }

    fn boost(&self, id: &str) -> Result<()> {
        self.client.reblog(id)
    }

    fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Post> {
        Ok(self.client.post_status(text, in_reply_to)?.into_post())
    }

    fn follow(&self, handle: &str) -> Result<()> {
        let id = self.client.account_id(handle)?;
        self.client.follow(&id)?;
        Ok(())
    }

    fn unfollow(&self, handle: &str) -> Result<()> {
        let id = self.client.account_id(handle)?;
        self.client.unfollow(&id)?;
        Ok(())
    }
}

/// In-memory feeds for tests. Each feed is a list of post ids, newest first;
/// posts are synthesized on demand with the id as cursor.
pub struct MockFeedService {
    feeds: RwLock<HashMap<Timeline, Vec<String>>>,
    parents: RwLock<HashMap<String, String>>,
    profiles: RwLock<HashMap<String, Profile>>,
    page_size: usize,
    failing: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl Default for MockFeedService {
    fn default() -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            parents: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            page_size: 20,
            failing: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockFeedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(self, timeline: Timeline, ids: &[&str]) -> Self {
        self.feeds
            .write()
            .insert(timeline, ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn with_reply(self, id: &str, parent: &str) -> Self {
        self.parents
            .write()
            .insert(id.to_string(), parent.to_string());
        self
    }

    pub fn with_profile(self, profile: Profile) -> Self {
        self.profiles
            .write()
            .insert(normalize_handle(&profile.handle), profile);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds `ids` on top of a feed, as if they were just published.
    pub fn publish(&self, timeline: &Timeline, ids: &[&str]) {
        let mut feeds = self.feeds.write();
        let feed = feeds.entry(timeline.clone()).or_default();
        let mut fresh: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        fresh.append(feed);
        *feed = fresh;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call);
        if self.failing.load(Ordering::SeqCst) {
            bail!("mock: network unreachable");
        }
        Ok(())
    }

    fn post(&self, id: &str, author: &str) -> Post {
        let mut post = Post::new(
            id,
            Author {
                id: format!("{author}-id"),
                handle: author.to_string(),
                display_name: author.to_uppercase(),
            },
            format!("post {id}"),
        );
        post.in_reply_to_id = self.parents.read().get(id).cloned();
        post
    }

    fn items(&self, timeline: &Timeline, ids: impl Iterator<Item = String>) -> Vec<FeedItem> {
        let author = match timeline {
            Timeline::User(handle) => handle.clone(),
            _ => "alice".to_string(),
        };
        ids.take(self.page_size)
            .map(|id| FeedItem::new(self.post(&id, &author)))
            .collect()
    }
}

impl FeedService for MockFeedService {
    fn fetch_newer(&self, timeline: &Timeline, since: Option<&str>) -> Result<Vec<FeedItem>> {
        self.record(format!("newer {timeline} {}", since.unwrap_or("-")))?;
        let feed = self.feeds.read().get(timeline).cloned().unwrap_or_default();
        let ids = feed
            .into_iter()
            .take_while(|id| Some(id.as_str()) != since);
        Ok(self.items(timeline, ids))
    }

    fn fetch_older(&self, timeline: &Timeline, max: &str) -> Result<Vec<FeedItem>> {
        self.record(format!("older {timeline} {max}"))?;
        let feed = self.feeds.read().get(timeline).cloned().unwrap_or_default();
        let ids = feed.into_iter().skip_while(|id| id != max).skip(1);
        Ok(self.items(timeline, ids))
    }

    fn fetch_single(&self, id: &str) -> Result<Post> {
        self.record(format!("single {id}"))?;
        let parents = self.parents.read();
        let known = parents.contains_key(id) || parents.values().any(|parent| parent == id);
        drop(parents);
        if !known {
            return Err(ApiError::NotFound(format!("/api/v1/statuses/{id}")).into());
        }
        Ok(self.post(id, "alice"))
    }

    fn profile(&self, handle: &str) -> Result<Profile> {
        self.record(format!("profile {handle}"))?;
        Ok(self
            .profiles
            .read()
            .get(&normalize_handle(handle))
            .cloned()
            .unwrap_or_else(|| Profile {
                id: format!("{handle}-id"),
                handle: handle.to_string(),
                display_name: handle.to_uppercase(),
                ..Profile::default()
            }))
    }

    fn signed_in(&self) -> Result<Profile> {
        Ok(Profile {
            id: "me-id".into(),
            handle: "me".into(),
            display_name: "Me".into(),
            ..Profile::default()
        })
    }
}

/// Records every mutation as a string such as `"favourite 3"`.
#[derive(Default)]
pub struct MockInteractionService {
    failing: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockInteractionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push(call);
        if self.failing.load(Ordering::SeqCst) {
            bail!("mock: request rejected");
        }
        Ok(())
    }
}

impl InteractionService for MockInteractionService {
    fn favourite(&self, id: &str) -> Result<()> {
        self.record(format!("favourite {id}"))
    }

    fn unfavourite(&self, id: &str) -> Result<()> {
        self.record(format!("unfavourite {id}"))
    }

    fn boost(&self, id: &str) -> Result<()> {
        self.record(format!("boost {id}"))
    }

    fn post(&self, text: &str, in_reply_to: Option<&str>) -> Result<Post> {
        self.record(format!("post {text:?} {}", in_reply_to.unwrap_or("-")))?;
        Ok(Post::new(
            "posted",
            Author {
                id: "me-id".into(),
                handle: "me".into(),
                display_name: "Me".into(),
            },
            text,
        ))
    }

    fn follow(&self, handle: &str) -> Result<()> {
        self.record(format!("follow {handle}"))
    }

    fn unfollow(&self, handle: &str) -> Result<()> {
        self.record(format!("unfollow {handle}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastodon::{Account, Page, Status};
    use chrono::Utc;

    fn status(id: &str) -> Status {
        Status {
            id: id.into(),
            created_at: Utc::now(),
            account: Account {
                id: "7".into(),
                username: "alice".into(),
                acct: "alice".into(),
                display_name: "Alice".into(),
                note: String::new(),
                url: String::new(),
                locked: false,
                statuses_count: 0,
                followers_count: 0,
                following_count: 0,
            },
            content: "<p>hi</p>".into(),
            spoiler_text: String::new(),
            in_reply_to_id: None,
            reblog: None,
            url: None,
            replies_count: 0,
            reblogs_count: 0,
            favourites_count: 0,
            favourited: Some(true),
            reblogged: None,
            media_attachments: Vec::new(),
        }
    }

    #[test]
    fn favourites_take_link_cursors() {
        let page = Page {
            items: vec![status("30"), status("20"), status("10")],
            next_max_id: Some("501".into()),
            prev_min_id: Some("777".into()),
        };
        let items = favourites(page);
        let cursors: Vec<_> = items.iter().map(|item| item.cursor.as_str()).collect();
        assert_eq!(cursors, vec!["777", "20", "501"]);
        assert!(items[0].post.is_favourited());
    }

    #[test]
    fn mock_pages_in_both_directions() {
        let feed = MockFeedService::new()
            .with_feed(Timeline::Home, &["5", "4", "3", "2", "1"])
            .with_page_size(2);
        let ids = |items: Vec<FeedItem>| -> Vec<String> {
            items.into_iter().map(|item| item.cursor).collect()
        };
        assert_eq!(ids(feed.fetch_newer(&Timeline::Home, None).unwrap()), vec!["5", "4"]);
        assert_eq!(ids(feed.fetch_older(&Timeline::Home, "4").unwrap()), vec!["3", "2"]);
        feed.publish(&Timeline::Home, &["6"]);
        assert_eq!(ids(feed.fetch_newer(&Timeline::Home, Some("5")).unwrap()), vec!["6"]);
        assert_eq!(feed.calls().len(), 3);
    }

    #[test]
    fn mock_single_fetch_knows_reply_links() {
        let feed = MockFeedService::new().with_reply("3", "2");
        assert_eq!(
            feed.fetch_single("3").unwrap().in_reply_to_id.as_deref(),
            Some("2")
        );
        assert!(feed.fetch_single("2").is_ok());
        assert!(feed.fetch_single("9").is_err());
    }

    #[test]
    fn mock_interactions_record_and_fail() {
        let api = MockInteractionService::new();
        api.favourite("1").unwrap();
        api.set_failing(true);
        assert!(api.boost("1").is_err());
        assert_eq!(api.calls(), vec!["favourite 1", "boost 1"]);
    }
}
