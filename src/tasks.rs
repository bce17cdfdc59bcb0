//! Background work. Every task runs on its own thread, writes what it learns
//! through the shared caches, and reports back as a [`Delivery`] that the
//! event loop applies between two frames.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::cache::ProfileCache;
use crate::config;
use crate::context::AppContext;
use crate::data::InteractionService;
use crate::lock::LockGuard;
use crate::model::{Post, Profile, Timeline};

/// Most entries a conversation view shows, the selected post included.
pub const CONVERSATION_LIMIT: usize = 50;
/// How long confirmation keys are ignored after a draft is confirmed.
pub const CONFIRM_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Newer,
    Older,
}

/// A fetched page: each post's paging cursor and its cached record.
pub type Page = Vec<(String, Arc<Post>)>;

#[derive(Debug)]
pub enum Delivery {
    Page {
        timeline: Timeline,
        direction: Direction,
        result: Result<Page, String>,
    },
    ConversationLink {
        generation: u64,
        result: Result<Arc<Post>, String>,
    },
    /// A reply-chain walk ended and released the conversation lock.
    WalkFinished,
    Profile {
        handle: String,
        result: Result<Arc<Profile>, String>,
    },
    SignedIn(Result<Arc<Profile>, String>),
    Mutation {
        mutation: Mutation,
        error: Option<String>,
    },
    Posted(Result<Arc<Post>, String>),
    Status(String),
}

/// A state change sent to the service after being applied locally.
#[derive(Debug, Clone)]
pub enum Mutation {
    Favourite(Arc<Post>),
    Unfavourite(Arc<Post>),
    Boost(Arc<Post>),
    Follow(String),
    Unfollow(String),
}

impl Mutation {
    fn apply(&self, profiles: &ProfileCache) {
        match self {
            Mutation::Favourite(post) => post.set_favourited(true),
            Mutation::Unfavourite(post) => post.set_favourited(false),
            Mutation::Boost(post) => post.set_boosted(true),
            Mutation::Follow(handle) => profiles.set_following(handle, true),
            Mutation::Unfollow(handle) => profiles.set_following(handle, false),
        }
    }

    /// Undoes [`Mutation::apply`] after the service refused the change.
    pub fn rollback(&self, profiles: &ProfileCache) {
        match self {
            Mutation::Favourite(post) => post.set_favourited(false),
            Mutation::Unfavourite(post) => post.set_favourited(true),
            Mutation::Boost(post) => post.set_boosted(false),
            Mutation::Follow(handle) => profiles.set_following(handle, false),
            Mutation::Unfollow(handle) => profiles.set_following(handle, true),
        }
    }

    fn send(&self, service: &dyn InteractionService) -> Result<()> {
        match self {
            Mutation::Favourite(post) => service.favourite(&post.id),
            Mutation::Unfavourite(post) => service.unfavourite(&post.id),
            Mutation::Boost(post) => service.boost(&post.id),
            Mutation::Follow(handle) => service.follow(handle),
            Mutation::Unfollow(handle) => service.unfollow(handle),
        }
    }

    pub fn failure_message(&self) -> String {
        match self {
            Mutation::Favourite(_) => "Err:Favourite".into(),
            Mutation::Unfavourite(_) => "Err:Unfavourite".into(),
            Mutation::Boost(_) => "Err:Boost".into(),
            Mutation::Follow(handle) => format!("Err! failed to follow @{handle}"),
            Mutation::Unfollow(handle) => format!("Err! failed to unfollow @{handle}"),
        }
    }

    /// Message shown once the service accepted the change, if any.
    pub fn success_message(&self) -> Option<String> {
        match self {
            Mutation::Follow(handle) => Some(format!("Succeed! following @{handle}")),
            Mutation::Unfollow(handle) => Some(format!("Succeed! unfollowed @{handle}")),
            _ => None,
        }
    }
}

fn describe(err: anyhow::Error) -> String {
    format!("{err:#}")
}

/// Applies `mutation` locally, then sends it on a background thread. The
/// delivery carries the service error, if any, so the loop can roll back.
pub fn dispatch_mutation(ctx: &AppContext, mutation: Mutation) {
    mutation.apply(&ctx.profiles);
    let service = ctx.interactions.clone();
    let tx = ctx.deliveries.clone();
    debug!(?mutation, "dispatching mutation");
    thread::spawn(move || {
        let error = mutation.send(service.as_ref()).err().map(describe);
        if let Some(error) = &error {
            warn!(?mutation, %error, "mutation failed");
        }
        let _ = tx.send(Delivery::Mutation { mutation, error });
    });
}

/// Fetches one page of `timeline`. `anchor` is the newest cursor for
/// [`Direction::Newer`] and the oldest one for [`Direction::Older`]. The
/// guard is released before the result is delivered.
pub fn spawn_page(
    ctx: &AppContext,
    timeline: Timeline,
    direction: Direction,
    anchor: Option<String>,
    guard: LockGuard,
) {
    let feed = ctx.feed.clone();
    let posts = ctx.posts.clone();
    let tx = ctx.deliveries.clone();
    debug!(%timeline, ?direction, ?anchor, "fetching page");
    thread::spawn(move || {
        let fetched = match (direction, anchor.as_deref()) {
            (Direction::Older, Some(max)) => feed.fetch_older(&timeline, max),
            (_, since) => feed.fetch_newer(&timeline, since),
        };
        let result = fetched
            .map(|items| {
                items
                    .into_iter()
                    .map(|item| (item.cursor, posts.register(item.post)))
                    .collect()
            })
            .map_err(describe);
        if let Err(error) = &result {
            warn!(%timeline, %error, "page fetch failed");
        }
        drop(guard);
        let _ = tx.send(Delivery::Page {
            timeline,
            direction,
            result,
        });
    });
}

/// A pending reply-chain walk for the conversation view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk {
    /// Id of the post the conversation was opened on.
    pub root: String,
    /// First link not in the content cache.
    pub missing: String,
    /// Entries the view already shows.
    pub shown: usize,
    /// Which entry into the conversation view this walk fills.
    pub generation: u64,
}

/// Walks a reply chain upward from `walk.missing`, one link per request,
/// reading through the content cache. The walk stops once `current` moves
/// past its generation. The guard is released before
/// [`Delivery::WalkFinished`] is sent.
pub fn spawn_conversation_walk(
    ctx: &AppContext,
    walk: Walk,
    current: Arc<AtomicU64>,
    guard: LockGuard,
) {
    let feed = ctx.feed.clone();
    let posts = ctx.posts.clone();
    let tx = ctx.deliveries.clone();
    debug!(root = %walk.root, missing = %walk.missing, "walking reply chain");
    thread::spawn(move || {
        let Walk {
            root,
            missing,
            mut shown,
            generation,
        } = walk;
        let mut next = Some(missing);
        while let Some(id) = next.take() {
            if shown >= CONVERSATION_LIMIT || current.load(Ordering::Acquire) != generation {
                break;
            }
            let post = match posts.get(&id) {
                Some(post) => post,
                None => match feed.fetch_single(&id) {
                    Ok(post) => posts.register(post),
                    Err(err) => {
                        let error = describe(err);
                        warn!(%root, %id, %error, "reply chain stopped");
                        let _ = tx.send(Delivery::ConversationLink {
                            generation,
                            result: Err(error),
                        });
                        break;
                    }
                },
            };
            shown += 1;
            next = post.in_reply_to_id.clone();
            let delivered = tx.send(Delivery::ConversationLink {
                generation,
                result: Ok(post),
            });
            if delivered.is_err() {
                return;
            }
        }
        drop(guard);
        let _ = tx.send(Delivery::WalkFinished);
    });
}

pub fn spawn_profile(ctx: &AppContext, handle: String) {
    let feed = ctx.feed.clone();
    let profiles = ctx.profiles.clone();
    let tx = ctx.deliveries.clone();
    thread::spawn(move || {
        let result = feed
            .profile(&handle)
            .map(|profile| profiles.register(profile))
            .map_err(describe);
        let _ = tx.send(Delivery::Profile { handle, result });
    });
}

pub fn spawn_signed_in(ctx: &AppContext) {
    let feed = ctx.feed.clone();
    let profiles = ctx.profiles.clone();
    let tx = ctx.deliveries.clone();
    thread::spawn(move || {
        let result = feed
            .signed_in()
            .map(|profile| profiles.register(profile))
            .map_err(describe);
        let _ = tx.send(Delivery::SignedIn(result));
    });
}

/// Publishes a draft. Holding `guard` keeps a second submit from racing it.
pub fn spawn_post(ctx: &AppContext, text: String, in_reply_to: Option<String>, guard: LockGuard) {
    let service = ctx.interactions.clone();
    let posts = ctx.posts.clone();
    let tx = ctx.deliveries.clone();
    thread::spawn(move || {
        let result = service
            .post(&text, in_reply_to.as_deref())
            .map(|post| posts.register(post))
            .map_err(describe);
        if let Err(error) = &result {
            warn!(%error, "post failed");
        }
        drop(guard);
        let _ = tx.send(Delivery::Posted(result));
    });
}

/// Holds `guard` for [`CONFIRM_DEBOUNCE`], then lets it go.
pub fn spawn_debounce(guard: LockGuard) {
    thread::spawn(move || {
        thread::sleep(CONFIRM_DEBOUNCE);
        drop(guard);
    });
}

pub fn spawn_open(ctx: &AppContext, urls: Vec<String>) {
    let tx = ctx.deliveries.clone();
    thread::spawn(move || {
        for url in urls {
            if let Err(err) = webbrowser::open(&url) {
                warn!(%url, error = %err, "failed to open url");
                let _ = tx.send(Delivery::Status(format!("Err! cannot open {url}")));
            }
        }
    });
}

pub fn spawn_save_footer(ctx: &AppContext, footer: String) {
    let path = ctx.config_path.clone();
    let tx = ctx.deliveries.clone();
    thread::spawn(move || match config::save_footer(path, &footer) {
        Ok(path) => debug!(path = %path.display(), "footer saved"),
        Err(err) => {
            let error = format!("{err:#}");
            warn!(%error, "failed to save footer");
            let _ = tx.send(Delivery::Status("Err! footer not saved".into()));
        }
    });
}
