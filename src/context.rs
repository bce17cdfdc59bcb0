use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::cache::{ContentCache, ProfileCache};
use crate::data::{FeedService, InteractionService};
use crate::painter::LabelPalette;
use crate::tasks::Delivery;

/// Everything views and background tasks share. Cloning is cheap: every field
/// is a handle onto the same underlying state.
#[derive(Clone)]
pub struct AppContext {
    pub posts: ContentCache,
    pub profiles: ProfileCache,
    pub palette: Arc<LabelPalette>,
    pub feed: Arc<dyn FeedService>,
    pub interactions: Arc<dyn InteractionService>,
    pub deliveries: Sender<Delivery>,
    /// Where `set_footer` writes; `None` means the default config path.
    pub config_path: Option<PathBuf>,
}

impl AppContext {
    /// Builds a context and hands back the receiving end of its delivery
    /// queue, which the event loop drains.
    pub fn new(
        feed: Arc<dyn FeedService>,
        interactions: Arc<dyn InteractionService>,
        config_path: Option<PathBuf>,
    ) -> (Self, Receiver<Delivery>) {
        let (tx, rx) = unbounded();
        let ctx = Self {
            posts: ContentCache::new(),
            profiles: ProfileCache::new(),
            palette: Arc::new(LabelPalette::new()),
            feed,
            interactions,
            deliveries: tx,
            config_path,
        };
        (ctx, rx)
    }
}
