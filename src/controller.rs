use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Local;
use crossterm::event::KeyEvent;
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use tracing::{debug, info, warn};

use crate::buffer::{EditMode, TextBuffer};
use crate::canvas::Canvas;
use crate::context::AppContext;
use crate::keymap::{literal_char, resolve_action, Action, KeymapMode};
use crate::lock::AdvisoryLock;
use crate::model::{normalize_handle, Post, Profile, Timeline};
use crate::painter::{profile_header_lines, Painter, COLOR_BAR_BG, COLOR_BG, COLOR_TEXT};
use crate::status::{StatusLine, STATUS_TTL_SECS};
use crate::tasks::{self, Delivery, Direction, Mutation, Walk, CONVERSATION_LIMIT};
use crate::viewport::{Entry, Viewport};

/// Depth of the mode history.
pub const MODE_HISTORY: usize = 5;
/// Rows of the composition area.
pub const DRAFT_ROWS: u16 = 4;
/// Drafts this long show their length in the mode bar.
const LENGTH_HINT_FROM: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Home,
    Mentions,
    Conversation,
    UserTimeline,
    Favourites,
    List,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Home => "*Timeline View*",
            Mode::Mentions => "*Mention View*",
            Mode::Conversation => "*Conversation View*",
            Mode::UserTimeline => "*UserTimeline View*",
            Mode::Favourites => "*Favorite View*",
            Mode::List => "*List View*",
        }
    }

    fn keymap(self) -> KeymapMode {
        match self {
            Mode::Conversation => KeymapMode::Conversation,
            _ => KeymapMode::Feed,
        }
    }
}

/// Bounded history of visited modes. The last element is the current mode
/// and the stack never runs empty.
#[derive(Debug, Clone)]
pub struct ModeStack {
    modes: VecDeque<Mode>,
}

impl ModeStack {
    pub fn new(initial: Mode) -> Self {
        Self {
            modes: VecDeque::from([initial]),
        }
    }

    pub fn current(&self) -> Mode {
        self.modes.back().copied().unwrap_or(Mode::Home)
    }

    pub fn push(&mut self, mode: Mode) {
        if self.current() == mode {
            return;
        }
        self.modes.push_back(mode);
        while self.modes.len() > MODE_HISTORY {
            self.modes.pop_front();
        }
    }

    /// Drops the current mode and returns the one beneath it. The bottom
    /// mode is never popped.
    pub fn pop(&mut self) -> Option<Mode> {
        if self.modes.len() < 2 {
            return None;
        }
        self.modes.pop_back();
        Some(self.current())
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitAction {
    Post,
    Reply { to: String, handle: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Composing(SubmitAction),
    Confirming(SubmitAction),
    Command,
}

/// A viewport parked while its surface shows another target.
#[derive(Debug)]
struct Parked {
    viewport: Viewport,
    lock: AdvisoryLock,
}

/// One mode's feed. Scoped surfaces (user, favourites, list) switch between
/// targets and park the viewport of each target they leave.
#[derive(Debug)]
struct Surface {
    timeline: Option<Timeline>,
    viewport: Viewport,
    lock: AdvisoryLock,
    parked: HashMap<Timeline, Parked>,
}

impl Surface {
    fn feed(timeline: Option<Timeline>, width: u16, height: u16) -> Self {
        Self {
            timeline,
            viewport: Viewport::new(width, height),
            lock: AdvisoryLock::new(),
            parked: HashMap::new(),
        }
    }

    fn conversation(width: u16, height: u16) -> Self {
        Self {
            timeline: None,
            viewport: Viewport::with_entries(Vec::new(), width, height),
            lock: AdvisoryLock::new(),
            parked: HashMap::new(),
        }
    }

    /// Points the surface at `timeline`, restoring its parked viewport if it
    /// was shown before. Returns false when it already was the target.
    fn retarget(&mut self, timeline: Timeline, width: u16, height: u16) -> bool {
        if self.timeline.as_ref() == Some(&timeline) {
            return false;
        }
        let restored = self.parked.remove(&timeline).unwrap_or_else(|| Parked {
            viewport: Viewport::new(width, height),
            lock: AdvisoryLock::new(),
        });
        let viewport = mem::replace(&mut self.viewport, restored.viewport);
        let lock = mem::replace(&mut self.lock, restored.lock);
        if let Some(previous) = self.timeline.replace(timeline) {
            self.parked.insert(previous, Parked { viewport, lock });
        }
        self.viewport.set_area(width, height);
        true
    }

    fn viewport_for(&mut self, timeline: &Timeline) -> Option<&mut Viewport> {
        if self.timeline.as_ref() == Some(timeline) {
            return Some(&mut self.viewport);
        }
        self.parked
            .get_mut(timeline)
            .map(|parked| &mut parked.viewport)
    }
}

/// The shown post of `post`, as a shared record.
fn shown_arc(post: &Arc<Post>) -> Arc<Post> {
    post.boost_of.clone().unwrap_or_else(|| post.clone())
}

/// Owns every view and the draft buffer, turns key presses and background
/// deliveries into state changes, and paints the screen.
pub struct Controller {
    ctx: AppContext,
    modes: ModeStack,
    home: Surface,
    mentions: Surface,
    conversation: Surface,
    user: Surface,
    favourites: Surface,
    list: Surface,
    conversation_root: Option<String>,
    walk_generation: Arc<AtomicU64>,
    pending_walk: Option<Walk>,
    buffer: TextBuffer,
    input: InputState,
    confirm_lock: AdvisoryLock,
    status: StatusLine,
    footer: String,
    me: Option<Arc<Profile>>,
    width: u16,
    height: u16,
    quit: bool,
}

impl Controller {
    pub fn new(ctx: AppContext, footer: String, width: u16, height: u16) -> Self {
        let rows = height.saturating_sub(1);
        Self {
            ctx,
            modes: ModeStack::new(Mode::Home),
            home: Surface::feed(Some(Timeline::Home), width, rows),
            mentions: Surface::feed(Some(Timeline::Mentions), width, rows),
            conversation: Surface::conversation(width, rows),
            user: Surface::feed(None, width, rows),
            favourites: Surface::feed(None, width, rows),
            list: Surface::feed(None, width, rows),
            conversation_root: None,
            walk_generation: Arc::new(AtomicU64::new(0)),
            pending_walk: None,
            buffer: TextBuffer::new(usize::from(width)),
            input: InputState::Idle,
            confirm_lock: AdvisoryLock::new(),
            status: StatusLine::default(),
            footer,
            me: None,
            width,
            height,
            quit: false,
        }
    }

    /// Loads the account, the home feed and mentions.
    pub fn start(&mut self) {
        tasks::spawn_signed_in(&self.ctx);
        self.refresh(Mode::Home);
        self.refresh(Mode::Mentions);
    }

    pub fn mode(&self) -> Mode {
        self.modes.current()
    }

    pub fn input_state(&self) -> &InputState {
        &self.input
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    pub fn status_text(&self) -> &str {
        self.status.text()
    }

    pub fn footer(&self) -> &str {
        &self.footer
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn viewport(&self, mode: Mode) -> &Viewport {
        &self.surface(mode).viewport
    }

    pub fn timeline(&self, mode: Mode) -> Option<&Timeline> {
        self.surface(mode).timeline.as_ref()
    }

    fn surface(&self, mode: Mode) -> &Surface {
        match mode {
            Mode::Home => &self.home,
            Mode::Mentions => &self.mentions,
            Mode::Conversation => &self.conversation,
            Mode::UserTimeline => &self.user,
            Mode::Favourites => &self.favourites,
            Mode::List => &self.list,
        }
    }

    fn surface_mut(&mut self, mode: Mode) -> &mut Surface {
        match mode {
            Mode::Home => &mut self.home,
            Mode::Mentions => &mut self.mentions,
            Mode::Conversation => &mut self.conversation,
            Mode::UserTimeline => &mut self.user,
            Mode::Favourites => &mut self.favourites,
            Mode::List => &mut self.list,
        }
    }

    fn surfaces_mut(&mut self) -> [&mut Surface; 6] {
        [
            &mut self.home,
            &mut self.mentions,
            &mut self.conversation,
            &mut self.user,
            &mut self.favourites,
            &mut self.list,
        ]
    }

    /// Rows given to the current view, header included.
    fn list_rows(&self) -> u16 {
        let reserved = match self.input {
            InputState::Idle => 1,
            InputState::Command => 2,
            InputState::Composing(_) | InputState::Confirming(_) => DRAFT_ROWS + 1,
        };
        self.height.saturating_sub(reserved)
    }

    fn relayout(&mut self) {
        let (width, rows) = (self.width, self.list_rows());
        for surface in self.surfaces_mut() {
            surface.viewport.set_area(width, rows);
        }
        self.refresh_headers();
    }

    fn header_lines(&self, timeline: Option<&Timeline>) -> usize {
        match timeline {
            Some(Timeline::User(handle)) | Some(Timeline::Favourites(handle)) => self
                .ctx
                .profiles
                .get(handle)
                .map(|profile| profile_header_lines(&profile, self.width))
                .unwrap_or(0),
            Some(Timeline::List(_)) => 1,
            _ => 0,
        }
    }

    fn refresh_headers(&mut self) {
        for mode in [Mode::UserTimeline, Mode::Favourites, Mode::List] {
            let lines = self.header_lines(self.surface(mode).timeline.as_ref());
            self.surface_mut(mode).viewport.set_header_lines(lines);
        }
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.buffer.set_width(usize::from(width));
        self.relayout();
    }

    /// Advances the status countdown. Returns true when the screen changed.
    pub fn tick(&mut self) -> bool {
        let typing = matches!(self.input, InputState::Composing(_) | InputState::Command);
        self.status.tick(typing)
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status.set_with_ttl(text, STATUS_TTL_SECS);
    }

    // --- loading -----------------------------------------------------------

    fn fetch(&mut self, mode: Mode, direction: Direction, anchor: Option<String>) {
        let surface = self.surface(mode);
        let Some(timeline) = surface.timeline.clone() else {
            return;
        };
        let Some(guard) = surface.lock.try_acquire() else {
            debug!(%timeline, "fetch already in flight, dropped");
            return;
        };
        self.status.set("Loading...");
        tasks::spawn_page(&self.ctx, timeline, direction, anchor, guard);
    }

    /// Initial load for an unloaded view, otherwise a check for newer posts.
    fn refresh(&mut self, mode: Mode) {
        let anchor = self
            .surface(mode)
            .viewport
            .newest_cursor()
            .map(str::to_string);
        self.fetch(mode, Direction::Newer, anchor);
    }

    fn load_older(&mut self, mode: Mode) {
        let viewport = &self.surface(mode).viewport;
        if viewport.is_empty() {
            self.refresh(mode);
            return;
        }
        if !matches!(viewport.selected(), Some(Entry::LoadMore)) {
            return;
        }
        let anchor = viewport.oldest_cursor().map(str::to_string);
        self.fetch(mode, Direction::Older, anchor);
    }

    fn switch_mode(&mut self, mode: Mode) {
        self.modes.push(mode);
        self.refresh(mode);
    }

    fn show_scoped(&mut self, mode: Mode, timeline: Timeline) {
        let (width, rows) = (self.width, self.list_rows());
        if self.surface_mut(mode).retarget(timeline.clone(), width, rows) {
            info!(%timeline, "switched target");
        }
        if let Timeline::User(handle) | Timeline::Favourites(handle) = &timeline {
            self.request_profile(handle);
        }
        self.refresh_headers();
        self.switch_mode(mode);
    }

    fn show_user(&mut self, handle: &str) {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return;
        }
        self.show_scoped(Mode::UserTimeline, Timeline::User(handle));
    }

    fn show_favourites(&mut self, handle: &str) {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return;
        }
        self.show_scoped(Mode::Favourites, Timeline::Favourites(handle));
    }

    /// Accepts `name` or `owner/name`; lists are always the signed-in
    /// account's, so the owner is dropped.
    fn show_list(&mut self, arg: &str) {
        let name = arg.rsplit_once('/').map_or(arg, |(_, name)| name).trim();
        if name.is_empty() {
            return;
        }
        self.show_scoped(Mode::List, Timeline::List(name.to_string()));
    }

    fn request_profile(&self, handle: &str) {
        if self.ctx.profiles.get(handle).is_none() {
            tasks::spawn_profile(&self.ctx, handle.to_string());
        }
    }

    fn enter_conversation(&mut self) {
        let mode = self.mode();
        let Some(post) = self.surface(mode).viewport.selected_post().cloned() else {
            return;
        };
        let shown = shown_arc(&post);
        if shown.in_reply_to_id.is_none() {
            return;
        }
        let walking = self.conversation.lock.is_locked() || self.pending_walk.is_some();
        if walking && self.conversation_root.as_deref() == Some(shown.id.as_str()) {
            // The walk for this chain is still filling the view.
            self.modes.push(Mode::Conversation);
            return;
        }
        let (chain, missing) = self
            .ctx
            .posts
            .reply_chain(&shown, CONVERSATION_LIMIT - 1);
        let mut entries = vec![Entry::post(shown.id.clone(), shown.clone())];
        entries.extend(
            chain
                .into_iter()
                .map(|parent| Entry::post(parent.id.clone(), parent)),
        );
        let count = entries.len();
        self.conversation.viewport.replace_entries(entries);
        self.conversation_root = Some(shown.id.clone());
        self.modes.push(Mode::Conversation);
        let generation = self.walk_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.pending_walk = None;
        if let Some(missing) = missing {
            self.status.set("Loading...");
            self.start_walk(Walk {
                root: shown.id.clone(),
                missing,
                shown: count,
                generation,
            });
        }
    }

    /// Starts `walk`, or queues it until the superseded walk holding the
    /// conversation lock finishes.
    fn start_walk(&mut self, walk: Walk) {
        match self.conversation.lock.try_acquire() {
            Some(guard) => tasks::spawn_conversation_walk(
                &self.ctx,
                walk,
                self.walk_generation.clone(),
                guard,
            ),
            None => {
                debug!(root = %walk.root, "conversation walk queued");
                self.pending_walk = Some(walk);
            }
        }
    }

    fn leave_conversation(&mut self) {
        if self.mode() == Mode::Conversation {
            self.modes.pop();
        }
    }

    /// The handle `this` and `.` stand for in commands.
    fn current_subject(&self) -> Option<String> {
        match self.surface(self.mode()).timeline.as_ref()? {
            Timeline::User(handle) | Timeline::Favourites(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    // --- deliveries --------------------------------------------------------

    /// Applies one background result. Results for a target no view holds
    /// any more are dropped.
    pub fn apply(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Page {
                timeline,
                direction,
                result,
            } => self.apply_page(timeline, direction, result),
            Delivery::ConversationLink { generation, result } => {
                if generation != self.walk_generation.load(Ordering::Acquire) {
                    debug!(generation, "stale conversation link dropped");
                    return;
                }
                match result {
                    Ok(post) => {
                        self.conversation
                            .viewport
                            .push_entry(Entry::post(post.id.clone(), post));
                        self.status.clear();
                    }
                    Err(_) => self.set_status("Err:Loading conversation"),
                }
            }
            Delivery::WalkFinished => {
                if let Some(walk) = self.pending_walk.take() {
                    self.start_walk(walk);
                }
            }
            Delivery::Profile { handle, result } => match result {
                Ok(_) => self.refresh_headers(),
                Err(error) => {
                    warn!(%handle, %error, "profile fetch failed");
                    self.set_status("Err:User profile Loading");
                }
            },
            Delivery::SignedIn(result) => match result {
                Ok(profile) => self.me = Some(profile),
                Err(error) => {
                    warn!(%error, "could not fetch signed-in account");
                    self.set_status("Err:Account Loading");
                }
            },
            Delivery::Mutation { mutation, error } => match error {
                Some(_) => {
                    mutation.rollback(&self.ctx.profiles);
                    self.refresh_headers();
                    self.set_status(mutation.failure_message());
                }
                None => {
                    self.refresh_headers();
                    if let Some(message) = mutation.success_message() {
                        self.set_status(message);
                    }
                }
            },
            Delivery::Posted(result) => match result {
                Ok(_) => self.set_status("Posted!"),
                Err(_) => self.set_status("Err! Failed to post"),
            },
            Delivery::Status(text) => self.set_status(text),
        }
    }

    fn apply_page(
        &mut self,
        timeline: Timeline,
        direction: Direction,
        result: Result<tasks::Page, String>,
    ) {
        let page = match result {
            Ok(page) => page,
            Err(_) => {
                self.set_status("Err:Loading");
                return;
            }
        };
        let count = page.len();
        let viewport = [
            &mut self.home,
            &mut self.mentions,
            &mut self.user,
            &mut self.favourites,
            &mut self.list,
        ]
        .into_iter()
        .find_map(|surface| surface.viewport_for(&timeline));
        let Some(viewport) = viewport else {
            debug!(%timeline, "page for unknown target dropped");
            return;
        };
        let entries: Vec<Entry> = page
            .into_iter()
            .map(|(cursor, post)| Entry::post(cursor, post))
            .collect();
        match direction {
            Direction::Newer if entries.is_empty() && viewport.is_empty() => {
                viewport.merge_older_entries(entries)
            }
            Direction::Newer => viewport.prepend_entries(entries),
            Direction::Older => viewport.merge_older_entries(entries),
        }
        debug!(%timeline, ?direction, count, "page applied");
        self.set_status(format!("Load!({count} posts)"));
    }

    // --- keys --------------------------------------------------------------

    /// Handles one key press. Returns true once the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match self.input {
            InputState::Idle => self.handle_browsing(key),
            InputState::Composing(_) => self.handle_editing(key, KeymapMode::Composing),
            InputState::Command => self.handle_editing(key, KeymapMode::Command),
            InputState::Confirming(_) => self.handle_confirming(key),
        }
        self.quit
    }

    fn handle_browsing(&mut self, key: KeyEvent) {
        let mode = self.mode();
        let Some(action) = resolve_action(&key, mode.keymap()) else {
            return;
        };
        match action {
            Action::SelectNext
            | Action::SelectPrevious
            | Action::SelectFirst
            | Action::SelectLast
            | Action::PageDown
            | Action::PageUp => self.navigate(mode, action),
            Action::LoadOlder => self.load_older(mode),
            Action::LoadNewer => self.refresh(mode),
            Action::Compose => self.start_compose(SubmitAction::Post),
            Action::Reply => {
                if let Some(post) = self.selected_shown() {
                    self.start_compose(SubmitAction::Reply {
                        to: post.id.clone(),
                        handle: post.author.handle.clone(),
                    });
                }
            }
            Action::ToggleFavourite => {
                if let Some(post) = self.selected_shown() {
                    let mutation = if post.is_favourited() {
                        Mutation::Unfavourite(post)
                    } else {
                        Mutation::Favourite(post)
                    };
                    tasks::dispatch_mutation(&self.ctx, mutation);
                }
            }
            Action::Boost => {
                if let Some(post) = self.selected_shown() {
                    if !post.is_boosted() {
                        tasks::dispatch_mutation(&self.ctx, Mutation::Boost(post));
                    }
                }
            }
            Action::OpenLinks => {
                if let Some(post) = self.selected_shown() {
                    self.open(post.openable_urls());
                }
            }
            Action::OpenMedia => {
                if let Some(post) = self.selected_shown() {
                    self.open(post.media_urls.clone());
                }
            }
            Action::ShowHome => self.switch_mode(Mode::Home),
            Action::ShowMentions => self.switch_mode(Mode::Mentions),
            Action::ShowAuthor => {
                if let Some(post) = self.selected_shown() {
                    self.show_user(&post.author.handle);
                }
            }
            Action::ShowConversation => self.enter_conversation(),
            Action::LeaveConversation => self.leave_conversation(),
            Action::EnterCommand => self.start_command(),
            Action::Quit => self.quit = true,
            _ => {}
        }
    }

    fn navigate(&mut self, mode: Mode, action: Action) {
        let viewport = &mut self.surface_mut(mode).viewport;
        match action {
            Action::SelectNext => viewport.select_next(),
            Action::SelectPrevious => viewport.select_previous(),
            Action::SelectFirst => viewport.select_first(),
            Action::SelectLast => viewport.select_last(),
            Action::PageDown => viewport.page_down(),
            Action::PageUp => viewport.page_up(),
            _ => {}
        }
    }

    fn selected_shown(&self) -> Option<Arc<Post>> {
        self.surface(self.mode())
            .viewport
            .selected_post()
            .map(shown_arc)
    }

    fn open(&mut self, urls: Vec<String>) {
        if urls.is_empty() {
            self.set_status("Nothing to open");
            return;
        }
        tasks::spawn_open(&self.ctx, urls);
    }

    fn start_compose(&mut self, action: SubmitAction) {
        let suffix = if self.footer.is_empty() {
            String::new()
        } else {
            format!(" {}", self.footer)
        };
        let prefix = match &action {
            SubmitAction::Post => String::new(),
            SubmitAction::Reply { handle, .. } => format!("@{handle} "),
        };
        self.buffer.set_mode(EditMode::MultiLine);
        self.buffer.set_width(usize::from(self.width));
        self.buffer.seed(&prefix, &suffix);
        self.input = InputState::Composing(action);
        self.relayout();
    }

    fn start_command(&mut self) {
        self.buffer.set_mode(EditMode::SingleLine);
        self.buffer.set_width(usize::from(self.width));
        self.buffer.clear();
        self.input = InputState::Command;
        self.relayout();
    }

    fn exit_input(&mut self) {
        self.buffer.clear();
        self.input = InputState::Idle;
        self.relayout();
    }

    fn handle_editing(&mut self, key: KeyEvent, keymap: KeymapMode) {
        let Some(action) = resolve_action(&key, keymap) else {
            if let Some(ch) = literal_char(&key) {
                self.buffer.insert_char(ch);
            }
            return;
        };
        match action {
            Action::CaretBackward => self.buffer.move_backward(),
            Action::CaretForward => self.buffer.move_forward(),
            Action::CaretUp => self.buffer.move_up(),
            Action::CaretDown => self.buffer.move_down(),
            Action::LineTop => self.buffer.move_to_line_top(),
            Action::LineBottom => self.buffer.move_to_line_bottom(),
            Action::DeleteBackward => self.buffer.delete_backward(),
            Action::LineBreak => self.buffer.insert_line_break(),
            Action::ConfirmDraft => self.confirm_draft(),
            Action::RunCommand => self.run_command(),
            Action::CancelInput => self.exit_input(),
            _ => {}
        }
    }

    fn confirm_draft(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Some(guard) = self.confirm_lock.try_acquire() else {
            return;
        };
        if let InputState::Composing(action) = mem::replace(&mut self.input, InputState::Idle) {
            self.input = InputState::Confirming(action);
            tasks::spawn_debounce(guard);
        }
    }

    fn handle_confirming(&mut self, key: KeyEvent) {
        if self.confirm_lock.is_locked() {
            return;
        }
        match resolve_action(&key, KeymapMode::Confirming) {
            Some(Action::CancelInput) => {
                if let InputState::Confirming(action) =
                    mem::replace(&mut self.input, InputState::Idle)
                {
                    self.input = InputState::Composing(action);
                    self.buffer.move_to_line_bottom();
                }
            }
            Some(Action::Submit) => self.submit(),
            _ => {}
        }
    }

    fn submit(&mut self) {
        let InputState::Confirming(action) = &self.input else {
            return;
        };
        let Some(guard) = self.home.lock.try_acquire() else {
            self.set_status("Busy, try again");
            return;
        };
        let in_reply_to = match action {
            SubmitAction::Post => None,
            SubmitAction::Reply { to, .. } => Some(to.clone()),
        };
        let text = self.buffer.content().to_string();
        info!(reply = in_reply_to.is_some(), "posting draft");
        self.exit_input();
        self.status.set("Posting...");
        tasks::spawn_post(&self.ctx, text, in_reply_to, guard);
    }

    fn run_command(&mut self) {
        let line = self.buffer.content().trim().to_string();
        self.exit_input();
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line.as_str(), ""),
        };
        if verb.is_empty() {
            return;
        }
        let arg = match rest {
            "this" | "." => self.current_subject().unwrap_or_default(),
            other => other.to_string(),
        };
        let takes_argument = matches!(
            verb,
            "user" | "list" | "favorite" | "fav" | "follow" | "unfollow" | "set_footer"
        );
        if takes_argument && arg.is_empty() {
            self.set_status(format!("Err! {verb} command needs argument"));
            return;
        }
        debug!(%verb, %arg, "running command");
        match verb {
            "user" => self.show_user(&arg),
            "list" => self.show_list(&arg),
            "favorite" | "fav" => self.show_favourites(&arg),
            "follow" => {
                tasks::dispatch_mutation(&self.ctx, Mutation::Follow(normalize_handle(&arg)))
            }
            "unfollow" => {
                tasks::dispatch_mutation(&self.ctx, Mutation::Unfollow(normalize_handle(&arg)))
            }
            "set_footer" => {
                self.footer = rest.to_string();
                self.set_status(format!("Footer: {}", self.footer));
                tasks::spawn_save_footer(&self.ctx, self.footer.clone());
            }
            "unset_footer" => {
                self.footer.clear();
                self.set_status("Footer cleared");
                tasks::spawn_save_footer(&self.ctx, String::new());
            }
            other => self.set_status(format!("Err! unknown command: {other}")),
        }
    }

    // --- drawing -----------------------------------------------------------

    fn mode_bar(&self) -> String {
        let mode = self.mode();
        let viewport = &self.surface(mode).viewport;
        let mut bar = format!("{} L{}", mode.label(), viewport.selected_index() + 1);
        if let Some(me) = &self.me {
            bar.push_str(&format!(" User:@{} [{}]", me.handle, me.display_name));
        }
        match &self.input {
            InputState::Idle => {
                if !self.status.text().is_empty() {
                    bar.push(' ');
                    bar.push_str(self.status.text());
                }
            }
            InputState::Command => bar.push_str(" *Command Mode*"),
            InputState::Composing(_) | InputState::Confirming(_) => {
                bar.push_str(" *Input Mode*");
                let count = self.buffer.char_count();
                if count >= LENGTH_HINT_FROM {
                    bar.push_str(&format!(" length:({count})"));
                }
                if matches!(self.input, InputState::Confirming(_)) {
                    bar.push_str(" ok?[Enter/C-g]");
                    if !self.status.text().is_empty() {
                        bar.push(' ');
                        bar.push_str(self.status.text());
                    }
                }
            }
        }
        bar
    }

    /// Paints the whole screen into `buf` and returns where the terminal
    /// cursor belongs, if it should be shown.
    pub fn draw(&self, buf: &mut Buffer, area: Rect) -> Option<(u16, u16)> {
        let mut canvas = Canvas::new(buf, area);
        let painter = Painter::new(&self.ctx.palette, Local::now());
        let rows = self.list_rows();
        let surface = self.surface(self.mode());
        let header = (surface.viewport.header_lines() as u16).min(rows);

        for y in 0..canvas.height() {
            canvas.fill_line(0, i64::from(y), COLOR_BG);
        }

        {
            let mut head = canvas.rows(0, header);
            match surface.timeline.as_ref() {
                Some(Timeline::User(handle)) | Some(Timeline::Favourites(handle)) => {
                    if let Some(profile) = self.ctx.profiles.get(handle) {
                        painter.paint_profile_header(&mut head, &profile);
                    }
                }
                Some(Timeline::List(name)) => painter.paint_list_header(&mut head, name),
                _ => {}
            }
        }

        {
            let mut list = canvas.rows(header, rows - header);
            let viewport = &surface.viewport;
            if viewport.entries().is_empty() || (viewport.is_empty() && !viewport.has_more()) {
                painter.paint_placeholder(&mut list, 0, "No posts");
            } else {
                viewport.render(&mut list, &painter);
            }
        }

        let bar = i64::from(rows);
        canvas.fill_line(0, bar, COLOR_BAR_BG);
        canvas.text(0, bar, &self.mode_bar(), COLOR_TEXT, COLOR_BAR_BG);

        match &self.input {
            InputState::Idle => None,
            InputState::Command => {
                let y = rows + 1;
                canvas.text(0, i64::from(y), ":", COLOR_TEXT, COLOR_BG);
                canvas.text(1, i64::from(y), self.buffer.visible_text(), COLOR_TEXT, COLOR_BG);
                let (col, _) = self.buffer.cursor_cell();
                Some((area.x + 1 + col as u16, area.y + y))
            }
            InputState::Composing(_) | InputState::Confirming(_) => {
                let top = rows + 1;
                for (row, line) in self
                    .buffer
                    .display_lines()
                    .iter()
                    .take(usize::from(DRAFT_ROWS))
                    .enumerate()
                {
                    canvas.text(0, i64::from(top) + row as i64, line, COLOR_TEXT, COLOR_BG);
                }
                if matches!(self.input, InputState::Confirming(_)) {
                    return None;
                }
                let (col, row) = self.buffer.cursor_cell();
                if row >= usize::from(DRAFT_ROWS) {
                    return None;
                }
                Some((area.x + col as u16, area.y + top + row as u16))
            }
        }
    }
}
