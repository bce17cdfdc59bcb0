use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::model::{normalize_handle, Author, Post, Profile};

pub const DEFAULT_PAGE_SIZE: u32 = 40;

static BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break regex"));
static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p>\s*<p[^>]*>").expect("valid paragraph regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<a\s([^>]*)>").expect("valid anchor regex"));
static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href="([^"]+)""#).expect("valid href regex"));
static CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)class="([^"]*)""#).expect("valid class regex"));
static LINK_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="(\w+)""#).expect("valid link header regex"));

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("mastodon: unauthorized, check the access token")]
    Unauthorized,
    #[error("mastodon: not found: {0}")]
    NotFound(String),
    #[error("mastodon: rate limited: {0}")]
    RateLimited(String),
    #[error("mastodon: api error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no list titled {0:?}")]
    MissingList(String),
    #[error("favourites of @{0} are not visible, only your own")]
    ForeignFavourites(String),
    #[error("no access token configured")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            access_token: String::new(),
            user_agent: format!("tootline/{}", crate::VERSION),
            timeout: Duration::from_secs(20),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub max_id: Option<String>,
    pub since_id: Option<String>,
    pub limit: Option<u32>,
    pub extra: Vec<(String, String)>,
}

impl ListingOptions {
    pub fn newer(since: Option<&str>, limit: u32) -> Self {
        Self {
            since_id: since.map(str::to_string),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn older(max: &str, limit: u32) -> Self {
        Self {
            max_id: Some(max.to_string()),
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(max_id) = self.max_id {
            params.push(("max_id".into(), max_id));
        }
        if let Some(since_id) = self.since_id {
            params.push(("since_id".into(), since_id));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        params.extend(self.extra);
        params
    }
}

/// One page of a listing plus the cursors from its `Link` header.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_max_id: Option<String>,
    pub prev_min_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub remaining: f64,
    pub reset_at: Option<SystemTime>,
}

pub struct Client {
    http: HttpClient,
    base_url: Url,
    access_token: String,
    user_agent: String,
    page_size: u32,
    rate: RwLock<RateLimit>,
    account_ids: RwLock<HashMap<String, String>>,
    list_ids: RwLock<HashMap<String, String>>,
    me: RwLock<Option<Account>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.access_token.trim().is_empty() {
            return Err(ApiError::MissingToken.into());
        }
        if config.user_agent.trim().is_empty() {
            bail!("mastodon client user agent required");
        }
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("parse server url {:?}", config.base_url))?;
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Client {
            http,
            base_url,
            access_token: config.access_token,
            user_agent: config.user_agent,
            page_size: config.page_size.max(1),
            rate: RwLock::new(RateLimit::default()),
            account_ids: RwLock::new(HashMap::new()),
            list_ids: RwLock::new(HashMap::new()),
            me: RwLock::new(None),
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate.read().clone()
    }

    pub fn home(&self, opts: ListingOptions) -> Result<Page<Status>> {
        self.fetch_page("/api/v1/timelines/home", opts)
    }

    pub fn mentions(&self, mut opts: ListingOptions) -> Result<Page<Notification>> {
        opts.extra.push(("types[]".into(), "mention".into()));
        self.fetch_page("/api/v1/notifications", opts)
    }

    pub fn account_statuses(&self, account_id: &str, opts: ListingOptions) -> Result<Page<Status>> {
        self.fetch_page(&format!("/api/v1/accounts/{account_id}/statuses"), opts)
    }

    pub fn list_timeline(&self, list_id: &str, opts: ListingOptions) -> Result<Page<Status>> {
        self.fetch_page(&format!("/api/v1/timelines/list/{list_id}"), opts)
    }

    /// The signed-in account's favourites. The server pages these by
    /// favourite ids that only appear in the `Link` header.
    pub fn favourites(&self, opts: ListingOptions) -> Result<Page<Status>> {
        self.fetch_page("/api/v1/favourites", opts)
    }

    pub fn status(&self, id: &str) -> Result<Status> {
        let resp = self.request(Method::GET, &format!("/api/v1/statuses/{id}"), &[], None)?;
        resp.json().context("mastodon: decode status")
    }

    pub fn lookup(&self, handle: &str) -> Result<Account> {
        let acct = handle.trim().trim_start_matches('@').to_string();
        let params = vec![("acct".to_string(), acct)];
        let resp = self.request(Method::GET, "/api/v1/accounts/lookup", &params, None)?;
        let account: Account = resp.json().context("mastodon: decode account")?;
        self.account_ids
            .write()
            .insert(normalize_handle(handle), account.id.clone());
        Ok(account)
    }

    pub fn account_id(&self, handle: &str) -> Result<String> {
        if let Some(id) = self.account_ids.read().get(&normalize_handle(handle)) {
            return Ok(id.clone());
        }
        Ok(self.lookup(handle)?.id)
    }

    pub fn relationship(&self, account_id: &str) -> Result<Relationship> {
        let params = vec![("id[]".to_string(), account_id.to_string())];
        let resp = self.request(
            Method::GET,
            "/api/v1/accounts/relationships",
            &params,
            None,
        )?;
        let relationships: Vec<Relationship> =
            resp.json().context("mastodon: decode relationships")?;
        relationships
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("relationship {account_id}")).into())
    }

    pub fn verify_credentials(&self) -> Result<Account> {
        if let Some(me) = self.me.read().as_ref() {
            return Ok(me.clone());
        }
        let resp = self.request(
            Method::GET,
            "/api/v1/accounts/verify_credentials",
            &[],
            None,
        )?;
        let account: Account = resp.json().context("mastodon: decode own account")?;
        *self.me.write() = Some(account.clone());
        Ok(account)
    }

    /// Resolves a list by case-insensitive title.
    pub fn list_id(&self, name: &str) -> Result<String> {
        let key = name.trim().to_lowercase();
        if let Some(id) = self.list_ids.read().get(&key) {
            return Ok(id.clone());
        }
        let resp = self.request(Method::GET, "/api/v1/lists", &[], None)?;
        let lists: Vec<ListInfo> = resp.json().context("mastodon: decode lists")?;
        let mut ids = self.list_ids.write();
        for list in &lists {
            ids.insert(list.title.to_lowercase(), list.id.clone());
        }
        ids.get(&key)
            .cloned()
            .ok_or_else(|| ApiError::MissingList(name.trim().to_string()).into())
    }

    pub fn favourite(&self, id: &str) -> Result<()> {
        self.request(Method::POST, &format!("/api/v1/statuses/{id}/favourite"), &[], Some(Vec::new()))?;
        Ok(())
    }

    pub fn unfavourite(&self, id: &str) -> Result<()> {
        self.request(Method::POST, &format!("/api/v1/statuses/{id}/unfavourite"), &[], Some(Vec::new()))?;
        Ok(())
    }

    pub fn reblog(&self, id: &str) -> Result<()> {
        self.request(Method::POST, &format!("/api/v1/statuses/{id}/reblog"), &[], Some(Vec::new()))?;
        Ok(())
    }

    pub fn post_status(&self, text: &str, in_reply_to: Option<&str>) -> Result<Status> {
        if text.trim().is_empty() {
            bail!("mastodon: post text is required");
        }
        let mut form = vec![("status".to_string(), text.to_string())];
        if let Some(parent) = in_reply_to {
            form.push(("in_reply_to_id".to_string(), parent.to_string()));
        }
        let resp = self.request(Method::POST, "/api/v1/statuses", &[], Some(form))?;
        resp.json().context("mastodon: decode posted status")
    }

    pub fn follow(&self, account_id: &str) -> Result<Relationship> {
        let resp = self.request(
            Method::POST,
            &format!("/api/v1/accounts/{account_id}/follow"),
            &[],
            Some(Vec::new()),
        )?;
        resp.json().context("mastodon: decode relationship")
    }

    pub fn unfollow(&self, account_id: &str) -> Result<Relationship> {
        let resp = self.request(
            Method::POST,
            &format!("/api/v1/accounts/{account_id}/unfollow"),
            &[],
            Some(Vec::new()),
        )?;
        resp.json().context("mastodon: decode relationship")
    }

    fn fetch_page<T>(&self, path: &str, opts: ListingOptions) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        let params = opts.into_params();
        let resp = self.request(Method::GET, path, &params, None)?;
        let (next_max_id, prev_min_id) = resp
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or((None, None));
        let items: Vec<T> = resp
            .json()
            .with_context(|| format!("mastodon: decode {path}"))?;
        debug!(path, count = items.len(), "fetched page");
        Ok(Page {
            items,
            next_max_id,
            prev_min_id,
        })
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        form: Option<Vec<(String, String)>>,
    ) -> Result<Response> {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token));
        if let Some(form_data) = form {
            req = req.form(&form_data);
        }

        let resp = req.send().with_context(|| format!("mastodon: request {path}"))?;
        self.capture_rate(resp.headers());
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        let body = excerpt(&body);
        let err = match status.as_u16() {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound(path.to_string()),
            429 => ApiError::RateLimited(body),
            code => ApiError::Status { status: code, body },
        };
        Err(err.into())
    }

    fn capture_rate(&self, headers: &HeaderMap) {
        let Some(remaining) = headers
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.parse::<f64>().ok())
        else {
            return;
        };
        let reset_at = headers
            .get("x-ratelimit-reset")
            .and_then(|value| value.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(SystemTime::from);
        let mut rate = self.rate.write();
        rate.remaining = remaining;
        rate.reset_at = reset_at;
    }
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    let body = body.trim();
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

/// Extracts `max_id` from the `next` link and `min_id` (or `since_id`) from
/// the `prev` link of a `Link` response header.
pub fn parse_link_header(header: &str) -> (Option<String>, Option<String>) {
    let mut next = None;
    let mut prev = None;
    for caps in LINK_HEADER_RE.captures_iter(header) {
        let Ok(url) = Url::parse(&caps[1]) else {
            continue;
        };
        let find = |keys: &[&str]| {
            url.query_pairs()
                .find(|(key, _)| keys.contains(&key.as_ref()))
                .map(|(_, value)| value.into_owned())
        };
        match &caps[2] {
            "next" => next = find(&["max_id"]),
            "prev" => prev = find(&["min_id", "since_id"]),
            _ => {}
        }
    }
    (next, prev)
}

/// Flattens status HTML into plain text: paragraphs and `<br>` become line
/// breaks, other tags are dropped and the common entities decoded.
pub fn html_to_text(html: &str) -> String {
    let text = PARAGRAPH_RE.replace_all(html, "\n\n");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Link targets in status HTML, skipping mention and hashtag anchors.
pub fn extract_links(html: &str) -> Vec<String> {
    let mut links = Vec::new();
    for caps in ANCHOR_RE.captures_iter(html) {
        let attrs = &caps[1];
        let class = CLASS_RE
            .captures(attrs)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        if class.contains("mention") || class.contains("hashtag") {
            continue;
        }
        if let Some(href) = HREF_RE.captures(attrs) {
            let href = href[1].replace("&amp;", "&");
            if !links.contains(&href) {
                links.push(href);
            }
        }
    }
    links
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub statuses_count: u64,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
}

impl Account {
    pub fn author(&self) -> Author {
        Author {
            id: self.id.clone(),
            handle: self.acct.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn into_profile(self, following: bool) -> Profile {
        Profile {
            bio: html_to_text(&self.note),
            id: self.id,
            handle: self.acct,
            display_name: self.display_name,
            url: self.url,
            locked: self.locked,
            following,
            posts_count: self.statuses_count,
            following_count: self.following_count,
            followers_count: self.followers_count,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub account: Account,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub replies_count: u64,
    #[serde(default)]
    pub reblogs_count: u64,
    #[serde(default)]
    pub favourites_count: u64,
    #[serde(default)]
    pub favourited: Option<bool>,
    #[serde(default)]
    pub reblogged: Option<bool>,
    #[serde(default)]
    pub media_attachments: Vec<Attachment>,
}

impl Status {
    pub fn into_post(self) -> Post {
        let body = html_to_text(&self.content);
        let text = if self.spoiler_text.is_empty() {
            body
        } else {
            format!("[CW: {}]\n{}", self.spoiler_text, body)
        };
        let mut post = Post::new(self.id, self.account.author(), text);
        post.created_at = self.created_at;
        post.replies_count = self.replies_count;
        post.boosts_count = self.reblogs_count;
        post.favourites_count = self.favourites_count;
        post.in_reply_to_id = self.in_reply_to_id;
        post.url = self.url;
        post.links = extract_links(&self.content);
        post.media_urls = self
            .media_attachments
            .into_iter()
            .filter_map(|media| media.remote_url.or(media.url))
            .collect();
        post.boost_of = self.reblog.map(|original| Arc::new(original.into_post()));
        post.with_flags(
            self.favourited.unwrap_or(false),
            self.reblogged.unwrap_or(false),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relationship {
    pub id: String,
    #[serde(default)]
    pub following: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListInfo {
    pub id: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_becomes_plain_text() {
        let html = "<p>Hello <span class=\"h-card\"><a href=\"https://x.social/@bob\" class=\"u-url mention\">@<span>bob</span></a></span></p><p>line one<br />line &amp; two &lt;3</p>";
        assert_eq!(html_to_text(html), "Hello @bob\n\nline one\nline & two <3");
    }

    #[test]
    fn links_skip_mentions_and_hashtags() {
        let html = concat!(
            "<p><a href=\"https://x.social/@bob\" class=\"u-url mention\">@bob</a> ",
            "<a href=\"https://x.social/tags/rust\" class=\"mention hashtag\">#rust</a> ",
            "<a href=\"https://rust-lang.org/?a=1&amp;b=2\" rel=\"nofollow\">rust-lang.org</a></p>"
        );
        assert_eq!(extract_links(html), vec!["https://rust-lang.org/?a=1&b=2"]);
    }

    #[test]
    fn link_header_yields_both_cursors() {
        let header = "<https://x.social/api/v1/favourites?limit=20&max_id=900>; rel=\"next\", <https://x.social/api/v1/favourites?limit=20&min_id=950>; rel=\"prev\"";
        assert_eq!(
            parse_link_header(header),
            (Some("900".to_string()), Some("950".to_string()))
        );
        assert_eq!(parse_link_header("garbage"), (None, None));
    }

    #[test]
    fn listing_options_become_query_params() {
        let params = ListingOptions::older("42", 20).into_params();
        assert_eq!(
            params,
            vec![
                ("max_id".to_string(), "42".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
        let params = ListingOptions::newer(None, 5).into_params();
        assert_eq!(params, vec![("limit".to_string(), "5".to_string())]);
    }

    #[test]
    fn status_json_converts_to_post() {
        let json = r#"{
            "id": "2",
            "created_at": "2024-03-20T12:00:00.000Z",
            "account": {"id": "9", "username": "bob", "acct": "bob@x.social", "display_name": "Bob"},
            "content": "",
            "favourited": false,
            "reblogged": true,
            "reblog": {
                "id": "1",
                "created_at": "2024-03-20T11:00:00.000Z",
                "account": {"id": "7", "username": "alice", "acct": "alice", "display_name": "Alice"},
                "content": "<p>hi</p>",
                "spoiler_text": "food",
                "in_reply_to_id": "0",
                "favourites_count": 3,
                "media_attachments": [{"url": "https://x.social/m/1.png", "remote_url": null}]
            }
        }"#;
        let status: Status = serde_json::from_str(json).unwrap();
        let post = status.into_post();
        assert!(post.is_boosted());
        assert_eq!(post.author.handle, "bob@x.social");
        let shown = post.shown();
        assert_eq!(shown.id, "1");
        assert_eq!(shown.text, "[CW: food]\nhi");
        assert_eq!(shown.in_reply_to_id.as_deref(), Some("0"));
        assert_eq!(shown.favourites_count, 3);
        assert_eq!(shown.media_urls, vec!["https://x.social/m/1.png"]);
    }

    #[test]
    fn client_requires_token() {
        let err = Client::new(ClientConfig {
            base_url: "https://x.social".into(),
            ..ClientConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::MissingToken)
        ));
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let body = "x".repeat(500);
        assert_eq!(excerpt(&body).chars().count(), 201);
        assert_eq!(excerpt(" short "), "short");
    }
}
