use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config;
use crate::context::AppContext;
use crate::controller::Controller;
use crate::data::{FeedService, InteractionService, MastodonFeedService, MastodonInteractionService};
use crate::logging;
use crate::mastodon::{self, ApiError};
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let config_path = options.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_ref());

    let log_path = cfg.logging.file.clone().or_else(logging::default_log_path);
    if let Some(log_path) = log_path {
        if let Err(err) = logging::init(&log_path, &cfg.logging.level) {
            eprintln!("warning: logging disabled: {err}");
        }
    }
    info!(version = crate::VERSION, server = %cfg.server.base_url, "starting");

    let client = mastodon::Client::new(mastodon::ClientConfig {
        base_url: cfg.server.base_url.clone(),
        access_token: cfg.server.access_token.clone(),
        user_agent: cfg.server.user_agent.clone(),
        timeout: cfg.server.timeout,
        page_size: cfg.timeline.page_size,
    })
    .map_err(|err| {
        if matches!(err.downcast_ref::<ApiError>(), Some(ApiError::MissingToken)) {
            warn!("no access token configured");
            anyhow::anyhow!(
                "no access token: set server.access_token in {display_path} or export {}",
                config::env_var_for("server.access_token")
            )
        } else {
            err
        }
    })?;
    let client = Arc::new(client);

    let feed: Arc<dyn FeedService> = Arc::new(MastodonFeedService::new(client.clone()));
    let interactions: Arc<dyn InteractionService> =
        Arc::new(MastodonInteractionService::new(client));

    let (ctx, deliveries) = AppContext::new(feed, interactions, options.config_file);
    let controller = Controller::new(ctx, cfg.compose.footer.clone(), 80, 24);

    let mut model = ui::Model::new(controller, deliveries);
    model.run()
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/tootline/config.yaml".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_path_shortens_home() {
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config").join("tootline").join("config.yaml");
            assert_eq!(friendly_path(Some(&path)), "~/.config/tootline/config.yaml");
        }
        assert_eq!(
            friendly_path(Some(&PathBuf::from("/etc/tootline.yaml"))),
            "/etc/tootline.yaml"
        );
    }

    #[test]
    fn missing_token_names_the_env_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let log = dir.path().join("tootline.log");
        std::fs::write(
            &path,
            format!(
                "server:\n  base_url: https://example.invalid\nlogging:\n  file: {}\n",
                log.display()
            ),
        )
        .unwrap();
        if std::env::var(config::env_var_for("server.access_token")).is_ok() {
            return;
        }
        let err = run(RunOptions {
            config_file: Some(path),
        })
        .unwrap_err();
        assert!(err.to_string().contains("TOOTLINE_SERVER__ACCESS_TOKEN"));
    }
}
