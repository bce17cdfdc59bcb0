use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "TOOTLINE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://mastodon.social".to_string()
}

fn default_user_agent() -> String {
    format!("tootline/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    crate::mastodon::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ComposeConfig {
    /// Text appended to every new draft after a space.
    #[serde(default)]
    pub footer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.server.base_url.is_empty() && other.server.base_url != default_base_url() {
        base.server.base_url = other.server.base_url;
    }
    if !other.server.access_token.is_empty() {
        base.server.access_token = other.server.access_token;
    }
    if !other.server.user_agent.is_empty() && other.server.user_agent != default_user_agent() {
        base.server.user_agent = other.server.user_agent;
    }
    if other.server.timeout != default_timeout() {
        base.server.timeout = other.server.timeout;
    }

    if other.timeline.page_size != 0 && other.timeline.page_size != default_page_size() {
        base.timeline.page_size = other.timeline.page_size;
    }

    if !other.compose.footer.is_empty() {
        base.compose.footer = other.compose.footer;
    }

    if other.logging.file.is_some() {
        base.logging.file = other.logging.file;
    }
    if !other.logging.level.is_empty() && other.logging.level != default_level() {
        base.logging.level = other.logging.level;
    }

    base
}

fn load_env(prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    let mut cfg = Config::default();
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "server.base_url" => cfg.server.base_url = value,
        "server.access_token" => cfg.server.access_token = value,
        "server.user_agent" => cfg.server.user_agent = value,
        "server.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.server.timeout = duration;
            }
        }
        "timeline.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.timeline.page_size = parsed;
            }
        }
        "compose.footer" => cfg.compose.footer = value,
        "logging.file" => cfg.logging.file = Some(PathBuf::from(value)),
        "logging.level" => cfg.logging.level = value,
        _ => {}
    }
}

/// Name of the environment variable that overrides a dotted config key.
pub fn env_var_for(key: &str) -> String {
    format!(
        "{}_{}",
        DEFAULT_ENV_PREFIX,
        key.to_ascii_uppercase().replace('.', "__")
    )
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tootline").join("config.yaml"))
}

/// Writes the composition footer into the config file, keeping every other
/// setting. An empty footer removes it.
pub fn save_footer(path: Option<PathBuf>, footer: &str) -> Result<PathBuf> {
    let path = if let Some(path) = path {
        path
    } else {
        default_config_path().context("config: unable to determine default config path")?
    };

    let mut cfg = if path.exists() {
        read_config_file(&path)?
    } else {
        Config::default()
    };
    cfg.compose.footer = footer.to_string();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("config: failed to create directory {}", parent.display()))?;
    }

    let contents = serde_yaml::to_string(&cfg).context("config: failed to serialize config")?;
    fs::write(&path, contents)
        .with_context(|| format!("config: failed to write file {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    fn isolated(path: PathBuf, prefix: &str) -> LoadOptions {
        LoadOptions {
            config_file: Some(path),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(isolated(dir.path().join("missing.yaml"), "TOOTLINE_T1")).unwrap();
        assert_eq!(cfg.server.base_url, "https://mastodon.social");
        assert_eq!(cfg.server.timeout, Duration::from_secs(20));
        assert_eq!(cfg.timeline.page_size, 40);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.compose.footer.is_empty());
    }

    #[test]
    fn file_values_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server:\n  base_url: https://fosstodon.org\n  access_token: abc\n  timeout: 5s\ntimeline:\n  page_size: 20\ncompose:\n  footer: \"#rustlang\"\n",
        )
        .unwrap();
        let cfg = load(isolated(path, "TOOTLINE_T2")).unwrap();
        assert_eq!(cfg.server.base_url, "https://fosstodon.org");
        assert_eq!(cfg.server.access_token, "abc");
        assert_eq!(cfg.server.timeout, Duration::from_secs(5));
        assert_eq!(cfg.timeline.page_size, 20);
        assert_eq!(cfg.compose.footer, "#rustlang");
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  access_token: from-file\n  timeout: 5s\n").unwrap();
        env::set_var("TOOTLINE_T3_SERVER__ACCESS_TOKEN", "from-env");
        env::set_var("TOOTLINE_T3_LOGGING__LEVEL", "debug");
        let cfg = load(isolated(path, "TOOTLINE_T3")).unwrap();
        env::remove_var("TOOTLINE_T3_SERVER__ACCESS_TOKEN");
        env::remove_var("TOOTLINE_T3_LOGGING__LEVEL");
        assert_eq!(cfg.server.access_token, "from-env");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.server.timeout, Duration::from_secs(5));
    }

    #[test]
    fn save_footer_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "server:\n  access_token: abc\n").unwrap();
        save_footer(Some(path.clone()), "via tootline").unwrap();
        let saved = read_config_file(&path).unwrap();
        assert_eq!(saved.compose.footer, "via tootline");
        assert_eq!(saved.server.access_token, "abc");
        save_footer(Some(path.clone()), "").unwrap();
        assert!(read_config_file(&path).unwrap().compose.footer.is_empty());
    }

    #[test]
    fn env_var_names_use_double_underscore() {
        assert_eq!(
            env_var_for("server.access_token"),
            "TOOTLINE_SERVER__ACCESS_TOKEN"
        );
    }
}
