use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use snugfeed::{Client, RedisBackend, Session};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".snugfeed";
const URL_OVERRIDE_VAR: &str = "SNUGFEED_REDIS_URL";

/// Workspace context for snugfeed commands
pub struct ClientContext {
    /// Directory holding `.snugfeed/` (or the working directory when none exists)
    pub root: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Loaded (or default) configuration
    pub config: FeedConfig,
}

/// Configuration stored in .snugfeed/config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            prefix: default_prefix(),
        }
    }
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

fn default_prefix() -> String {
    "snugfeed".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Where the access token is kept between invocations, relative to the root
    #[serde(default = "default_session_file")]
    pub session_file: String,
    /// Stop `--watch` after this many idle seconds (never when unset)
    #[serde(default)]
    pub watch_idle_secs: Option<u64>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
            watch_idle_secs: None,
        }
    }
}

fn default_session_file() -> String {
    ".snugfeed/session.json".to_string()
}

impl ClientContext {
    /// Find and load context from current directory or ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    /// Uses the nearest ancestor holding `.snugfeed/config.toml`, else `start` with defaults
    pub fn find_from(start: &Path) -> Result<Self> {
        let mut current = start.to_path_buf();
        loop {
            if current.join(CONFIG_DIR).join("config.toml").exists() {
                return Self::from_root(current);
            }
            if !current.pop() {
                return Self::from_root(start.to_path_buf());
            }
        }
    }

    pub fn from_root(root: PathBuf) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join("config.toml");

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).context("Failed to read config.toml")?;
            toml::from_str(&content).context("Failed to parse config.toml")?
        } else {
            FeedConfig::default()
        };

        Ok(Self {
            root,
            config_path,
            config,
        })
    }

    /// Get the Redis URL: `SNUGFEED_REDIS_URL` wins, otherwise the configured value with variables expanded
    pub fn redis_url(&self) -> Result<String> {
        self.redis_url_with(|name| std::env::var(name).ok())
    }

    fn redis_url_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        if let Some(url) = lookup(URL_OVERRIDE_VAR) {
            return Ok(url);
        }
        expand_env(&self.config.backend.redis_url, lookup)
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(&self.config.client.session_file)
    }

    pub fn load_session(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let session = serde_json::from_str(&content).context("Saved session is corrupt; run 'snugfeed auth signout'")?;
        Ok(Some(session))
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(session)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn clear_session(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }

    /// Connects to the backend, resuming the saved session if there is one
    pub async fn connect(&self) -> Result<Client<RedisBackend>> {
        let url = self
            .redis_url()
            .context("REDIS_URL environment variable not set. Set it to connect to Redis.")?;
        let backend = RedisBackend::connect(&url, self.config.backend.prefix.clone())
            .await
            .context("Failed to connect to Redis")?;
        Ok(match self.load_session()? {
            Some(session) => Client::with_session(backend, session),
            None => Client::new(backend),
        })
    }
}

/// Replaces every `${VAR}` in `value`; unset variables are an error
fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        let replacement = lookup(name).with_context(|| format!("Environment variable {name} not set"))?;
        expanded.push_str(&rest[..start]);
        expanded.push_str(&replacement);
        rest = &rest[start + 3 + len..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}
