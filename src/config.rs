use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    DisabledMatcher, FaceMatcher, ManagerGate, MatchOutcome, ReferenceImageMatcher, StaticMatcher,
};
use crate::error::{DashboardError, Result};
use crate::schema::{Column, HeaderAliases};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub path: String,
    /// Extra header names per canonical column, e.g. `amount = ["revenue"]`
    #[serde(default)]
    pub aliases: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertConfig {
    /// Compliance percentage under which groups are flagged.
    /// Left unset there are no alerts.
    pub threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChatConfig {
    #[serde(default)]
    pub typing_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// `disabled`, `allow` or `reference`
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Registered manager photo, read by the `reference` provider
    pub reference_image: Option<String>,
    #[serde(default = "default_face_match_timeout")]
    pub face_match_timeout_secs: u64,
    /// Lifetime of a manager unlock token
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            provider: default_provider(),
            reference_image: None,
            face_match_timeout_secs: default_face_match_timeout(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}

fn default_face_match_timeout() -> u64 {
    10
}

fn default_token_ttl() -> u64 {
    3600
}

const PROVIDERS: [&str; 3] = ["disabled", "allow", "reference"];

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[data]
path = "data/sales.csv"

[chat]
typing_delay_ms = 0

[auth]
provider = "disabled"
face_match_timeout_secs = 10
token_ttl_secs = 3600

[server]
bind = "127.0.0.1:3000"
"#;

pub const CONFIG_FILE: &str = "dashboard.toml";

/// Load configuration.
///
/// Search order:
/// 1. The explicit path, when given (must exist)
/// 2. `dashboard.toml` in the working directory
/// 3. The embedded default
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        info!("Loading config from: {}", path.display());
        return parse_file(path);
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        info!("Loading config from: {}", local.display());
        return parse_file(&local);
    }

    warn!("{} not found, using default embedded configuration", CONFIG_FILE);
    parse(DEFAULT_CONFIG)
}

fn parse_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        DashboardError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse(&contents)
}

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(contents).map_err(|e| DashboardError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<()> {
        if let Some(t) = self.alerts.threshold {
            if !(0.0..=1000.0).contains(&t) {
                return Err(DashboardError::Config(format!(
                    "alert threshold {} is not a percentage",
                    t
                )));
            }
        }
        if !PROVIDERS.contains(&self.auth.provider.as_str()) {
            return Err(DashboardError::Config(format!(
                "unknown face-match provider '{}', expected one of {}",
                self.auth.provider,
                PROVIDERS.join(", ")
            )));
        }
        if self.auth.provider == "reference" && self.auth.reference_image.is_none() {
            return Err(DashboardError::Config(
                "provider 'reference' needs [auth] reference_image".into(),
            ));
        }
        for column in self.data.aliases.keys() {
            if Column::from_name(column).is_none() {
                return Err(DashboardError::Config(format!(
                    "unknown column '{}' in [data.aliases]",
                    column
                )));
            }
        }
        Ok(())
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data.path)
    }

    /// Built-in header aliases plus the configured ones
    pub fn header_aliases(&self) -> HeaderAliases {
        let mut aliases = HeaderAliases::default();
        for (column, names) in &self.data.aliases {
            if let Some(column) = Column::from_name(column) {
                for name in names {
                    aliases.add(column, name);
                }
            }
        }
        aliases
    }

    pub fn typing_delay(&self) -> Duration {
        Duration::from_millis(self.chat.typing_delay_ms)
    }

    pub fn face_match_timeout(&self) -> Duration {
        Duration::from_secs(self.auth.face_match_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }

    /// Manager gate backed by the configured face-match provider
    pub fn manager_gate(&self) -> Result<ManagerGate> {
        let matcher: Arc<dyn FaceMatcher> = match self.auth.provider.as_str() {
            "allow" => Arc::new(StaticMatcher(MatchOutcome::Match)),
            "reference" => {
                let path = self.auth.reference_image.as_deref().ok_or_else(|| {
                    DashboardError::Config("provider 'reference' needs reference_image".into())
                })?;
                Arc::new(ReferenceImageMatcher::from_path(Path::new(path))?)
            }
            "disabled" => Arc::new(DisabledMatcher),
            other => {
                return Err(DashboardError::Config(format!(
                    "unknown face-match provider '{}'",
                    other
                )));
            }
        };
        info!("manager gate uses the {} provider", matcher.name());
        Ok(ManagerGate::new(matcher, self.face_match_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config = parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.data.path, "data/sales.csv");
        assert_eq!(config.alerts.threshold, None);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.face_match_timeout(), Duration::from_secs(10));
        assert_eq!(config.auth.provider, "disabled");
        assert_eq!(config.token_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn configured_provider_drives_the_gate() {
        let config = parse(
            r#"
            [data]
            path = "x.csv"
            [auth]
            provider = "allow"
            "#,
        )
        .unwrap();
        let grant = config.manager_gate().unwrap().check(vec![1]).unwrap();
        assert_eq!(grant.provider, "static");

        let config = parse(DEFAULT_CONFIG).unwrap();
        let err = config.manager_gate().unwrap().check(vec![1]).unwrap_err();
        assert!(matches!(err, DashboardError::SourceUnavailable(_)));
    }

    #[test]
    fn reference_provider_reads_the_registered_photo() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("manager.jpg");
        std::fs::write(&photo, b"badge photo").unwrap();
        let config = parse(&format!(
            "[data]\npath = \"x.csv\"\n[auth]\nprovider = \"reference\"\nreference_image = {:?}\n",
            photo.display().to_string()
        ))
        .unwrap();
        let gate = config.manager_gate().unwrap();
        assert!(gate.check(b"badge photo".to_vec()).is_ok());
        assert!(gate.check(b"someone else".to_vec()).is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = parse(
            r#"
            [data]
            path = "x.csv"
            [auth]
            provider = "retina"
            "#,
        )
        .unwrap_err();
        assert!(err.user_message().contains("retina"));

        let err = parse("[data]\npath = \"x.csv\"\n[auth]\nprovider = \"reference\"\n")
            .unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn threshold_and_aliases_are_read() {
        let config = parse(
            r#"
            [data]
            path = "ventas.xlsx"
            [data.aliases]
            amount = ["Revenue"]
            [alerts]
            threshold = 70
            "#,
        )
        .unwrap();
        assert_eq!(config.alerts.threshold, Some(70.0));
        assert_eq!(config.header_aliases().resolve("revenue"), Some(Column::Amount));
        assert_eq!(config.chat.typing_delay_ms, 0);
    }

    #[test]
    fn unknown_alias_column_is_rejected() {
        let err = parse(
            r#"
            [data]
            path = "x.csv"
            [data.aliases]
            region = ["zona"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }
}
