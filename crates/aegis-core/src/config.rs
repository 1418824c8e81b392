use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AegisError, Result};

/// Top-level config (`aegis.toml` + `AEGIS_*` env overrides, see spec §6 "Environment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AegisConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub features: FeatureFlags,
}

impl Default for AegisConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            providers: ProvidersConfig::default(),
            paths: PathsConfig::default(),
            security: SecurityConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Max tokens requested per turn; streaming kicks in above 8192 (spec §4.F.4).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

/// Filesystem locations the engine reads/writes (spec §6, multiple file formats).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_config_dir")]
    pub config_dir: String,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            reports_dir: default_reports_dir(),
        }
    }
}

impl PathsConfig {
    pub fn kg_path(&self) -> String {
        format!("{}/knowledge.db", self.config_dir)
    }
    pub fn schedule_path(&self) -> String {
        format!("{}/schedules.json", self.config_dir)
    }
    pub fn audit_log_path(&self) -> String {
        format!("{}/audit.jsonl", self.config_dir)
    }
    pub fn mcp_spec_path(&self) -> String {
        format!("{}/servers.json", self.config_dir)
    }
    pub fn identity_path(&self) -> String {
        format!("{}/identity.md", self.config_dir)
    }
    pub fn installed_skills_path(&self) -> String {
        format!("{}/skills.json", self.config_dir)
    }
    pub fn skills_dir(&self) -> String {
        format!("{}/skills", self.config_dir)
    }
}

/// Allow/deny lists enforced by the internal tool set (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Empty = unrestricted.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    /// Tools that must prompt for confirmation before acting (e.g. `create_directory`).
    #[serde(default)]
    pub confirm_tools: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub allow_script_execution: bool,
    #[serde(default)]
    pub allow_extended_context: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            allow_script_execution: false,
            allow_extended_context: false,
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_config_dir() -> String {
    if let Ok(dir) = std::env::var("AEGIS_CONFIG_DIR") {
        return dir;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.aegis", home)
}
fn default_reports_dir() -> String {
    format!("{}/reports", default_config_dir())
}

impl AegisConfig {
    /// Load config from `aegis.toml` with `AEGIS_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `$AEGIS_CONFIG_DIR/aegis.toml`
    /// (or `~/.aegis/aegis.toml` if unset).
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(|| format!("{}/aegis.toml", default_config_dir()));

        let config: AegisConfig = Figment::from(Figment::new().merge(Toml::file(&path)))
            .merge(Env::prefixed("AEGIS_").split("_"))
            .extract()
            .map_err(|e| AegisError::Config(e.to_string()))?;

        Ok(config)
    }
}
