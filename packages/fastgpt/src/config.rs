use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    host = "gpu-box.local"
//
//   env var:         FASTGPT_SERVER__HOST=gpu-box.local   (double underscore = nesting)
//
//   CLI flag:        fastgpt --host gpu-box.local         (highest priority)

/// Scheme the backend is served over. The WebSocket scheme follows it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn http_scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn ws_scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "ws",
            Protocol::Https => "wss",
        }
    }
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Backend endpoint (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_generate_path")]
    pub generate_path: String,
    #[serde(default = "default_models_path")]
    pub models_path: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            protocol: Protocol::default(),
            generate_path: default_generate_path(),
            models_path: default_models_path(),
        }
    }
}

/// Chat defaults (lives under `[chat]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    /// Preferred model; falls back to the first one the server lists.
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub test_input: bool,
    #[serde(default = "default_test_prompt")]
    pub test_prompt: String,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            test_input: false,
            test_prompt: default_test_prompt(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_generate_path() -> String {
    "generate".to_string()
}
fn default_models_path() -> String {
    "gpt_models".to_string()
}
fn default_test_prompt() -> String {
    "Write a Python function that returns the n-th Fibonacci number, \
     then call it for n = 10 and print the result."
        .to_string()
}

/// Build a figment that layers: defaults → config.toml → FASTGPT_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `FASTGPT_SERVER__PORT=9000`  →  `server.port = 9000`
///   `FASTGPT_CHAT__TEST_INPUT=true`  →  `chat.test_input = true`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("FASTGPT_").split("__"))
}

/// Command-line values that win over every file/env layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub model: Option<String>,
    pub test_input: Option<bool>,
}

impl CliOverrides {
    pub fn apply(&self, fc: &mut FileConfig) {
        if let Some(host) = &self.host {
            fc.server.host = host.clone();
        }
        if let Some(port) = self.port {
            fc.server.port = port;
        }
        if let Some(protocol) = self.protocol {
            fc.server.protocol = protocol;
        }
        if let Some(model) = &self.model {
            fc.chat.default_model = Some(model.clone());
        }
        if let Some(test_input) = self.test_input {
            fc.chat.test_input = test_input;
        }
    }
}

// =============================================================================
// Runtime views
// =============================================================================

/// The one backend endpoint used for the lifetime of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub generate_path: String,
    pub models_path: String,
}

impl Endpoint {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            protocol: fc.protocol,
            generate_path: fc.generate_path.trim_start_matches('/').to_string(),
            models_path: fc.models_path.trim_start_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.protocol.http_scheme(),
            self.host,
            self.port
        )
    }

    pub fn ws_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol.ws_scheme(),
            self.host,
            self.port,
            self.generate_path
        )
    }

    pub fn models_url(&self) -> String {
        format!("{}/{}", self.base_url(), self.models_path)
    }
}

// =============================================================================
// Directory layout config (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct FastGptConfig {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl FastGptConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".fastgpt"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir, logs_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("fastgpt.log")
    }

    /// Write `fc` to config.toml unless one already exists.
    /// Returns whether a file was written.
    pub fn write_config_if_missing(&self, fc: &FileConfig) -> Result<bool> {
        let path = self.config_toml_path();
        if path.exists() {
            return Ok(false);
        }
        let body = toml::to_string_pretty(fc).context("Failed to serialize config")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write config: {:?}", path))?;
        info!("Wrote default config to {}", path.display());
        Ok(true)
    }
}
