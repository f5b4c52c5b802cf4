mod input;
mod line;
mod tui;

use anyhow::{Context, Result};
use fastgpt_stream::ModelList;
use tracing::{info, warn};

use crate::app::ChatApp;
use crate::config::{CliOverrides, Endpoint, FastGptConfig, FileConfig, load_config};
use crate::models::{ClientError, fetch_models};
use crate::session::LiveSession;

/// Resolve the layered configuration with command-line overrides on top.
pub fn resolve_config(config: &FastGptConfig, overrides: &CliOverrides) -> Result<FileConfig> {
    let mut fc: FileConfig = load_config(&config.data_dir)
        .extract()
        .context("Failed to load configuration")?;
    overrides.apply(&mut fc);
    Ok(fc)
}

/// Interactive chat: full screen on a terminal, line mode otherwise.
pub async fn chat_command(
    config: &FastGptConfig,
    overrides: &CliOverrides,
    full_screen: bool,
) -> Result<()> {
    let fc = resolve_config(config, overrides)?;
    let endpoint = Endpoint::from_file(&fc.server);

    let models = match fetch_models(&endpoint).await {
        Ok(list) => list,
        Err(e) => {
            warn!(url = %endpoint.models_url(), "Failed to fetch model list: {e}");
            ModelList::default()
        }
    };
    info!(count = models.gpt_models.len(), first = ?models.first(), "models available");

    let ws_url = endpoint.ws_url();
    let mut app = ChatApp::new(ws_url.as_str(), fc.chat.test_input, fc.chat.test_prompt);
    app.set_models(models, fc.chat.default_model.as_deref());

    let session = LiveSession::start(ws_url);
    info!(url = session.url(), model = ?app.selected_model(), "chat session started");

    if full_screen {
        tui::run(app, session).await
    } else {
        line::run(app, session).await
    }
}

pub async fn models_command(
    config: &FastGptConfig,
    overrides: &CliOverrides,
    json: bool,
) -> Result<()> {
    let fc = resolve_config(config, overrides)?;
    let endpoint = Endpoint::from_file(&fc.server);

    let list = match fetch_models(&endpoint).await {
        Ok(list) => list,
        Err(ClientError::Unreachable) => {
            anyhow::bail!("No backend reachable at {}", endpoint.base_url())
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else if list.is_empty() {
        println!("No models available.");
    } else {
        for (i, name) in list.gpt_models.iter().enumerate() {
            let marker = if i == 0 { "*" } else { " " };
            println!("{marker} {name}");
        }
        println!("\n{} model(s)", list.gpt_models.len());
    }
    Ok(())
}

/// Print the effective configuration; `--write` also seeds config.toml.
pub fn config_command(config: &FastGptConfig, overrides: &CliOverrides, write: bool) -> Result<()> {
    let fc = resolve_config(config, overrides)?;
    if write {
        let path = config.config_toml_path();
        if config.write_config_if_missing(&fc)? {
            println!("Wrote {}", path.display());
        } else {
            println!("{} already exists; left untouched", path.display());
        }
    }
    print!(
        "{}",
        toml::to_string_pretty(&fc).context("Failed to serialize config")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_config_applies_overrides_over_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[server]\nhost = \"gpu-box\"\nport = 9000\n",
        )
        .unwrap();
        let config = FastGptConfig::new(Some(dir.path().to_path_buf())).unwrap();

        let fc = resolve_config(&config, &CliOverrides::default()).unwrap();
        assert_eq!(fc.server.host, "gpu-box");
        assert_eq!(fc.server.port, 9000);

        let overrides = CliOverrides {
            port: Some(7000),
            model: Some("gpt-4".into()),
            ..Default::default()
        };
        let fc = resolve_config(&config, &overrides).unwrap();
        assert_eq!(fc.server.host, "gpu-box");
        assert_eq!(fc.server.port, 7000);
        assert_eq!(fc.chat.default_model.as_deref(), Some("gpt-4"));
    }

    #[test]
    fn config_command_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = FastGptConfig::new(Some(dir.path().to_path_buf())).unwrap();
        config_command(&config, &CliOverrides::default(), true).unwrap();
        let first = std::fs::read_to_string(config.config_toml_path()).unwrap();
        assert!(first.contains("[server]"));

        std::fs::write(config.config_toml_path(), "[server]\nport = 1\n").unwrap();
        config_command(&config, &CliOverrides::default(), true).unwrap();
        let second = std::fs::read_to_string(config.config_toml_path()).unwrap();
        assert_eq!(second, "[server]\nport = 1\n");
    }
}
