//! Project configuration.
//!
//! Settings live in `<project>/.eddy/settings.json` and overlay the built-in
//! defaults. Only the pieces the core consumes are modelled: the theme name
//! and the per-language language-server table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const SETTINGS_DIR: &str = ".eddy";
pub const SETTINGS_FILE: &str = "settings.json";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspServerConfig {
    /// Command to spawn the server.
    pub command: String,

    /// Arguments to pass to the server.
    #[serde(default)]
    pub args: Vec<String>,

    /// Whether the server is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Custom initialization options, passed in the `initializationOptions`
    /// field of the `initialize` request.
    #[serde(default)]
    pub initialization_options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Built-in theme name.
    pub theme: String,

    /// Language id (e.g. "c") to language-server configuration.
    pub lsp: HashMap<String, LspServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut lsp = HashMap::new();
        lsp.insert(
            "c".to_string(),
            LspServerConfig {
                command: "clangd".to_string(),
                args: vec![
                    "--use-dirty-headers".to_string(),
                    "--background-index".to_string(),
                ],
                enabled: true,
                initialization_options: None,
            },
        );
        Config {
            theme: "dark".to_string(),
            lsp,
        }
    }
}

impl Config {
    pub fn settings_path(project_root: &Path) -> PathBuf {
        project_root.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// The project's configuration: the settings file when present, the
    /// defaults otherwise.
    pub fn load(project_root: &Path) -> anyhow::Result<Config> {
        let path = Self::settings_path(project_root);
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn lsp_for(&self, language_id: &str) -> Option<&LspServerConfig> {
        self.lsp
            .get(language_id)
            .filter(|config| config.enabled && !config.command.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_configure_clangd_for_c() {
        let config = Config::default();
        let clangd = config.lsp_for("c").unwrap();
        assert_eq!(clangd.command, "clangd");
        assert!(clangd.enabled);
        assert!(config.lsp_for("cobol").is_none());
    }

    #[test]
    fn disabled_servers_are_filtered() {
        let mut config = Config::default();
        config.lsp.get_mut("c").unwrap().enabled = false;
        assert!(config.lsp_for("c").is_none());
    }

    #[test]
    fn missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.theme, "dark");
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings_dir = dir.path().join(SETTINGS_DIR);
        std::fs::create_dir_all(&settings_dir).unwrap();
        std::fs::write(
            settings_dir.join(SETTINGS_FILE),
            r#"{
                "theme": "light",
                "lsp": {
                    "c": {"command": "ccls", "args": ["--log-file=/tmp/ccls.log"]}
                }
            }"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.theme, "light");
        assert_eq!(config.lsp_for("c").unwrap().command, "ccls");
    }

    #[test]
    fn malformed_settings_error_out() {
        let dir = tempfile::tempdir().unwrap();
        let settings_dir = dir.path().join(SETTINGS_DIR);
        std::fs::create_dir_all(&settings_dir).unwrap();
        std::fs::write(settings_dir.join(SETTINGS_FILE), "{not json").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
