use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use gm_bridge::{GmApi, JsonFileScriptStore, ScriptId, Secret};
use gm_config::Config;
use tracing::{debug, info};

use crate::utils::styles::{fmt_bold, fmt_dimmed, fmt_success};

#[derive(Debug, Clone, Parser)]
pub(crate) struct ValuesCmd {
    /// Script name
    #[arg(long)]
    pub(crate) name: String,

    /// Script namespace
    #[arg(long)]
    pub(crate) namespace: String,

    #[command(subcommand)]
    pub(crate) action: ValuesAction,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum ValuesAction {
    /// List the script's value names
    List,
    /// Print a value
    Get {
        key: String,
        /// Printed when the value is not set
        #[arg(long)]
        default: Option<String>,
    },
    /// Store a value
    Set { key: String, value: String },
    /// Remove a value
    Delete { key: String },
}

impl ValuesCmd {
    pub(crate) fn handle(&self, cfg: &Config) -> Result<()> {
        let path = store_path(cfg);
        debug!("Opening value store {path}");
        let store = JsonFileScriptStore::open(&path)?;

        // the CLI is the trusted host, so it injects a fresh secret and hands it to itself
        let secret = Secret::generate();
        let api = GmApi::new(Arc::new(store), secret.clone());
        let script = ScriptId::new(&self.name, &self.namespace);

        let mut out = std::io::stdout().lock();
        self.run(&api, &script, secret.expose(), &mut out)?;

        if matches!(
            self.action,
            ValuesAction::Set { .. } | ValuesAction::Delete { .. }
        ) {
            info!(
                "{}",
                fmt_success(&format!(
                    "Updated values of {script} in {path}",
                    script = fmt_bold(&script.to_string()),
                    path = fmt_dimmed(path.as_str()),
                ))
            );
        }
        Ok(())
    }

    fn run(
        &self,
        api: &GmApi,
        script: &ScriptId,
        secret: &str,
        out: &mut impl std::io::Write,
    ) -> Result<()> {
        match &self.action {
            ValuesAction::List => {
                if let Some(names) = api.list_values(script, secret)
                    && !names.is_empty()
                {
                    writeln!(out, "{names}")?;
                }
            }
            ValuesAction::Get { key, default } => {
                match api.get_value(script, secret, key, default.as_deref()) {
                    Some(value) => writeln!(out, "{value}")?,
                    None => anyhow::bail!("No value {key} stored for {script}"),
                }
            }
            ValuesAction::Set { key, value } => api.set_value(script, secret, key, value),
            ValuesAction::Delete { key } => api.delete_value(script, secret, key),
        }
        Ok(())
    }
}

/// A relative store file lives next to the config file
fn store_path(cfg: &Config) -> Utf8PathBuf {
    let file = cfg.store.file();
    if file.is_absolute() {
        return file;
    }
    match cfg.path().parent() {
        Some(dir) if !dir.as_str().is_empty() => dir.join(file),
        _ => file,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        cfg: Config,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("gm.json")).unwrap();
        Fixture {
            cfg: Config::default().with_path(&path),
            _dir: dir,
        }
    }

    fn run(cfg: &Config, action: ValuesAction) -> Result<String> {
        let cmd = ValuesCmd {
            name: "Tab Saver".into(),
            namespace: "https://example.org".into(),
            action,
        };
        let secret = Secret::generate();
        let api = GmApi::new(
            Arc::new(JsonFileScriptStore::open(store_path(cfg))?),
            secret.clone(),
        );
        let script = ScriptId::new(&cmd.name, &cmd.namespace);
        let mut out = Vec::new();
        cmd.run(&api, &script, secret.expose(), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_store_path_relative_to_config() {
        let fx = fixture();
        let dir = fx.cfg.path().parent().unwrap().to_owned();
        assert_eq!(store_path(&fx.cfg), dir.join("gm-values.json"));

        let bare = Config::default();
        assert_eq!(store_path(&bare), Utf8PathBuf::from("gm-values.json"));
    }

    #[test]
    fn test_values_persist_between_invocations() {
        let fx = fixture();
        run(
            &fx.cfg,
            ValuesAction::Set {
                key: "theme".into(),
                value: "dark".into(),
            },
        )
        .unwrap();
        run(
            &fx.cfg,
            ValuesAction::Set {
                key: "count".into(),
                value: "2".into(),
            },
        )
        .unwrap();

        assert_eq!(run(&fx.cfg, ValuesAction::List).unwrap(), "count,theme\n");
        let get = ValuesAction::Get {
            key: "theme".into(),
            default: None,
        };
        assert_eq!(run(&fx.cfg, get).unwrap(), "dark\n");

        run(&fx.cfg, ValuesAction::Delete { key: "theme".into() }).unwrap();
        let missing = ValuesAction::Get {
            key: "theme".into(),
            default: None,
        };
        assert!(run(&fx.cfg, missing).is_err());
        let defaulted = ValuesAction::Get {
            key: "theme".into(),
            default: Some("light".into()),
        };
        assert_eq!(run(&fx.cfg, defaulted).unwrap(), "light\n");
    }
}
