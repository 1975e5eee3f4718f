use anyhow::Result;
use clap::Parser;
use gm_config::Config;
use tracing::info;

use crate::utils::styles::{fmt_dimmed, fmt_success};

#[derive(Debug, Clone, Parser)]
pub(crate) struct InitCmd {
    /// Host name recorded in the config, defaults to the current directory name
    #[arg(long)]
    pub(crate) name: Option<String>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub(crate) force: bool,
}

impl InitCmd {
    pub(crate) fn handle(&self, cfg: Config) -> Result<()> {
        let path = cfg.path();
        if path.exists() && !self.force {
            anyhow::bail!("Config already exists at {path}, pass --force to overwrite it");
        }

        let name = self.name.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|p| p.file_name().map(|f| f.to_string_lossy().to_string()))
                .unwrap_or(cfg.name.clone())
        });
        let mut cfg = Config::default().with_path(&path);
        cfg.name = name;
        cfg.save()?;

        info!(
            "{}",
            fmt_success(&format!("Config written to {}", fmt_dimmed(path.as_str())))
        );
        Ok(())
    }
}
