use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use gm_bridge::{Bridge, BridgeConfig, CallbackInvocation, MemoryScriptStore, Secret};
use gm_config::Config;
use tracing::{info, warn};

#[derive(Debug, Clone, Parser)]
pub(crate) struct RequestCmd {
    /// Request descriptor file, stdin when omitted or `-`
    pub(crate) file: Option<Utf8PathBuf>,

    /// Print callbacks as the script text a page would evaluate
    #[arg(long)]
    pub(crate) script: bool,
}

impl RequestCmd {
    pub(crate) fn handle(&self, cfg: &Config) -> Result<()> {
        let descriptor = self.read_descriptor()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let bridge = Bridge::new(
            BridgeConfig::from(cfg),
            Arc::new(MemoryScriptStore::new()),
            Secret::generate(),
            Arc::new(tx),
        )?;

        let script = self.script;
        let printer = std::thread::spawn(move || print_invocations(&rx, script));

        let result = bridge.xml_http_request(&descriptor);
        // waits for queued requests, then releases the sink so the printer ends
        bridge.shutdown();
        let printed = printer
            .join()
            .map_err(|_| anyhow::anyhow!("Callback printer panicked"))??;

        let state = result?;
        info!(
            ready_state = u8::from(state.ready_state),
            status = state.status,
            callbacks = printed,
            "Request finished"
        );
        Ok(())
    }

    fn read_descriptor(&self) -> Result<String> {
        match &self.file {
            Some(path) if path.as_str() != "-" => std::fs::read_to_string(path)
                .context(format!("Failed reading request descriptor: {path}")),
            _ => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed reading request descriptor from stdin")?;
                Ok(buf)
            }
        }
    }
}

fn print_invocations(rx: &Receiver<CallbackInvocation>, script: bool) -> Result<usize> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_invocations(rx, script, &mut out)
}

fn write_invocations(
    rx: &Receiver<CallbackInvocation>,
    script: bool,
    out: &mut impl Write,
) -> Result<usize> {
    let mut printed = 0;
    for invocation in rx {
        let line = if script {
            match invocation.to_script() {
                Ok(line) => line,
                Err(e) => {
                    warn!(callback = %invocation.callback, error = %e, "Skipping callback");
                    continue;
                }
            }
        } else {
            serde_json::to_string(&invocation)?
        };
        writeln!(out, "{line}")?;
        out.flush()?;
        printed += 1;
    }
    Ok(printed)
}
