mod commands;
mod utils;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use gm_config::Config;
use tracing::error;

use crate::commands::{init::InitCmd, request::RequestCmd, values::ValuesCmd};

#[derive(Parser)]
#[command(name = "gm")]
#[command(version)]
#[command(about = "GM - userscript bridge host")]
#[command(
    long_about = "gm hosts the privileged side of a userscript engine from the command line. \
It issues GM_xmlhttpRequest calls described as JSON and prints every callback the script \
engine would receive, and it reads and writes the per-script values behind GM_getValue and \
friends.\n\n\
Logs go to stderr so stdout carries only callback invocations and values."
)]
#[command(after_help = "EXAMPLES:\n  \
    # Write a default configuration\n  \
    gm init\n\n  \
    # Issue a request and print callbacks as JSON lines\n  \
    echo '{\"method\":\"GET\",\"url\":\"https://example.org\",\"onload\":\"done\"}' | gm request\n\n  \
    # Print callbacks as script text\n  \
    gm request request.json --script\n\n  \
    # Store and read a script value\n  \
    gm values --name 'Tab Saver' --namespace https://example.org set theme dark\n  \
    gm values --name 'Tab Saver' --namespace https://example.org get theme\n\
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path, defaults to ./gm.json
    #[arg(long, short = 'c', global = true, default_value_t = Config::default_path())]
    config: Utf8PathBuf,

    /// No logging except for errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Verbose logging (-v) or trace logging (-vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Cli {
    fn handle(&self, cfg: Config) -> Result<()> {
        match &self.command {
            Commands::Init(cmd) => cmd.handle(cfg),
            Commands::Request(cmd) => cmd.handle(&cfg),
            Commands::Values(cmd) => cmd.handle(&cfg),
        }
    }
}

#[derive(Debug, Subcommand)]
#[command(styles=utils::styles::get_styles())]
enum Commands {
    /// Write a default configuration file
    #[command(
        long_about = "Writes a configuration file with every setting at its default. \
Refuses to overwrite an existing file."
    )]
    Init(InitCmd),

    /// Issue a GM_xmlhttpRequest
    #[command(
        long_about = "Reads a request descriptor from FILE, or stdin when FILE is omitted, \
runs it through the bridge and prints each callback invocation on its own line. \
Asynchronous requests are waited for before exiting."
    )]
    Request(RequestCmd),

    /// Read and write script values
    #[command(
        long_about = "Calls the secret-gated value API against the configured JSON value store, \
scoped to one script identified by name and namespace."
    )]
    Values(ValuesCmd),
}

fn main() {
    let cli = Cli::parse();

    let cfg = match Config::load_or_default(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("gm: {e:#}");
            std::process::exit(1);
        }
    };

    if let Err(e) = utils::logger::init_logger(&cfg.logger, cli.quiet, cli.verbose) {
        eprintln!("gm: Failed initializing logger: {e:#}");
    }

    let _host = utils::logger::host_span(&cfg.name).entered();
    if let Err(e) = cli.handle(cfg) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
