use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// YAML settings file.
    #[arg(short, long, env = "RANK_TRACKER_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Overrides the Keyword API base URL.
    #[arg(long, env = "RANK_TRACKER_API_URL")]
    pub(crate) api_url: Option<String>,
    /// Overrides the Keyword API bearer token.
    #[arg(long, env = "RANK_TRACKER_API_TOKEN", hide_env_values = true)]
    pub(crate) api_token: Option<String>,
    /// Overrides the directory job state is kept in.
    #[arg(long)]
    pub(crate) storage_dir: Option<PathBuf>,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Submits keywords for a domain and tracks them until processed.
    Add(AddArgs),
    /// Prints every tracked job.
    List,
    /// Stops tracking a job.
    Remove { id: String },
    /// Drops every completed or failed job.
    Clear,
    /// Polls pending jobs until none remain.
    Watch,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct AddArgs {
    /// Domain id the keywords belong to.
    #[arg(long)]
    pub(crate) domain: u64,
    /// Keywords to track.
    #[arg(required = true)]
    pub(crate) keywords: Vec<String>,
    /// Stars the new keywords.
    #[arg(long, default_value_t)]
    pub(crate) star: bool,
    /// Country to track from; requires --device.
    #[arg(long, requires = "device")]
    pub(crate) country: Option<String>,
    /// Device to track on; requires --country.
    #[arg(long, requires = "country")]
    pub(crate) device: Option<String>,
    /// Tags to attach; may be repeated.
    #[arg(long = "tag")]
    pub(crate) tags: Vec<String>,
    /// Keep polling until the new job finishes.
    #[arg(short, long, default_value_t)]
    pub(crate) wait: bool,
}
