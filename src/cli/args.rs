//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "figcache",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch plot directories and inspect the workspace path cache",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  figcache init\n  figcache watch ~/figs --seconds 30\n  figcache add ~/figs/a.fyp ~/data/run1.csv\n  figcache recent --category doc\n  figcache dirs --category data --files"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path cache file (overrides cache.cache_file)
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create .figcache/settings.toml with default values
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Watch directories and feed changes into the path cache
    Watch {
        /// Directories to watch in addition to configured and known ones
        #[arg(value_name = "DIR")]
        directories: Vec<PathBuf>,

        /// Stop after this many seconds
        #[arg(short, long, default_value = "10")]
        seconds: u64,

        /// Override watch.polling_timeout_secs
        #[arg(long)]
        polling_timeout: Option<u64>,
    },

    /// Record files as recently used
    Add {
        /// Files to add
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// List the most recently used files of a category
    Recent {
        /// Category tag, e.g. doc or data
        #[arg(short = 'k', long, default_value = "doc")]
        category: String,
    },

    /// List directories holding files of a category
    Dirs {
        /// Category tag, e.g. doc or data
        #[arg(short = 'k', long, default_value = "doc")]
        category: String,

        /// Also list the files in each directory
        #[arg(long)]
        files: bool,
    },
}
