use clap::Parser;
use figcache::cli::commands;
use figcache::cli::{Cli, Commands};
use figcache::{Settings, logging};

fn main() {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        Settings::default()
    });
    if let Some(cache_file) = &cli.cache_file {
        settings.cache.cache_file = Some(cache_file.clone());
    }

    logging::init_with_config(&settings.logging);

    let cache_file = settings.cache.cache_file_path();
    let result = match cli.command {
        Commands::Init { force } => commands::init::run_init(force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Watch {
            directories,
            seconds,
            polling_timeout,
        } => commands::watch::run_watch(
            settings,
            &cache_file,
            &directories,
            seconds,
            polling_timeout,
        ),
        Commands::Add { files } => commands::cache::run_add(&settings, &cache_file, &files),
        Commands::Recent { category } => {
            commands::cache::run_recent(&settings, &cache_file, &category)
        }
        Commands::Dirs { category, files } => {
            commands::cache::run_dirs(&settings, &cache_file, &category, files)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
