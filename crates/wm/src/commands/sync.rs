//! `wm sync` command implementation.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use wm_assets::AssetStore;
use wm_cache::{FileCache, NullCache, VersionedCache};
use wm_config::{CliSettings, Config};
use wm_source::HttpWorkspaceClient;
use wm_sync::Orchestrator;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the sync command.
#[derive(Args)]
pub(crate) struct SyncArgs {
    /// Path to configuration file (default: auto-discover wm.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Re-fetch every asset, bypassing the asset index.
    #[arg(long)]
    force: bool,

    /// Disable the traversal and render caches for this run.
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or the sync itself fails.
    pub(crate) fn execute(self, app_version: &str) -> Result<(), CliError> {
        let output = Output::new();
        let started = Instant::now();

        let cli_settings = CliSettings {
            cache_enabled: self.no_cache.then_some(false),
            force_refresh: self.force.then_some(true),
            output_dir: None,
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let source = config.require_source()?;

        let client = HttpWorkspaceClient::new(&source.base_url, &source.token);
        let cache: Box<dyn VersionedCache> = if config.output_resolved.cache_enabled {
            Box::new(FileCache::open(
                config.output_resolved.cache_dir.clone(),
                app_version,
            ))
        } else {
            Box::new(NullCache)
        };
        let mut assets = AssetStore::open(
            config.output_resolved.assets_dir.clone(),
            config.force_refresh,
        );

        output.highlight(&format!("Syncing {}...", config.site.name));
        let summary = Orchestrator::new(&config, &client, cache.as_ref()).run(&mut assets)?;

        output.success(&format!(
            "Synced {} pages and {} collections ({} assets) in {:.1}s",
            summary.pages,
            summary.collections,
            summary.assets,
            started.elapsed().as_secs_f64()
        ));
        output.info(&format!(
            "Artifacts written to {}",
            config.output_resolved.dir.display()
        ));

        Ok(())
    }
}
