use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use geowatch_logic::{
    LocationRecord, MemoryStore, OutputSlot, Plugin, PluginConfig, read_typed,
};
use geowatch_sim::{
    ReplayLocation, VariableTemplates, load_track, parse_host_version, prelude::*,
};
use log::{error, info};

const DEFAULT_TEMPLATE: &str =
    "You are at $location.latitude, $location.longitude (within $location.accuracy m)";

#[derive(Parser)]
/// Play a recorded track through the geolocation directives and print the
/// live-update output after every position change
struct Cli {
    /// JSON file with the positions to replay
    track: PathBuf,

    /// Body of the live-update directive
    #[arg(short, long, default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Plugin config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds between two steps of the track
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Simulate a platform without geolocation
    #[arg(long)]
    no_geolocation: bool,

    /// Name the story engine reports
    #[arg(long, default_value = "SugarCube")]
    host_title: String,

    /// Version the story engine reports
    #[arg(long, default_value = "2.37.3")]
    host_version: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    let config = cli
        .config
        .as_ref()
        .map(PluginConfig::load)
        .transpose()?
        .unwrap_or_default();
    let host = parse_host_version(&cli.host_title, &cli.host_version)?;
    let track = load_track(&cli.track)?;

    let mut service = ReplayLocation::new(track, Duration::from_millis(cli.interval_ms));
    if cli.no_geolocation {
        service = service.unavailable();
    }
    let finished = service.finished();

    let store = Arc::new(MemoryStore::default());
    let engine = Arc::new(VariableTemplates::new(store.clone()));
    let state_key = config.state_key.clone();

    let plugin = Plugin::load(Some(&host), config, service, store.clone(), engine)
        .context("Failed to load directives")?;

    let slot = OutputSlot::new();
    plugin.invoke("start-watch", None, &slot)?;
    let live = plugin.invoke("live-update", Some(cli.template.as_str()), &slot)?;

    println!("{}", slot.to_markup());

    if let Some(updates) = plugin.updates() {
        let slot = slot.clone();
        updates.subscribe(move || {
            println!("{}", slot.to_markup());
            Ok(())
        });
    }

    tokio::select! {
        res = plugin.main_loop() => {
            if let Err(why) = &res {
                error!("Rendering failed: {why:?}");
            }
            res?;
        }
        _ = finished.cancelled() => {
            plugin.process_pending()?;
            info!("Track played out");
        }
        Ok(_) = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
    }

    plugin.invoke("stop-watch", None, &slot)?;
    if let Some(live) = live {
        live.detach();
    }
    plugin.shutdown();

    let record: Option<LocationRecord> = read_typed(store.as_ref(), &state_key)?;
    match record {
        Some(record) => info!("Last known ${state_key}: {record:?}"),
        None => info!("${state_key} was never set"),
    }

    Ok(())
}
