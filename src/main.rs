// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

mod config;
mod descriptor;
mod errors;
mod name;
mod storage;
mod swarm;
mod transport;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use fs2::FileExt;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

use crate::config::load_settings;
use crate::name::Name;
use crate::swarm::{SwarmEvent, SwarmManager};
use crate::transport::LoopbackHub;

const DEFAULT_LOG_FILTER: LevelFilter = LevelFilter::INFO;
const MAX_MIRROR_ROUNDS: usize = 100_000;

#[derive(Parser)]
#[command(name = "nametorrent", about = "Named-data file distribution client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the completion state of a torrent's data directory.
    Status {
        /// Base name of the torrent descriptor, e.g. /demo/torrent
        #[arg(long)]
        torrent: String,
        #[arg(long)]
        data_dir: PathBuf,
    },
    /// Copy a torrent from one data directory into another through an
    /// in-process hub: one seeding manager, one downloading manager.
    Mirror {
        #[arg(long)]
        torrent: String,
        #[arg(long)]
        from: PathBuf,
        #[arg(long)]
        to: PathBuf,
        /// Forwarding route name the seeding side is attached at.
        #[arg(long, default_value = "/local")]
        route: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = init_tracing();
    tracing::info!("starting nametorrent");

    let cli = Cli::parse();
    match cli.command {
        Commands::Status { torrent, data_dir } => run_status(&torrent, &data_dir),
        Commands::Mirror {
            torrent,
            from,
            to,
            route,
        } => run_mirror(&torrent, &from, &to, &route),
    }
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = config::get_app_paths().map(|(_, data_dir)| data_dir.join("logs"))?;
    fs::create_dir_all(&log_dir).ok()?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(7)
        .filename_prefix("nametorrent")
        .filename_suffix("log")
        .build(&log_dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(DEFAULT_LOG_FILTER);
    tracing_subscriber::registry().with(layer).try_init().ok()?;
    Some(guard)
}

/// One exclusive lock per data directory, so two instances cannot write
/// the same files. Held for the life of the process.
fn lock_data_dir(dir: &Path) -> Result<File, Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let lock_file = File::create(dir.join(".nametorrent.lock"))?;
    if lock_file.try_lock_exclusive().is_err() {
        return Err(format!(
            "data directory {} is in use by another nametorrent instance",
            dir.display()
        )
        .into());
    }
    Ok(lock_file)
}

fn run_status(torrent: &str, data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = lock_data_dir(data_dir)?;
    let settings = load_settings();
    let mut manager = SwarmManager::new(Name::from_uri(torrent), data_dir, settings, None);
    manager.initialize()?;

    println!("torrent:           {}", torrent);
    println!(
        "descriptor:        {}",
        if manager.has_all_torrent_segments() {
            "complete"
        } else {
            "incomplete"
        }
    );
    println!("known manifests:   {}", manager.tracker().manifest_bases().len());
    println!("missing manifests: {}", manager.missing_manifests().len());
    println!("missing packets:   {}", manager.missing_data_packets().len());
    println!(
        "state:             {}",
        if manager.is_complete() {
            "complete"
        } else {
            "incomplete"
        }
    );
    Ok(())
}

fn run_mirror(
    torrent: &str,
    from: &Path,
    to: &Path,
    route: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let _from_lock = lock_data_dir(from)?;
    let _to_lock = lock_data_dir(to)?;

    let torrent_name = Name::from_uri(torrent);
    let route_name = Name::from_uri(route);
    let hub = LoopbackHub::new();

    let mut seed_settings = load_settings();
    seed_settings.seed = true;
    let mut seeder = SwarmManager::new(
        torrent_name.clone(),
        from,
        seed_settings,
        Some(Box::new(hub.attached(&route_name))),
    );
    seeder.initialize()?;
    if !seeder.is_complete() {
        tracing::warn!("seed directory is incomplete; mirroring what it has");
    }

    let mut fetch_settings = load_settings();
    fetch_settings.seed = false;
    fetch_settings.routes = vec![route.to_string()];
    let mut fetcher = SwarmManager::new(
        torrent_name,
        to,
        fetch_settings,
        Some(Box::new(hub.endpoint())),
    );
    fetcher.initialize()?;
    fetcher.download_torrent_file();

    let mut packets = 0usize;
    for _ in 0..MAX_MIRROR_ROUNDS {
        for event in fetcher.process_events(Duration::ZERO) {
            match event {
                SwarmEvent::Failed { name, reason } => {
                    return Err(format!("download of {} failed: {}", name, reason).into());
                }
                SwarmEvent::PacketReceived { .. } => packets += 1,
                SwarmEvent::TorrentComplete { manifests } => {
                    println!("descriptor complete: {} file(s)", manifests.len());
                }
                SwarmEvent::ManifestComplete { name } => {
                    println!("manifest complete: {}", name);
                }
                _ => {}
            }
        }
        let _ = seeder.process_events(Duration::ZERO);
        if fetcher.is_complete() {
            fetcher.shutdown();
            seeder.shutdown();
            println!("mirror complete: {} packet(s) copied", packets);
            return Ok(());
        }
    }

    Err("mirror stalled before completing".into())
}
