// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use figment::providers::{Env, Format};
use figment::{providers::Toml, Figment};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Keep answering inbound requests for held content after completion.
    pub seed: bool,

    // Retry / failover
    /// Retries per forwarding route per name before failing over.
    pub max_retries: u32,
    /// Dispatches between route re-ranking passes.
    pub sorting_interval: u64,
    /// Maximum simultaneously in-flight requests.
    pub window_size: usize,

    /// Bootstrap forwarding routes, tried in ranked order.
    pub routes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: true,
            max_retries: 5,
            sorting_interval: 100,
            window_size: 50,
            routes: vec!["/ucla".to_string(), "/arizona".to_string()],
        }
    }
}

/// Single source of truth for app directories.
pub fn get_app_paths() -> Option<(PathBuf, PathBuf)> {
    if let Some(proj_dirs) = ProjectDirs::from("com", "github", "nametorrent") {
        let config_dir = proj_dirs.config_dir().to_path_buf();
        let data_dir = proj_dirs.data_local_dir().to_path_buf();

        fs::create_dir_all(&config_dir).ok()?;
        fs::create_dir_all(&data_dir).ok()?;

        Some((config_dir, data_dir))
    } else {
        None
    }
}

pub fn load_settings() -> Settings {
    if let Some((config_dir, _)) = get_app_paths() {
        let config_file_path = config_dir.join("settings.toml");

        return Figment::new()
            .merge(Toml::file(config_file_path))
            .merge(Env::prefixed("NAMETORRENT_"))
            .extract()
            .unwrap_or_default();
    }

    Settings::default()
}

/// Saves the provided settings to the config file.
#[allow(dead_code)]
pub fn save_settings(settings: &Settings) -> io::Result<()> {
    if let Some((config_dir, _)) = get_app_paths() {
        let config_file_path = config_dir.join("settings.toml");
        let temp_file_path = config_dir.join("settings.toml.tmp");
        let content = toml::to_string_pretty(settings).map_err(io::Error::other)?;
        fs::write(&temp_file_path, content)?;
        fs::rename(&temp_file_path, &config_file_path)?;
    }
    Ok(())
}
