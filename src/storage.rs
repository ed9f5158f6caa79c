// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::name::Name;

/// Maps descriptor and packet names onto one torrent's data directory:
///
/// ```text
/// <root>/torrent/<k>.seg            bencoded torrent-descriptor segments
/// <root>/manifests/<file>/<k>.seg   bencoded file-manifest segments
/// <root>/files/<file>               packet payloads at index * packet_size
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn torrent_dir(&self) -> PathBuf {
        self.root.join("torrent")
    }

    pub fn manifest_dir(&self, manifest: &Name) -> PathBuf {
        self.root.join("manifests").join(filename_for(manifest))
    }

    pub fn file_path(&self, manifest: &Name) -> PathBuf {
        self.root.join("files").join(filename_for(manifest))
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.torrent_dir())?;
        fs::create_dir_all(self.root.join("manifests"))?;
        fs::create_dir_all(self.root.join("files"))?;
        Ok(())
    }
}

/// A name's filename form: components joined by `_`, anything outside the
/// portable filename set replaced.
pub fn filename_for(name: &Name) -> String {
    if name.is_empty() {
        return "_".to_owned();
    }
    name.components()
        .join("_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Atomically persists one descriptor segment as `<dir>/<segment>.seg`.
pub fn write_segment(dir: &Path, segment: u64, bytes: &[u8]) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let tmp = dir.join(format!("{}.seg.tmp", segment));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, dir.join(format!("{}.seg", segment)))
}

/// All persisted segments under `dir`, ascending by segment number. A
/// missing directory is simply an empty scan.
pub fn scan_segments(dir: &Path) -> io::Result<Vec<(u64, Vec<u8>)>> {
    let mut segments = Vec::new();
    if !dir.exists() {
        return Ok(segments);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let Some(stem) = file_name.strip_suffix(".seg") else {
            continue;
        };
        let Ok(index) = stem.parse::<u64>() else {
            continue;
        };
        segments.push((index, fs::read(entry.path())?));
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

pub fn open_data_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// Writes one packet's payload at its offset and syncs, so a set bitmap
/// bit always reflects durably-committed bytes.
pub fn write_packet(file: &mut File, index: u64, packet_size: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(index * packet_size))?;
    file.write_all(bytes)?;
    file.sync_data()
}

pub fn read_packet(file: &mut File, index: u64, packet_size: u64, len: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(index * packet_size))?;
    let mut buffer = vec![0u8; len as usize];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// The exact byte length of packet `index` within a file of `file_size`
/// bytes split into `packet_size`-byte packets.
pub fn packet_len(index: u64, packet_size: u64, file_size: u64) -> u64 {
    file_size
        .saturating_sub(index * packet_size)
        .min(packet_size)
}

/// Whether the on-disk byte range of packet `index` is fully covered by a
/// file of length `file_len`. Used to rebuild completion bitmaps at
/// initialization; a truncated file covers fewer packets and the shortfall
/// reads as "missing", never as an error.
pub fn packet_covered(file_len: u64, index: u64, packet_size: u64, file_size: u64) -> bool {
    let start = index * packet_size;
    let end = (start + packet_size).min(file_size);
    end > start && file_len >= end
}
