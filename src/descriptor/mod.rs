// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod parser;

use serde::{Deserialize, Serialize};

use crate::name::Name;
use parser::ParseError;

/// One segment of the torrent descriptor: the manifest base names covered
/// by this sub-range of the descriptor, in descriptor order. Segment `k`
/// of a descriptor with base name `B` is named `B/k`; `more` is non-zero
/// when a successor segment exists, so the absence of a segment is
/// detectable by name rather than by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSegment {
    pub segment: u64,
    pub more: i64,
    pub manifests: Vec<String>,
}

#[allow(dead_code)]
impl TorrentSegment {
    pub fn new(segment: u64, has_more: bool, manifests: &[Name]) -> Self {
        Self {
            segment,
            more: i64::from(has_more),
            manifests: manifests.iter().map(Name::to_string).collect(),
        }
    }

    pub fn has_more(&self) -> bool {
        self.more != 0
    }

    pub fn manifest_names(&self) -> Vec<Name> {
        self.manifests.iter().map(|m| Name::from_uri(m)).collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        Ok(serde_bencode::to_bytes(self)?)
    }
}

/// One segment of a file manifest: the data-packet names of one sub-range
/// of the file, in packet order. Every packet holds `packet_size` bytes
/// except the file's final packet, which may be short; `file_size` lets
/// the tracker compute exact packet byte ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSegment {
    pub segment: u64,
    pub more: i64,
    pub packet_size: u64,
    pub file_size: u64,
    pub packets: Vec<String>,
}

#[allow(dead_code)]
impl ManifestSegment {
    pub fn new(
        segment: u64,
        has_more: bool,
        packet_size: u64,
        file_size: u64,
        packets: &[Name],
    ) -> Self {
        Self {
            segment,
            more: i64::from(has_more),
            packet_size,
            file_size,
            packets: packets.iter().map(Name::to_string).collect(),
        }
    }

    pub fn has_more(&self) -> bool {
        self.more != 0
    }

    pub fn packet_names(&self) -> Vec<Name> {
        self.packets.iter().map(|p| Name::from_uri(p)).collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        Ok(serde_bencode::to_bytes(self)?)
    }
}
