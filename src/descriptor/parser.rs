// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::descriptor::{ManifestSegment, TorrentSegment};
use serde_bencode::de;

use std::fmt;

#[derive(Debug)]
pub enum ParseError {
    Bencode(serde_bencode::Error),
    ZeroPacketSize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Bencode(e) => write!(f, "bencode error: {}", e),
            ParseError::ZeroPacketSize => write!(f, "manifest segment declares a zero packet size"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<serde_bencode::Error> for ParseError {
    fn from(e: serde_bencode::Error) -> Self {
        ParseError::Bencode(e)
    }
}

pub fn torrent_segment_from_bytes(bytes: &[u8]) -> Result<TorrentSegment, ParseError> {
    Ok(de::from_bytes(bytes)?)
}

pub fn manifest_segment_from_bytes(bytes: &[u8]) -> Result<ManifestSegment, ParseError> {
    let segment: ManifestSegment = de::from_bytes(bytes)?;
    // A zero packet size would make every offset computation divide-by-zero
    // nonsense downstream; reject it here where the bytes first appear.
    if segment.packet_size == 0 {
        return Err(ParseError::ZeroPacketSize);
    }
    Ok(segment)
}
