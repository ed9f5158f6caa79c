// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{BTreeMap, HashMap};
use std::fs::File;

use tracing::{event, Level};

use crate::descriptor::{parser, ManifestSegment, TorrentSegment};
use crate::errors::EngineError;
use crate::name::{ContentKind, Name};
use crate::storage::{self, DataLayout};

/// Per-manifest state: the held manifest segments, the exclusively-owned
/// handle of the backing file, and the completion bitmap.
///
/// `packets` and `bitmap` cover the contiguous prefix of held segments;
/// both only ever grow, and growing preserves already-set bits. The true
/// packet count becomes known when the final segment (one with no
/// successor) joins the prefix.
#[derive(Debug)]
struct FileState {
    segments: BTreeMap<u64, ManifestSegment>,
    packet_size: u64,
    file_size: u64,
    packets: Vec<Name>,
    bitmap: Vec<bool>,
    handle: File,
    descriptor_complete: bool,
}

impl FileState {
    fn first_missing_segment(&self, base: &Name) -> Option<Name> {
        let mut k = 0u64;
        loop {
            match self.segments.get(&k) {
                None => return Some(base.segment(k)),
                Some(s) if !s.has_more() => return None,
                Some(_) => k += 1,
            }
        }
    }
}

/// Single source of truth for "what do we have / still need", at torrent,
/// manifest, and packet granularity, backed by the on-disk data layout.
/// Every ingestion persists to disk before mutating in-memory state, so a
/// set packet bit always means durably-written bytes.
pub struct CompletionTracker {
    torrent_base: Name,
    layout: DataLayout,
    torrent_segments: BTreeMap<u64, TorrentSegment>,
    /// Manifest base names in the order the descriptor references them.
    manifest_order: Vec<Name>,
    files: HashMap<Name, FileState>,
    /// Packet name -> (manifest base, global packet index).
    packet_index: HashMap<Name, (Name, u64)>,
}

#[allow(dead_code)]
impl CompletionTracker {
    pub fn new(torrent_base: Name, layout: DataLayout) -> Self {
        Self {
            torrent_base,
            layout,
            torrent_segments: BTreeMap::new(),
            manifest_order: Vec::new(),
            files: HashMap::new(),
            packet_index: HashMap::new(),
        }
    }

    /// Rebuilds all state from the data directory: parses every persisted
    /// torrent and manifest segment and reconstructs completion bitmaps
    /// from the backing files' lengths. Malformed persisted descriptors
    /// propagate as initialization failures; short or absent data files
    /// just mean missing packets.
    pub fn initialize_from_disk(&mut self) -> Result<(), EngineError> {
        self.layout.ensure_dirs()?;

        for (index, bytes) in storage::scan_segments(&self.layout.torrent_dir())? {
            let segment = parser::torrent_segment_from_bytes(&bytes)?;
            if segment.segment != index {
                event!(
                    Level::WARN,
                    file_index = index,
                    embedded = segment.segment,
                    "torrent segment file index disagrees with its contents"
                );
            }
            self.insert_torrent_segment(segment);
        }

        for base in self.manifest_order.clone() {
            for (_, bytes) in storage::scan_segments(&self.layout.manifest_dir(&base))? {
                let segment = parser::manifest_segment_from_bytes(&bytes)?;
                self.insert_manifest_segment(&base, segment)?;
            }
        }

        event!(
            Level::INFO,
            torrent_segments = self.torrent_segments.len(),
            manifests = self.files.len(),
            missing_packets = self.missing_data_packets_all().len(),
            "reconstructed completion state from disk"
        );
        Ok(())
    }

    // --- Ingestion -------------------------------------------------------

    /// Ingests a received torrent-descriptor segment: persists it and
    /// returns the manifest base names it references.
    pub fn record_torrent_segment(
        &mut self,
        name: &Name,
        bytes: &[u8],
    ) -> Result<Vec<Name>, EngineError> {
        let segment = parser::torrent_segment_from_bytes(bytes)?;
        if name.parent() != self.torrent_base
            || name.final_segment_number() != Some(segment.segment)
        {
            return Err(EngineError::UnknownSegment(name.clone()));
        }
        storage::write_segment(&self.layout.torrent_dir(), segment.segment, bytes)?;
        Ok(self.insert_torrent_segment(segment))
    }

    /// Ingests a received file-manifest segment: persists it and returns
    /// the packet names it newly made known.
    pub fn record_manifest_segment(
        &mut self,
        name: &Name,
        bytes: &[u8],
    ) -> Result<Vec<Name>, EngineError> {
        let segment = parser::manifest_segment_from_bytes(bytes)?;
        let base = name.parent();
        if base.is_empty() || name.final_segment_number() != Some(segment.segment) {
            return Err(EngineError::UnknownSegment(name.clone()));
        }
        storage::write_segment(&self.layout.manifest_dir(&base), segment.segment, bytes)?;
        Ok(self.insert_manifest_segment(&base, segment)?)
    }

    /// Commits a received data packet to its offset in the backing file
    /// and sets its bitmap bit. Idempotent: a set bit is never cleared,
    /// and a packet already held is not rewritten.
    pub fn record_data_packet(&mut self, name: &Name, bytes: &[u8]) -> Result<(), EngineError> {
        let Some((base, index)) = self.packet_index.get(name).cloned() else {
            return Err(EngineError::UnknownSegment(name.clone()));
        };
        let Some(state) = self.files.get_mut(&base) else {
            return Err(EngineError::UnknownSegment(name.clone()));
        };
        if state.bitmap[index as usize] {
            return Ok(());
        }
        storage::write_packet(&mut state.handle, index, state.packet_size, bytes)?;
        state.bitmap[index as usize] = true;
        event!(Level::DEBUG, packet = %name, index, "data packet committed");
        Ok(())
    }

    /// Classifies `name` against held descriptors and ingests accordingly.
    /// The engine's response path prefers the kind carried with the
    /// pending request; this is the structural fallback and the defensive
    /// surface for content that arrives outside a tracked request.
    pub fn mark_received(&mut self, name: &Name, bytes: &[u8]) -> Result<(), EngineError> {
        match self.classify(name) {
            Some(ContentKind::TorrentSegment) => {
                self.record_torrent_segment(name, bytes).map(|_| ())
            }
            Some(ContentKind::ManifestSegment) => {
                self.record_manifest_segment(name, bytes).map(|_| ())
            }
            Some(ContentKind::DataPacket) => self.record_data_packet(name, bytes),
            None => Err(EngineError::UnknownSegment(name.clone())),
        }
    }

    fn insert_torrent_segment(&mut self, segment: TorrentSegment) -> Vec<Name> {
        let manifests = segment.manifest_names();
        for manifest in &manifests {
            if !self.manifest_order.contains(manifest) {
                self.manifest_order.push(manifest.clone());
            }
        }
        self.torrent_segments.insert(segment.segment, segment);
        manifests
    }

    fn insert_manifest_segment(
        &mut self,
        base: &Name,
        segment: ManifestSegment,
    ) -> std::io::Result<Vec<Name>> {
        if !self.manifest_order.contains(base) {
            self.manifest_order.push(base.clone());
        }
        let state = match self.files.entry(base.clone()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let handle = storage::open_data_file(&self.layout.file_path(base))?;
                entry.insert(FileState {
                    segments: BTreeMap::new(),
                    packet_size: segment.packet_size,
                    file_size: segment.file_size,
                    packets: Vec::new(),
                    bitmap: Vec::new(),
                    handle,
                    descriptor_complete: false,
                })
            }
        };
        if state.packet_size != segment.packet_size || state.file_size != segment.file_size {
            event!(
                Level::WARN,
                manifest = %base,
                "manifest segment disagrees on packet or file size; keeping first-seen geometry"
            );
        }
        state.segments.insert(segment.segment, segment);

        // Recompute the contiguous prefix of known packets, growing the
        // bitmap. Bits for newly known packets are reconstructed from the
        // backing file's current length (resumed downloads), never cleared.
        let file_len = state.handle.metadata()?.len();
        let mut known = Vec::new();
        let mut complete = false;
        let mut k = 0u64;
        while let Some(s) = state.segments.get(&k) {
            known.extend(s.packet_names());
            if !s.has_more() {
                complete = true;
                break;
            }
            k += 1;
        }
        state.descriptor_complete = complete;

        let mut fresh = Vec::new();
        for index in state.packets.len()..known.len() {
            let packet = known[index].clone();
            state.bitmap.push(storage::packet_covered(
                file_len,
                index as u64,
                state.packet_size,
                state.file_size,
            ));
            state.packets.push(packet.clone());
            self.packet_index
                .insert(packet.clone(), (base.clone(), index as u64));
            fresh.push(packet);
        }
        Ok(fresh)
    }

    // --- Classification --------------------------------------------------

    /// Structural classification of `name` against known base names.
    pub fn classify(&self, name: &Name) -> Option<ContentKind> {
        if self.packet_index.contains_key(name) {
            return Some(ContentKind::DataPacket);
        }
        if name.final_segment_number().is_some() {
            let parent = name.parent();
            if parent == self.torrent_base {
                return Some(ContentKind::TorrentSegment);
            }
            if self.files.contains_key(&parent) || self.manifest_order.contains(&parent) {
                return Some(ContentKind::ManifestSegment);
            }
        }
        None
    }

    /// The manifest record's base name for `name`, which may be the base
    /// itself or any segment name of the manifest. Unknown names are
    /// taken as bases verbatim.
    pub fn manifest_base_of(&self, name: &Name) -> Name {
        if self.files.contains_key(name) || self.manifest_order.contains(name) {
            return name.clone();
        }
        if name.final_segment_number().is_some() {
            let parent = name.parent();
            if self.files.contains_key(&parent) || self.manifest_order.contains(&parent) {
                return parent;
            }
        }
        name.clone()
    }

    // --- Missing views ---------------------------------------------------

    /// The next torrent-descriptor segment to fetch: the first gap in
    /// segment index order, or `None` once the final segment is held.
    pub fn missing_torrent_segment(&self) -> Option<Name> {
        let mut k = 0u64;
        loop {
            match self.torrent_segments.get(&k) {
                None => return Some(self.torrent_base.segment(k)),
                Some(s) if !s.has_more() => return None,
                Some(_) => k += 1,
            }
        }
    }

    pub fn has_all_torrent_segments(&self) -> bool {
        self.missing_torrent_segment().is_none()
    }

    /// The next segment to fetch for one manifest, addressed by its base
    /// or by any of its segment names.
    pub fn missing_manifest_segment(&self, name: &Name) -> Option<Name> {
        let base = self.manifest_base_of(name);
        match self.files.get(&base) {
            None => Some(base.segment(0)),
            Some(state) => state.first_missing_segment(&base),
        }
    }

    /// First missing segment name of every incomplete manifest referenced
    /// by held torrent segments, in descriptor order.
    pub fn missing_manifests(&self) -> Vec<Name> {
        self.manifest_order
            .iter()
            .filter_map(|base| self.missing_manifest_segment(base))
            .collect()
    }

    /// Every known-but-unheld packet name of one manifest, in packet
    /// order, regardless of which segment name addressed the manifest.
    pub fn missing_data_packets(&self, name: &Name) -> Vec<Name> {
        let base = self.manifest_base_of(name);
        let Some(state) = self.files.get(&base) else {
            return Vec::new();
        };
        state
            .packets
            .iter()
            .zip(&state.bitmap)
            .filter(|(_, held)| !**held)
            .map(|(packet, _)| packet.clone())
            .collect()
    }

    /// Union over all known manifests, manifest order then packet order.
    pub fn missing_data_packets_all(&self) -> Vec<Name> {
        self.manifest_order
            .iter()
            .flat_map(|base| self.missing_data_packets(base))
            .collect()
    }

    pub fn has_data_packet(&self, name: &Name) -> bool {
        self.packet_index
            .get(name)
            .and_then(|(base, index)| {
                self.files
                    .get(base)
                    .map(|state| state.bitmap[*index as usize])
            })
            .unwrap_or(false)
    }

    pub fn manifest_descriptor_complete(&self, name: &Name) -> bool {
        let base = self.manifest_base_of(name);
        self.files
            .get(&base)
            .map(|state| state.descriptor_complete)
            .unwrap_or(false)
    }

    pub fn manifest_bases(&self) -> &[Name] {
        &self.manifest_order
    }

    // --- Serving ----------------------------------------------------------

    /// Re-encodes or reads back held content for the seed responder;
    /// `None` for anything not held. Read failures are logged and served
    /// as not-held rather than propagated: an unanswerable request is the
    /// requester's timeout, not our fault.
    pub fn content_for(&mut self, name: &Name) -> Option<Vec<u8>> {
        match self.classify(name)? {
            ContentKind::TorrentSegment => {
                let segment = self.torrent_segments.get(&name.final_segment_number()?)?;
                segment.encode().ok()
            }
            ContentKind::ManifestSegment => {
                let base = self.manifest_base_of(name);
                let state = self.files.get(&base)?;
                let segment = state.segments.get(&name.final_segment_number()?)?;
                segment.encode().ok()
            }
            ContentKind::DataPacket => {
                let (base, index) = self.packet_index.get(name)?.clone();
                let state = self.files.get_mut(&base)?;
                if !state.bitmap.get(index as usize).copied().unwrap_or(false) {
                    return None;
                }
                let len = storage::packet_len(index, state.packet_size, state.file_size);
                match storage::read_packet(&mut state.handle, index, state.packet_size, len) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        event!(Level::WARN, packet = %name, error = %e, "failed to read back a committed packet");
                        None
                    }
                }
            }
        }
    }
}
