// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// A hierarchical content or route name: an ordered sequence of components,
/// totally ordered lexicographically component-by-component.
///
/// Names address torrent-descriptor segments, file-manifest segments, data
/// packets, and forwarding routes alike. A `Name` is immutable once built;
/// all derivations (`child`, `segment`, `parent`) return new values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    /// Parses a `/`-separated URI form, e.g. `/demo/alpha.bin`.
    /// Empty components are dropped, so `"/a//b/"` equals `"/a/b"`.
    pub fn from_uri(uri: &str) -> Self {
        Self {
            components: uri
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn child(&self, component: &str) -> Name {
        let mut components = self.components.clone();
        components.push(component.to_owned());
        Name { components }
    }

    /// Appends the decimal sequence-number component addressing segment `seq`.
    pub fn segment(&self, seq: u64) -> Name {
        self.child(&seq.to_string())
    }

    /// The name with the final component removed; the empty name's parent is
    /// the empty name.
    pub fn parent(&self) -> Name {
        let mut components = self.components.clone();
        components.pop();
        Name { components }
    }

    /// Parses the final component as a segment/packet sequence number.
    pub fn final_segment_number(&self) -> Option<u64> {
        self.components.last()?.parse().ok()
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.len() >= self.components.len()
            && other.components[..self.components.len()] == self.components[..]
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// What a request is asking for, decided once when the request is built and
/// carried alongside the name through the pending-request set, so the
/// response path never has to re-infer it from name structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    TorrentSegment,
    ManifestSegment,
    DataPacket,
}
