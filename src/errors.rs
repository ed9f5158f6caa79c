// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use crate::descriptor::parser::ParseError;
use crate::name::Name;

/// Failure taxonomy of the download/seed engine.
///
/// `NoRoutesAvailable` is fatal to any new dispatch; `Malformed` and `Io`
/// are surfaced without retry (re-fetching identical bytes cannot fix a
/// structural defect, and a network retry cannot fix a disk fault);
/// `UnknownSegment` is defensive and never corrupts tracker state.
/// Timeouts are not errors: they feed the retry/failover machinery.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no forwarding routes available")]
    NoRoutesAvailable,

    #[error("malformed descriptor: {0}")]
    Malformed(#[from] ParseError),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} does not belong to any held descriptor")]
    UnknownSegment(Name),
}
