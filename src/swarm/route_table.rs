// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cmp::Ordering;

use tracing::{event, Level};

use crate::errors::EngineError;
use crate::name::Name;

/// Per-route outcome counters. The failure streak resets on any success;
/// the success rate is lifetime successes over lifetime attempts.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub name: Name,
    pub consecutive_failures: u64,
    pub successes: u64,
    pub attempts: u64,
}

impl RouteRecord {
    fn new(name: Name) -> Self {
        Self {
            name,
            consecutive_failures: 0,
            successes: 0,
            attempts: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// The known forwarding routes, ranked, with a cursor at "the route to try
/// now". Round-robin-with-failover: the cursor only advances when the
/// engine exhausts its retries on the current route, and the table is
/// re-ranked every sorting interval rather than on every outcome, so one
/// bad result cannot thrash the ordering.
#[derive(Debug, Default)]
pub struct RouteTable {
    records: Vec<RouteRecord>,
    cursor: usize,
}

#[allow(dead_code)]
impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route with zeroed counters; no-op if already known.
    pub fn insert(&mut self, name: Name) {
        if self.records.iter().any(|r| r.name == name) {
            return;
        }
        self.records.push(RouteRecord::new(name));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn names(&self) -> Vec<Name> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    /// The route at the ranking cursor.
    pub fn current(&self) -> Result<&Name, EngineError> {
        self.records
            .get(self.cursor)
            .map(|r| &r.name)
            .ok_or(EngineError::NoRoutesAvailable)
    }

    /// Moves the cursor to the next route in rank order, wrapping.
    pub fn advance(&mut self) {
        if !self.records.is_empty() {
            self.cursor = (self.cursor + 1) % self.records.len();
        }
    }

    pub fn record_outcome(&mut self, name: &Name, success: bool) {
        let Some(record) = self.records.iter_mut().find(|r| &r.name == name) else {
            return;
        };
        record.attempts += 1;
        if success {
            record.successes += 1;
            record.consecutive_failures = 0;
        } else {
            record.consecutive_failures += 1;
        }
    }

    /// Re-orders routes by descending quality: fewest recent failures
    /// first, then highest success rate. The sort is stable, so calling
    /// this twice without intervening outcomes yields the same order. The
    /// cursor follows the route it pointed at before the sort.
    pub fn resort(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let current = self.records[self.cursor].name.clone();
        self.records.sort_by(|a, b| {
            a.consecutive_failures
                .cmp(&b.consecutive_failures)
                .then_with(|| {
                    b.success_rate()
                        .partial_cmp(&a.success_rate())
                        .unwrap_or(Ordering::Equal)
                })
        });
        self.cursor = self
            .records
            .iter()
            .position(|r| r.name == current)
            .unwrap_or(0);
        event!(
            Level::DEBUG,
            routes = self.records.len(),
            best = %self.records[0].name,
            "re-ranked forwarding routes"
        );
    }
}
