// Copyright (c) 2023 Nick Piaddo
// SPDX-License-Identifier: Apache-2.0 OR MIT

// From dependency library

// From standard library
use std::fmt;

// From this library

/// Hit/miss tally of chunk reuse lookups.
#[derive(Debug, Clone)]
pub struct MatchStats {
    label: String,
    hits: u64,
    misses: u64,
}

impl MatchStats {
    /// Creates an empty tally.
    pub fn new<T>(label: T) -> MatchStats
    where
        T: AsRef<str>,
    {
        MatchStats {
            label: label.as_ref().to_owned(),
            hits: 0,
            misses: 0,
        }
    }

    /// Records a successful lookup.
    pub fn add_hit(&mut self) {
        self.hits += 1;
    }

    /// Records a failed lookup.
    pub fn add_miss(&mut self) {
        self.misses += 1;
    }

    /// Returns the number of successful lookups.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns the number of failed lookups.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns the total number of lookups.
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Returns the fraction of lookups that succeeded, or `0.0` before the
    /// first lookup.
    pub fn hit_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} hits, {} misses ({:.1}%)",
            self.label,
            self.hits,
            self.misses,
            self.hit_ratio() * 100.0
        )
    }
}
