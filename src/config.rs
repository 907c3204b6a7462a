//! Compile and render settings.

use chrono::{FixedOffset, Offset, Utc};

/// Engine settings. `Config::default()` keeps whitespace as written,
/// formats dates in UTC, and sets budgets large enough that only runaway
/// templates hit them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Drop a single newline directly after a `%}` tag close.
    pub trim_blocks: bool,
    /// Maximum nesting of `for`/`if`/`set` blocks while rendering, and of
    /// expressions while compiling.
    pub max_depth: usize,
    /// Maximum total `for` iterations in one render.
    pub max_iterations: usize,
    /// Zone the `date` filter formats in when no timezone argument is given.
    pub timezone: FixedOffset,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trim_blocks: false,
            max_depth: 64,
            max_iterations: 100_000,
            timezone: utc(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trim_blocks(mut self, trim_blocks: bool) -> Self {
        self.trim_blocks = trim_blocks;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = timezone;
        self
    }
}

pub(crate) fn utc() -> FixedOffset {
    Utc.fix()
}
