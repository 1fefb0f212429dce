//! Forwards numeric-level log records from embedded components into `tracing`.
//!
//! Levels follow the broker trace scale: `0` is off, `1` the most severe and
//! `9` the most verbose. Records above the listener's configured level are
//! dropped before formatting.

use tracing::Level;

const LOG_LISTENER_TAG: &str = "LogListener:";

pub const LOG_LEVEL_OFF: i32 = 0;
pub const LOG_LEVEL_MAX: i32 = 9;

/// Maps a trace level onto a `tracing` level; `None` for levels that are
/// never emitted.
pub fn tracing_level(level: i32) -> Option<Level> {
    match level {
        i32::MIN..=LOG_LEVEL_OFF => None,
        1 | 2 => Some(Level::ERROR),
        3 | 4 => Some(Level::WARN),
        5 => Some(Level::INFO),
        6 | 7 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// A log sink handed to an external component.
///
/// Each listener carries the instance name it was created with, so records
/// from different components stay distinguishable without a process-wide
/// registry.
#[derive(Clone, Debug)]
pub struct LogListener {
    name: String,
    max_level: i32,
}

impl LogListener {
    pub fn new(name: &str, max_level: i32) -> Self {
        Self {
            name: name.to_string(),
            max_level: max_level.clamp(LOG_LEVEL_OFF, LOG_LEVEL_MAX),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_level(&self) -> i32 {
        self.max_level
    }

    pub fn set_max_level(&mut self, max_level: i32) {
        self.max_level = max_level.clamp(LOG_LEVEL_OFF, LOG_LEVEL_MAX);
    }

    /// The most verbose `tracing` level this listener lets through.
    pub fn max_tracing_level(&self) -> Option<Level> {
        tracing_level(self.max_level)
    }

    pub fn is_enabled(&self, level: i32) -> bool {
        level > LOG_LEVEL_OFF && level.min(LOG_LEVEL_MAX) <= self.max_level
    }

    /// Emits `message` at the `tracing` level matching `level`. Returns
    /// whether the record passed the listener's threshold.
    pub fn log(&self, level: i32, message: &str) -> bool {
        if !self.is_enabled(level) {
            return false;
        }
        match level {
            1 | 2 => tracing::error!("{}:{} {message}", self.name, LOG_LISTENER_TAG),
            3 | 4 => tracing::warn!("{}:{} {message}", self.name, LOG_LISTENER_TAG),
            5 => tracing::info!("{}:{} {message}", self.name, LOG_LISTENER_TAG),
            6 | 7 => tracing::debug!("{}:{} {message}", self.name, LOG_LISTENER_TAG),
            _ => tracing::trace!("{}:{} {message}", self.name, LOG_LISTENER_TAG),
        }
        true
    }
}
