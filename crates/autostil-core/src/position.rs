//! Position providers.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::error::PositionError;
use crate::geo::Position;

/// Source of position fixes.
pub trait PositionSource: Send + Sync {
    /// A single current fix.
    fn current_position(&self) -> Result<Position, PositionError>;

    /// Continuous fixes; stop consuming (drop the iterator) to cancel.
    fn stream_positions(&self) -> Box<dyn Iterator<Item = Position> + Send>;
}

/// Always reports the same coordinate, timestamped at the time of the fix.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    lat: f64,
    lon: f64,
    interval: Duration,
}

impl FixedPosition {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            interval: Duration::from_millis(3000),
        }
    }

    /// Pause between streamed fixes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl PositionSource for FixedPosition {
    fn current_position(&self) -> Result<Position, PositionError> {
        Ok(Position::new(self.lat, self.lon))
    }

    fn stream_positions(&self) -> Box<dyn Iterator<Item = Position> + Send> {
        let Self { lat, lon, interval } = *self;
        let mut first = true;
        Box::new(std::iter::from_fn(move || {
            if !first {
                std::thread::sleep(interval);
            }
            first = false;
            Some(Position::new(lat, lon))
        }))
    }
}

/// Replays a fixed list of coordinates.
///
/// `current_position` pops the next entry; `stream_positions` drains the
/// rest. Each fix is stamped when it is handed out.
#[derive(Debug, Default)]
pub struct ScriptedPositions {
    queue: Mutex<VecDeque<(f64, f64)>>,
    interval: Duration,
}

impl ScriptedPositions {
    pub fn new(coords: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Self {
            queue: Mutex::new(coords.into_iter().collect()),
            interval: Duration::ZERO,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn push(&self, lat: f64, lon: f64) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((lat, lon));
    }

    pub fn remaining(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PositionSource for ScriptedPositions {
    fn current_position(&self) -> Result<Position, PositionError> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .map(|(lat, lon)| Position::at(lat, lon, Utc::now()))
            .ok_or(PositionError::Unavailable)
    }

    fn stream_positions(&self) -> Box<dyn Iterator<Item = Position> + Send> {
        let coords: Vec<(f64, f64)> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let interval = self.interval;
        Box::new(coords.into_iter().enumerate().map(move |(i, (lat, lon))| {
            if i > 0 && !interval.is_zero() {
                std::thread::sleep(interval);
            }
            Position::new(lat, lon)
        }))
    }
}

/// A provider that never has a fix.
#[derive(Debug, Clone)]
pub struct UnavailablePosition {
    error: PositionError,
}

impl UnavailablePosition {
    pub fn new(error: PositionError) -> Self {
        Self { error }
    }
}

impl Default for UnavailablePosition {
    fn default() -> Self {
        Self::new(PositionError::Unavailable)
    }
}

impl PositionSource for UnavailablePosition {
    fn current_position(&self) -> Result<Position, PositionError> {
        Err(self.error.clone())
    }

    fn stream_positions(&self) -> Box<dyn Iterator<Item = Position> + Send> {
        Box::new(std::iter::empty())
    }
}
