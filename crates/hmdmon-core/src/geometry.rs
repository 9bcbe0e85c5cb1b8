//! Window geometry of the mirror process

use serde::{Deserialize, Serialize};

/// Position and size of a mirror window on the host desktop.
///
/// Equality is structural; the mirror supervisor persists a new value only
/// when it differs from the last stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPosition {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowPosition {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
