//! The 3x3 colored grid the arm works over, and its calibration table.
//!
//! ```text
//!          | Arm Base |
//!   red    |  green   |  blue
//!   yellow |  cyan    |  magenta
//!   black  |  white   |  orange
//! ```
//!
//! The table is calibration data for one physical arm. Recalibrating means
//! editing [`GridCell::pulses`], not configuration.

use crate::error::{MotionError, MotionResult};
use crate::joint::Pulse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Gripper pulse for `close` and `hold`.
pub const GRIPPER_CLOSED: Pulse = 1950;

/// Gripper pulse for `open`.
pub const GRIPPER_OPEN: Pulse = 1650;

/// One of the nine named grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridCell {
    Red,
    Green,
    Blue,
    Yellow,
    Cyan,
    Magenta,
    Black,
    White,
    Orange,
}

impl GridCell {
    pub const ALL: [GridCell; 9] = [
        GridCell::Red,
        GridCell::Green,
        GridCell::Blue,
        GridCell::Yellow,
        GridCell::Cyan,
        GridCell::Magenta,
        GridCell::Black,
        GridCell::White,
        GridCell::Orange,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GridCell::Red => "red",
            GridCell::Green => "green",
            GridCell::Blue => "blue",
            GridCell::Yellow => "yellow",
            GridCell::Cyan => "cyan",
            GridCell::Magenta => "magenta",
            GridCell::Black => "black",
            GridCell::White => "white",
            GridCell::Orange => "orange",
        }
    }

    /// Base, shoulder and elbow pulse widths over this cell.
    pub fn pulses(self, height: Height) -> [Pulse; 3] {
        use GridCell::*;
        use Height::*;
        match (self, height) {
            // front row
            (Red, Raised) => [1200, 1825, 1600],
            (Red, Lowered) => [1200, 1625, 1850],
            (Green, Raised) => [1450, 1825, 1600],
            (Green, Lowered) => [1450, 1625, 1850],
            (Blue, Raised) => [1700, 1825, 1600],
            (Blue, Lowered) => [1700, 1625, 1850],
            // middle row
            (Yellow, Raised) => [1200, 1900, 1750],
            (Yellow, Lowered) => [1200, 1750, 2000],
            (Cyan, Raised) => [1450, 1900, 1750],
            (Cyan, Lowered) => [1450, 1750, 2000],
            (Magenta, Raised) => [1700, 1900, 1750],
            (Magenta, Lowered) => [1700, 1750, 2000],
            // back row
            (Black, Raised) => [1300, 2000, 1900],
            (Black, Lowered) => [1300, 1850, 2125],
            (White, Raised) => [1450, 2000, 1900],
            (White, Lowered) => [1450, 1850, 2125],
            (Orange, Raised) => [1700, 2000, 1900],
            (Orange, Lowered) => [1650, 1850, 2125],
        }
    }
}

impl FromStr for GridCell {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        GridCell::ALL
            .into_iter()
            .find(|cell| cell.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MotionError::UnknownCell(s.to_string()))
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arm height over a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Height {
    Raised,
    Lowered,
}

impl FromStr for Height {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raised" => Ok(Height::Raised),
            "lowered" => Ok(Height::Lowered),
            _ => Err(MotionError::InvalidHeight(s.to_string())),
        }
    }
}

/// Requested gripper state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripperState {
    Open,
    Hold,
    Close,
}

impl GripperState {
    /// Parse leniently: `close`/`hold` are recognized, anything else opens the gripper.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "close" => GripperState::Close,
            "hold" => GripperState::Hold,
            "open" => GripperState::Open,
            other => {
                warn!(gripper = other, "unrecognized gripper state, opening");
                GripperState::Open
            }
        }
    }

    pub fn pulse(self) -> Pulse {
        match self {
            GripperState::Close | GripperState::Hold => GRIPPER_CLOSED,
            GripperState::Open => GRIPPER_OPEN,
        }
    }
}

/// Target pulse widths for the base/shoulder/elbow triple and the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTarget {
    pub positioning: [Pulse; 3],
    pub gripper: Pulse,
}

/// Turns symbolic grid actions into joint targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridActionMapper;

impl GridActionMapper {
    pub fn new() -> Self {
        Self
    }

    /// Resolve typed cell, height and gripper state.
    pub fn target(&self, cell: GridCell, height: Height, gripper: GripperState) -> MotionTarget {
        MotionTarget {
            positioning: cell.pulses(height),
            gripper: gripper.pulse(),
        }
    }

    /// Resolve an action as emitted by the decision-maker.
    ///
    /// Fails with [`MotionError::UnknownCell`] or [`MotionError::InvalidHeight`];
    /// the caller skips the action and carries on.
    pub fn resolve(&self, cell: &str, height: &str, gripper: &str) -> MotionResult<MotionTarget> {
        let cell: GridCell = cell.parse()?;
        let height: Height = height.parse()?;
        Ok(self.target(cell, height, GripperState::parse_lenient(gripper)))
    }
}
