//! Flow-direction encodings
//!
//! Drainage maps arrive as integer rasters in one of three encodings. All of
//! them decode to a `(row, col)` unit offset toward the downstream cell, or
//! to "no downstream" for pits and outlets.
//!
//! Local drain direction (keypad layout, the default):
//! ```text
//!   7  8  9
//!   4  5  6
//!   1  2  3
//! ```
//! `5` = pit.
//!
//! D8 (counter-clockwise from east):
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! `0` = pit.
//!
//! ESRI (powers of two, clockwise from east):
//! ```text
//!   32  64  128
//!   16   0    1
//!    8   4    2
//! ```
//! `0` = pit.

use serde::{Deserialize, Serialize};

/// Decoded direction of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Pit or outlet: the cell has no downstream neighbour
    Pit,
    /// Drains to the neighbour at `(row + dr, col + dc)`
    Flow { dr: isize, dc: isize },
}

/// Integer encoding of a flow-direction raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionEncoding {
    /// Keypad local drain direction, 1-9 with 5 = pit
    #[default]
    Ldd,
    /// 0-8, counter-clockwise from east, 0 = pit
    D8,
    /// 1, 2, 4, ..., 128 clockwise from east, 0 = pit
    Esri,
}

/// (dr, dc) for keypad codes 1..=9, index 0 unused
const LDD_OFFSETS: [(isize, isize); 10] = [
    (0, 0),
    (1, -1),  // 1: SW
    (1, 0),   // 2: S
    (1, 1),   // 3: SE
    (0, -1),  // 4: W
    (0, 0),   // 5: pit
    (0, 1),   // 6: E
    (-1, -1), // 7: NW
    (-1, 0),  // 8: N
    (-1, 1),  // 9: NE
];

/// (dr, dc) for D8 codes 1..=8, index 0 = pit
const D8_OFFSETS: [(isize, isize); 9] = [
    (0, 0),
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// (dr, dc) for ESRI bit positions 0..8 (code = 1 << bit)
const ESRI_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (1, 1),   // 2: SE
    (1, 0),   // 4: S
    (1, -1),  // 8: SW
    (0, -1),  // 16: W
    (-1, -1), // 32: NW
    (-1, 0),  // 64: N
    (-1, 1),  // 128: NE
];

impl DirectionEncoding {
    /// Decode a raw cell value.
    ///
    /// Returns `None` for values outside the encoding, including
    /// non-integral and non-finite values.
    pub fn decode(self, code: f64) -> Option<Direction> {
        if !code.is_finite() || code.fract() != 0.0 || code < 0.0 {
            return None;
        }
        let code = code as u64;
        let offset = match self {
            DirectionEncoding::Ldd => match code {
                5 => return Some(Direction::Pit),
                1..=9 => LDD_OFFSETS[code as usize],
                _ => return None,
            },
            DirectionEncoding::D8 => match code {
                0 => return Some(Direction::Pit),
                1..=8 => D8_OFFSETS[code as usize],
                _ => return None,
            },
            DirectionEncoding::Esri => match code {
                0 => return Some(Direction::Pit),
                c if c <= 128 && c.is_power_of_two() => {
                    ESRI_OFFSETS[c.trailing_zeros() as usize]
                }
                _ => return None,
            },
        };
        Some(Direction::Flow {
            dr: offset.0,
            dc: offset.1,
        })
    }

    /// Code of a direction in this encoding; `None` if `(dr, dc)` is not a
    /// unit neighbour offset.
    pub fn encode(self, direction: Direction) -> Option<u8> {
        let (dr, dc) = match direction {
            Direction::Pit => return Some(self.pit_code()),
            Direction::Flow { dr, dc } => (dr, dc),
        };
        if (dr, dc) == (0, 0) {
            return None;
        }
        match self {
            DirectionEncoding::Ldd => (1..=9u8)
                .filter(|&c| c != 5)
                .find(|&c| LDD_OFFSETS[c as usize] == (dr, dc)),
            DirectionEncoding::D8 => (1..=8u8).find(|&c| D8_OFFSETS[c as usize] == (dr, dc)),
            DirectionEncoding::Esri => ESRI_OFFSETS
                .iter()
                .position(|&o| o == (dr, dc))
                .map(|bit| 1u8 << bit),
        }
    }

    /// Code used for pits and outlets
    pub fn pit_code(self) -> u8 {
        match self {
            DirectionEncoding::Ldd => 5,
            DirectionEncoding::D8 | DirectionEncoding::Esri => 0,
        }
    }
}

impl std::str::FromStr for DirectionEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ldd" | "keypad" => Ok(DirectionEncoding::Ldd),
            "d8" => Ok(DirectionEncoding::D8),
            "esri" => Ok(DirectionEncoding::Esri),
            _ => Err(format!("unknown direction encoding: {} (use ldd, d8 or esri)", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DirectionEncoding; 3] = [
        DirectionEncoding::Ldd,
        DirectionEncoding::D8,
        DirectionEncoding::Esri,
    ];

    #[test]
    fn test_ldd_keypad_layout() {
        let enc = DirectionEncoding::Ldd;
        assert_eq!(enc.decode(5.0), Some(Direction::Pit));
        assert_eq!(enc.decode(2.0), Some(Direction::Flow { dr: 1, dc: 0 }));
        assert_eq!(enc.decode(9.0), Some(Direction::Flow { dr: -1, dc: 1 }));
        assert_eq!(enc.decode(0.0), None);
        assert_eq!(enc.decode(10.0), None);
    }

    #[test]
    fn test_esri_powers_of_two() {
        let enc = DirectionEncoding::Esri;
        assert_eq!(enc.decode(1.0), Some(Direction::Flow { dr: 0, dc: 1 }));
        assert_eq!(enc.decode(128.0), Some(Direction::Flow { dr: -1, dc: 1 }));
        assert_eq!(enc.decode(0.0), Some(Direction::Pit));
        assert_eq!(enc.decode(3.0), None);
        assert_eq!(enc.decode(256.0), None);
    }

    #[test]
    fn test_rejects_non_integral_codes() {
        for enc in ALL {
            assert_eq!(enc.decode(2.5), None);
            assert_eq!(enc.decode(f64::NAN), None);
            assert_eq!(enc.decode(-1.0), None);
        }
    }

    #[test]
    fn test_south_agrees_across_encodings() {
        let south = Direction::Flow { dr: 1, dc: 0 };
        assert_eq!(DirectionEncoding::Ldd.encode(south), Some(2));
        assert_eq!(DirectionEncoding::D8.encode(south), Some(7));
        assert_eq!(DirectionEncoding::Esri.encode(south), Some(4));
        for enc in ALL {
            assert_eq!(enc.decode(enc.pit_code() as f64), Some(Direction::Pit));
            assert_eq!(enc.encode(Direction::Flow { dr: 0, dc: 0 }), None);
        }
    }

    #[test]
    fn test_parse_encoding() {
        assert_eq!("D8".parse::<DirectionEncoding>(), Ok(DirectionEncoding::D8));
        assert!("hex".parse::<DirectionEncoding>().is_err());
    }
}
