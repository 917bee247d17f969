//! Integer grid position
//!
//! Tanks live on a 2D integer grid. On the wire a position is always the
//! two-element array `[x, y]`, so the serde representation goes through a
//! tuple rather than a `{"x": .., "y": ..}` object.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Spawn point for fresh and reset tanks
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (i32, i32) {
    fn from(position: Position) -> Self {
        (position.x, position.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        assert_eq!(Position::ORIGIN, Position::new(0, 0));
        assert_eq!(Position::default(), Position::ORIGIN);
    }

    #[test]
    fn test_serializes_as_array() {
        let position = Position::new(5, 7);
        let json = serde_json::to_string(&position).unwrap();
        assert_eq!(json, "[5,7]");
    }

    #[test]
    fn test_deserializes_from_array() {
        let position: Position = serde_json::from_str("[-3, 12]").unwrap();
        assert_eq!(position, Position::new(-3, 12));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        assert!(serde_json::from_str::<Position>("[1]").is_err());
        assert!(serde_json::from_str::<Position>("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Position::new(5, 7).to_string(), "[5, 7]");
    }
}
