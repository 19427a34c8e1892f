// Node dimension table used for layout and hit-testing

use serde::{Deserialize, Serialize};

/// Half extents of a node's bounding box
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HalfSize {
    pub half_w: f64,
    pub half_h: f64,
}

impl HalfSize {
    const fn new(half_w: f64, half_h: f64) -> Self {
        Self { half_w, half_h }
    }
}

pub const FALLBACK_HALF_SIZE: HalfSize = HalfSize::new(24.0, 24.0);

const TANK: HalfSize = HalfSize::new(44.0, 36.0);
const PUMP: HalfSize = HalfSize::new(28.0, 28.0);
const VALVE: HalfSize = HalfSize::new(18.0, 18.0);
const MANIFOLD: HalfSize = HalfSize::new(60.0, 14.0);

/// Half-size for a node type label. Case-insensitive; anything unknown gets
/// the generic square.
pub fn node_half_size(kind: Option<&str>) -> HalfSize {
    let Some(kind) = kind else {
        return FALLBACK_HALF_SIZE;
    };
    match kind.trim().to_ascii_lowercase().as_str() {
        "tank" => TANK,
        "pump" => PUMP,
        "valve" => VALVE,
        "manifold" => MANIFOLD,
        _ => FALLBACK_HALF_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        assert_eq!(node_half_size(Some("TANK")), TANK);
        assert_eq!(node_half_size(Some(" Pump ")), PUMP);
        assert_eq!(node_half_size(Some("valve")), VALVE);
        assert_eq!(node_half_size(Some("Manifold")), MANIFOLD);
    }

    #[test]
    fn fallback_is_square() {
        assert_eq!(FALLBACK_HALF_SIZE.half_w, FALLBACK_HALF_SIZE.half_h);
        assert_eq!(node_half_size(None), FALLBACK_HALF_SIZE);
        assert_eq!(node_half_size(Some("")), FALLBACK_HALF_SIZE);
    }
}
