// Orthogonal (Manhattan) edge routing
//
// One bend at the horizontal midpoint: A -> (midX, A.y) -> (midX, B.y) -> B.
// Aligned endpoints degenerate to a straight or single-bend line.

use crate::graph::{Point, PositionLookup};

/// Vertices of the routed path, endpoints included
pub fn orthogonal_points(a: Point, b: Point) -> [Point; 4] {
    let mid_x = (a.x + b.x) / 2.0;
    [a, Point::new(mid_x, a.y), Point::new(mid_x, b.y), b]
}

/// SVG path data routing from `a` to `b`
pub fn orthogonal_path_between(a: Point, b: Point) -> String {
    let [start, bend, _, end] = orthogonal_points(a, b);
    format!(
        "M {} {} H {} V {} H {}",
        start.x, start.y, bend.x, end.y, end.x
    )
}

/// Route between two node ids. An unresolvable endpoint yields an empty path.
pub fn orthogonal_path<L>(lookup: &L, a: &str, b: &str) -> String
where
    L: PositionLookup + ?Sized,
{
    match (lookup.position(a), lookup.position(b)) {
        (Some(pa), Some(pb)) => orthogonal_path_between(pa, pb),
        _ => String::new(),
    }
}
