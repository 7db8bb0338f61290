//! Approach bearings and the cardinal directions derived from them.

use phasebridge_types::Direction;

use crate::topology::Point;

/// Width of one compass sector in degrees.
const SECTOR_WIDTH: f64 = 45.0;

/// Primary and secondary direction of each 45 degree sector, clockwise from
/// north.
const SECTORS: [(Direction, Direction); 8] = [
    (Direction::North, Direction::East),
    (Direction::East, Direction::North),
    (Direction::East, Direction::South),
    (Direction::South, Direction::East),
    (Direction::South, Direction::West),
    (Direction::West, Direction::South),
    (Direction::West, Direction::North),
    (Direction::North, Direction::West),
];

/// Compass bearing in degrees (`[0, 360)`, 0 = north, clockwise) of `point`
/// seen from `center`. `None` when the two coincide or a coordinate is not
/// finite.
pub fn bearing(center: Point, point: Point) -> Option<f64> {
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
        return None;
    }
    let degrees = dx.atan2(dy).to_degrees();
    let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
    // A tiny negative angle can round up to a full turn.
    Some(if degrees >= 360.0 { 0.0 } else { degrees })
}

/// Primary direction of a bearing plus the neighbouring direction it leans
/// towards. The secondary direction is `None` on exact multiples of 45
/// degrees.
pub fn directions(bearing: f64) -> (Direction, Option<Direction>) {
    let exact = bearing % SECTOR_WIDTH == 0.0;
    let (primary, secondary) = (1_u8..)
        .zip(SECTORS)
        .find(|(upper, _)| bearing < SECTOR_WIDTH * f64::from(*upper))
        .map_or((Direction::North, Direction::West), |(_, sector)| sector);
    (primary, (!exact).then_some(secondary))
}
