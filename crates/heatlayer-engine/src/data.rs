//! Heatmap input points and their packed vertex form.

use crate::geo::{LngLat, Projection};

/// A weighted geographic sample.
///
/// `value` is a non-negative intensity; it is normalized by the configured
/// `max` in the splat shader.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Point {
    pub coordinates: LngLat,
    pub value: f32,
}

impl Point {
    #[inline]
    pub const fn new(coordinates: LngLat, value: f32) -> Self {
        Self { coordinates, value }
    }
}

/// Parallel vertex streams for the splat pass.
///
/// `positions` holds `2 * len()` world-plane floats, `intensities` holds `len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexData {
    pub positions: Vec<f32>,
    pub intensities: Vec<f32>,
}

impl VertexData {
    /// Projects every point, one vertex per point, in input order.
    pub fn build(projection: &dyn Projection, points: &[Point]) -> Self {
        let mut positions = Vec::with_capacity(points.len() * 2);
        let mut intensities = Vec::with_capacity(points.len());

        for point in points {
            let world = projection.to_world_coordinates(point.coordinates);
            positions.extend_from_slice(&world.to_f32());
            intensities.push(point.value);
        }

        Self { positions, intensities }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{SphericalMercator, WorldCoordinates};

    /// Maps `(lng, lat)` straight onto `(x, y)`.
    struct Identity;

    impl Projection for Identity {
        fn to_world_coordinates(&self, c: LngLat) -> WorldCoordinates {
            WorldCoordinates::new(c.lng, c.lat)
        }

        fn from_world_coordinates(&self, w: WorldCoordinates) -> LngLat {
            LngLat::new(w.x, w.y)
        }
    }

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(LngLat::new(i as f64, -(i as f64)), i as f32 * 0.5))
            .collect()
    }

    #[test]
    fn lengths_are_two_n_and_n() {
        for n in [0, 1, 2, 7, 1500] {
            let data = VertexData::build(&Identity, &points(n));
            assert_eq!(data.positions.len(), 2 * n);
            assert_eq!(data.intensities.len(), n);
            assert_eq!(data.len(), n);
        }
    }

    #[test]
    fn order_is_preserved() {
        let data = VertexData::build(&Identity, &points(4));
        assert_eq!(data.positions, vec![0.0, 0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert_eq!(data.intensities, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn duplicates_and_zero_values_are_kept() {
        let p = Point::new(LngLat::new(10.0, 10.0), 0.0);
        let data = VertexData::build(&Identity, &[p, p, p]);
        assert_eq!(data.len(), 3);
        assert!(data.intensities.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn projection_is_applied() {
        let p = Point::new(LngLat::new(90.0, 0.0), 1.0);
        let data = VertexData::build(&SphericalMercator, &[p]);
        assert!((data.positions[0] - 0.5).abs() < 1e-6);
        assert!(data.positions[1].abs() < 1e-6);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(VertexData::build(&Identity, &[]).is_empty());
    }
}
