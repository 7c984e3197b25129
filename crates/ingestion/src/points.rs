//! Grid points queried for an ingestion.

use forecast_common::BoundingBox;

/// Approximate degrees per metre at the equator.
const DEGREES_PER_METRE: f64 = 1e-5;

/// Decimal places kept on generated coordinates.
const COORD_DECIMALS: i32 = 3;

/// Minimum number of points per axis.
const MIN_POINTS: usize = 2;

/// Latitude and longitude axes of the grid to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoints {
    /// Ascending latitudes
    pub lats: Vec<f64>,
    /// Ascending longitudes
    pub lons: Vec<f64>,
}

impl GridPoints {
    /// Evenly spaced axes covering `bbox` at roughly `resolution_m` metres.
    ///
    /// Each axis gets `floor(span / step)` points (at least two) spread from
    /// min to max inclusive, rounded to three decimals and clamped back into
    /// the box so rounding never pushes an edge point outside it.
    pub fn from_bbox(bbox: &BoundingBox, resolution_m: u32) -> Self {
        let step = f64::from(resolution_m) * DEGREES_PER_METRE;
        Self {
            lats: axis(bbox.min_lat, bbox.max_lat, step),
            lons: axis(bbox.min_lon, bbox.max_lon, step),
        }
    }

    pub fn len(&self) -> usize {
        self.lats.len() * self.lons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(lat, lon)` pair, row by row from the south-west corner.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.lats
            .iter()
            .flat_map(move |&lat| self.lons.iter().map(move |&lon| (lat, lon)))
    }
}

fn axis(min: f64, max: f64, step: f64) -> Vec<f64> {
    // 1e-9 absorbs representation error, e.g. 1.0 / 0.01
    let count = (((max - min) / step) + 1e-9).floor().max(0.0) as usize;
    let count = count.max(MIN_POINTS);
    let scale = 10f64.powi(COORD_DECIMALS);

    let mut values: Vec<f64> = (0..count)
        .map(|i| {
            let v = min + (max - min) * i as f64 / (count - 1) as f64;
            ((v * scale).round() / scale).clamp(min, max)
        })
        .collect();
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coarse_grid() {
        let points = GridPoints::from_bbox(&BoundingBox::new(9.0, 45.0, 10.0, 46.0), 50_000);
        assert_eq!(points.lats, vec![45.0, 46.0]);
        assert_eq!(points.lons, vec![9.0, 10.0]);
        assert_eq!(points.len(), 4);
        assert_eq!(
            points.iter().collect::<Vec<_>>(),
            vec![(45.0, 9.0), (45.0, 10.0), (46.0, 9.0), (46.0, 10.0)]
        );
    }

    #[test]
    fn test_default_resolution_point_count() {
        let points = GridPoints::from_bbox(&BoundingBox::new(9.0, 45.0, 10.0, 46.0), 1000);
        assert_eq!(points.lats.len(), 100);
        assert_eq!(points.lats.first(), Some(&45.0));
        assert_eq!(points.lats.last(), Some(&46.0));
        assert!(points.lats.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_small_box_still_has_two_points() {
        let points = GridPoints::from_bbox(&BoundingBox::new(9.05, 45.78, 9.12, 45.84), 10_000);
        assert_eq!(points.lons, vec![9.05, 9.12]);
        assert_eq!(points.lats, vec![45.78, 45.84]);
    }

    #[test]
    fn test_rounded_to_three_decimals() {
        let points = GridPoints::from_bbox(&BoundingBox::new(9.0, 45.0, 9.1, 45.1), 2500);
        assert_eq!(points.lons, vec![9.0, 9.033, 9.067, 9.1]);
    }

    #[test]
    fn test_rounding_keeps_edges_inside_box() {
        let bbox = BoundingBox::new(9.0004, 45.0004, 9.9996, 45.9996);
        let points = GridPoints::from_bbox(&bbox, 50_000);
        assert_eq!(points.lats, vec![45.0004, 45.9996]);
        assert_eq!(points.lons, vec![9.0004, 9.9996]);

        let fine = GridPoints::from_bbox(&bbox, 1000);
        assert!(fine.lats.iter().all(|&v| (45.0004..=45.9996).contains(&v)));
        assert!(fine.lons.iter().all(|&v| (9.0004..=9.9996).contains(&v)));
        assert_eq!(fine.lats.first(), Some(&45.0004));
        assert_eq!(fine.lats.last(), Some(&45.9996));
    }
}
