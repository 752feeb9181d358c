//! Angle/intensity samples of one pixel (or one region).

use serde::{Deserialize, Serialize};

/// One measured intensity at one angle of incidence.
///
/// Degrees and radians are set together at construction and stay consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    angle_degrees: f64,
    angle_radians: f64,
    intensity: f64,
}

impl Observation {
    pub fn new(angle_degrees: f64, intensity: f64) -> Self {
        Self {
            angle_degrees,
            angle_radians: angle_degrees.to_radians(),
            intensity,
        }
    }

    pub fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    pub fn angle_radians(&self) -> f64 {
        self.angle_radians
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }
}

/// Observation in the weighted form consumed by the fitters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPoint {
    pub weight: f64,
    /// Angle in radians
    pub x: f64,
    /// Intensity
    pub y: f64,
}

/// Ordered observations; the order is the one used for fitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.observations
    }

    /// Mean intensity, or NaN for an empty set.
    pub fn average_intensity(&self) -> f64 {
        let sum: f64 = self.observations.iter().map(Observation::intensity).sum();
        sum / self.observations.len() as f64
    }

    /// Every observation with weight 1.
    pub fn weighted_points(&self) -> Vec<WeightedPoint> {
        self.observations
            .iter()
            .map(|o| WeightedPoint {
                weight: 1.0,
                x: o.angle_radians,
                y: o.intensity,
            })
            .collect()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.observations.iter().map(Observation::intensity).collect()
    }
}

impl FromIterator<Observation> for ObservationSet {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ObservationSet {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_angles_are_consistent() {
        let o = Observation::new(30.0, 1200.0);
        assert_relative_eq!(o.angle_radians(), std::f64::consts::PI / 6.0);
        assert_eq!(o.angle_degrees(), 30.0);
        assert_eq!(o.intensity(), 1200.0);
    }

    #[test]
    fn test_average_and_weighted_points() {
        let set: ObservationSet = [(-10.0, 100.0), (0.0, 200.0), (10.0, 600.0)]
            .into_iter()
            .map(|(angle, intensity)| Observation::new(angle, intensity))
            .collect();

        assert_eq!(set.len(), 3);
        assert_relative_eq!(set.average_intensity(), 300.0);

        let points = set.weighted_points();
        assert!(points.iter().all(|p| p.weight == 1.0));
        assert_relative_eq!(points[2].x, 10f64.to_radians());
        assert_eq!(points[1].y, 200.0);

        assert!(ObservationSet::default().average_intensity().is_nan());
    }
}
