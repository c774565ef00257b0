use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CellResult, Undefined, VoccError};
use crate::grid::sphere_math::{bearing_to_tangent, normalize_bearing};
use crate::grid::ScalarField;
use crate::velocity::gradient::GradientResult;
use crate::velocity::trend::TrendResult;

/// Gradient-based climate velocity of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Trend / gradient magnitude, carrying the sign of the trend
    /// (km per year on lon/lat grids).
    pub magnitude: f64,
    /// Compass bearing in [0, 360).
    pub bearing: f64,
}

impl Velocity {
    pub fn speed(&self) -> f64 {
        self.magnitude.abs()
    }

    /// (east, north) components of the displacement per year.
    pub fn components(&self) -> (f64, f64) {
        let (e, n) = bearing_to_tangent(self.bearing);
        (e * self.speed(), n * self.speed())
    }
}

pub type VelocityResult = CellResult<Velocity>;

/// Combine one cell's trend and gradient into a velocity.
///
/// Undefined when the trend is invalid or the gradient magnitude is 0;
/// the upstream reason is carried through.
pub fn velocity_at(trend: &TrendResult, gradient: &GradientResult) -> VelocityResult {
    let fit = trend.fit?;
    let gradient = (*gradient)?;
    let bearing = match gradient.bearing {
        Some(b) if gradient.magnitude > 0.0 => b,
        _ => return Err(Undefined::UndefinedGradient),
    };

    let magnitude = fit.slope / gradient.magnitude;
    if !magnitude.is_finite() {
        return Err(Undefined::UndefinedVelocity);
    }

    let bearing = if fit.slope >= 0.0 {
        bearing
    } else {
        normalize_bearing(bearing + 180.0)
    };

    Ok(Velocity { magnitude, bearing })
}

/// Per-cell velocity for a whole grid. Both inputs must cover the same cells.
pub fn compute_velocity(
    trends: &[TrendResult],
    gradients: &[GradientResult],
) -> Result<Vec<VelocityResult>, VoccError> {
    VoccError::check_len("gradient field", trends.len(), gradients.len())?;
    Ok(trends
        .par_iter()
        .zip(gradients.par_iter())
        .map(|(t, g)| velocity_at(t, g))
        .collect())
}

/// Trend, gradient and velocity of one variable, computed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityField {
    pub variable: String,
    pub trends: Vec<TrendResult>,
    pub gradients: Vec<GradientResult>,
    pub velocities: Vec<VelocityResult>,
    /// Field the gradient was taken from (the series mean).
    pub mean: ScalarField,
}

impl VelocityField {
    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }

    pub fn magnitudes(&self) -> ScalarField {
        self.velocities
            .iter()
            .map(|v| v.as_ref().ok().map(|v| v.magnitude))
            .collect()
    }

    pub fn bearings(&self) -> ScalarField {
        self.velocities
            .iter()
            .map(|v| v.as_ref().ok().map(|v| v.bearing))
            .collect()
    }

    /// Time for the climate to cross a region of `diameter` at each cell's
    /// speed (years when the diameter is in the grid's distance unit).
    pub fn residence_times(&self, diameter: f64) -> ScalarField {
        self.velocities
            .iter()
            .map(|v| match v {
                Ok(v) if v.speed() > 0.0 => Some(diameter / v.speed()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::gradient::Gradient;
    use crate::velocity::trend::TrendFit;

    const EPSILON: f64 = 1e-9;

    fn trend(slope: f64) -> TrendResult {
        TrendResult {
            n_obs: 30,
            fit: Ok(TrendFit {
                slope,
                mean: 10.0,
                intercept: 0.0,
                std_error: Some(0.001),
            }),
        }
    }

    fn gradient(magnitude: f64, bearing: f64) -> GradientResult {
        let (e, n) = bearing_to_tangent(bearing);
        Ok(Gradient {
            magnitude,
            bearing: if magnitude > 0.0 { Some(bearing) } else { None },
            d_east: e * magnitude,
            d_north: n * magnitude,
        })
    }

    #[test]
    fn positive_trend_follows_gradient_bearing() {
        let v = velocity_at(&trend(0.02), &gradient(0.001, 30.0)).unwrap();
        assert!((v.magnitude - 20.0).abs() < EPSILON);
        assert!((v.bearing - 30.0).abs() < EPSILON);
    }

    #[test]
    fn negative_trend_reverses_bearing_and_sign() {
        let v = velocity_at(&trend(-0.02), &gradient(0.001, 300.0)).unwrap();
        assert!((v.magnitude + 20.0).abs() < EPSILON);
        assert!((v.bearing - 120.0).abs() < EPSILON);
        assert!((v.speed() - 20.0).abs() < EPSILON);
    }

    #[test]
    fn zero_gradient_is_undefined_not_infinite() {
        let result = velocity_at(&trend(5.0), &gradient(0.0, 0.0));
        assert_eq!(result, Err(Undefined::UndefinedGradient));
    }

    #[test]
    fn invalid_trend_propagates() {
        let insufficient = TrendResult {
            n_obs: 2,
            fit: Err(Undefined::InsufficientData),
        };
        assert_eq!(
            velocity_at(&insufficient, &gradient(0.1, 0.0)),
            Err(Undefined::InsufficientData)
        );
        assert_eq!(
            velocity_at(&trend(1.0), &Err(Undefined::Masked)),
            Err(Undefined::Masked)
        );
    }

    #[test]
    fn overflowing_ratio_is_undefined_velocity() {
        let result = velocity_at(&trend(f64::MAX), &gradient(1e-300, 0.0));
        assert_eq!(result, Err(Undefined::UndefinedVelocity));
    }

    #[test]
    fn tiny_gradient_is_fast_but_defined() {
        let v = velocity_at(&trend(0.01), &gradient(1e-9, 90.0)).unwrap();
        assert!(v.magnitude > 1e6);
        assert!(v.magnitude.is_finite());
    }

    #[test]
    fn components_point_along_bearing() {
        let v = Velocity {
            magnitude: -4.0,
            bearing: 90.0,
        };
        let (e, n) = v.components();
        assert!((e - 4.0).abs() < EPSILON);
        assert!(n.abs() < EPSILON);
    }

    #[test]
    fn grid_velocity_checks_lengths() {
        let err = compute_velocity(&[trend(1.0)], &[]).unwrap_err();
        assert!(matches!(err, VoccError::Shape { .. }));
    }

    #[test]
    fn residence_time_skips_stationary_cells() {
        let field = VelocityField {
            variable: "sst".to_string(),
            trends: vec![trend(0.02), trend(0.0)],
            gradients: vec![gradient(0.001, 0.0), gradient(0.001, 0.0)],
            velocities: vec![
                velocity_at(&trend(0.02), &gradient(0.001, 0.0)),
                velocity_at(&trend(0.0), &gradient(0.001, 0.0)),
            ],
            mean: vec![Some(10.0), Some(10.0)],
        };
        let times = field.residence_times(100.0);
        assert!((times[0].unwrap() - 5.0).abs() < EPSILON);
        assert_eq!(times[1], None);
    }
}
