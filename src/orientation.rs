//! Quasi-uniform sampling of projection directions.
//!
//! Orientations use the 3DEM Z-Y'-Z'' Euler convention. Only `(phi, theta)` are
//! sampled since the in-plane angle `psi` does not change the projection direction.
//!
//! * P94: Penczek et al. (1994), as described in Baldwin & Penczek, "The Transform
//!   Class in SPARX and EMAN2", JSB 157 (2007).
//! * SK97: the "Spiral Points" construction of Saff & Kuijlaars, "Distributing Many
//!   Points on a Sphere", Math. Intelligencer 19 (1997).

use log::{debug, warn};
use serde::Deserialize;
use std::f64::consts::PI;
use strum_macros::{Display, EnumString};
use thiserror::Error;

// Slack for inclusive ranges whose endpoint falls on a step boundary up to round-off.
const STEP_TOLERANCE: f64 = 1e-9;

/// Upper bound on the number of P94 orientations.
pub const MAX_SAMPLES: usize = 1 << 26;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Invalid sampling method '{0}', valid options: P94, SK97")]
    InvalidMethod(String),

    #[error("Step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),

    #[error("{name} range [{min}, {max}] must be ordered and lie within [0, {limit}]")]
    InvalidRange {
        name: &'static str,
        min: f64,
        max: f64,
        limit: f64,
    },

    #[error("Latitude theta = {0} lies on a pole, where the longitude step is undefined")]
    PoleLatitude(f64),

    #[error("Spiral sampling needs at least 3 points, got {0}")]
    TooFewPoints(usize),

    #[error("Step size {step} would produce more than {limit} orientations")]
    TooManySamples { step: f64, limit: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, EnumString, Display)]
pub enum SamplingMethod {
    /// Iso-latitude grid.
    P94,
    /// Spiral points.
    SK97,
}

impl Default for SamplingMethod {
    fn default() -> Self {
        SamplingMethod::SK97
    }
}

/// Sampled orientations in degrees; `phi[i]` and `theta[i]` describe one direction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Orientations {
    pub phi: Vec<f64>,
    pub theta: Vec<f64>,
}

impl Orientations {
    pub fn len(&self) -> usize {
        self.phi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phi.is_empty()
    }

    /// Iterates over `(phi, theta)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.phi.iter().cloned().zip(self.theta.iter().cloned())
    }

    /// Projection directions as points on the unit sphere.
    pub fn unit_vectors(&self) -> Vec<[f64; 3]> {
        self.iter()
            .map(|(phi, theta)| {
                let (phi, theta) = (phi.to_radians(), theta.to_radians());
                [
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ]
            })
            .collect()
    }

    fn push(&mut self, phi: f64, theta: f64) {
        self.phi.push(phi);
        self.theta.push(theta);
    }
}

/// Parameters of both sampling methods.
///
/// `phi_range`, `theta_range` and `step_size` are used by P94 only, `n` by SK97 only.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrientationSampler {
    /// Longitude range, degrees within [0, 360].
    pub phi_range: [f64; 2],
    /// Latitude range, degrees within [0, 180]; must not produce a latitude on a pole.
    pub theta_range: [f64; 2],
    /// Latitude step Δθ, degrees.
    pub step_size: f64,
    /// Total number of spiral points.
    pub n: usize,
}

impl Default for OrientationSampler {
    fn default() -> Self {
        OrientationSampler {
            phi_range: [0.0, 360.0],
            theta_range: [0.1, 179.9],
            step_size: 6.0,
            n: 1163,
        }
    }
}

impl OrientationSampler {
    pub fn sample(&self, method: SamplingMethod) -> Result<Orientations, SamplingError> {
        match method {
            SamplingMethod::P94 => sample_p94(self.phi_range, self.theta_range, self.step_size),
            SamplingMethod::SK97 => sample_sk97(self.n),
        }
    }
}

/// Samples with the method named by `method` (`"P94"` or `"SK97"`).
pub fn sample(
    phi_range: [f64; 2],
    theta_range: [f64; 2],
    step_size: f64,
    n: usize,
    method: &str,
) -> Result<Orientations, SamplingError> {
    let method: SamplingMethod = method
        .parse()
        .map_err(|_| SamplingError::InvalidMethod(method.to_string()))?;
    OrientationSampler {
        phi_range,
        theta_range,
        step_size,
        n,
    }
    .sample(method)
}

/// Number of values in `start, start + step, ...` up to and including `stop`.
///
/// Counts above `limit`, and non-finite counts, are rejected.
fn inclusive_count(start: f64, stop: f64, step: f64, limit: usize) -> Option<usize> {
    let intervals = ((stop - start) / step + STEP_TOLERANCE).floor();
    if !intervals.is_finite() || intervals >= limit as f64 {
        return None;
    }
    (intervals as usize).checked_add(1)
}

fn check_range(name: &'static str, range: [f64; 2], limit: f64) -> Result<(), SamplingError> {
    let [min, max] = range;
    let valid = min.is_finite() && max.is_finite() && 0.0 <= min && min <= max && max <= limit;
    if !valid {
        return Err(SamplingError::InvalidRange {
            name,
            min,
            max,
            limit,
        });
    }
    Ok(())
}

/// Iso-latitude grid: latitudes every `step_size` degrees, and on each latitude
/// longitudes every `step_size / |sin(theta)|` degrees, both ranges inclusive.
///
/// Output is ordered by theta, then by phi.
pub fn sample_p94(
    phi_range: [f64; 2],
    theta_range: [f64; 2],
    step_size: f64,
) -> Result<Orientations, SamplingError> {
    if !(step_size.is_finite() && step_size > 0.0) {
        return Err(SamplingError::InvalidStepSize(step_size));
    }
    check_range("phi", phi_range, 360.0)?;
    check_range("theta", theta_range, 180.0)?;

    let [phi_min, phi_max] = phi_range;
    let [theta_min, theta_max] = theta_range;
    if step_size > theta_max - theta_min || step_size > phi_max - phi_min {
        warn!(
            "P94 step {} exceeds the sampled range, some axes reduce to their start value",
            step_size
        );
    }

    let too_many = SamplingError::TooManySamples {
        step: step_size,
        limit: MAX_SAMPLES,
    };
    let latitudes = inclusive_count(theta_min, theta_max, step_size, MAX_SAMPLES)
        .ok_or_else(|| too_many.clone())?;

    // size every latitude before allocating anything
    let mut rings = Vec::with_capacity(latitudes);
    let mut total = 0usize;
    for k in 0..latitudes {
        let theta = theta_min + k as f64 * step_size;
        let sin_theta = theta.to_radians().sin().abs();
        if sin_theta <= f64::EPSILON {
            return Err(SamplingError::PoleLatitude(theta));
        }
        let delta_phi = step_size / sin_theta;
        let count = inclusive_count(phi_min, phi_max, delta_phi, MAX_SAMPLES - total)
            .ok_or_else(|| too_many.clone())?;
        total += count;
        rings.push((theta, delta_phi, count));
    }

    let mut out = Orientations {
        phi: Vec::with_capacity(total),
        theta: Vec::with_capacity(total),
    };
    for (theta, delta_phi, count) in rings {
        for k in 0..count {
            out.push(phi_min + k as f64 * delta_phi, theta);
        }
    }

    debug!("P94: {} orientations on {} latitudes", out.len(), latitudes);
    Ok(out)
}

/// Spiral points: `n` points with `cos(theta)` evenly spaced on `[-1, 1]`, poles
/// fixed at `theta = 180` (first) and `theta = 0` (last), and each intermediate
/// longitude advanced from the previous one by `3.6 / sqrt(n) / sin(theta)` radians.
pub fn sample_sk97(n: usize) -> Result<Orientations, SamplingError> {
    if n < 3 {
        return Err(SamplingError::TooFewPoints(n));
    }

    let delta_cos_theta = 2.0 / (n - 1) as f64;
    let rate = 3.6 / (n as f64).sqrt();

    let mut out = Orientations {
        phi: Vec::with_capacity(n),
        theta: Vec::with_capacity(n),
    };
    out.push(0.0, 180.0);

    // the recurrence makes each longitude depend on the previous one
    let mut phi = 0.0f64;
    for i in 1..n - 1 {
        let theta = (-1.0 + i as f64 * delta_cos_theta).acos();
        phi = (phi + rate / theta.sin()).rem_euclid(2.0 * PI);
        out.push(phi.to_degrees().rem_euclid(360.0), theta.to_degrees());
    }

    out.push(0.0, 0.0);

    debug!("SK97: {} orientations", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("P94".parse::<SamplingMethod>().unwrap(), SamplingMethod::P94);
        assert_eq!("SK97".parse::<SamplingMethod>().unwrap(), SamplingMethod::SK97);
        assert_eq!(SamplingMethod::SK97.to_string(), "SK97");
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result = sample([0.0, 360.0], [6.0, 174.0], 6.0, 100, "HEALPix");
        assert_eq!(
            result,
            Err(SamplingError::InvalidMethod("HEALPix".to_string()))
        );
    }

    #[test]
    fn p94_equator_count_includes_endpoint() {
        let samples = sample([0.0, 360.0], [6.0, 174.0], 6.0, 0, "P94").unwrap();
        let equator: Vec<f64> = samples
            .iter()
            .filter(|&(_, theta)| theta == 90.0)
            .map(|(phi, _)| phi)
            .collect();
        let expected = (360.0 / (6.0 / 90f64.to_radians().sin())).floor() as usize + 1;
        assert_eq!(equator.len(), expected);
        assert_eq!(equator.len(), 61);
        assert_eq!(equator[0], 0.0);
        assert_close(*equator.last().unwrap(), 360.0, 1e-9);
    }

    #[test]
    fn p94_latitudes_cover_range_inclusively() {
        let samples = sample_p94([0.0, 360.0], [6.0, 174.0], 6.0).unwrap();
        let mut latitudes: Vec<f64> = samples.theta.clone();
        latitudes.dedup();
        assert_eq!(latitudes.len(), 29);
        assert_close(latitudes[0], 6.0, 1e-12);
        assert_close(*latitudes.last().unwrap(), 174.0, 1e-9);
    }

    #[test]
    fn p94_is_ordered_by_theta_then_phi() {
        let samples = sample_p94([10.0, 200.0], [30.0, 150.0], 15.0).unwrap();
        let pairs: Vec<(f64, f64)> = samples.iter().collect();
        for w in pairs.windows(2) {
            let (phi0, theta0) = w[0];
            let (phi1, theta1) = w[1];
            assert!(theta1 > theta0 || (theta1 == theta0 && phi1 > phi0));
        }
        assert!(samples.phi.iter().all(|&phi| (10.0..=200.0 + 1e-9).contains(&phi)));
    }

    #[test]
    fn p94_is_reproducible() {
        let a = sample_p94([0.0, 360.0], [0.1, 179.9], 6.0).unwrap();
        let b = sample_p94([0.0, 360.0], [0.1, 179.9], 6.0).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn p94_rejects_bad_inputs() {
        assert_eq!(
            sample_p94([0.0, 360.0], [0.0, 90.0], 6.0),
            Err(SamplingError::PoleLatitude(0.0))
        );
        assert_eq!(
            sample_p94([0.0, 360.0], [6.0, 180.0], 6.0),
            Err(SamplingError::PoleLatitude(180.0))
        );
        assert_eq!(
            sample_p94([0.0, 360.0], [6.0, 174.0], 0.0),
            Err(SamplingError::InvalidStepSize(0.0))
        );
        assert!(matches!(
            sample_p94([0.0, 400.0], [6.0, 174.0], 6.0),
            Err(SamplingError::InvalidRange { name: "phi", .. })
        ));
        assert!(matches!(
            sample_p94([0.0, 360.0], [120.0, 60.0], 6.0),
            Err(SamplingError::InvalidRange { name: "theta", .. })
        ));
    }

    #[test]
    fn p94_rejects_steps_that_explode_the_sample_count() {
        assert_eq!(
            sample_p94([0.0, 360.0], [6.0, 174.0], 1e-300),
            Err(SamplingError::TooManySamples {
                step: 1e-300,
                limit: MAX_SAMPLES
            })
        );
        // each latitude fits, but their sum does not
        assert_eq!(
            sample_p94([0.0, 360.0], [6.0, 174.0], 1e-3),
            Err(SamplingError::TooManySamples {
                step: 1e-3,
                limit: MAX_SAMPLES
            })
        );
        assert!(sample_p94([0.0, 360.0], [6.0, 174.0], 0.5).is_ok());
    }

    #[test]
    fn sk97_returns_n_points_with_fixed_poles() {
        for &n in &[3usize, 4, 10, 1163] {
            let samples = sample([0.0, 360.0], [0.0, 180.0], 6.0, n, "SK97").unwrap();
            assert_eq!(samples.len(), n);
            assert_eq!(samples.theta.len(), n);
            assert_eq!((samples.phi[0], samples.theta[0]), (0.0, 180.0));
            assert_eq!((samples.phi[n - 1], samples.theta[n - 1]), (0.0, 0.0));
            assert!(samples.theta.iter().all(|&t| (0.0..=180.0).contains(&t)));
            assert!(samples.phi.iter().all(|&p| (0.0..360.0).contains(&p)));
        }
    }

    #[test]
    fn sk97_follows_spiral_recurrence() {
        let n = 5;
        let samples = sample_sk97(n).unwrap();
        // cos(theta) = -1, -0.5, 0, 0.5, 1
        let rate = 3.6 / (n as f64).sqrt();
        let mut phi = 0.0f64;
        for (i, &cos_theta) in [-0.5f64, 0.0, 0.5].iter().enumerate() {
            let theta = cos_theta.acos();
            phi = (phi + rate / theta.sin()) % (2.0 * PI);
            assert_close(samples.theta[i + 1], theta.to_degrees(), 1e-12);
            assert_close(samples.phi[i + 1], phi.to_degrees(), 1e-9);
        }
        // theta strictly decreasing from the south to the north pole
        assert!(samples.theta.windows(2).all(|w| w[1] < w[0]));
    }

    #[test]
    fn sk97_rejects_fewer_than_three_points() {
        assert_eq!(sample_sk97(2), Err(SamplingError::TooFewPoints(2)));
        assert_eq!(sample_sk97(0), Err(SamplingError::TooFewPoints(0)));
    }

    #[test]
    fn unit_vectors_lie_on_sphere() {
        let samples = sample_sk97(200).unwrap();
        let points = samples.unit_vectors();
        assert_eq!(points.len(), 200);
        for p in &points {
            assert_close(p[0] * p[0] + p[1] * p[1] + p[2] * p[2], 1.0, 1e-12);
        }
        assert_close(points[0][2], -1.0, 1e-12);
        assert_close(points[199][2], 1.0, 1e-12);
    }
}
