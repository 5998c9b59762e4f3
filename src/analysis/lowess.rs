//! # LOWESS Smoothing
//!
//! Locally weighted scatterplot smoothing (Cleveland, 1979) of noisy
//! `(x, y)` samples into a [`Curve`].
//!
//! ## Algorithm
//!
//! For every distinct `x0` in the samples:
//!
//! 1. Take the `ceil(fraction * n)` samples nearest to `x0` (at least 2).
//! 2. Weight each by the tricube kernel `(1 - (d/h)³)³`, where `h` is the
//!    distance to the farthest neighbour.
//! 3. Fit a weighted straight line and evaluate it at `x0`.
//!
//! Then `iterations` robustifying passes reweight every sample by the bisquare
//! of its residual over six median absolute residuals, so isolated outliers
//! stop pulling the curve.
//!
//! ## Usage
//!
//! ```
//! use flight_testpilot::analysis::lowess::Lowess;
//!
//! let x: Vec<f64> = (0..20).map(f64::from).collect();
//! let y: Vec<f64> = x.iter().map(|x| 2.0 * x).collect();
//!
//! let curve = Lowess::default().fit(&x, &y).unwrap();
//! assert!((curve.predict(10.0).unwrap() - 20.0).abs() < 1e-6);
//! assert_eq!(curve.predict(25.0), None); // beyond the data
//! ```

use crate::error::{Result, TestPilotError};

/// Default share of samples in each local fit.
pub const DEFAULT_FRACTION: f64 = 0.6667;

/// Default number of robustifying passes.
pub const DEFAULT_ITERATIONS: usize = 3;

/// Sorted, de-duplicated `(x, y)` sequence produced by [`Lowess::fit`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Curve {
    points: Vec<(f64, f64)>,
}

impl Curve {
    /// Curve points, strictly ascending in x.
    #[must_use]
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the curve has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest x, if any.
    #[must_use]
    pub fn x_range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.0, self.points.last()?.0))
    }

    /// Forward step lookup.
    ///
    /// Returns the y of the first point whose x is at or above the query.
    /// Queries below the first x or above the last x return `None`; this
    /// replaces the `-1` sentinel, which could not be told apart from a real
    /// value.
    ///
    /// # Examples
    ///
    /// ```
    /// use flight_testpilot::analysis::lowess::Lowess;
    ///
    /// let curve = Lowess::default().fit(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]).unwrap();
    /// assert!((curve.predict(1.5).unwrap() - 20.0).abs() < 1e-9);
    /// assert_eq!(curve.predict(0.5), None);
    /// ```
    #[must_use]
    pub fn predict(&self, x: f64) -> Option<f64> {
        let (first_x, _) = *self.points.first()?;
        if x < first_x {
            return None;
        }
        self.points.iter().find(|(px, _)| *px >= x).map(|(_, py)| *py)
    }
}

/// LOWESS smoother configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lowess {
    /// Share of samples in each local fit (0.0 to 1.0).
    fraction: f64,
    /// Robustifying passes after the initial fit.
    iterations: usize,
}

impl Default for Lowess {
    fn default() -> Self {
        Self {
            fraction: DEFAULT_FRACTION,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Lowess {
    /// Creates a smoother.
    ///
    /// # Arguments
    ///
    /// * `fraction` - Share of samples per local fit. Clamped to 0.0..=1.0;
    ///   every fit uses at least two samples.
    /// * `iterations` - Robustifying passes (0 disables outlier rejection).
    #[must_use]
    pub fn new(fraction: f64, iterations: usize) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            iterations,
        }
    }

    /// Returns the configured fraction.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Returns the configured robustifying passes.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Fits the smoother and returns one point per distinct x, ascending.
    ///
    /// # Errors
    ///
    /// - `InsufficientData` if fewer than two samples or lengths differ
    /// - `NonFiniteSample` if any sample is NaN or infinite
    /// - `DegenerateFit` if every x is equal
    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<Curve> {
        if x.len() != y.len() {
            return Err(TestPilotError::InsufficientData(format!(
                "{} x samples but {} y samples",
                x.len(),
                y.len()
            )));
        }
        let n = x.len();
        if n < 2 {
            return Err(TestPilotError::InsufficientData(format!(
                "{} samples, at least 2 required",
                n
            )));
        }
        if let Some(i) = x.iter().zip(y).position(|(a, b)| !a.is_finite() || !b.is_finite()) {
            return Err(TestPilotError::NonFiniteSample(i));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
        let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
        let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

        let range = xs[n - 1] - xs[0];
        if range <= 0.0 {
            return Err(TestPilotError::DegenerateFit(format!(
                "all {} samples share x = {}",
                n, xs[0]
            )));
        }

        let neighbours = ((self.fraction * n as f64).ceil() as usize).clamp(2, n);
        let groups = distinct_groups(&xs);

        // Residual scale below which the fit is already exact
        let tolerance = 1e-7 * ys.iter().map(|y| y.abs()).sum::<f64>() / n as f64;

        let mut robustness = vec![1.0; n];
        let mut fitted = fit_pass(&xs, &ys, &robustness, neighbours, &groups, range);

        for _ in 0..self.iterations {
            let residuals: Vec<f64> = groups
                .iter()
                .zip(&fitted)
                .flat_map(|(g, f)| ys[g.start..g.end].iter().map(move |y| y - f))
                .collect();

            let scale = 6.0 * median_abs(&residuals);
            if scale <= tolerance {
                break;
            }
            for (w, r) in robustness.iter_mut().zip(&residuals) {
                *w = bisquare(r / scale);
            }

            fitted = fit_pass(&xs, &ys, &robustness, neighbours, &groups, range);
        }

        let points = groups.iter().zip(fitted).map(|(g, f)| (g.x, f)).collect();
        Ok(Curve { points })
    }
}

/// Run of equal x values in the sorted samples.
#[derive(Debug, Clone, Copy)]
struct Group {
    x: f64,
    start: usize,
    end: usize,
}

fn distinct_groups(xs: &[f64]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for (i, &x) in xs.iter().enumerate() {
        match groups.last_mut() {
            Some(g) if g.x == x => g.end = i + 1,
            _ => groups.push(Group { x, start: i, end: i + 1 }),
        }
    }
    groups
}

/// One local regression per distinct x.
fn fit_pass(
    xs: &[f64],
    ys: &[f64],
    robustness: &[f64],
    neighbours: usize,
    groups: &[Group],
    range: f64,
) -> Vec<f64> {
    let n = xs.len();
    let mut left = 0;

    groups
        .iter()
        .map(|g| {
            let x0 = g.x;
            // Slide the window of `neighbours` samples towards x0
            while left + neighbours < n && x0 - xs[left] > xs[left + neighbours] - x0 {
                left += 1;
            }
            let right = left + neighbours - 1;
            let h = (x0 - xs[left]).max(xs[right] - x0);

            // Samples tied with the window edge are equally near
            let mut lo = left;
            while lo > 0 && x0 - xs[lo - 1] <= h {
                lo -= 1;
            }
            let mut hi = right;
            while hi + 1 < n && xs[hi + 1] - x0 <= h {
                hi += 1;
            }

            local_fit(x0, &xs[lo..=hi], &ys[lo..=hi], &robustness[lo..=hi], h, range)
                .unwrap_or_else(|| mean(&ys[g.start..g.end]))
        })
        .collect()
}

/// Weighted straight-line fit evaluated at `x0`; `None` if every weight is zero.
fn local_fit(x0: f64, xs: &[f64], ys: &[f64], robustness: &[f64], h: f64, range: f64) -> Option<f64> {
    let weights: Vec<f64> = xs
        .iter()
        .zip(robustness)
        .map(|(&x, &r)| {
            let d = (x - x0).abs();
            let w = if h > 0.0 { tricube(d / h) } else { 1.0 };
            w * r
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let x_mean = weights.iter().zip(xs).map(|(w, x)| w * x).sum::<f64>() / total;
    let y_mean = weights.iter().zip(ys).map(|(w, y)| w * y).sum::<f64>() / total;
    let sxx = weights
        .iter()
        .zip(xs)
        .map(|(w, x)| w * (x - x_mean).powi(2))
        .sum::<f64>()
        / total;

    // Too little x spread in the window to trust a slope
    if sxx.sqrt() <= 0.001 * range {
        return Some(y_mean);
    }

    let sxy = weights
        .iter()
        .zip(xs.iter().zip(ys))
        .map(|(w, (x, y))| w * (x - x_mean) * (y - y_mean))
        .sum::<f64>()
        / total;

    Some(y_mean + sxy / sxx * (x0 - x_mean))
}

/// Tricube kernel on a normalized distance.
#[inline]
fn tricube(u: f64) -> f64 {
    if u >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u * u;
        t * t * t
    }
}

/// Bisquare robustness weight on a scaled residual.
#[inline]
fn bisquare(u: f64) -> f64 {
    if u.abs() >= 1.0 {
        0.0
    } else {
        let t = 1.0 - u * u;
        t * t
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median_abs(values: &[f64]) -> f64 {
    let mut abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    abs.sort_by(f64::total_cmp);
    let mid = abs.len() / 2;
    if abs.len() % 2 == 0 {
        (abs[mid - 1] + abs[mid]) / 2.0
    } else {
        abs[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(points: &[(f64, f64)]) -> Curve {
        Curve {
            points: points.to_vec(),
        }
    }

    #[test]
    fn test_linear_input_is_reproduced() {
        for n in [10, 15, 40] {
            let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.5 + 3.0).collect();
            let y: Vec<f64> = x.iter().map(|x| 2.0 * x).collect();

            let curve = Lowess::default().fit(&x, &y).unwrap();
            assert_eq!(curve.len(), n);
            for &(px, py) in curve.points() {
                assert!((py - 2.0 * px).abs() < 1e-9, "n={} x={} y={}", n, px, py);
            }
        }
    }

    #[test]
    fn test_output_sorted_and_deduplicated() {
        let x = [5.0, 1.0, 3.0, 3.0, 2.0, 5.0, 4.0, 1.0];
        let y = [10.0, 2.0, 6.0, 6.5, 4.0, 9.5, 8.0, 2.5];

        let curve = Lowess::default().fit(&x, &y).unwrap();
        let xs: Vec<f64> = curve.points().iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        for pair in curve.points().windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
    }

    #[test]
    fn test_noise_is_smoothed() {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let y: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 6.0 } else { 4.0 }).collect();

        let curve = Lowess::default().fit(&x, &y).unwrap();
        for &(px, py) in curve.points() {
            if (10.0..=30.0).contains(&px) {
                assert!((py - 5.0).abs() < 0.5, "x={} y={}", px, py);
            }
        }
    }

    #[test]
    fn test_robustness_rejects_outlier() {
        let x: Vec<f64> = (0..21).map(f64::from).collect();
        let mut y = x.clone();
        y[10] = 100.0;

        let plain = Lowess::new(DEFAULT_FRACTION, 0).fit(&x, &y).unwrap();
        let robust = Lowess::default().fit(&x, &y).unwrap();

        assert!((plain.predict(10.0).unwrap() - 10.0).abs() > 5.0);
        assert!((robust.predict(10.0).unwrap() - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_two_samples() {
        let curve = Lowess::default().fit(&[1.0, 2.0], &[3.0, 5.0]).unwrap();
        assert_eq!(curve.len(), 2);
        assert!((curve.points()[0].1 - 3.0).abs() < 1e-9);
        assert!((curve.points()[1].1 - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_data() {
        assert!(matches!(
            Lowess::default().fit(&[1.0], &[1.0]),
            Err(TestPilotError::InsufficientData(_))
        ));
        assert!(matches!(
            Lowess::default().fit(&[], &[]),
            Err(TestPilotError::InsufficientData(_))
        ));
        assert!(matches!(
            Lowess::default().fit(&[1.0, 2.0, 3.0], &[1.0, 2.0]),
            Err(TestPilotError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_degenerate_fit() {
        assert!(matches!(
            Lowess::default().fit(&[4.0, 4.0, 4.0], &[1.0, 2.0, 3.0]),
            Err(TestPilotError::DegenerateFit(_))
        ));
    }

    #[test]
    fn test_non_finite_sample() {
        match Lowess::default().fit(&[1.0, 2.0, 3.0], &[1.0, f64::NAN, 3.0]) {
            Err(TestPilotError::NonFiniteSample(i)) => assert_eq!(i, 1),
            other => panic!("Expected NonFiniteSample, got: {:?}", other),
        }
    }

    #[test]
    fn test_fraction_clamped() {
        assert_eq!(Lowess::new(1.5, 2).fraction(), 1.0);
        assert_eq!(Lowess::new(-0.5, 2).fraction(), 0.0);
        assert_eq!(Lowess::default().fraction(), DEFAULT_FRACTION);
        assert_eq!(Lowess::default().iterations(), DEFAULT_ITERATIONS);
    }

    #[test]
    fn test_tiny_fraction_still_fits() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| x * 3.0 + 1.0).collect();
        let curve = Lowess::new(0.0, 0).fit(&x, &y).unwrap();
        assert_eq!(curve.len(), 10);
    }

    #[test]
    fn test_predict_step_lookup() {
        let c = curve(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);

        assert_eq!(c.predict(1.0), Some(10.0));
        assert_eq!(c.predict(1.5), Some(20.0));
        assert_eq!(c.predict(2.0), Some(20.0));
        assert_eq!(c.predict(3.0), Some(30.0));
    }

    #[test]
    fn test_predict_out_of_range() {
        let c = curve(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);

        assert_eq!(c.predict(0.99), None);
        assert_eq!(c.predict(3.01), None);
        assert_eq!(c.predict(f64::NAN), None);
        assert_eq!(Curve::default().predict(1.0), None);
    }

    #[test]
    fn test_x_range() {
        assert_eq!(curve(&[(1.0, 0.0), (4.0, 0.0)]).x_range(), Some((1.0, 4.0)));
        assert_eq!(Curve::default().x_range(), None);
    }

    #[test]
    fn test_kernels() {
        assert_eq!(tricube(0.0), 1.0);
        assert_eq!(tricube(1.0), 0.0);
        assert!((tricube(0.5) - 0.669921875).abs() < 1e-12);
        assert_eq!(bisquare(0.0), 1.0);
        assert_eq!(bisquare(-1.0), 0.0);
        assert!((bisquare(0.5) - 0.5625).abs() < 1e-12);
    }

    #[test]
    fn test_median_abs() {
        assert_eq!(median_abs(&[-3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_abs(&[-4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
