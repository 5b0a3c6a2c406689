//! Color temperature conversion between device-native units and Kelvin.
//!
//! Key Lights report temperature in a device-specific scale (roughly mireds,
//! 143..344). Conversion goes through two natural cubic splines fitted to a
//! fixed calibration table, one per direction. Outside the table the end
//! segments extrapolate; values are never clamped.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;

/// Anchor pairs measured on the device, ordered by Kelvin.
pub const DEFAULT_ANCHORS: [(i32, i32); 6] = [
    (2900, 344),
    (3700, 271),
    (4100, 244),
    (5200, 192),
    (6000, 167),
    (7000, 143),
];

/// One calibration anchor: a Kelvin value and its device-native equivalent.
///
/// # Example
///
/// ```
/// use keylightd::converter::CalibrationPoint;
///
/// let warm: CalibrationPoint = (2900, 344).into();
/// assert_eq!(warm.kelvin, 2900);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub kelvin: i32,
    pub native: i32,
}

impl From<(i32, i32)> for CalibrationPoint {
    fn from(value: (i32, i32)) -> Self {
        Self {
            kelvin: value.0,
            native: value.1,
        }
    }
}

/// Validated, immutable calibration table.
///
/// Kelvin values must be strictly increasing and native values strictly
/// monotonic, so that both interpolations are single-valued.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, CalibrationError> {
        if points.len() < 2 {
            return Err(CalibrationError::TooFewAnchors(points.len()));
        }

        if let Some(index) = points.windows(2).position(|w| w[1].kelvin <= w[0].kelvin) {
            return Err(CalibrationError::NotMonotonic {
                axis: "kelvin",
                order: "increasing",
                index: index + 1,
            });
        }

        let decreasing = points[1].native < points[0].native;
        if let Some(index) = points.windows(2).position(|w| {
            if decreasing {
                w[1].native >= w[0].native
            } else {
                w[1].native <= w[0].native
            }
        }) {
            return Err(CalibrationError::NotMonotonic {
                axis: "native",
                order: "monotonic",
                index: index + 1,
            });
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            points: DEFAULT_ANCHORS.iter().copied().map(Into::into).collect(),
        }
    }
}

/// Natural cubic spline (zero curvature at both ends).
#[derive(Debug, Clone)]
struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot.
    curvature: Vec<f64>,
}

impl CubicSpline {
    /// Fits a spline through `(xs[i], ys[i])`. `xs` must be strictly increasing.
    fn natural(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let n = xs.len();
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        let mut curvature = vec![0.0; n];

        // Tridiagonal system for the interior knots (Thomas algorithm).
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];
        for i in 1..n.saturating_sub(1) {
            let lower = h[i - 1];
            let diag = 2.0 * (h[i - 1] + h[i]);
            let upper = h[i];
            let rhs = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);

            let denom = diag - lower * c_prime[i - 1];
            c_prime[i] = upper / denom;
            d_prime[i] = (rhs - lower * d_prime[i - 1]) / denom;
        }
        for i in (1..n.saturating_sub(1)).rev() {
            curvature[i] = d_prime[i] - c_prime[i] * curvature[i + 1];
        }

        Self { xs, ys, curvature }
    }

    fn at(&self, x: f64) -> f64 {
        let last = self.xs.len() - 2;
        let i = self.xs[1..=last].partition_point(|&knot| knot < x);

        let (x0, y0, y1) = (self.xs[i], self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.curvature[i], self.curvature[i + 1]);
        let h = self.xs[i + 1] - x0;
        let t = x - x0;

        let slope = (y1 - y0) / h - h * (2.0 * m0 + m1) / 6.0;
        y0 + slope * t + m0 / 2.0 * t * t + (m1 - m0) / (6.0 * h) * t * t * t
    }
}

/// Bidirectional Kelvin <-> native temperature converter.
///
/// Results are rounded half away from zero.
///
/// # Example
///
/// ```
/// use keylightd::converter::{CalibrationTable, UnitConverter};
///
/// let converter = UnitConverter::new(&CalibrationTable::default())?;
/// assert_eq!(converter.to_kelvin(344), 2900);
/// assert_eq!(converter.to_native(7000), 143);
/// # Ok::<(), keylightd::error::CalibrationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct UnitConverter {
    kelvin_to_native: CubicSpline,
    native_to_kelvin: CubicSpline,
}

impl UnitConverter {
    pub fn new(table: &CalibrationTable) -> Result<Self, CalibrationError> {
        // Re-check so hand-built tables fail here rather than at call time.
        let table = CalibrationTable::new(table.points().to_vec())?;

        let by_kelvin = table.points();
        let kelvin_to_native = CubicSpline::natural(
            by_kelvin.iter().map(|p| f64::from(p.kelvin)).collect(),
            by_kelvin.iter().map(|p| f64::from(p.native)).collect(),
        );

        let mut by_native = by_kelvin.to_vec();
        by_native.sort_by_key(|p| p.native);
        let native_to_kelvin = CubicSpline::natural(
            by_native.iter().map(|p| f64::from(p.native)).collect(),
            by_native.iter().map(|p| f64::from(p.kelvin)).collect(),
        );

        Ok(Self {
            kelvin_to_native,
            native_to_kelvin,
        })
    }

    /// Converts a Kelvin value to the device-native scale.
    pub fn to_native(&self, kelvin: i32) -> i32 {
        self.kelvin_to_native.at(f64::from(kelvin)).round() as i32
    }

    /// Converts a device-native value to Kelvin.
    pub fn to_kelvin(&self, native: i32) -> i32 {
        self.native_to_kelvin.at(f64::from(native)).round() as i32
    }
}
