use crate::error::{Error, Result};

/// Fill every `NaN` in `data` with a shape-preserving monotone cubic (PCHIP)
/// fitted on the indices of the valid samples.
///
/// Two points give a straight line. Interior slopes are the weighted harmonic
/// mean of the neighbouring secants, zero at sign changes. End slopes use the
/// one-sided three-point rule and samples outside the valid range are
/// extrapolated with the first/last cubic piece. Valid samples are left
/// untouched.
///
/// Fails when fewer than two valid samples exist, even if nothing is missing.
pub fn interpolate_missing(data: &mut [f64]) -> Result<()> {
    let xs: Vec<f64> = data
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i as f64)
        .collect();
    if xs.len() < 2 {
        return Err(Error::Interpolation { valid: xs.len() });
    }
    if xs.len() == data.len() {
        return Ok(());
    }
    let ys: Vec<f64> = xs.iter().map(|&x| data[x as usize]).collect();
    let pchip = Pchip::new(xs, ys);
    for (i, value) in data.iter_mut().enumerate() {
        if value.is_nan() {
            *value = pchip.eval(i as f64);
        }
    }
    Ok(())
}

/// Piecewise cubic Hermite interpolant with PCHIP slopes.
#[derive(Debug, Clone)]
pub struct Pchip {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    /// `xs` must be strictly increasing and hold at least two points.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let slopes = pchip_slopes(&xs, &ys);
        Self { xs, ys, slopes }
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        // partition_point gives the first knot > x; clamp so outside points use the end pieces
        let k = self
            .xs
            .partition_point(|&knot| knot <= x)
            .saturating_sub(1)
            .min(n - 2);
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[k]
            + h10 * h * self.slopes[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.slopes[k + 1]
    }
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn pchip_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = ys
        .windows(2)
        .zip(&h)
        .map(|(w, hk)| (w[1] - w[0]) / hk)
        .collect();
    if n == 2 {
        return vec![m[0], m[0]];
    }
    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        let (m0, m1) = (m[k - 1], m[k]);
        if sign(m0) != sign(m1) || m0 == 0.0 || m1 == 0.0 {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        let whmean = (w1 / m0 + w2 / m1) / (w1 + w2);
        d[k] = 1.0 / whmean;
    }
    d[0] = edge_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}
