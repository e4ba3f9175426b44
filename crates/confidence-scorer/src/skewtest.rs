//! D'Agostino test for whether a sample's skewness differs from a normal
//! distribution's.

use statrs::distribution::{ContinuousCDF, Normal};

/// Smallest sample the normal approximation supports.
pub const MIN_SAMPLES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewTest {
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Returns `None` for fewer than 8 values or a sample with no variance.
pub fn skewtest(data: &[f64]) -> Option<SkewTest> {
    let n = data.len();
    if n < MIN_SAMPLES {
        return None;
    }

    let nf = n as f64;
    let mean = data.iter().sum::<f64>() / nf;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / nf;
    let m3 = data.iter().map(|x| (x - mean).powi(3)).sum::<f64>() / nf;
    if m2 <= 0.0 || !m2.is_finite() {
        return None;
    }

    let b2 = m3 / m2.powf(1.5);
    let mut y = b2 * ((nf + 1.0) * (nf + 3.0) / (6.0 * (nf - 2.0))).sqrt();
    let beta2 = 3.0 * (nf * nf + 27.0 * nf - 70.0) * (nf + 1.0) * (nf + 3.0)
        / ((nf - 2.0) * (nf + 5.0) * (nf + 7.0) * (nf + 9.0));
    let w2 = -1.0 + (2.0 * (beta2 - 1.0)).sqrt();
    let delta = 1.0 / (0.5 * w2.ln()).sqrt();
    let alpha = (2.0 / (w2 - 1.0)).sqrt();
    if y == 0.0 {
        y = 1.0;
    }

    let ratio = y / alpha;
    let statistic = delta * (ratio + (ratio * ratio + 1.0).sqrt()).ln();
    let standard = Normal::new(0.0, 1.0).ok()?;
    let p_value = 2.0 * standard.sf(statistic.abs());

    if statistic.is_finite() && p_value.is_finite() {
        Some(SkewTest { statistic, p_value })
    } else {
        None
    }
}
