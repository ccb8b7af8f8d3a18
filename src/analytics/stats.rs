//! Missing-aware reducers used by every view.
//!
//! Missing values are skipped, never propagated: a mean over nothing is
//! `None`, a sum over nothing is `0.0`.

use std::collections::HashSet;

use crate::dataset::Cell;

/// Arithmetic mean of the present values.
pub fn mean<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (total, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(t, c), v| (t + v, c + 1));
    if count == 0 { None } else { Some(total / count as f64) }
}

/// Sum of the present values.
pub fn sum<I: IntoIterator<Item = Option<f64>>>(values: I) -> f64 {
    values.into_iter().flatten().sum()
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0.0" in JSON output.
    if rounded == 0.0 { 0.0 } else { rounded }
}

pub fn round_opt(value: Option<f64>, places: i32) -> Option<f64> {
    value.map(|v| round_to(v, places))
}

/// Number of distinct non-missing keys.
pub fn distinct_count<'a, I: IntoIterator<Item = &'a Cell>>(cells: I) -> usize {
    cells
        .into_iter()
        .filter_map(Cell::as_key)
        .collect::<HashSet<_>>()
        .len()
}

/// Pearson correlation coefficient of paired observations.
///
/// `None` for fewer than two pairs or when either side has zero variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let (x0, y0) = pairs[0];
    if pairs.iter().all(|&(x, _)| x == x0) || pairs.iter().all(|&(_, y)| y == y0) {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some((sxy / denom).clamp(-1.0, 1.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
