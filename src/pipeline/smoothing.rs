//! Numeric helpers shared by the pipeline stages and the forecaster.

/// Trailing simple moving average.
///
/// Output has the same length as the input; the first `window - 1` values
/// average over the shorter prefix that is available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() || window == 0 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let chunk = &values[start..=i];
            chunk.iter().sum::<f64>() / chunk.len() as f64
        })
        .collect()
}

/// Clamp `value` to `[lo, hi]`.
pub fn bound(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Round a price to cents.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let x_mean = (values.len() - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let numerator: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| (i as f64 - x_mean) * (y - y_mean))
        .sum();

    let denominator: f64 = values
        .iter()
        .enumerate()
        .map(|(i, _)| (i as f64 - x_mean).powi(2))
        .sum();

    if denominator.abs() < 1e-10 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Format a dollar amount with thousands separators and no cents.
pub fn format_usd(amount: f64) -> String {
    let rounded = amount.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${}", sign, grouped)
}
