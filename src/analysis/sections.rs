//! Turning-point detection on sampled signals.
//!
//! Peaks are local maxima filtered by topographic prominence. Each retained
//! peak is refined with the parabola through its two neighbours, which gives
//! a sub-sample vertex and a signed correction distance used when measuring
//! arc lengths between consecutive peaks.

/// Default prominence threshold, as a fraction of the signal range.
pub const DEFAULT_PROMINENCE: f64 = 0.01;

/// A detected turning point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    /// Index of the discrete peak sample.
    pub index: usize,
    /// Abscissa of the fitted parabola vertex.
    pub vertex: f64,
    /// Distance between the discrete peak and the vertex in the `(x, y)`
    /// plane; positive when the vertex lies at or before the sample.
    pub correction: f64,
}

/// Local maxima of `y`. Flat tops report their middle sample; the first and
/// last samples are never peaks.
pub fn local_maxima(y: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if y.len() < 3 {
        return peaks;
    }

    let last = y.len() - 1;
    let mut i = 1;
    while i < last {
        if y[i - 1] < y[i] {
            let mut ahead = i + 1;
            while ahead < last && y[ahead] == y[i] {
                ahead += 1;
            }
            if y[ahead] < y[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }

    peaks
}

/// Prominence of the peak at `peak`: its height above the higher of the two
/// lowest points reached on each side before a higher sample.
pub fn prominence(y: &[f64], peak: usize) -> f64 {
    let height = y[peak];

    let mut left_min = height;
    for &value in y[..=peak].iter().rev() {
        if value > height {
            break;
        }
        left_min = left_min.min(value);
    }

    let mut right_min = height;
    for &value in &y[peak..] {
        if value > height {
            break;
        }
        right_min = right_min.min(value);
    }

    height - left_min.max(right_min)
}

/// Peaks of `y` whose prominence reaches `threshold * (max(y) - min(y))`.
pub fn find_peaks(y: &[f64], threshold: f64) -> Vec<usize> {
    let (min, max) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let required = threshold * (max - min);

    local_maxima(y)
        .into_iter()
        .filter(|&peak| prominence(y, peak) >= required)
        .collect()
}

/// Vertex of the parabola through the samples around `index`, as
/// `(vertex_x, vertex_y)`. `None` for a collinear neighbourhood.
fn parabola_vertex(x: &[f64], y: &[f64], index: usize) -> Option<(f64, f64)> {
    let h0 = x[index] - x[index - 1];
    let h2 = x[index + 1] - x[index];
    if h0 == 0.0 || h2 == 0.0 {
        return None;
    }

    // p(u) = a u^2 + b u + y1 with u = x - x1
    let slope_left = (y[index] - y[index - 1]) / h0;
    let slope_right = (y[index + 1] - y[index]) / h2;
    let a = (slope_right - slope_left) / (h0 + h2);
    if a == 0.0 || !a.is_finite() {
        return None;
    }
    let b = slope_left + a * h0;

    let u = -b / (2.0 * a);
    let vertex_y = y[index] - b * b / (4.0 * a);
    Some((x[index] + u, vertex_y))
}

/// Detect the turning points of `y(x)` and refine each one.
pub fn cut_sections(x: &[f64], y: &[f64], threshold: f64) -> Vec<Section> {
    find_peaks(y, threshold)
        .into_iter()
        .map(|index| match parabola_vertex(x, y, index) {
            Some((vertex, vertex_y)) => {
                let distance = (vertex - x[index]).hypot(vertex_y - y[index]);
                let correction = if vertex <= x[index] { distance } else { -distance };
                Section {
                    index,
                    vertex,
                    correction,
                }
            }
            None => Section {
                index,
                vertex: x[index],
                correction: 0.0,
            },
        })
        .collect()
}

/// Mean height of the detected peaks of a radius signal.
pub fn apocenter(y: &[f64], threshold: f64) -> Option<f64> {
    let peaks = find_peaks(y, threshold);
    if peaks.is_empty() {
        return None;
    }
    Some(peaks.iter().map(|&i| y[i]).sum::<f64>() / peaks.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn sinusoid(period: f64, dt: f64, n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * dt).collect();
        let y = x.iter().map(|t| (2.0 * PI * t / period).sin()).collect();
        (x, y)
    }

    #[test]
    fn test_sections_on_sinusoid() {
        let period = 1.37;
        let dt = 0.01;
        let (x, y) = sinusoid(period, dt, 1000);

        let sections = cut_sections(&x, &y, DEFAULT_PROMINENCE);
        assert_eq!(sections.len(), 8);

        let mut raw_error = 0.0;
        let mut refined_error = 0.0;
        for (k, section) in sections.iter().enumerate() {
            let expected = period / 4.0 + k as f64 * period;
            let raw = (x[section.index] - expected).abs();
            let refined = (section.vertex - expected).abs();
            assert!(raw <= dt, "peak {} is {} away", k, raw);
            assert!(refined <= raw + 1e-12);
            raw_error += raw;
            refined_error += refined;
        }
        assert!(refined_error < raw_error);
    }

    #[test]
    fn test_correction_sign() {
        let x = [0.0, 1.0, 2.0];
        // Vertex after the sample
        let sections = cut_sections(&x, &[0.0, 1.0, 0.9], 0.0);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].vertex > 1.0);
        assert!(sections[0].correction < 0.0);

        // Vertex before the sample
        let sections = cut_sections(&x, &[0.9, 1.0, 0.0], 0.0);
        assert!(sections[0].vertex < 1.0);
        assert!(sections[0].correction > 0.0);

        // Symmetric: vertex on the sample
        let sections = cut_sections(&x, &[0.0, 1.0, 0.0], 0.0);
        assert_relative_eq!(sections[0].vertex, 1.0);
        assert_eq!(sections[0].correction, 0.0);
    }

    #[test]
    fn test_plateau_reports_middle_sample() {
        let y = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(local_maxima(&y), vec![3]);

        let x: Vec<f64> = (0..y.len()).map(|i| i as f64).collect();
        let sections = cut_sections(&x, &y, DEFAULT_PROMINENCE);
        assert_eq!(sections[0].correction, 0.0);
        assert_eq!(sections[0].vertex, 3.0);
    }

    #[test]
    fn test_edges_are_never_peaks() {
        let y = [5.0, 1.0, 2.0, 1.0, 6.0];
        assert_eq!(local_maxima(&y), vec![2]);
        assert!(local_maxima(&[0.0, 1.0, 2.0, 3.0]).is_empty());
    }

    #[test]
    fn test_prominence_filters_ripples() {
        // Two large peaks with a small ripple in between
        let y = [0.0, 10.0, 0.0, 0.05, 0.0, 10.0, 0.0];
        assert_relative_eq!(prominence(&y, 3), 0.05);
        assert_relative_eq!(prominence(&y, 1), 10.0);

        assert_eq!(find_peaks(&y, DEFAULT_PROMINENCE), vec![1, 5]);
        assert_eq!(find_peaks(&y, 0.0), vec![1, 3, 5]);
    }

    #[test]
    fn test_apocenter() {
        let y = [1.0, 3.0, 1.0, 5.0, 1.0];
        assert_eq!(apocenter(&y, DEFAULT_PROMINENCE), Some(4.0));
        assert_eq!(apocenter(&[2.0; 10], DEFAULT_PROMINENCE), None);
        assert!(cut_sections(&[0.0; 10], &[2.0; 10], DEFAULT_PROMINENCE).is_empty());
    }
}
