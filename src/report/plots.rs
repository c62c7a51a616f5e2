//! PNG figures.
//!
//! Every figure is drawn with the bitmap backend. Series with undefined
//! values are split into separate line segments rather than bridged.

use crate::analysis::diagnostics::Diagnostics;
use crate::analysis::isochrony::IsochronyResult;
use crate::analysis::trajectory::TrajectoryPath;
use crate::report::summary::KEPLER_SLOPE;
use anyhow::Result;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

const FIGURE_SIZE: (u32, u32) = (1024, 768);

/// Split a series at its undefined points.
pub fn segments<I>(points: I) -> Vec<Vec<(f64, f64)>>
where
    I: IntoIterator<Item = Option<(f64, f64)>>,
{
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for point in points {
        match point {
            Some(p) if p.0.is_finite() && p.1.is_finite() => current.push(p),
            _ => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Padded range covering `values`, or `-1..1` when there are none.
pub fn padded_range<I>(values: I) -> Range<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5 * lo.abs().max(1.0) };
    (lo - pad)..(hi + pad)
}

/// Range over the strictly positive `values`, for logarithmic axes.
fn positive_range<I>(values: I) -> Range<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.1..1.0;
    }
    if hi > lo {
        (lo * 0.9)..(hi * 1.1)
    } else {
        (lo * 0.5)..(hi * 2.0)
    }
}

fn time_range(t: &[f64]) -> Range<f64> {
    match (t.first(), t.last()) {
        (Some(&first), Some(&last)) if last > first => first..last,
        _ => padded_range(t.iter().copied()),
    }
}

/// Slope over time with its error band and the Kepler reference.
pub fn plot_slope_series(path: &Path, result: &IsochronyResult) -> Result<()> {
    let slope = |offset: f64| {
        segments(
            result
                .t
                .iter()
                .zip(&result.slopes)
                .map(|(&t, s)| s.map(|s| (t, s.slope + offset * s.slope_err))),
        )
    };
    let (central, upper, lower) = (slope(0.0), slope(1.0), slope(-1.0));

    let y_range = padded_range(
        upper
            .iter()
            .chain(&lower)
            .flatten()
            .map(|p| p.1)
            .chain(std::iter::once(KEPLER_SLOPE)),
    );
    let x_range = time_range(&result.t);

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), y_range)?;

    chart.configure_mesh().x_desc("t / Td").y_desc("pente").draw()?;

    for segment in central {
        chart.draw_series(LineSeries::new(segment, &RED))?;
    }
    for segment in upper.into_iter().chain(lower) {
        chart.draw_series(LineSeries::new(segment, RED.mix(0.4)))?;
    }
    chart.draw_series(std::iter::once(PathElement::new(
        vec![(x_range.start, KEPLER_SLOPE), (x_range.end, KEPLER_SLOPE)],
        BLACK.mix(0.5),
    )))?;

    root.present()?;
    Ok(())
}

/// Points and fitted line of the last fitted timestep.
pub fn plot_last_fit(path: &Path, result: &IsochronyResult) -> Result<()> {
    let Some((step, fit)) = result.last_fit() else {
        return Ok(());
    };

    let points: Vec<(f64, f64, f64)> = result
        .defined_at(step)
        .into_iter()
        .filter_map(|j| match (result.log_tau[[step, j]], result.log_energy[[step, j]]) {
            (Some(x), Some(y)) => Some((x, y, result.log_energy_std[j])),
            _ => None,
        })
        .collect();

    let x_min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(
        points
            .iter()
            .flat_map(|&(_, y, dy)| [y - dy, y + dy])
            .chain([fit.slope * x_min + fit.intercept, fit.slope * x_max + fit.intercept]),
    );

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Pente : {:.3} ± {:.3}", fit.slope, fit.slope_err),
            ("sans-serif", 22),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart.configure_mesh().x_desc("ln(tau)").y_desc("ln(-E)").draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&(x, y, dy)| ErrorBar::new_vertical(x, y - dy, y, y + dy, BLUE.filled(), 6)),
    )?;
    chart.draw_series(LineSeries::new(
        vec![
            (x_min, fit.slope * x_min + fit.intercept),
            (x_max, fit.slope * x_max + fit.intercept),
        ],
        BLACK.stroke_width(2),
    ))?;

    root.present()?;
    Ok(())
}

/// Four stacked panels: energy drift, virial ratio, axis ratios and radial
/// percentiles.
pub fn plot_verification(path: &Path, diagnostics: &Diagnostics) -> Result<()> {
    let t = &diagnostics.t;
    let x_range = time_range(t);
    let series = |values: &[f64]| -> Vec<Vec<(f64, f64)>> {
        segments(t.iter().zip(values).map(|(&t, &v)| Some((t, v))))
    };

    let panels: [(&str, Vec<(&str, &[f64], RGBColor)>); 4] = [
        ("(E - <E>) / <E> (%)", vec![("energy", diagnostics.energy_drift.as_slice(), BLUE)]),
        ("virial", vec![("virial", diagnostics.virial.as_slice(), BLUE)]),
        (
            "axis ratios",
            vec![("a1", diagnostics.a1.as_slice(), BLUE), ("a2", diagnostics.a2.as_slice(), RED)],
        ),
        (
            "R",
            vec![
                ("R90", diagnostics.r90.as_slice(), BLUE),
                ("R50", diagnostics.r50.as_slice(), RED),
                ("R10", diagnostics.r10.as_slice(), GREEN),
            ],
        ),
    ];

    let root = BitMapBackend::new(path, (1000, 1200)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((4, 1));

    for (area, (y_desc, curves)) in areas.iter().zip(panels) {
        let y_range = padded_range(curves.iter().flat_map(|c| c.1.iter().copied()));
        let mut chart = ChartBuilder::on(area)
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.clone(), y_range)?;

        chart.configure_mesh().x_desc("t / Td").y_desc(y_desc).draw()?;

        for (label, values, color) in curves {
            let mut first = true;
            for segment in series(values) {
                let drawn = chart.draw_series(LineSeries::new(segment, &color))?;
                if first {
                    drawn
                        .label(label)
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                    first = false;
                }
            }
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

/// Density profiles on logarithmic axes.
pub fn plot_density(path: &Path, diagnostics: &Diagnostics) -> Result<()> {
    let profiles = &diagnostics.density_profiles;
    let x_range = positive_range(profiles.iter().flat_map(|p| p.radius.iter().copied()));
    let y_range = positive_range(profiles.iter().flat_map(|p| p.density.iter().copied()));

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.log_scale(), y_range.log_scale())?;

    chart.configure_mesh().x_desc("r / R90").y_desc("rho").draw()?;

    for (i, profile) in profiles.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        let points: Vec<(f64, f64)> = profile
            .radius
            .iter()
            .zip(&profile.density)
            .map(|(&r, &rho)| (r, rho))
            .filter(|&(r, rho)| r > 0.0 && rho > 0.0)
            .collect();
        chart
            .draw_series(LineSeries::new(points, &color))?
            .label(format!("t / Td = {:.3}", profile.t))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Selected orbits in the `(ln tau, ln(-E))` plane.
pub fn plot_trajectories(path: &Path, paths: &[TrajectoryPath]) -> Result<()> {
    let x_range = padded_range(paths.iter().flat_map(|p| p.points.iter().map(|q| q.0)));
    let y_range = padded_range(paths.iter().flat_map(|p| p.points.iter().map(|q| q.1)));

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart.configure_mesh().x_desc("ln(tau)").y_desc("ln(-E)").draw()?;

    for (i, trajectory) in paths.iter().enumerate() {
        let color = Palette99::pick(i);
        chart.draw_series(LineSeries::new(trajectory.points.iter().copied(), &color))?;

        if let Some(start) = trajectory.start {
            chart.draw_series(std::iter::once(Circle::new(start, 4, RED.filled())))?;
        }
        chart.draw_series(
            trajectory
                .time_marks
                .iter()
                .map(|&(x, y, _)| Cross::new((x, y), 3, BLACK)),
        )?;
        chart.draw_series(trajectory.time_marks.iter().map(|&(x, y, t)| {
            Text::new(format!("{:.2}", t), (x + 0.01, y + 0.01), ("sans-serif", 12))
        }))?;
    }

    root.present()?;
    Ok(())
}

/// Radius over time of the selected orbits, labelled by particle index.
pub fn plot_radius_curves(path: &Path, t: &[f64], curves: &[(usize, Vec<f64>)]) -> Result<()> {
    let x_range = time_range(t);
    let y_range = padded_range(curves.iter().flat_map(|c| c.1.iter().copied()));

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart.configure_mesh().x_desc("t").y_desc("R").draw()?;

    for (i, (particle, radius)) in curves.iter().enumerate() {
        let color = Palette99::pick(i).mix(0.9);
        chart
            .draw_series(LineSeries::new(
                t.iter().copied().zip(radius.iter().copied()),
                &color,
            ))?
            .label(particle.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_split_on_gaps() {
        let points = vec![
            None,
            Some((0.0, 1.0)),
            Some((1.0, 2.0)),
            None,
            Some((2.0, f64::NAN)),
            Some((3.0, 4.0)),
        ];
        assert_eq!(
            segments(points),
            vec![vec![(0.0, 1.0), (1.0, 2.0)], vec![(3.0, 4.0)]]
        );
        assert!(segments(vec![None, None]).is_empty());
    }

    #[test]
    fn test_padded_range() {
        let range = padded_range(vec![0.0, 10.0]);
        assert_eq!(range, -0.5..10.5);

        // Constant series still get a non-empty range
        let range = padded_range(vec![2.0, 2.0]);
        assert!(range.start < 2.0 && range.end > 2.0);

        assert_eq!(padded_range(Vec::new()), -1.0..1.0);
        assert_eq!(padded_range(vec![f64::NAN]), -1.0..1.0);
    }

    #[test]
    fn test_positive_range_ignores_non_positive() {
        let range = positive_range(vec![-1.0, 0.0, 0.5, 2.0]);
        assert!(range.start > 0.0);
        assert!(range.start <= 0.5 && range.end >= 2.0);
        assert_eq!(positive_range(vec![0.0]), 0.1..1.0);
    }

    #[test]
    fn test_time_range() {
        assert_eq!(time_range(&[0.0, 0.5, 1.0]), 0.0..1.0);
        let single = time_range(&[3.0]);
        assert!(single.start < 3.0 && single.end > 3.0);
    }
}
