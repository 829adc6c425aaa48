//! Shared drawing helpers on top of plotters.

use crate::stats::BoxStats;
use anyhow::Error;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// A chart model that can draw itself on any plotters backend.
pub trait Chart {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static;

    /// Draw into an SVG file.
    fn render_svg<P: AsRef<Path>>(&self, path: P, size: (u32, u32)) -> Result<(), Error> {
        let root = SVGBackend::new(path.as_ref(), size).into_drawing_area();
        root.fill(&WHITE)?;
        self.draw(&root)?;
        root.present()?;
        Ok(())
    }

    /// Draw into an in-memory SVG document.
    fn to_svg_string(&self, size: (u32, u32)) -> Result<String, Error> {
        let mut buffer = String::new();
        {
            let root = SVGBackend::with_string(&mut buffer, size).into_drawing_area();
            root.fill(&WHITE)?;
            self.draw(&root)?;
            root.present()?;
        }
        Ok(buffer)
    }
}

pub(crate) type FloatChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

pub(crate) fn text_style(size: u32) -> TextStyle<'static> {
    ("sans-serif", size).into_font().color(&BLACK)
}

/// `(nrow, ncol)` for `n` panels. With neither given the grid is as square as
/// possible; with one given the other follows from it. Rows are added when both
/// are given but too few for `n`. Zero panels give one empty cell.
pub fn grid_shape(n: usize, nrow: Option<usize>, ncol: Option<usize>) -> (usize, usize) {
    if n == 0 {
        return (1, 1);
    }
    let ceil_div = |a: usize, b: usize| (a + b - 1) / b;
    match (nrow.filter(|&r| r > 0), ncol.filter(|&c| c > 0)) {
        (Some(r), Some(c)) => (r.max(ceil_div(n, c)), c),
        (Some(r), None) => (r, ceil_div(n, r)),
        (None, Some(c)) => (ceil_div(n, c), c),
        (None, None) => {
            let c = (n as f64).sqrt().ceil() as usize;
            (ceil_div(n, c), c)
        }
    }
}

/// Stack areas vertically with heights proportional to `weights`.
pub(crate) fn split_heights<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    weights: &[f64],
) -> Vec<DrawingArea<DB, Shift>> {
    let (_, height) = area.dim_in_pixel();
    let total = weights.iter().sum::<f64>();
    if weights.len() < 2 || total <= 0.0 {
        return area.split_evenly((1, 1));
    }
    let mut acc = 0.0;
    let breaks = weights[..weights.len() - 1]
        .iter()
        .map(|w| {
            acc += w;
            (height as f64 * acc / total).round() as i32
        })
        .collect::<Vec<_>>();
    area.split_by_breakpoints(Vec::<i32>::new(), breaks)
}

/// Min..max of the values, padded by `pad` of the span on each side.
pub(crate) fn padded_range<I: IntoIterator<Item = f64>>(values: I, pad: f64) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return 0.0..1.0;
    }
    let span = if hi > lo { hi - lo } else { 1.0 };
    (lo - pad * span)..(hi + pad * span)
}

/// Label formatter for a categorical axis drawn at integer positions.
pub(crate) fn category_label(labels: &[String], x: f64) -> String {
    let rounded = x.round();
    if (x - rounded).abs() > 1e-6 || rounded < 0.0 {
        return String::new();
    }
    labels.get(rounded as usize).cloned().unwrap_or_default()
}

/// Draw a Tukey box centered at `x`.
pub(crate) fn draw_box<DB: DrawingBackend>(
    chart: &mut FloatChart<DB>,
    x: f64,
    half_width: f64,
    stats: &BoxStats,
    color: RGBColor,
) -> Result<(), Error>
where
    DB::ErrorType: 'static,
{
    let (left, right) = (x - half_width, x + half_width);
    chart.draw_series(std::iter::once(Rectangle::new(
        [(left, stats.q1), (right, stats.q3)],
        color.mix(0.25).filled(),
    )))?;
    chart.draw_series(std::iter::once(Rectangle::new(
        [(left, stats.q1), (right, stats.q3)],
        color.stroke_width(1),
    )))?;
    chart.draw_series(vec![
        PathElement::new(vec![(left, stats.median), (right, stats.median)], color.stroke_width(2)),
        PathElement::new(vec![(x, stats.q3), (x, stats.upper_whisker)], color.stroke_width(1)),
        PathElement::new(vec![(x, stats.q1), (x, stats.lower_whisker)], color.stroke_width(1)),
    ])?;
    Ok(())
}

/// Color swatches with labels in a row, for legends drawn outside of a chart.
pub(crate) fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    entries: &[(String, RGBColor)],
) -> Result<(), Error>
where
    DB::ErrorType: 'static,
{
    let (width, height) = area.dim_in_pixel();
    let style = text_style(12);
    let y = (height as i32 / 2 - 6).max(0);
    let mut x = 10i32;
    for (label, color) in entries {
        let advance = 24 + 7 * label.chars().count() as i32;
        if x + advance > width as i32 && x > 10 {
            break;
        }
        area.draw(&Rectangle::new([(x, y), (x + 12, y + 12)], color.filled()))?;
        area.draw_text(label, &style, (x + 16, y))?;
        x += advance;
    }
    Ok(())
}
