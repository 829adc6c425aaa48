//! Pixel layout of the heatmap: row strip on the left, column tracks on top,
//! gene labels on the right and the color ramp below.

use super::{blocks, DeHeatmap};
use crate::render::{text_style, Chart};
use anyhow::Error;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::HashSet;

const MARGIN: i32 = 5;
const STRIP: i32 = 12;
const TRACK: i32 = 12;
const RAMP_HEIGHT: i32 = 40;
const CHAR_WIDTH: i32 = 7;

/// Start and end offsets of every entry along an axis of `extent` pixels, with
/// `gap` pixels between runs of equal keys.
fn spans<T: PartialEq>(keys: &[T], extent: f64, gap: f64) -> Vec<(f64, f64)> {
    let runs = blocks(keys);
    if keys.is_empty() {
        return Vec::new();
    }
    let gaps = runs.len().saturating_sub(1) as f64 * gap;
    let unit = ((extent - gaps) / keys.len() as f64).max(0.0);
    let mut out = Vec::with_capacity(keys.len());
    for (b, &(start, end)) in runs.iter().enumerate() {
        for i in start..end {
            let x = i as f64 * unit + b as f64 * gap;
            out.push((x, x + unit));
        }
    }
    out
}

fn pixel_range(span: (f64, f64), offset: i32) -> (i32, i32) {
    let lo = span.0.round() as i32;
    let hi = (span.1.round() as i32).max(lo + 1);
    (offset + lo, offset + hi)
}

impl Chart for DeHeatmap {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<(), Error>
    where
        DB::ErrorType: 'static,
    {
        let d = &self.details;
        let (width, height) = area.dim_in_pixel();
        let (width, height) = (width as i32, height as i32);
        let labeled = d.labeled_genes.iter().map(String::as_str).collect::<HashSet<_>>();
        let label_chars = d
            .labeled_genes
            .iter()
            .chain(d.column_annotation.iter().map(|t| &t.name))
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0) as i32;
        let label_width = (label_chars * CHAR_WIDTH + 2 * MARGIN).min(width / 3);

        let left = MARGIN + STRIP + 3;
        let top = MARGIN + d.column_annotation.len() as i32 * (TRACK + 2) + 2;
        let right = width - label_width;
        let bottom = height - RAMP_HEIGHT;
        if right <= left || bottom <= top {
            return Ok(());
        }

        let gap = if self.split { self.split_gap as f64 } else { 0.0 };
        let row_spans = spans(&d.row_clusters, (bottom - top) as f64, gap);
        let col_spans = spans(&d.column_clusters, (right - left) as f64, gap);

        for (r, &row_span) in row_spans.iter().enumerate() {
            let (y0, y1) = pixel_range(row_span, top);
            for (c, &col_span) in col_spans.iter().enumerate() {
                let (x0, x1) = pixel_range(col_span, left);
                let color = d.ramp.color(d.matrix[[r, c]]);
                area.draw(&Rectangle::new([(x0, y0), (x1, y1)], color.filled()))?;
            }
            let cluster_color = d.cluster_palette.get(&d.row_clusters[r]).unwrap_or(BLACK);
            area.draw(&Rectangle::new([(MARGIN, y0), (MARGIN + STRIP, y1)], cluster_color.filled()))?;
            if labeled.contains(d.genes[r].as_str()) {
                let y = (y0 + y1) / 2 - 5;
                area.draw_text(&d.genes[r], &text_style(10), (right + MARGIN, y))?;
            }
        }

        for (t, track) in d.column_annotation.iter().enumerate() {
            let y0 = MARGIN + t as i32 * (TRACK + 2);
            for (c, &col_span) in col_spans.iter().enumerate() {
                let Some(color) = track.labels[c].as_deref().and_then(|l| track.palette.get(l)) else {
                    continue;
                };
                let (x0, x1) = pixel_range(col_span, left);
                area.draw(&Rectangle::new([(x0, y0), (x1, y0 + TRACK)], color.filled()))?;
            }
            area.draw_text(&track.name, &text_style(10), (right + MARGIN, y0))?;
        }

        let ramp_top = bottom + 10;
        let steps = 50;
        for i in 0..steps {
            let x = left + i * 2;
            let color = d.ramp.color(i as f64 / (steps - 1) as f64);
            area.draw(&Rectangle::new([(x, ramp_top), (x + 2, ramp_top + 10)], color.filled()))?;
        }
        area.draw_text("0", &text_style(10), (left, ramp_top + 12))?;
        area.draw_text("1", &text_style(10), (left + 2 * steps - 6, ramp_top + 12))?;

        // cluster legend next to the ramp
        let mut x = left + 2 * steps + 20;
        for (level, color) in d.cluster_palette.iter() {
            let advance = 20 + CHAR_WIDTH * level.chars().count() as i32;
            if x + advance > width {
                break;
            }
            area.draw(&Rectangle::new([(x, ramp_top), (x + 10, ramp_top + 10)], color.filled()))?;
            area.draw_text(level, &text_style(10), (x + 14, ramp_top))?;
            x += advance;
        }
        Ok(())
    }
}
