//! Colors for categorical levels and continuous values.

use anyhow::{bail, format_err, Context, Error};
use plotters::style::{Color, HSLColor, RGBColor};
use std::collections::BTreeMap;

/// `n` colors with evenly spaced hues, starting at 15 degrees.
pub fn hue_palette(n: usize) -> Vec<RGBColor> {
    (0..n)
        .map(|i| {
            let hue = (15.0 / 360.0 + i as f64 / n as f64).rem_euclid(1.0);
            let c = HSLColor(hue, 0.65, 0.6).to_rgba();
            RGBColor(c.0, c.1, c.2)
        })
        .collect()
}

/// Parse `#RRGGBB` or `RRGGBB`.
pub fn parse_hex_color(s: &str) -> Result<RGBColor, Error> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("malformed color '{}': expected #RRGGBB", s);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("malformed color '{}'", s))
    };
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

pub fn to_hex(color: RGBColor) -> String {
    format!("#{:02X}{:02X}{:02X}", color.0, color.1, color.2)
}

/// One color per level, in level order.
#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    levels: Vec<String>,
    colors: Vec<RGBColor>,
}

impl Palette {
    /// Hue palette over the levels.
    pub fn default_for<S: AsRef<str>>(levels: &[S]) -> Palette {
        Palette {
            levels: levels.iter().map(|l| l.as_ref().to_string()).collect(),
            colors: hue_palette(levels.len()),
        }
    }

    /// Caller colors (hex strings keyed by level), reordered to `levels`. Every
    /// level needs a color; extra keys are ignored.
    pub fn from_map<S: AsRef<str>>(levels: &[S], colors: &BTreeMap<String, String>) -> Result<Palette, Error> {
        let missing = levels
            .iter()
            .map(AsRef::as_ref)
            .filter(|l| !colors.contains_key(*l))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!("no color given for level(s): {}", missing.join(", "));
        }
        let colors = levels
            .iter()
            .map(|l| {
                let hex = colors
                    .get(l.as_ref())
                    .ok_or_else(|| format_err!("no color given for level '{}'", l.as_ref()))?;
                parse_hex_color(hex)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Palette {
            levels: levels.iter().map(|l| l.as_ref().to_string()).collect(),
            colors,
        })
    }

    /// Whether `colors` covers every level.
    pub fn covers<S: AsRef<str>>(levels: &[S], colors: &BTreeMap<String, String>) -> bool {
        levels.iter().all(|l| colors.contains_key(l.as_ref()))
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, level: &str) -> Option<RGBColor> {
        self.levels.iter().position(|l| l == level).map(|i| self.colors[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RGBColor)> + '_ {
        self.levels.iter().map(String::as_str).zip(self.colors.iter().copied())
    }

    /// Level → hex color.
    pub fn to_hex_map(&self) -> BTreeMap<String, String> {
        self.iter().map(|(l, c)| (l.to_string(), to_hex(c))).collect()
    }
}

/// Piecewise linear color gradient over [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRamp {
    stops: Vec<(f64, RGBColor)>,
}

impl ColorRamp {
    pub fn new(stops: Vec<(f64, RGBColor)>) -> Result<ColorRamp, Error> {
        if stops.len() < 2 {
            bail!("a color ramp needs at least two stops");
        }
        if stops.windows(2).any(|w| w[0].0 >= w[1].0) {
            bail!("color ramp stops must be strictly increasing");
        }
        Ok(ColorRamp { stops })
    }

    /// navy → white → firebrick
    pub fn heatmap() -> ColorRamp {
        ColorRamp {
            stops: vec![
                (0.0, RGBColor(0, 0, 128)),
                (0.5, RGBColor(255, 255, 255)),
                (1.0, RGBColor(178, 34, 34)),
            ],
        }
    }

    /// light gray → red, for continuous values on embeddings.
    pub fn gray_red() -> ColorRamp {
        ColorRamp {
            stops: vec![(0.0, RGBColor(211, 211, 211)), (1.0, RGBColor(255, 0, 0))],
        }
    }

    /// Color at `v`, clamped to the ramp ends. NaN maps to the lowest stop.
    pub fn color(&self, v: f64) -> RGBColor {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if v.is_nan() || v <= first.0 {
            return first.1;
        }
        if v >= last.0 {
            return last.1;
        }
        let i = self.stops.iter().position(|s| s.0 >= v).unwrap_or(self.stops.len() - 1);
        let (x0, c0) = self.stops[i - 1];
        let (x1, c1) = self.stops[i];
        let t = (v - x0) / (x1 - x0);
        let mix = |a: u8, b: u8| (a as f64 + t * (b as f64 - a as f64)).round() as u8;
        RGBColor(mix(c0.0, c1.0), mix(c0.1, c1.1), mix(c0.2, c1.2))
    }

    /// Color of `v` rescaled from `[lo, hi]`.
    pub fn color_in(&self, v: f64, lo: f64, hi: f64) -> RGBColor {
        if hi > lo {
            self.color((v - lo) / (hi - lo))
        } else {
            self.color(0.0)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(parse_hex_color("#FF0080").unwrap(), RGBColor(255, 0, 128));
        assert_eq!(parse_hex_color("00ff00").unwrap(), RGBColor(0, 255, 0));
        assert!(parse_hex_color("#FF00").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
        assert_eq!(to_hex(RGBColor(1, 2, 255)), "#0102FF");
    }

    #[test]
    fn test_hue_palette_distinct() {
        let p = hue_palette(5);
        assert_eq!(p.len(), 5);
        for i in 0..5 {
            for j in i + 1..5 {
                assert_ne!(p[i], p[j]);
            }
        }
        assert!(hue_palette(0).is_empty());
        // first hue is 15 degrees: red dominant, blue lowest
        let RGBColor(r, g, b) = hue_palette(1)[0];
        assert!((r as i32 - 219).abs() <= 1);
        assert!((g as i32 - 120).abs() <= 1);
        assert!((b as i32 - 87).abs() <= 1);
    }

    #[test]
    fn test_palette_from_map() {
        let mut colors = BTreeMap::new();
        colors.insert("b".to_string(), "#0000FF".to_string());
        colors.insert("a".to_string(), "#FF0000".to_string());
        colors.insert("z".to_string(), "#00FF00".to_string());
        let p = Palette::from_map(&["b", "a"], &colors).unwrap();
        assert_eq!(p.levels(), &["b", "a"]);
        assert_eq!(p.get("a"), Some(RGBColor(255, 0, 0)));
        assert_eq!(p.get("z"), None);

        let err = Palette::from_map(&["a", "c"], &colors).unwrap_err();
        assert!(err.to_string().contains('c'));
        colors.insert("c".to_string(), "red".to_string());
        assert!(Palette::from_map(&["a", "c"], &colors).is_err());
    }

    #[test]
    fn test_ramp() {
        let r = ColorRamp::heatmap();
        assert_eq!(r.color(0.0), RGBColor(0, 0, 128));
        assert_eq!(r.color(0.5), RGBColor(255, 255, 255));
        assert_eq!(r.color(2.0), RGBColor(178, 34, 34));
        assert_eq!(r.color(f64::NAN), RGBColor(0, 0, 128));
        assert_eq!(r.color_in(5.0, 0.0, 10.0), RGBColor(255, 255, 255));
        assert!(ColorRamp::new(vec![(0.0, RGBColor(0, 0, 0))]).is_err());
    }
}
