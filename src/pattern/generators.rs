//! Built-in pattern generators. Each is a pure function of
//! `(width, height, frame_counter, params)` — no hidden state, so hot-reload
//! and pattern switches reset cleanly by construction.

use std::collections::HashMap;

use crate::frame::{PixelFrame, Rgb};

/// Parameters passed to a generator, as a loose string-keyed map (the
/// control surface accepts arbitrary JSON objects for `internal(name,
/// params)`; numeric/color values are parsed on demand).
pub type Params = HashMap<String, String>;

/// Errors a generator can raise. The Pattern Runner catches these, reverts
/// selection to `external`, and surfaces them to Status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorError(pub String);

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for GeneratorError {}

/// Look up a generator by name. `fail_on_third_tick` only exists in test
/// builds, so it can never be selected by a running binary — only
/// `cargo test` resolves that name.
pub fn generator_by_name(name: &str) -> Option<fn(usize, usize, u64, &Params) -> Result<PixelFrame, GeneratorError>> {
    match name {
        "solid" => Some(solid),
        "rainbow_wipe" => Some(rainbow_wipe),
        "checker_flash" => Some(checker_flash),
        "plasma" => Some(plasma),
        #[cfg(test)]
        "fail_on_third_tick" => Some(fail_on_third_tick),
        _ => None,
    }
}

pub fn available_pattern_names() -> &'static [&'static str] {
    &["solid", "rainbow_wipe", "checker_flash", "plasma"]
}

fn parse_color(params: &Params) -> Rgb {
    let get = |key: &str| params.get(key).and_then(|v| v.parse::<u8>().ok()).unwrap_or(0);
    (get("r"), get("g"), get("b"))
}

/// Flat fill using `params["r"/"g"/"b"]` (default black).
fn solid(width: usize, height: usize, _counter: u64, params: &Params) -> Result<PixelFrame, GeneratorError> {
    let color = parse_color(params);
    Ok(PixelFrame::new(width, height, vec![color; width * height]))
}

/// Hue cycles across the canvas, shifting one column per tick.
fn rainbow_wipe(width: usize, height: usize, counter: u64, _params: &Params) -> Result<PixelFrame, GeneratorError> {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let hue = ((x as u64 + counter) * 360 / width.max(1) as u64) % 360;
            pixels.push(hsv_to_rgb(hue as f64, 1.0, if y % 2 == 0 { 1.0 } else { 0.8 }));
        }
    }
    Ok(PixelFrame::new(width, height, pixels))
}

/// Alternating checkerboard, flips phase every 15 ticks.
fn checker_flash(width: usize, height: usize, counter: u64, _params: &Params) -> Result<PixelFrame, GeneratorError> {
    let phase = (counter / 15) % 2 == 0;
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let on = ((x + y) % 2 == 0) == phase;
            pixels.push(if on { (255, 255, 255) } else { (0, 0, 0) });
        }
    }
    Ok(PixelFrame::new(width, height, pixels))
}

/// Classic sine-sum plasma.
fn plasma(width: usize, height: usize, counter: u64, _params: &Params) -> Result<PixelFrame, GeneratorError> {
    let t = counter as f64 * 0.08;
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let fx = x as f64;
            let fy = y as f64;
            let v = (fx * 0.2 + t).sin() + (fy * 0.2 + t).cos() + ((fx + fy) * 0.15 + t * 1.3).sin();
            let hue = ((v + 3.0) / 6.0 * 360.0).rem_euclid(360.0);
            pixels.push(hsv_to_rgb(hue, 1.0, 1.0));
        }
    }
    Ok(PixelFrame::new(width, height, pixels))
}

/// Raises on its third invocation, used to exercise the `PatternFailure`
/// contract. Compiled only for tests — absent from `generator_by_name` (and
/// thus unreachable from any running binary) outside `cargo test`.
#[cfg(test)]
fn fail_on_third_tick(width: usize, height: usize, counter: u64, _params: &Params) -> Result<PixelFrame, GeneratorError> {
    if counter == 2 {
        return Err(GeneratorError("synthetic failure on third tick".into()));
    }
    Ok(PixelFrame::black(width, height))
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> Rgb {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - (h_prime % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    (
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    )
}
