//! Given a frame and a requested brightness, computes a clamped brightness
//! that keeps estimated current under a configured ceiling. Pure and
//! stateless — thread-safe by construction.

use crate::frame::PixelFrame;

/// Per-LED current draw at full channel value and full brightness, in amps.
pub const DEFAULT_I_MAX_PER_LED: f64 = 0.06;

/// Power budget configuration, read once per call through the Arbiter's
/// published snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PowerConfig {
    pub ceiling_amps: f64,
    pub i_max_per_led: f64,
    pub i_idle_per_led: f64,
    pub enabled: bool,
}

impl PowerConfig {
    pub fn new(ceiling_amps: f64, enabled: bool) -> Self {
        PowerConfig {
            ceiling_amps,
            i_max_per_led: DEFAULT_I_MAX_PER_LED,
            i_idle_per_led: 0.0,
            enabled,
        }
    }
}

/// Result of applying the power limiter to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitResult {
    pub b_applied: u8,
    pub limited: bool,
    pub estimate_amps: f64,
}

/// Estimated current at brightness `b` for a frame with channel sum `s`
/// across `n` LEDs: `I(b) = (s/255) * i_max_per_led * (b/255) + n * i_idle`.
fn estimate_current(channel_sum: u64, led_count: usize, brightness: u8, cfg: &PowerConfig) -> f64 {
    (channel_sum as f64 / 255.0) * cfg.i_max_per_led * (brightness as f64 / 255.0)
        + led_count as f64 * cfg.i_idle_per_led
}

/// Clamp `b_req` so the frame's estimated current stays at or under
/// `cfg.ceiling_amps`. `led_count` is the physical LED count (`N`), used for
/// the idle-current term and the unreachable-ceiling check.
pub fn limit(frame: &PixelFrame, b_req: u8, led_count: usize, cfg: &PowerConfig) -> LimitResult {
    if !cfg.enabled {
        let estimate_amps = estimate_current(frame.channel_sum(), led_count, b_req, cfg);
        return LimitResult {
            b_applied: b_req,
            limited: false,
            estimate_amps,
        };
    }

    let idle_total = led_count as f64 * cfg.i_idle_per_led;
    if cfg.ceiling_amps <= idle_total {
        return LimitResult {
            b_applied: 0,
            limited: true,
            estimate_amps: idle_total,
        };
    }

    let requested = estimate_current(frame.channel_sum(), led_count, b_req, cfg);
    if requested <= cfg.ceiling_amps {
        return LimitResult {
            b_applied: b_req,
            limited: false,
            estimate_amps: requested,
        };
    }

    let s = frame.channel_sum() as f64;
    let b_applied = if s <= 0.0 {
        // An all-black frame can't exceed the ceiling above the idle term;
        // requested <= ceiling would already have returned above.
        0
    } else {
        let numerator = (cfg.ceiling_amps - idle_total) * 255.0 * 255.0;
        let denominator = s * cfg.i_max_per_led;
        let raw = (numerator / denominator).floor();
        raw.clamp(0.0, b_req as f64) as u8
    };

    LimitResult {
        b_applied,
        limited: true,
        estimate_amps: estimate_current(frame.channel_sum(), led_count, b_applied, cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_through_under_ceiling() {
        let frame = PixelFrame::black(4, 4);
        let cfg = PowerConfig::new(5.0, true);
        let result = limit(&frame, 255, 16, &cfg);
        assert_eq!(result.b_applied, 255);
        assert!(!result.limited);
    }

    #[test]
    fn clamps_when_over_ceiling() {
        // 32x32 canvas, 4 units of 16x16 -> N=1024.
        // Fully white frame, S = 3*255*1024 = 783_360.
        let n = 1024;
        let white: Vec<_> = vec![(255u8, 255u8, 255u8); 32 * 32];
        let frame = PixelFrame::new(32, 32, white);
        let cfg = PowerConfig::new(5.0, true);
        let result = limit(&frame, 255, n, &cfg);
        assert!(result.limited);
        assert_eq!(result.b_applied, 6);
        assert!(result.estimate_amps <= 5.0);
    }

    #[test]
    fn unreachable_ceiling_yields_black() {
        let frame = PixelFrame::black(4, 4);
        let mut cfg = PowerConfig::new(0.5, true);
        cfg.i_idle_per_led = 1.0; // 16 LEDs * 1.0A idle = 16A > 0.5A ceiling
        let result = limit(&frame, 255, 16, &cfg);
        assert_eq!(result.b_applied, 0);
        assert!(result.limited);
    }

    #[test]
    fn disabled_mode_is_pass_through_even_over_budget() {
        let white: Vec<_> = vec![(255u8, 255u8, 255u8); 32 * 32];
        let frame = PixelFrame::new(32, 32, white);
        let cfg = PowerConfig::new(0.001, false);
        let result = limit(&frame, 255, 1024, &cfg);
        assert_eq!(result.b_applied, 255);
        assert!(!result.limited);
    }

    #[test]
    fn brightness_zero_yields_idle_only_estimate() {
        let white: Vec<_> = vec![(255u8, 255u8, 255u8); 16];
        let frame = PixelFrame::new(4, 4, white);
        let mut cfg = PowerConfig::new(5.0, true);
        cfg.i_idle_per_led = 0.01;
        let result = limit(&frame, 0, 16, &cfg);
        assert_eq!(result.b_applied, 0);
        assert!((result.estimate_amps - 0.16).abs() < 1e-9);
    }

    #[test]
    fn never_exceeds_requested_brightness() {
        let white: Vec<_> = vec![(255u8, 255u8, 255u8); 64];
        let frame = PixelFrame::new(8, 8, white);
        let cfg = PowerConfig::new(1000.0, true);
        for b_req in [0u8, 10, 128, 255] {
            let result = limit(&frame, b_req, 64, &cfg);
            assert!(result.b_applied <= b_req);
        }
    }
}
