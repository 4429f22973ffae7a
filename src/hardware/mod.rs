//! Hardware render primitive: the only place the controller touches the LED
//! chain. `MockSink` (default) is a no-op for development off the actual
//! hardware; the `hardware` feature swaps in a real sink backed by
//! `rpi-led-matrix`'s bulk `set_image` FFI.

use crate::frame::Rgb;

#[derive(Debug)]
pub struct HardwareError(pub String);

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hardware I/O error: {}", self.0)
    }
}

impl std::error::Error for HardwareError {}

/// Abstraction over the physical LED chain. Exclusively owned by the
/// controller thread; no other component may touch it.
pub trait HardwareSink: Send {
    /// Push one physical-order frame with the given brightness (0-255, the
    /// `b_applied` the power limiter computed).
    fn render(&mut self, phys_pixels: &[Rgb], brightness: u8) -> Result<(), HardwareError>;
}

/// No-op sink for development without attached hardware.
pub struct MockSink {
    led_count: usize,
}

impl MockSink {
    pub fn new(led_count: usize) -> Self {
        tracing::info!(led_count, "mock hardware sink initialized");
        MockSink { led_count }
    }
}

impl HardwareSink for MockSink {
    fn render(&mut self, phys_pixels: &[Rgb], _brightness: u8) -> Result<(), HardwareError> {
        debug_assert_eq!(phys_pixels.len(), self.led_count);
        Ok(())
    }
}

#[cfg(feature = "hardware")]
mod rpi {
    use super::{HardwareError, HardwareSink};
    use crate::frame::Rgb;
    use rpi_led_matrix::{LedCanvas, LedMatrix, LedMatrixOptions, LedRuntimeOptions};

    // Direct FFI to hzeller's C API, mirroring the bulk-transfer path used
    // elsewhere in this codebase's lineage: one `set_image` call per frame
    // instead of one `set_pixel` call per LED.
    extern "C" {
        fn set_image(
            canvas: *mut std::ffi::c_void,
            canvas_offset_x: std::ffi::c_int,
            canvas_offset_y: std::ffi::c_int,
            image_buffer: *const u8,
            buffer_size_bytes: usize,
            image_width: std::ffi::c_int,
            image_height: std::ffi::c_int,
            is_bgr: std::ffi::c_char,
        );
        fn led_matrix_set_brightness(matrix: *mut std::ffi::c_void, brightness: u8);
    }

    pub struct RpiMatrixSink {
        matrix: LedMatrix,
        canvas: Option<LedCanvas>,
        matrix_ptr: *mut std::ffi::c_void,
        width: usize,
        height: usize,
    }

    impl RpiMatrixSink {
        /// `rows`/`cols` describe one chained panel; `chain_length` is the
        /// number of panels on the data chain (matches `Layout::units().len()`).
        pub fn new(rows: u32, cols: u32, chain_length: u32) -> Self {
            let mut options = LedMatrixOptions::new();
            let _ = options.set_rows(rows);
            let _ = options.set_cols(cols);
            let _ = options.set_chain_length(chain_length);
            let _ = options.set_hardware_mapping("regular");
            let _ = options.set_pwm_bits(11);
            let _ = options.set_pwm_lsb_nanoseconds(130);
            options.set_hardware_pulsing(true);
            options.set_refresh_rate(false);

            let mut rt_options = LedRuntimeOptions::new();
            let _ = rt_options.set_gpio_slowdown(3);
            let _ = rt_options.set_drop_privileges(false);

            let matrix = LedMatrix::new(Some(options), Some(rt_options))
                .expect("failed to initialize LED matrix");
            let canvas = matrix.offscreen_canvas();

            // Safety: LedMatrix's first field is a raw `*mut CLedMatrix`
            // handle; this extracts it for the runtime brightness FFI the
            // crate doesn't expose.
            let matrix_ptr =
                unsafe { *(&matrix as *const LedMatrix as *const *mut std::ffi::c_void) };

            RpiMatrixSink {
                matrix,
                canvas: Some(canvas),
                matrix_ptr,
                width: (cols * chain_length) as usize,
                height: rows as usize,
            }
        }
    }

    // Safety: created, used, and destroyed entirely within the dedicated
    // render thread (see main.rs). Never shared across threads; `Send` is
    // required only so `Box<dyn HardwareSink>` can be moved into that
    // thread once at startup.
    unsafe impl Send for RpiMatrixSink {}

    impl HardwareSink for RpiMatrixSink {
        fn render(&mut self, phys_pixels: &[Rgb], brightness: u8) -> Result<(), HardwareError> {
            let Some(canvas) = self.canvas.take() else {
                return Err(HardwareError("no offscreen canvas available".into()));
            };

            assert_eq!(
                std::mem::size_of::<LedCanvas>(),
                std::mem::size_of::<*mut std::ffi::c_void>(),
                "LedCanvas layout changed — set_image FFI assumption broken"
            );
            let canvas_ptr: *mut std::ffi::c_void =
                unsafe { *(&canvas as *const LedCanvas as *const *mut std::ffi::c_void) };

            let mut buf = Vec::with_capacity(phys_pixels.len() * 3);
            for &(r, g, b) in phys_pixels {
                buf.push(r);
                buf.push(g);
                buf.push(b);
            }

            unsafe {
                set_image(
                    canvas_ptr,
                    0,
                    0,
                    buf.as_ptr(),
                    buf.len(),
                    self.width as std::ffi::c_int,
                    self.height as std::ffi::c_int,
                    0,
                );
                led_matrix_set_brightness(self.matrix_ptr, brightness);
            }

            self.canvas = Some(self.matrix.swap(canvas));
            Ok(())
        }
    }
}

#[cfg(feature = "hardware")]
pub use rpi::RpiMatrixSink;
