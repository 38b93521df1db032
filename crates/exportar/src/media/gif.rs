//! Animated GIF assembly from a captured frame sequence.

use crate::result::{ExportError, ExportarResult};
use crate::sequencer::FrameSequence;
use gif::{Encoder, Frame, Repeat};
use image::GenericImageView;
use serde::{Deserialize, Serialize};

/// Settings for GIF assembly
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GifSettings {
    /// Playback frames per second (1-60)
    pub fps: u32,
    /// Quality level (1-100, drives palette quantization speed)
    pub quality: u8,
}

impl Default for GifSettings {
    fn default() -> Self {
        Self {
            fps: crate::config::GIF_FRAME_RATE,
            quality: 80,
        }
    }
}

impl GifSettings {
    /// Create settings for a given playback rate
    #[must_use]
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.clamp(1, 60),
            ..Self::default()
        }
    }

    /// Set quality (clamped to 1-100)
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Per-frame delay in centiseconds (the GIF timebase)
    #[must_use]
    pub fn frame_delay_cs(&self) -> u16 {
        (100 / self.fps.max(1) as u16).max(1)
    }

    /// Map quality (1-100) to the `gif` crate's quantization speed (1-30,
    /// lower is slower and better)
    #[must_use]
    pub fn quantization_speed(&self) -> i32 {
        let normalized = i32::from(100 - self.quality);
        (normalized * 29 / 100 + 1).clamp(1, 30)
    }
}

/// Encodes an entire frame sequence into an infinitely-looping GIF.
#[derive(Debug, Default, Clone, Copy)]
pub struct GifEncoder {
    settings: GifSettings,
}

impl GifEncoder {
    /// Create an encoder with the given settings
    #[must_use]
    pub fn new(settings: GifSettings) -> Self {
        Self { settings }
    }

    /// Encode the whole sequence. Dimensions come from the first frame;
    /// every frame must match them (they share one session viewport).
    ///
    /// # Errors
    ///
    /// `ImageProcessing` on an empty sequence, a PNG decode failure, a
    /// dimension mismatch, or a GIF writer error.
    pub fn encode(&self, sequence: &FrameSequence) -> ExportarResult<Vec<u8>> {
        let first = sequence.first_frame().ok_or_else(|| ExportError::ImageProcessing {
            message: "cannot encode an empty frame sequence".to_string(),
        })?;

        let (width, height) = decode_dimensions(&first.data)?;
        let (gif_width, gif_height) = (width as u16, height as u16);
        let delay = self.settings.frame_delay_cs();
        let speed = self.settings.quantization_speed();

        let mut output = Vec::new();
        {
            let mut encoder = Encoder::new(&mut output, gif_width, gif_height, &[])
                .map_err(|e| ExportError::ImageProcessing {
                    message: format!("failed to create GIF encoder: {e}"),
                })?;
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| ExportError::ImageProcessing {
                    message: format!("failed to set GIF repeat: {e}"),
                })?;

            for frame in sequence.frames() {
                let img = image::load_from_memory_with_format(&frame.data, image::ImageFormat::Png)
                    .map_err(|e| ExportError::ImageProcessing {
                        message: format!("failed to decode frame {}: {e}", frame.index),
                    })?;

                if img.dimensions() != (width, height) {
                    return Err(ExportError::ImageProcessing {
                        message: format!(
                            "frame {} is {}x{}, sequence is {width}x{height}",
                            frame.index,
                            img.width(),
                            img.height()
                        ),
                    });
                }

                let mut rgba = img.to_rgba8().into_raw();
                let mut gif_frame = Frame::from_rgba_speed(gif_width, gif_height, &mut rgba, speed);
                gif_frame.delay = delay;

                encoder
                    .write_frame(&gif_frame)
                    .map_err(|e| ExportError::ImageProcessing {
                        message: format!("failed to write frame {}: {e}", frame.index),
                    })?;
            }
        }

        tracing::debug!(
            frames = sequence.len(),
            width,
            height,
            bytes = output.len(),
            "encoded GIF"
        );
        Ok(output)
    }
}

fn decode_dimensions(png: &[u8]) -> ExportarResult<(u32, u32)> {
    let img = image::load_from_memory_with_format(png, image::ImageFormat::Png).map_err(|e| {
        ExportError::ImageProcessing {
            message: format!("failed to decode frame: {e}"),
        }
    })?;
    Ok(img.dimensions())
}
