//! Captured frame to RGB conversion.

use image::{ImageFormat, RgbImage};

use super::CaptureError;

/// Converts packed YUYV 4:2:2 into RGB24 using BT.601 coefficients.
///
/// `rgb` is resized to `width * height * 3`. Extra input bytes are ignored.
///
/// # Errors
///
/// Returns [`CaptureError::ShortFrame`] if `yuyv` holds fewer than
/// `width * height * 2` bytes.
pub fn yuyv_to_rgb(
    yuyv: &[u8],
    width: u32,
    height: u32,
    rgb: &mut Vec<u8>,
) -> Result<(), CaptureError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(CaptureError::ShortFrame {
            expected,
            actual: yuyv.len(),
        });
    }

    rgb.resize(pixels * 3, 0);
    for (src, dst) in yuyv[..expected].chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let (y0, u, y1, v) = (src[0], src[1], src[2], src[3]);
        let u = f32::from(u) - 128.0;
        let v = f32::from(v) - 128.0;

        let dr = 1.402 * v;
        let dg = -0.344_14 * u - 0.714_14 * v;
        let db = 1.772 * u;

        let (first, second) = dst.split_at_mut(3);
        for (luma, out) in [(y0, first), (y1, second)] {
            let y = f32::from(luma);
            out[0] = clamp_channel(y + dr);
            out[1] = clamp_channel(y + dg);
            out[2] = clamp_channel(y + db);
        }
    }
    Ok(())
}

/// Decodes one MJPEG frame.
///
/// # Errors
///
/// Returns [`CaptureError::Decode`] if the data is not a valid JPEG image.
pub fn decode_mjpeg(data: &[u8]) -> Result<RgbImage, CaptureError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
    Ok(image.to_rgb8())
}

fn clamp_channel(value: f32) -> u8 {
    (value as i32).clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::Rgb;

    use super::*;

    #[test]
    fn test_neutral_chroma_yields_grey() {
        // Arrange: two pixels, Y = 16 and 235, U = V = 128
        let yuyv = [16, 128, 235, 128];
        let mut rgb = Vec::new();

        // Act
        yuyv_to_rgb(&yuyv, 2, 1, &mut rgb).unwrap();

        // Assert
        assert_eq!(rgb, vec![16, 16, 16, 235, 235, 235]);
    }

    #[test]
    fn test_saturated_chroma_is_clamped() {
        // Arrange: full red chroma on a bright pixel pair
        let yuyv = [255, 128, 0, 255];
        let mut rgb = Vec::new();

        // Act
        yuyv_to_rgb(&yuyv, 2, 1, &mut rgb).unwrap();

        // Assert: R saturates high on the bright pixel, G low on the dark one
        assert_eq!(rgb[0], 255);
        assert_eq!(rgb[4], 0);
    }

    #[test]
    fn test_short_frame_is_rejected() {
        let mut rgb = Vec::new();
        let result = yuyv_to_rgb(&[0u8; 7], 2, 2, &mut rgb);
        assert!(matches!(
            result,
            Err(CaptureError::ShortFrame {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_decode_mjpeg_restores_dimensions() {
        // Arrange
        let source = RgbImage::from_pixel(16, 8, Rgb([200, 40, 40]));
        let mut jpeg = Cursor::new(Vec::new());
        source.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();

        // Act
        let decoded = decode_mjpeg(jpeg.get_ref()).unwrap();

        // Assert
        assert_eq!(decoded.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_mjpeg_rejects_garbage() {
        assert!(matches!(decode_mjpeg(&[0xFF, 0x00, 0x12]), Err(CaptureError::Decode(_))));
    }
}
