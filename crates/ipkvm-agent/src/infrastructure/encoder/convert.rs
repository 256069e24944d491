//! Packed YUYV 4:2:2 to planar I420 (YUV 4:2:0) conversion.

use super::EncoderError;

/// Size in bytes of an I420 frame of `width x height`.
pub fn i420_len(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    w * h + 2 * (w / 2) * (h / 2)
}

/// Converts one YUYV frame into `out` laid out as `Y | U | V` planes.
///
/// Luma is copied as-is; each chroma sample is the average of the two rows
/// it covers. `width` and `height` must be even.
///
/// # Errors
///
/// Returns [`EncoderError::FrameSize`] if `yuyv` is shorter than
/// `width * height * 2` bytes or `out` is not [`i420_len`] bytes.
pub fn yuyv_to_i420(
    yuyv: &[u8],
    width: u32,
    height: u32,
    out: &mut [u8],
) -> Result<(), EncoderError> {
    let (w, h) = (width as usize, height as usize);
    let expected = w * h * 2;
    if yuyv.len() < expected {
        return Err(EncoderError::FrameSize {
            expected,
            actual: yuyv.len(),
        });
    }
    if out.len() != i420_len(width, height) {
        return Err(EncoderError::FrameSize {
            expected: i420_len(width, height),
            actual: out.len(),
        });
    }

    let stride = w * 2;
    let (y_plane, chroma) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = chroma.split_at_mut((w / 2) * (h / 2));

    for (row, y_row) in y_plane.chunks_exact_mut(w).enumerate() {
        let src = &yuyv[row * stride..(row + 1) * stride];
        for (dst, pair) in y_row.chunks_exact_mut(2).zip(src.chunks_exact(4)) {
            dst[0] = pair[0];
            dst[1] = pair[2];
        }
    }

    for row in 0..h / 2 {
        let top = &yuyv[2 * row * stride..(2 * row + 1) * stride];
        let bottom = &yuyv[(2 * row + 1) * stride..(2 * row + 2) * stride];
        let u_row = &mut u_plane[row * (w / 2)..(row + 1) * (w / 2)];
        let v_row = &mut v_plane[row * (w / 2)..(row + 1) * (w / 2)];

        for (col, (t, b)) in top.chunks_exact(4).zip(bottom.chunks_exact(4)).enumerate() {
            u_row[col] = average(t[1], b[1]);
            v_row[col] = average(t[3], b[3]);
        }
    }
    Ok(())
}

fn average(a: u8, b: u8) -> u8 {
    ((u16::from(a) + u16::from(b) + 1) / 2) as u8
}
