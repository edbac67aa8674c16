//! Conversion of raw color and depth encodings into [`RgbImage`] and
//! [`DepthBuffer`].

use super::raw::{ColorEncoding, DepthEncoding};
use image::RgbImage;
use thiserror::Error;
use voxfuse_data::DepthBuffer;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("{encoding} buffer for {width}x{height} has {actual} bytes, expected {expected}")]
    UnsupportedEncoding {
        encoding: &'static str,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("zero-sized image")]
    EmptyImage,
}

fn yuv420_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_dims(width, height);
    width as usize * height as usize + 2 * cw * ch
}

fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

fn mismatch(
    encoding: &'static str,
    width: u32,
    height: u32,
    expected: usize,
    actual: usize,
) -> NormalizeError {
    NormalizeError::UnsupportedEncoding {
        encoding,
        width,
        height,
        expected,
        actual,
    }
}

/// Decide the concrete encoding of an `Auto` buffer from its length.
fn detect_encoding(len: usize, width: u32, height: u32) -> Result<ColorEncoding, NormalizeError> {
    let pixels = width as usize * height as usize;
    if len == pixels * 3 {
        Ok(ColorEncoding::Rgb8)
    } else if len == pixels * 4 {
        Ok(ColorEncoding::Rgba8)
    } else if len >= yuv420_len(width, height) {
        Ok(ColorEncoding::I420)
    } else {
        Err(mismatch("auto", width, height, yuv420_len(width, height), len))
    }
}

/// Convert a raw color buffer to RGB.
///
/// YUV buffers may carry trailing padding, which is ignored. Direct RGB/RGBA
/// buffers must match the image size exactly.
pub fn normalize_color(
    data: &[u8],
    width: u32,
    height: u32,
    encoding: ColorEncoding,
) -> Result<RgbImage, NormalizeError> {
    if width == 0 || height == 0 {
        return Err(NormalizeError::EmptyImage);
    }
    let pixels = width as usize * height as usize;

    match encoding {
        ColorEncoding::Rgb8 => {
            if data.len() != pixels * 3 {
                return Err(mismatch("rgb8", width, height, pixels * 3, data.len()));
            }
            RgbImage::from_raw(width, height, data.to_vec())
                .ok_or_else(|| mismatch("rgb8", width, height, pixels * 3, data.len()))
        }
        ColorEncoding::Rgba8 => {
            if data.len() != pixels * 4 {
                return Err(mismatch("rgba8", width, height, pixels * 4, data.len()));
            }
            let rgb = data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .ok_or_else(|| mismatch("rgba8", width, height, pixels * 4, data.len()))
        }
        ColorEncoding::I420 | ColorEncoding::Yv12 => {
            let expected = yuv420_len(width, height);
            if data.len() < expected {
                let name = if encoding == ColorEncoding::I420 { "i420" } else { "yv12" };
                return Err(mismatch(name, width, height, expected, data.len()));
            }
            let (cw, ch) = chroma_dims(width, height);
            let (y_plane, rest) = data.split_at(pixels);
            let (first, rest) = rest.split_at(cw * ch);
            let second = &rest[..cw * ch];
            let (u_plane, v_plane) = if encoding == ColorEncoding::I420 {
                (first, second)
            } else {
                (second, first)
            };
            Ok(RgbImage::from_fn(width, height, |x, y| {
                let luma = y_plane[y as usize * width as usize + x as usize];
                let c = (y as usize / 2) * cw + x as usize / 2;
                image::Rgb(yuv_to_rgb(luma, u_plane[c], v_plane[c]))
            }))
        }
        ColorEncoding::Auto => {
            let detected = detect_encoding(data.len(), width, height)?;
            normalize_color(data, width, height, detected)
        }
    }
}

/// Full-range BT.601 YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344136 * u - 0.714136 * v;
    let b = y + 1.772 * u;
    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Convert a raw depth buffer to meters.
///
/// Zero, negative and non-finite results become
/// [`INVALID_DEPTH`](voxfuse_data::INVALID_DEPTH).
pub fn normalize_depth(
    data: &[u8],
    width: u32,
    height: u32,
    encoding: DepthEncoding,
    scale: f32,
) -> Result<DepthBuffer, NormalizeError> {
    if width == 0 || height == 0 {
        return Err(NormalizeError::EmptyImage);
    }
    let pixels = width as usize * height as usize;
    let expected = pixels * encoding.bytes_per_sample();
    if data.len() != expected {
        let name = match encoding {
            DepthEncoding::U8 => "depth u8",
            DepthEncoding::U16 => "depth u16",
            DepthEncoding::F32 => "depth f32",
        };
        return Err(mismatch(name, width, height, expected, data.len()));
    }

    let samples: Vec<f32> = match encoding {
        DepthEncoding::U8 => data.iter().map(|&d| d as f32 * scale).collect(),
        DepthEncoding::U16 => data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32 * scale)
            .collect(),
        DepthEncoding::F32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) * scale)
            .collect(),
    };

    DepthBuffer::new(width, height, samples)
        .map_err(|_| mismatch("depth", width, height, expected, data.len()))
}

/// Resample `depth` to the color resolution. Intrinsics always refer to the
/// color image.
pub fn align_depth(depth: &DepthBuffer, width: u32, height: u32) -> DepthBuffer {
    if depth.dimensions() == (width, height) {
        return depth.clone();
    }
    depth.resize_nearest(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxfuse_data::INVALID_DEPTH;

    // Inverse of `yuv_to_rgb`, used to build flat-color fixtures.
    fn rgb_to_yuv([r, g, b]: [u8; 3]) -> [u8; 3] {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        let u = (b - y) / 1.772 + 128.0;
        let v = (r - y) / 1.402 + 128.0;
        [clamp_u8(y), clamp_u8(u), clamp_u8(v)]
    }

    fn flat_yuv(width: u32, height: u32, rgb: [u8; 3], padding: usize, yv12: bool) -> Vec<u8> {
        let [y, u, v] = rgb_to_yuv(rgb);
        let (cw, ch) = chroma_dims(width, height);
        let mut data = vec![y; (width * height) as usize];
        let (first, second) = if yv12 { (v, u) } else { (u, v) };
        data.extend(std::iter::repeat_n(first, cw * ch));
        data.extend(std::iter::repeat_n(second, cw * ch));
        data.extend(std::iter::repeat_n(0xAB, padding));
        data
    }

    fn close(a: [u8; 3], b: [u8; 3], tol: i16) -> bool {
        a.iter().zip(b).all(|(x, y)| (*x as i16 - y as i16).abs() <= tol)
    }

    #[test]
    fn test_flat_colors_round_trip_through_i420_and_yv12() {
        for rgb in [[200, 30, 40], [20, 220, 90], [128, 128, 128], [0, 0, 0], [255, 255, 255]] {
            for yv12 in [false, true] {
                let encoding = if yv12 { ColorEncoding::Yv12 } else { ColorEncoding::I420 };
                let data = flat_yuv(6, 4, rgb, 0, yv12);
                let img = normalize_color(&data, 6, 4, encoding).unwrap();
                for px in img.pixels() {
                    assert!(close(px.0, rgb, 3), "{:?} vs {:?}", px.0, rgb);
                }
            }
        }
    }

    #[test]
    fn test_yuv_ignores_trailing_padding() {
        let data = flat_yuv(4, 4, [10, 200, 10], 37, false);
        let img = normalize_color(&data, 4, 4, ColorEncoding::I420).unwrap();
        assert!(close(img.get_pixel(3, 3).0, [10, 200, 10], 3));
    }

    #[test]
    fn test_odd_dimensions_use_rounded_up_chroma() {
        let data = flat_yuv(5, 3, [90, 90, 200], 0, false);
        assert_eq!(data.len(), 15 + 2 * 3 * 2);
        let img = normalize_color(&data, 5, 3, ColorEncoding::I420).unwrap();
        assert!(close(img.get_pixel(4, 2).0, [90, 90, 200], 3));
    }

    #[test]
    fn test_short_yuv_is_rejected() {
        let data = vec![0u8; 10];
        let err = normalize_color(&data, 4, 4, ColorEncoding::I420).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedEncoding { expected: 24, actual: 10, .. }));
    }

    #[test]
    fn test_direct_encodings_require_exact_length() {
        let rgb = vec![7u8; 2 * 2 * 3];
        assert!(normalize_color(&rgb, 2, 2, ColorEncoding::Rgb8).is_ok());
        let mut long = rgb.clone();
        long.push(0);
        assert!(normalize_color(&long, 2, 2, ColorEncoding::Rgb8).is_err());

        let rgba: Vec<u8> = (0..16).collect();
        let img = normalize_color(&rgba, 2, 2, ColorEncoding::Rgba8).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6]);
    }

    #[test]
    fn test_auto_detects_from_length() {
        let (w, h) = (4u32, 4u32);
        let rgb: Vec<u8> = vec![9; (w * h * 3) as usize];
        let img = normalize_color(&rgb, w, h, ColorEncoding::Auto).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [9, 9, 9]);

        let rgba: Vec<u8> = (0..w * h).flat_map(|_| [1, 2, 3, 255]).collect();
        let img = normalize_color(&rgba, w, h, ColorEncoding::Auto).unwrap();
        assert_eq!(img.get_pixel(2, 2).0, [1, 2, 3]);

        let yuv = flat_yuv(w, h, [128, 128, 128], 5, false);
        let img = normalize_color(&yuv, w, h, ColorEncoding::Auto).unwrap();
        assert!(close(img.get_pixel(0, 0).0, [128, 128, 128], 2));

        assert!(normalize_color(&[0u8; 3], w, h, ColorEncoding::Auto).is_err());
    }

    #[test]
    fn test_depth_u16_scaled_to_meters() {
        let raw: Vec<u8> = [1000u16, 0, 2500, 65535]
            .iter()
            .flat_map(|d| d.to_le_bytes())
            .collect();
        let depth = normalize_depth(&raw, 2, 2, DepthEncoding::U16, 0.001).unwrap();
        assert!((depth.as_slice()[0] - 1.0).abs() < 1e-6);
        assert_eq!(depth.as_slice()[1], INVALID_DEPTH);
        assert!((depth.as_slice()[2] - 2.5).abs() < 1e-6);
        assert!((depth.as_slice()[3] - 65.535).abs() < 1e-3);
    }

    #[test]
    fn test_depth_f32_sanitizes_invalid_samples() {
        let raw: Vec<u8> = [0.5f32, f32::NAN, -1.0, f32::INFINITY]
            .iter()
            .flat_map(|d| d.to_le_bytes())
            .collect();
        let depth = normalize_depth(&raw, 4, 1, DepthEncoding::F32, 1.0).unwrap();
        assert_eq!(depth.as_slice(), &[0.5, INVALID_DEPTH, INVALID_DEPTH, INVALID_DEPTH]);
    }

    #[test]
    fn test_depth_size_mismatch() {
        let err = normalize_depth(&[0u8; 7], 2, 2, DepthEncoding::U16, 1.0).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedEncoding { expected: 8, actual: 7, .. }));
    }

    #[test]
    fn test_align_depth_to_color_resolution() {
        let depth = DepthBuffer::from_fn(2, 2, |x, y| 1.0 + x as f32 + 2.0 * y as f32);
        let aligned = align_depth(&depth, 4, 4);
        assert_eq!(aligned.dimensions(), (4, 4));
        assert_eq!(aligned.get(0, 0), Some(1.0));
        assert_eq!(aligned.get(3, 0), Some(2.0));
        assert_eq!(aligned.get(0, 3), Some(3.0));
        assert_eq!(aligned.get(3, 3), Some(4.0));
    }
}
