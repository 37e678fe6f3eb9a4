use bytes::Bytes;
use image::DynamicImage;

use crate::helpers::{BwError, DecodeContext};
use crate::tile::{ColourTexture, Raster};

/// Vertex grid edge length of a terrain tile on the GPU.
pub const N_EDGE_VERTICES: u32 = 65;

/// Decodes a height tile. Accepts 16-bit grayscale PNGs directly and the
/// RG-packed 8-bit encoding (height = r << 8 | g) some servers use.
pub fn decode_height(bytes: &Bytes) -> Result<Raster<u16>, BwError> {
    let image = image::load_from_memory(bytes).decoding("height tile")?;
    let (width, height) = (image.width(), image.height());
    if width < 2 || width != height {
        return Err(BwError::Decode(format!(
            "Height tile must be square, got {width}x{height}"
        )));
    }
    let data: Vec<u16> = match image {
        DynamicImage::ImageLuma16(buf) => buf.into_raw(),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().map(|p| p.0[0]).collect(),
        other => {
            let rgba = other.to_rgba8();
            rgba.pixels()
                .map(|p| ((p.0[0] as u16) << 8) | p.0[1] as u16)
                .collect()
        }
    };
    Raster::from_vec(width, height, data)
        .ok_or_else(|| BwError::Decode("Height raster size mismatch".into()))
}

/// Decodes a height tile and snaps it onto the vertex grid.
pub fn decode_height_for_gpu(bytes: &Bytes) -> Result<Raster<u16>, BwError> {
    Ok(decode_height(bytes)?.resampled(N_EDGE_VERTICES))
}

/// Decodes an ortho imagery tile (JPEG in production, any format the
/// image crate knows) into RGBA8.
pub fn decode_ortho(bytes: &Bytes) -> Result<ColourTexture, BwError> {
    let image = image::load_from_memory(bytes).decoding("ortho tile")?;
    let rgba = image.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    ColourTexture::new(width, height, rgba.into_raw())
        .ok_or_else(|| BwError::Decode("Ortho texture size mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use std::io::Cursor;

    fn png_bytes_gray16(size: u32) -> Bytes {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(size, size, |x, y| Luma([(x * 100 + y) as u16]));
        let mut out = Vec::new();
        DynamicImage::ImageLuma16(buf)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    fn png_bytes_rgb8(size: u32) -> Bytes {
        let buf: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(size, size, |x, _| Rgb([x as u8, 7, 0]));
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(buf)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    #[test]
    fn gray16_heights_pass_through() {
        let raster = decode_height(&png_bytes_gray16(65)).unwrap();
        assert_eq!(raster.width(), 65);
        assert_eq!(raster.pixel(3, 2), 302);
    }

    #[test]
    fn rg_packed_heights_are_recombined() {
        let raster = decode_height(&png_bytes_rgb8(8)).unwrap();
        assert_eq!(raster.pixel(5, 0), (5u16 << 8) | 7);
    }

    #[test]
    fn oversized_heights_snap_to_the_vertex_grid() {
        let raster = decode_height_for_gpu(&png_bytes_gray16(256)).unwrap();
        assert_eq!(raster.width(), N_EDGE_VERTICES);
        assert_eq!(raster.height(), N_EDGE_VERTICES);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let junk = Bytes::from_static(b"definitely not a png");
        assert!(matches!(decode_height(&junk), Err(BwError::Decode(_))));
        assert!(matches!(decode_ortho(&junk), Err(BwError::Decode(_))));
    }

    #[test]
    fn ortho_decodes_to_rgba8() {
        let tex = decode_ortho(&png_bytes_rgb8(16)).unwrap();
        assert_eq!(tex.width(), 16);
        assert_eq!(tex.n_bytes(), 16 * 16 * 4);
        assert_eq!(tex.data()[4 * 5], 5); // r channel of pixel x=5
    }
}
