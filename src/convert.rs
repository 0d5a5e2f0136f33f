// convert.rs — Conversions between pixel formats and to/from the `image` crate.
//
// The kernels work on any `Pixel` type, but the post-processor and the
// pipelines pass `Image<Rgba>` between stages. This module moves data in and
// out of that working format:
//
//   PNG file ──► ::image::RgbaImage ──► Image<Rgba8> ──► Image<Rgba>
//                                                            │ stages
//   PNG file ◄── ::image::RgbaImage ◄── Image<Rgba8> ◄───────┘
//
// Note: our own module is also called `image`. Inside this crate the
// external crate is always spelled `::image`.
//
// NEW RUST CONCEPTS:
// - Leading `::` to name an external crate shadowed by a local module.
// - `bytemuck::cast_slice` to view `[Rgba8]` as raw bytes without copying.

use rayon::prelude::*;

use crate::image::{Image, Pixel, Rgba, Rgba8};

/// UNORM 8-bit to normalized float.
pub fn rgba8_to_rgba(src: &Image<Rgba8>) -> Image<Rgba> {
    convert_image(src)
}

/// Normalized float to UNORM 8-bit, saturating and rounding.
pub fn rgba_to_rgba8(src: &Image<Rgba>) -> Image<Rgba8> {
    convert_image(src)
}

/// Generic conversion between any two Pixel types through `Rgba`.
///
/// NOTE ON GENERICS:
/// S and D are both `Pixel`, so each (S, D) pair gets its own monomorphized
/// copy and the `to_rgba`/`from_rgba` calls inline away.
pub fn convert_image<S: Pixel, D: Pixel>(src: &Image<S>) -> Image<D> {
    let width = src.width();
    let mut dst: Image<D> = Image::new(width, src.height());
    if width == 0 {
        return dst;
    }
    dst.as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (out, &px) in row.iter_mut().zip(src.row(y)) {
                *out = D::from_rgba(px.to_rgba());
            }
        });
    dst
}

/// Copy an `image` crate buffer into an `Image<Rgba8>`.
pub fn from_rgba_image(src: &::image::RgbaImage) -> Image<Rgba8> {
    let (w, h) = src.dimensions();
    let pixels: Vec<Rgba8> = src.pixels().map(|p| Rgba8(p.0)).collect();
    Image::from_vec(w as usize, h as usize, pixels)
}

/// Copy an `Image<Rgba8>` into an `image` crate buffer, dropping any stride
/// padding.
pub fn to_rgba_image(src: &Image<Rgba8>) -> ::image::RgbaImage {
    let mut bytes = Vec::with_capacity(src.width() * src.height() * 4);
    for y in 0..src.height() {
        bytes.extend_from_slice(bytemuck::cast_slice(src.row(y)));
    }
    // Length is exactly width * height * 4, so this cannot fail.
    ::image::RgbaImage::from_vec(src.width() as u32, src.height() as u32, bytes)
        .unwrap_or_else(|| ::image::RgbaImage::new(src.width() as u32, src.height() as u32))
}
