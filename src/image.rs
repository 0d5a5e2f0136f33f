// image.rs — Runtime-sized image container, generic over pixel type.
//
// Every kernel in this crate reads a source "texture" and writes a
// destination "texture". On the GPU those are typed resources behind a
// sampler; here they are `Image<T>` values with the sampler semantics
// reproduced in software:
//
//   GPU                               CPU (this file)
//   ─────────────────────────────     ─────────────────────────────────
//   Texture2D.Load(int2)              fetch_clamped(img, x, y)
//   SampleLevel(linear clamp, uv)     sample_bilinear(img, u, v)
//   RWTexture2D[uint2] = value        Image::set(x, y, value)
//
// The kernels always work in normalized RGBA floats (`Rgba`). Storage can
// be any `Pixel` type — 8-bit UNORM frames convert on read and on write,
// which mirrors how an R8G8B8A8_UNORM render target behaves.
//
// NEW RUST CONCEPTS:
// - bytemuck `Pod` / `Zeroable` derives on `#[repr(C)]` pixel structs, so an
//   `Image<Rgba>` buffer can be viewed as `&[f32]` without copying.
// - Trait with associated conversion functions (Pixel)
// - Lifetime-free `impl Iterator` return types

use std::fmt;

use bytemuck::{Pod, Zeroable};

// ---------------------------------------------------------------------------
// Rgba / Rgba8
// ---------------------------------------------------------------------------

/// A normalized floating-point RGBA sample.
///
/// SDR and PQ content lives in [0, 1]. Scene-linear HDR content may exceed
/// 1.0 (the recommended range is [0, 12.5], where 1.0 is 80 nits).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Rgba { r, g, b, a }
    }

    /// Opaque gray with all three color channels equal to `v`.
    #[inline]
    pub const fn gray(v: f32) -> Self {
        Rgba { r: v, g: v, b: v, a: 1.0 }
    }

    /// The color channels as an array, alpha dropped.
    #[inline]
    pub fn rgb(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Add the same offset to all three color channels. Alpha is untouched.
    #[inline]
    pub fn offset_rgb(self, delta: f32) -> Self {
        Rgba { r: self.r + delta, g: self.g + delta, b: self.b + delta, a: self.a }
    }

    /// Multiply all three color channels by `factor`. Alpha is untouched.
    #[inline]
    pub fn scale_rgb(self, factor: f32) -> Self {
        Rgba { r: self.r * factor, g: self.g * factor, b: self.b * factor, a: self.a }
    }

    /// Component-wise linear interpolation (all four channels).
    #[inline]
    pub fn lerp(self, other: Rgba, t: f32) -> Self {
        Rgba {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }
}

/// An 8-bit UNORM RGBA sample, the layout of an R8G8B8A8 swapchain image.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8(pub [u8; 4]);

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------
// Any type that implements Pixel can be stored in an Image and read by the
// kernels. The conversion is always through normalized `Rgba`:
//
//   Send + Sync — thread-groups run on rayon workers and share the source
//                 image by reference.
//   'static     — rules out borrowed pixel types.

/// Trait for types that can serve as pixel values in an Image.
pub trait Pixel: Copy + Default + Send + Sync + 'static {
    /// Convert this pixel to normalized RGBA.
    fn to_rgba(self) -> Rgba;

    /// Construct a pixel from normalized RGBA (with clamping/rounding where
    /// the storage type needs it).
    fn from_rgba(c: Rgba) -> Self;
}

impl Pixel for Rgba {
    #[inline]
    fn to_rgba(self) -> Rgba {
        self
    }

    #[inline]
    fn from_rgba(c: Rgba) -> Self {
        c
    }
}

impl Pixel for Rgba8 {
    #[inline]
    fn to_rgba(self) -> Rgba {
        let [r, g, b, a] = self.0;
        Rgba::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    #[inline]
    fn from_rgba(c: Rgba) -> Self {
        // UNORM stores saturate, exactly like a GPU write to an 8-bit target.
        let q = |v: f32| (v * 255.0).clamp(0.0, 255.0).round() as u8;
        Rgba8([q(c.r), q(c.g), q(c.b), q(c.a)])
    }
}

impl Pixel for f32 {
    /// A single-channel float image is read as opaque gray.
    #[inline]
    fn to_rgba(self) -> Rgba {
        Rgba::gray(self)
    }

    /// Writing RGBA into a single channel keeps the BT.709 luma.
    #[inline]
    fn from_rgba(c: Rgba) -> Self {
        crate::luma::luma_linear(c.rgb())
    }
}

impl Pixel for u8 {
    #[inline]
    fn to_rgba(self) -> Rgba {
        Rgba::gray(self as f32 / 255.0)
    }

    #[inline]
    fn from_rgba(c: Rgba) -> Self {
        (crate::luma::luma_linear(c.rgb()) * 255.0).clamp(0.0, 255.0).round() as u8
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------
// Row-major, contiguous buffer with explicit stride.
//
// Memory layout (stride = 5, width = 4):
//
//   data index:  0  1  2  3 [4]  5  6  7  8 [9] 10 11 12 13 [14]
//   pixel:       ■  ■  ■  ■  ·   ■  ■  ■  ■  ·   ■  ■  ■  ■  ·
//   row:         |--- row 0 ---|  |--- row 1 ---|  |--- row 2 ---|
//
// Stride padding matches the row pitch of a mapped GPU texture, so a
// readback can be wrapped without repacking.

/// A 2D image with runtime dimensions, generic over pixel type `T`.
pub struct Image<T: Pixel> {
    /// Pixel data in row-major order. Length = height * stride.
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in *elements* (not bytes). stride >= width.
    stride: usize,
}

impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    // --- Constructors ---

    /// Create a zero-initialized image with the given dimensions.
    pub fn new(width: usize, height: usize) -> Self {
        Self::new_with_stride(width, height, width)
    }

    /// Create a zero-initialized image with an explicit stride.
    ///
    /// # Panics
    /// Panics if `stride < width`.
    pub fn new_with_stride(width: usize, height: usize, stride: usize) -> Self {
        assert!(
            stride >= width,
            "stride ({stride}) must be >= width ({width})"
        );
        Image {
            data: vec![T::default(); height * stride],
            width,
            height,
            stride,
        }
    }

    /// Create an image where every pixel has the same value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Build an image by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image::from_vec(width, height, data)
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Get the pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Get a mutable reference to the pixel at (x, y).
    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    /// Set the pixel at (x, y) to the given value.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row as a slice (stride padding excluded).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    /// Mutable borrow of a single row.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Iterate over all pixels as `(x, y, value)` tuples.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Access the underlying data as a flat slice, stride padding included.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the underlying data.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + Pod> Image<T> {
    /// View the pixel buffer as raw bytes, e.g. for a texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

// Debug formatting — useful for small images in tests.
impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(8) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 8 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sampling — software "linear clamp" sampler
// ---------------------------------------------------------------------------

/// Fetch the texel at integer coordinates, clamping to the image edge.
///
/// Negative and past-the-end coordinates replicate the border texel. This is
/// the only way the tile loaders touch the source, so a tile can never read
/// outside the texture.
///
/// # Panics
/// Panics if the image is empty.
#[inline]
pub fn fetch_clamped<T: Pixel>(img: &Image<T>, x: i64, y: i64) -> Rgba {
    assert!(img.width() > 0 && img.height() > 0, "cannot fetch from an empty image");
    let cx = x.clamp(0, img.width() as i64 - 1) as usize;
    let cy = y.clamp(0, img.height() as i64 - 1) as usize;
    // SAFETY: cx < width and cy < height after clamping.
    unsafe { img.get_unchecked(cx, cy).to_rgba() }
}

/// Bilinear sample at normalized texture coordinates with clamp addressing.
///
/// Texel `i` covers [i/w, (i+1)/w), so its center is at `(i + 0.5) / w`.
/// Sampling exactly at a texel center returns that texel.
///
/// # Panics
/// Panics if the image is empty.
pub fn sample_bilinear<T: Pixel>(img: &Image<T>, u: f32, v: f32) -> Rgba {
    assert!(img.width() > 0 && img.height() > 0, "cannot sample an empty image");

    let x = u * img.width() as f32 - 0.5;
    let y = v * img.height() as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = fetch_clamped(img, x0, y0);
    let p10 = fetch_clamped(img, x0 + 1, y0);
    let p01 = fetch_clamped(img, x0, y0 + 1);
    let p11 = fetch_clamped(img, x0 + 1, y0 + 1);

    let top = p00.lerp(p10, fx);
    let bottom = p01.lerp(p11, fx);
    top.lerp(bottom, fy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rgba() {
        let img: Image<Rgba> = Image::new(10, 5);
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 5);
        assert_eq!(img.stride(), 10);
        for (_, _, v) in img.pixels() {
            assert_eq!(v, Rgba::default());
        }
    }

    #[test]
    fn test_roundtrip() {
        let mut img: Image<u8> = Image::new(4, 3);
        img.set(0, 0, 10);
        img.set(3, 2, 255);
        assert_eq!(img.get(0, 0), 10);
        assert_eq!(img.get(3, 2), 255);
        assert_eq!(img.get(2, 2), 0);
    }

    #[test]
    fn test_from_fn_layout() {
        let img = Image::from_fn(3, 2, |x, y| (x + 10 * y) as f32);
        assert_eq!(img.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(img.row(1), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_rgba8_conversion_saturates() {
        let px = Rgba8::from_rgba(Rgba::new(-0.2, 0.5, 1.7, 1.0));
        assert_eq!(px, Rgba8([0, 128, 255, 255]));
        let back = px.to_rgba();
        assert!((back.g - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_fetch_clamped_replicates_border() {
        let img = Image::from_fn(3, 3, |x, y| (x + 3 * y) as f32);
        assert_eq!(fetch_clamped(&img, -5, -5).r, 0.0);
        assert_eq!(fetch_clamped(&img, 10, 0).r, 2.0);
        assert_eq!(fetch_clamped(&img, 1, 99).r, 7.0);
    }

    #[test]
    fn test_bilinear_at_texel_center() {
        let img = Image::from_fn(4, 4, |x, y| (x * 4 + y) as f32);
        let c = sample_bilinear(&img, 2.5 / 4.0, 1.5 / 4.0);
        assert!((c.r - img.get(2, 1)).abs() < 1e-4);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = Image::from_vec(2, 2, vec![0.0f32, 10.0, 20.0, 30.0]);
        // u = v = 0.5 sits exactly between the four texel centers.
        let c = sample_bilinear(&img, 0.5, 0.5);
        assert!((c.r - 15.0).abs() < 1e-5);
    }

    #[test]
    fn test_bilinear_clamps_outside() {
        let img = Image::from_vec(2, 2, vec![1.0f32, 2.0, 3.0, 4.0]);
        assert!((sample_bilinear(&img, -1.0, -1.0).r - 1.0).abs() < 1e-6);
        assert!((sample_bilinear(&img, 2.0, 2.0).r - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_as_bytes_len() {
        let img: Image<Rgba> = Image::new(3, 2);
        assert_eq!(img.as_bytes().len(), 3 * 2 * 16);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let img: Image<u8> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    #[should_panic(expected = "stride")]
    fn test_stride_less_than_width() {
        let _img: Image<u8> = Image::new_with_stride(10, 5, 8);
    }
}
