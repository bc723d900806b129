// buffer.rs — owned 2D pixel sample storage
//
// `ImageBuffer` is the single currency every node consumes and produces:
// a row-major array of u8 samples with width, height and channel count.
// An empty buffer (zero area) is a first-class value — it is how "no
// input connected" and "operation not applicable" propagate through the
// pipeline without errors.

use serde::{Deserialize, Serialize};

/// Row-major u8 sample storage. Channel order is RGB for 3-channel
/// buffers; 1-channel buffers are grayscale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// The empty buffer: zero area, no samples.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled buffer. Returns the empty buffer if any
    /// dimension is zero.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        if width == 0 || height == 0 || channels == 0 {
            return Self::empty();
        }
        ImageBuffer {
            width,
            height,
            channels,
            data: vec![0; width as usize * height as usize * channels as usize],
        }
    }

    /// Wrap raw samples. Returns `None` if the sample count does not
    /// match `width * height * channels`.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * channels as usize {
            return None;
        }
        if width == 0 || height == 0 || channels == 0 {
            return Some(Self::empty());
        }
        Some(ImageBuffer {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Whether `other` has the same width and height (channel count may
    /// differ).
    pub fn same_size(&self, other: &ImageBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// All samples of the pixel at (x, y).
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let o = self.offset(x, y);
        &self.data[o..o + self.channels as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let o = self.offset(x, y);
        let c = self.channels as usize;
        &mut self.data[o..o + c]
    }

    /// A single channel sample at (x, y).
    #[inline]
    pub fn sample(&self, x: u32, y: u32, channel: u8) -> u8 {
        self.data[self.offset(x, y) + channel as usize]
    }

    #[inline]
    pub fn set_sample(&mut self, x: u32, y: u32, channel: u8, value: u8) {
        let o = self.offset(x, y) + channel as usize;
        self.data[o] = value;
    }
}

/// Reflect an out-of-bounds coordinate back into `[0, len)` without
/// repeating the border sample (gfedcb|abcdefgh|gfedcb). `len` must be
/// nonzero; a 1-wide axis always resolves to 0.
pub fn reflect_101(coord: i64, len: u32) -> u32 {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as i64 - 1);
    let mut m = coord % period;
    if m < 0 {
        m += period;
    }
    if m >= len as i64 {
        m = period - m;
    }
    m as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_has_no_samples() {
        let buf = ImageBuffer::empty();
        assert!(buf.is_empty());
        assert_eq!(buf.width(), 0);
        assert_eq!(buf.height(), 0);
        assert_eq!(buf.data().len(), 0);
    }

    #[test]
    fn zero_dimension_collapses_to_empty() {
        assert!(ImageBuffer::new(0, 10, 3).is_empty());
        assert!(ImageBuffer::new(10, 0, 3).is_empty());
        assert!(ImageBuffer::new(10, 10, 0).is_empty());
    }

    #[test]
    fn from_raw_validates_length() {
        assert!(ImageBuffer::from_raw(2, 2, 1, vec![0; 4]).is_some());
        assert!(ImageBuffer::from_raw(2, 2, 1, vec![0; 5]).is_none());
        assert!(ImageBuffer::from_raw(2, 2, 3, vec![0; 12]).is_some());
    }

    #[test]
    fn pixel_indexing_row_major() {
        let mut buf = ImageBuffer::new(3, 2, 3);
        buf.pixel_mut(2, 1).copy_from_slice(&[10, 20, 30]);
        assert_eq!(buf.pixel(2, 1), &[10, 20, 30]);
        assert_eq!(buf.sample(2, 1, 1), 20);
        // Last pixel sits at the end of the data slice
        let len = buf.data().len();
        assert_eq!(&buf.data()[len - 3..], &[10, 20, 30]);
    }

    #[test]
    fn reflect_101_interior_is_identity() {
        for i in 0..8 {
            assert_eq!(reflect_101(i, 8), i as u32);
        }
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        // gfedcb|abcdefgh|gfedcb for len=8
        assert_eq!(reflect_101(-1, 8), 1);
        assert_eq!(reflect_101(-2, 8), 2);
        assert_eq!(reflect_101(8, 8), 6);
        assert_eq!(reflect_101(9, 8), 5);
    }

    #[test]
    fn reflect_101_single_column() {
        assert_eq!(reflect_101(-5, 1), 0);
        assert_eq!(reflect_101(7, 1), 0);
    }

    #[test]
    fn reflect_101_far_out_of_bounds() {
        let v = reflect_101(1000, 8);
        assert!(v < 8);
        let v = reflect_101(-1000, 8);
        assert!(v < 8);
    }
}
