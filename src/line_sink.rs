//! Destination side of the scan decoder.
//!
//! The decoder hands over each completed raster line exactly once, in
//! increasing line order, through the [`LineSink`] trait. The row memory
//! belongs to the decoder and is only valid for the duration of the call;
//! the sink performs the layout transform into its own storage.

use crate::error::JpeglsError;
use crate::traits::Sample;
use crate::InterleaveMode;

/// Receives decoded raster lines.
///
/// `row` covers the decoder's internal component rows: the sample of
/// component `c` at column `x` is `row[c * stride + 1 + x]` (offset 1 skips
/// the border column used for prediction).
pub trait LineSink<T: Sample> {
    fn accept_line(&mut self, row: &[T], pixel_count: usize, stride: usize)
        -> Result<(), JpeglsError>;
}

/// Line sink that assembles the decoded scan into a caller-provided byte
/// buffer, honouring the scan's interleave mode. For non-interleaved
/// multi-component images one sink per scan is created, each targeting its
/// own plane.
pub struct RasterSink<'a> {
    destination: &'a mut [u8],
    width: usize,
    height: usize,
    component_count: usize,
    interleave_mode: InterleaveMode,
    plane_index: usize,
    line: usize,
}

impl<'a> RasterSink<'a> {
    pub fn new(
        destination: &'a mut [u8],
        width: usize,
        height: usize,
        component_count: usize,
        interleave_mode: InterleaveMode,
        plane_index: usize,
    ) -> Self {
        Self {
            destination,
            width,
            height,
            component_count,
            interleave_mode,
            plane_index,
            line: 0,
        }
    }
}

impl<T: Sample> LineSink<T> for RasterSink<'_> {
    fn accept_line(
        &mut self,
        row: &[T],
        pixel_count: usize,
        stride: usize,
    ) -> Result<(), JpeglsError> {
        debug_assert_eq!(pixel_count, self.width);
        let components = match self.interleave_mode {
            InterleaveMode::None => 1,
            _ => self.component_count,
        };

        let line_samples = pixel_count * components;
        let line_offset = match self.interleave_mode {
            InterleaveMode::None => {
                self.plane_index * self.width * self.height + self.line * line_samples
            }
            _ => self.line * line_samples,
        };
        if (line_offset + line_samples) * T::BYTES > self.destination.len() {
            return Err(JpeglsError::DestinationTooSmall);
        }

        match self.interleave_mode {
            InterleaveMode::None => {
                for x in 0..pixel_count {
                    let offset = (line_offset + x) * T::BYTES;
                    row[1 + x].store(&mut self.destination[offset..]);
                }
            }
            InterleaveMode::Line => {
                for component in 0..components {
                    for x in 0..pixel_count {
                        let offset = (line_offset + component * pixel_count + x) * T::BYTES;
                        row[component * stride + 1 + x].store(&mut self.destination[offset..]);
                    }
                }
            }
            InterleaveMode::Sample => {
                for x in 0..pixel_count {
                    for component in 0..components {
                        let offset = (line_offset + x * components + component) * T::BYTES;
                        row[component * stride + 1 + x].store(&mut self.destination[offset..]);
                    }
                }
            }
        }

        self.line += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_sink_places_lines_into_the_selected_plane() {
        let mut destination = vec![0u8; 2 * 2 * 2]; // two 2x2 planes
        let mut sink = RasterSink::new(&mut destination, 2, 2, 2, InterleaveMode::None, 1);
        // Row layout: border column + samples.
        LineSink::<u8>::accept_line(&mut sink, &[0, 10, 11, 0], 2, 4).unwrap();
        LineSink::<u8>::accept_line(&mut sink, &[0, 12, 13, 0], 2, 4).unwrap();
        assert_eq!(destination, [0, 0, 0, 0, 10, 11, 12, 13]);
    }

    #[test]
    fn line_interleaved_sink_concatenates_component_rows() {
        let mut destination = vec![0u8; 2 * 2 * 2];
        let mut sink = RasterSink::new(&mut destination, 2, 2, 2, InterleaveMode::Line, 0);
        // Two component rows with stride 4.
        LineSink::<u8>::accept_line(&mut sink, &[0, 1, 2, 0, 0, 5, 6, 0], 2, 4).unwrap();
        assert_eq!(&destination[..4], &[1, 2, 5, 6]);
    }

    #[test]
    fn sample_interleaved_sink_interleaves_pixels() {
        let mut destination = vec![0u8; 2 * 2 * 2];
        let mut sink = RasterSink::new(&mut destination, 2, 2, 2, InterleaveMode::Sample, 0);
        LineSink::<u8>::accept_line(&mut sink, &[0, 1, 2, 0, 0, 5, 6, 0], 2, 4).unwrap();
        assert_eq!(&destination[..4], &[1, 5, 2, 6]);
    }

    #[test]
    fn sink_reports_insufficient_room() {
        let mut destination = vec![0u8; 3]; // one byte short of a 2x2 image
        let mut sink = RasterSink::new(&mut destination, 2, 2, 1, InterleaveMode::None, 0);
        LineSink::<u8>::accept_line(&mut sink, &[0, 1, 2, 0], 2, 4).unwrap();
        assert_eq!(
            LineSink::<u8>::accept_line(&mut sink, &[0, 3, 4, 0], 2, 4),
            Err(JpeglsError::DestinationTooSmall)
        );
    }

    #[test]
    fn sixteen_bit_samples_are_stored_native_endian() {
        let mut destination = vec![0u8; 4];
        let mut sink = RasterSink::new(&mut destination, 2, 1, 1, InterleaveMode::None, 0);
        LineSink::<u16>::accept_line(&mut sink, &[0, 0x1234, 0x5678, 0], 2, 4).unwrap();
        assert_eq!(u16::from_ne_bytes([destination[0], destination[1]]), 0x1234);
        assert_eq!(u16::from_ne_bytes([destination[2], destination[3]]), 0x5678);
    }
}
