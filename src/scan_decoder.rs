//! Scan decoding engine: drives the regular/run state machine of
//! ISO/IEC 14495-1 Annex A over one entropy-coded scan and delivers
//! reconstructed lines to a [`LineSink`].

use crate::bit_reader::BitReader;
use crate::coding_parameters::{CodingParameters, PresetCodingParameters};
use crate::constants::J;
use crate::error::JpeglsError;
use crate::golomb_lut::GOLOMB_LUT;
use crate::line_sink::{LineSink, RasterSink};
use crate::regular_mode_context::RegularModeContext;
use crate::run_mode_context::RunModeContext;
use crate::traits::{
    apply_sign, apply_sign_for_index, bit_wise_sign, sign, CodecTraits, DefaultTraits,
    LosslessTraits, Sample,
};
use crate::{FrameInfo, InterleaveMode};
use log::debug;
use std::marker::PhantomData;

/// Decodes one scan from `source` into `sink`, selecting the sample width
/// and traits implementation that fit the scan parameters. Returns the
/// number of source bytes consumed.
pub(crate) fn decode_into(
    source: &[u8],
    frame_info: FrameInfo,
    pc_parameters: PresetCodingParameters,
    parameters: CodingParameters,
    sink: &mut RasterSink<'_>,
) -> Result<usize, JpeglsError> {
    let maximum_sample_value = pc_parameters.maximum_sample_value;
    let near_lossless = parameters.near_lossless;
    let bits_per_sample = frame_info.bits_per_sample;

    if bits_per_sample <= 8 {
        if near_lossless == 0 && maximum_sample_value == (1 << bits_per_sample) - 1 {
            let traits = LosslessTraits::new(bits_per_sample);
            ScanDecoder::<u8, _>::new(frame_info, pc_parameters, parameters, traits, source)?
                .decode_scan(sink)
        } else {
            let traits = DefaultTraits::new(maximum_sample_value, near_lossless);
            ScanDecoder::<u8, _>::new(frame_info, pc_parameters, parameters, traits, source)?
                .decode_scan(sink)
        }
    } else if near_lossless == 0 && maximum_sample_value == (1 << bits_per_sample) - 1 {
        let traits = LosslessTraits::new(bits_per_sample);
        ScanDecoder::<u16, _>::new(frame_info, pc_parameters, parameters, traits, source)?
            .decode_scan(sink)
    } else {
        let traits = DefaultTraits::new(maximum_sample_value, near_lossless);
        ScanDecoder::<u16, _>::new(frame_info, pc_parameters, parameters, traits, source)?
            .decode_scan(sink)
    }
}

pub struct ScanDecoder<'a, T: Sample, R: CodecTraits> {
    reader: BitReader<'a>,
    traits: R,
    frame_info: FrameInfo,
    parameters: CodingParameters,
    t1: i32,
    t2: i32,
    t3: i32,
    reset_threshold: i32,

    // One context set per component in interleaved scans, a single set
    // otherwise. The run index is per component in line-interleaved scans
    // and shared (slot 0) in sample-interleaved scans.
    regular_contexts: Vec<Vec<RegularModeContext>>,
    run_contexts: Vec<[RunModeContext; 2]>,
    run_index: Vec<usize>,

    _sample: PhantomData<T>,
}

impl<'a, T: Sample, R: CodecTraits> ScanDecoder<'a, T, R> {
    pub fn new(
        frame_info: FrameInfo,
        pc_parameters: PresetCodingParameters,
        parameters: CodingParameters,
        traits: R,
        source: &'a [u8],
    ) -> Result<Self, JpeglsError> {
        let component_count = if parameters.interleave_mode == InterleaveMode::None {
            1
        } else {
            frame_info.component_count as usize
        };

        let range = traits.range();
        let regular_contexts =
            (0..component_count).map(|_| vec![RegularModeContext::new(range); 365]).collect();
        let run_contexts = (0..component_count)
            .map(|_| [RunModeContext::new(0, range), RunModeContext::new(1, range)])
            .collect();

        debug!(
            "scan decode: {}x{} components={} bits={} near={} interleave={:?}",
            frame_info.width,
            frame_info.height,
            frame_info.component_count,
            frame_info.bits_per_sample,
            parameters.near_lossless,
            parameters.interleave_mode
        );

        Ok(Self {
            reader: BitReader::new(source)?,
            traits,
            frame_info,
            parameters,
            t1: pc_parameters.threshold1,
            t2: pc_parameters.threshold2,
            t3: pc_parameters.threshold3,
            reset_threshold: pc_parameters.reset_value,
            regular_contexts,
            run_contexts,
            run_index: vec![0; component_count],
            _sample: PhantomData,
        })
    }

    /// Decodes all lines of the scan, verifies the scan trailer and returns
    /// the number of source bytes consumed.
    pub fn decode_scan(&mut self, sink: &mut impl LineSink<T>) -> Result<usize, JpeglsError> {
        self.decode_lines(sink)?;
        self.reader.finalize()?;
        Ok(self.reader.current_byte_position())
    }

    fn decode_lines(&mut self, sink: &mut impl LineSink<T>) -> Result<(), JpeglsError> {
        let width = self.frame_info.width as usize;
        let height = self.frame_info.height as usize;
        let pixel_stride = width + 2;
        let component_count = self.regular_contexts.len();

        // Two rows per component; the row above the first line is all
        // zeros, which seeds Ra/Rb/Rc/Rd per the standard.
        let mut line_buffer: Vec<T> = vec![T::default(); 2 * component_count * pixel_stride];

        for line in 0..height {
            let (top, bottom) = line_buffer.split_at_mut(component_count * pixel_stride);
            let (previous, current) =
                if line & 1 == 1 { (bottom, top) } else { (top, bottom) };

            match self.parameters.interleave_mode {
                InterleaveMode::None | InterleaveMode::Line => {
                    for component in 0..component_count {
                        let previous_row = &mut previous[component * pixel_stride..][..pixel_stride];
                        let current_row = &mut current[component * pixel_stride..][..pixel_stride];
                        // Rd of the last column is Rb; the virtual sample
                        // west of column 0 is the sample north of it.
                        previous_row[width + 1] = previous_row[width];
                        current_row[0] = previous_row[1];
                        self.decode_component_line(component, previous_row, current_row, width)?;
                    }
                }
                InterleaveMode::Sample => {
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        previous[row + width + 1] = previous[row + width];
                        current[row] = previous[row + 1];
                    }
                    self.decode_pixel_interleaved_line(previous, current, width, pixel_stride)?;
                }
            }

            sink.accept_line(current, width, pixel_stride)?;
        }
        Ok(())
    }

    fn decode_component_line(
        &mut self,
        component: usize,
        previous: &[T],
        current: &mut [T],
        width: usize,
    ) -> Result<(), JpeglsError> {
        let mut index = 1;
        let mut rb = previous[0].to_i32();
        let mut rd = previous[1].to_i32();

        while index <= width {
            let ra = current[index - 1].to_i32();
            let rc = rb;
            rb = rd;
            rd = previous[index + 1].to_i32();

            let qs = self.context_id(
                self.quantize_gradient(rd - rb),
                self.quantize_gradient(rb - rc),
                self.quantize_gradient(rc - ra),
            );
            if qs != 0 {
                let value = self.decode_regular(component, qs, predicted_value(ra, rb, rc))?;
                current[index] = T::from_i32(value);
                index += 1;
            } else {
                index += self.decode_run_mode(component, index, previous, current, width)?;
                if index <= width {
                    rb = previous[index - 1].to_i32();
                    rd = previous[index].to_i32();
                }
            }
        }
        Ok(())
    }

    fn decode_pixel_interleaved_line(
        &mut self,
        previous: &[T],
        current: &mut [T],
        width: usize,
        pixel_stride: usize,
    ) -> Result<(), JpeglsError> {
        let component_count = self.regular_contexts.len();
        let mut ra = vec![0i32; component_count];
        let mut rb = vec![0i32; component_count];
        let mut rc = vec![0i32; component_count];
        let mut rd = vec![0i32; component_count];
        let mut qs = vec![0i32; component_count];

        for component in 0..component_count {
            rb[component] = previous[component * pixel_stride].to_i32();
            rd[component] = previous[component * pixel_stride + 1].to_i32();
        }

        let mut index = 1;
        while index <= width {
            let mut all_zero = true;
            for component in 0..component_count {
                let row = component * pixel_stride;
                ra[component] = current[row + index - 1].to_i32();
                rc[component] = rb[component];
                rb[component] = rd[component];
                rd[component] = previous[row + index + 1].to_i32();

                qs[component] = self.context_id(
                    self.quantize_gradient(rd[component] - rb[component]),
                    self.quantize_gradient(rb[component] - rc[component]),
                    self.quantize_gradient(rc[component] - ra[component]),
                );
                if qs[component] != 0 {
                    all_zero = false;
                }
            }

            if !all_zero {
                for component in 0..component_count {
                    let value = self.decode_regular(
                        component,
                        qs[component],
                        predicted_value(ra[component], rb[component], rc[component]),
                    )?;
                    current[component * pixel_stride + index] = T::from_i32(value);
                }
                index += 1;
            } else {
                // Run mode spans whole pixels: every component repeats its
                // own Ra. The run length is coded once, with the shared
                // run index.
                let remaining = width - index + 1;
                let run_length = self.decode_run_length(0, remaining)?;
                for component in 0..component_count {
                    let row = component * pixel_stride;
                    let repeated = current[row + index - 1];
                    for i in 0..run_length {
                        current[row + index + i] = repeated;
                    }
                }
                index += run_length;

                if run_length != remaining {
                    // One interruption sample per component, each choosing
                    // its run context from its own Ra/Rb neighbors.
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        let ra_value = current[row + index - 1].to_i32();
                        let rb_value = previous[row + index].to_i32();
                        let value =
                            self.decode_run_interruption_pixel(component, ra_value, rb_value, 0)?;
                        current[row + index] = T::from_i32(value);
                    }
                    self.decrement_run_index(0);
                    index += 1;
                }

                if index <= width {
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        rb[component] = previous[row + index - 1].to_i32();
                        rd[component] = previous[row + index].to_i32();
                    }
                }
            }
        }
        Ok(())
    }

    fn decode_regular(
        &mut self,
        component: usize,
        qs: i32,
        predicted: i32,
    ) -> Result<i32, JpeglsError> {
        let sign = bit_wise_sign(qs);
        let context_index = apply_sign_for_index(qs, sign);

        let (k, context_c) = {
            let context = &self.regular_contexts[component][context_index];
            (context.golomb_coding_parameter()?, context.c())
        };
        let predicted_value = self.traits.correct_prediction(predicted + apply_sign(context_c, sign));

        let code = GOLOMB_LUT[k as usize][self.reader.peek_byte()? as usize];
        let mut error_value = if code.bit_count != 0 {
            self.reader.skip(i32::from(code.bit_count));
            unmap_error_value(i32::from(code.mapped_value))
        } else {
            let value = unmap_error_value(self.decode_mapped_value(k, self.traits.limit())?);
            if value.abs() > 65535 {
                return Err(JpeglsError::InvalidCompressedData);
            }
            value
        };

        if k == 0 {
            error_value ^= self.regular_contexts[component][context_index]
                .error_correction(self.parameters.near_lossless);
        }
        self.regular_contexts[component][context_index].update_variables_and_bias(
            error_value,
            self.parameters.near_lossless,
            self.reset_threshold,
        )?;

        error_value = apply_sign(error_value, sign);
        Ok(self.traits.compute_reconstructed_sample(predicted_value, error_value))
    }

    /// Reads a Golomb code word: unary prefix plus `k` remainder bits, or
    /// the escape form (`qbpp` bits plus one) when the prefix reaches the
    /// length limit.
    fn decode_mapped_value(&mut self, k: i32, limit: i32) -> Result<i32, JpeglsError> {
        let high_bits = self.reader.read_high_bits()?;
        if high_bits >= limit - (self.traits.qbpp() + 1) {
            return Ok(self.reader.read_value(self.traits.qbpp())? + 1);
        }
        if k == 0 {
            return Ok(high_bits);
        }
        Ok((high_bits << k) + self.reader.read_value(k)?)
    }

    fn decode_run_mode(
        &mut self,
        component: usize,
        start_index: usize,
        previous: &[T],
        current: &mut [T],
        width: usize,
    ) -> Result<usize, JpeglsError> {
        let ra = current[start_index - 1];
        let remaining = width - start_index + 1;
        let run_length = self.decode_run_length(component, remaining)?;
        for i in 0..run_length {
            current[start_index + i] = ra;
        }
        if run_length == remaining {
            return Ok(run_length);
        }

        let interruption_index = start_index + run_length;
        let rb = previous[interruption_index].to_i32();
        let value = self.decode_run_interruption_pixel(component, ra.to_i32(), rb, component)?;
        current[interruption_index] = T::from_i32(value);
        self.decrement_run_index(component);
        Ok(run_length + 1)
    }

    /// Decodes a run length of up to `pixel_count` pixels: each 1 bit
    /// stands for 2^J[run index] pixels (capped by the end of the line), a
    /// 0 bit terminates the run and is followed by J[run index] tail bits.
    fn decode_run_length(
        &mut self,
        run_index_slot: usize,
        pixel_count: usize,
    ) -> Result<usize, JpeglsError> {
        let mut length = 0;
        while self.reader.read_bit()? {
            let full = 1usize << J[self.run_index[run_index_slot]];
            let count = full.min(pixel_count - length);
            length += count;
            if count == full {
                self.increment_run_index(run_index_slot);
            }
            if length == pixel_count {
                return Ok(length);
            }
        }

        let tail_bits = J[self.run_index[run_index_slot]];
        if tail_bits > 0 {
            length += self.reader.read_value(tail_bits)? as usize;
        }
        if length > pixel_count {
            return Err(JpeglsError::InvalidCompressedData);
        }
        Ok(length)
    }

    fn decode_run_interruption_pixel(
        &mut self,
        component: usize,
        ra: i32,
        rb: i32,
        run_index_slot: usize,
    ) -> Result<i32, JpeglsError> {
        if self.traits.is_near(ra, rb) {
            let error_value = self.decode_run_interruption_error(component, 1, run_index_slot)?;
            Ok(self.traits.compute_reconstructed_sample(ra, error_value))
        } else {
            let error_value = self.decode_run_interruption_error(component, 0, run_index_slot)?;
            Ok(self.traits.compute_reconstructed_sample(rb, error_value * sign(rb - ra)))
        }
    }

    fn decode_run_interruption_error(
        &mut self,
        component: usize,
        context_index: usize,
        run_index_slot: usize,
    ) -> Result<i32, JpeglsError> {
        let (k, run_interruption_type) = {
            let context = &self.run_contexts[component][context_index];
            (context.golomb_coding_parameter()?, context.run_interruption_type())
        };
        let limit = self.traits.limit() - J[self.run_index[run_index_slot]] - 1;
        let e_mapped_error_value = self.decode_mapped_value(k, limit)?;
        let error_value = self.run_contexts[component][context_index]
            .decode_error_value(e_mapped_error_value + run_interruption_type, k);
        self.run_contexts[component][context_index].update_variables(
            error_value,
            e_mapped_error_value,
            self.reset_threshold,
        );
        Ok(error_value)
    }

    fn quantize_gradient(&self, di: i32) -> i32 {
        let near = self.parameters.near_lossless;
        if di <= -self.t3 {
            -4
        } else if di <= -self.t2 {
            -3
        } else if di <= -self.t1 {
            -2
        } else if di < -near {
            -1
        } else if di <= near {
            0
        } else if di < self.t1 {
            1
        } else if di < self.t2 {
            2
        } else if di < self.t3 {
            3
        } else {
            4
        }
    }

    fn context_id(&self, q1: i32, q2: i32, q3: i32) -> i32 {
        (q1 * 9 + q2) * 9 + q3
    }

    fn increment_run_index(&mut self, slot: usize) {
        if self.run_index[slot] < 31 {
            self.run_index[slot] += 1;
        }
    }

    fn decrement_run_index(&mut self, slot: usize) {
        if self.run_index[slot] > 0 {
            self.run_index[slot] -= 1;
        }
    }
}

/// Median edge predictor (code segment A.4), written with the sign trick
/// that replaces the min/max comparisons.
pub(crate) fn predicted_value(ra: i32, rb: i32, rc: i32) -> i32 {
    let sign = bit_wise_sign(rb - ra);
    if (sign ^ (rc - ra)) < 0 {
        return rb;
    }
    if (sign ^ (rb - rc)) < 0 {
        return ra;
    }
    ra + rb - rc
}

fn unmap_error_value(mapped_value: i32) -> i32 {
    let sign = mapped_value << 31 >> 31;
    sign ^ (mapped_value >> 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_predictor_selects_edge() {
        // Rc >= max(Ra, Rb): predict min.
        assert_eq!(predicted_value(10, 20, 25), 10);
        // Rc <= min(Ra, Rb): predict max.
        assert_eq!(predicted_value(10, 20, 5), 20);
        // Otherwise: planar prediction.
        assert_eq!(predicted_value(10, 20, 15), 15);
        // Symmetry in Ra/Rb.
        assert_eq!(predicted_value(20, 10, 25), 10);
        assert_eq!(predicted_value(20, 10, 5), 20);
    }

    #[test]
    fn unmap_inverts_the_standard_error_mapping() {
        for error in -300..=300 {
            let mapped = if error >= 0 { 2 * error } else { -2 * error - 1 };
            assert_eq!(unmap_error_value(mapped), error);
        }
    }
}
