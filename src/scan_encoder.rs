//! Scan encoding engine: the bit-exact inverse of the scan decoder.
//!
//! Emits Golomb-coded prediction residuals and run lengths into a caller
//! buffer, inserting the JPEG-LS stuffing bit after every `0xFF` byte so
//! the produced scan obeys the marker-escape rule the bit reader relies on.

use crate::coding_parameters::{CodingParameters, PresetCodingParameters};
use crate::constants::J;
use crate::error::JpeglsError;
use crate::jpeg_marker_code::JPEG_MARKER_START_BYTE;
use crate::regular_mode_context::RegularModeContext;
use crate::run_mode_context::RunModeContext;
use crate::scan_decoder::predicted_value;
use crate::traits::{
    apply_sign, apply_sign_for_index, bit_wise_sign, sign, CodecTraits, DefaultTraits,
    LosslessTraits, Sample,
};
use crate::{FrameInfo, InterleaveMode};
use std::marker::PhantomData;

/// Encodes one scan from `source` (raw samples laid out per the interleave
/// mode) into `destination`. Returns the number of bytes written.
pub(crate) fn encode_into(
    source: &[u8],
    frame_info: FrameInfo,
    pc_parameters: PresetCodingParameters,
    parameters: CodingParameters,
    destination: &mut [u8],
) -> Result<usize, JpeglsError> {
    if frame_info.bits_per_sample <= 8 {
        encode_typed::<u8>(source, frame_info, pc_parameters, parameters, destination)
    } else {
        encode_typed::<u16>(source, frame_info, pc_parameters, parameters, destination)
    }
}

fn encode_typed<T: Sample>(
    source: &[u8],
    frame_info: FrameInfo,
    pc_parameters: PresetCodingParameters,
    parameters: CodingParameters,
    destination: &mut [u8],
) -> Result<usize, JpeglsError> {
    let components_in_scan = if parameters.interleave_mode == InterleaveMode::None {
        1
    } else {
        frame_info.component_count as usize
    };
    let sample_count =
        frame_info.width as usize * frame_info.height as usize * components_in_scan;
    if source.len() < sample_count * T::BYTES {
        return Err(JpeglsError::SourceTooSmall);
    }
    let samples: Vec<T> = (0..sample_count).map(|i| T::load(&source[i * T::BYTES..])).collect();

    let maximum_sample_value = pc_parameters.maximum_sample_value;
    let near_lossless = parameters.near_lossless;
    if near_lossless == 0 && maximum_sample_value == (1 << frame_info.bits_per_sample) - 1 {
        let traits = LosslessTraits::new(frame_info.bits_per_sample);
        ScanEncoder::<T, _>::new(frame_info, pc_parameters, parameters, traits, destination)
            .encode_scan(&samples)
    } else {
        let traits = DefaultTraits::new(maximum_sample_value, near_lossless);
        ScanEncoder::<T, _>::new(frame_info, pc_parameters, parameters, traits, destination)
            .encode_scan(&samples)
    }
}

pub struct ScanEncoder<'a, T: Sample, R: CodecTraits> {
    destination: &'a mut [u8],
    position: usize,
    bit_buffer: u32,
    free_bit_count: i32,
    is_ff_written: bool,

    traits: R,
    frame_info: FrameInfo,
    parameters: CodingParameters,
    t1: i32,
    t2: i32,
    t3: i32,
    reset_threshold: i32,

    regular_contexts: Vec<Vec<RegularModeContext>>,
    run_contexts: Vec<[RunModeContext; 2]>,
    run_index: Vec<usize>,

    _sample: PhantomData<T>,
}

impl<'a, T: Sample, R: CodecTraits> ScanEncoder<'a, T, R> {
    pub fn new(
        frame_info: FrameInfo,
        pc_parameters: PresetCodingParameters,
        parameters: CodingParameters,
        traits: R,
        destination: &'a mut [u8],
    ) -> Self {
        let component_count = if parameters.interleave_mode == InterleaveMode::None {
            1
        } else {
            frame_info.component_count as usize
        };
        let range = traits.range();
        Self {
            destination,
            position: 0,
            bit_buffer: 0,
            free_bit_count: 32,
            is_ff_written: false,
            traits,
            frame_info,
            parameters,
            t1: pc_parameters.threshold1,
            t2: pc_parameters.threshold2,
            t3: pc_parameters.threshold3,
            reset_threshold: pc_parameters.reset_value,
            regular_contexts: (0..component_count)
                .map(|_| vec![RegularModeContext::new(range); 365])
                .collect(),
            run_contexts: (0..component_count)
                .map(|_| [RunModeContext::new(0, range), RunModeContext::new(1, range)])
                .collect(),
            run_index: vec![0; component_count],
            _sample: PhantomData,
        }
    }

    pub fn encode_scan(&mut self, source: &[T]) -> Result<usize, JpeglsError> {
        self.encode_lines(source)?;
        self.end_scan()?;
        Ok(self.position)
    }

    fn encode_lines(&mut self, source: &[T]) -> Result<(), JpeglsError> {
        let width = self.frame_info.width as usize;
        let height = self.frame_info.height as usize;
        let pixel_stride = width + 2;
        let component_count = self.regular_contexts.len();

        let mut line_buffer: Vec<T> = vec![T::default(); 2 * component_count * pixel_stride];

        for line in 0..height {
            let (top, bottom) = line_buffer.split_at_mut(component_count * pixel_stride);
            let (previous, current) =
                if line & 1 == 1 { (bottom, top) } else { (top, bottom) };

            let source_line = &source[line * width * component_count..];
            match self.parameters.interleave_mode {
                InterleaveMode::None | InterleaveMode::Line => {
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        current[row + 1..row + 1 + width]
                            .copy_from_slice(&source_line[component * width..][..width]);
                    }
                }
                InterleaveMode::Sample => {
                    for x in 0..width {
                        for component in 0..component_count {
                            current[component * pixel_stride + 1 + x] =
                                source_line[x * component_count + component];
                        }
                    }
                }
            }

            for component in 0..component_count {
                let row = component * pixel_stride;
                previous[row + width + 1] = previous[row + width];
                current[row] = previous[row + 1];
            }

            match self.parameters.interleave_mode {
                InterleaveMode::None | InterleaveMode::Line => {
                    for component in 0..component_count {
                        let previous_row = &previous[component * pixel_stride..][..pixel_stride];
                        let current_row = &mut current[component * pixel_stride..][..pixel_stride];
                        self.encode_component_line(component, previous_row, current_row, width)?;
                    }
                }
                InterleaveMode::Sample => {
                    self.encode_pixel_interleaved_line(previous, current, width, pixel_stride)?;
                }
            }
        }
        Ok(())
    }

    fn encode_component_line(
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
                let x = current[index].to_i32();
                let reconstructed =
                    self.encode_regular(component, qs, x, predicted_value(ra, rb, rc))?;
                current[index] = T::from_i32(reconstructed);
                index += 1;
            } else {
                index += self.encode_run_mode(component, index, previous, current, width)?;
                if index <= width {
                    rb = previous[index - 1].to_i32();
                    rd = previous[index].to_i32();
                }
            }
        }
        Ok(())
    }

    fn encode_pixel_interleaved_line(
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
                    let row = component * pixel_stride;
                    let x = current[row + index].to_i32();
                    let reconstructed = self.encode_regular(
                        component,
                        qs[component],
                        x,
                        predicted_value(ra[component], rb[component], rc[component]),
                    )?;
                    current[row + index] = T::from_i32(reconstructed);
                }
                index += 1;
            } else {
                let remaining = width - index + 1;
                let run_value: Vec<T> =
                    (0..component_count).map(|c| current[c * pixel_stride + index - 1]).collect();

                let mut run_length = 0;
                'scan: while run_length < remaining {
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        if !self.traits.is_near(
                            current[row + index + run_length].to_i32(),
                            run_value[component].to_i32(),
                        ) {
                            break 'scan;
                        }
                    }
                    for component in 0..component_count {
                        current[component * pixel_stride + index + run_length] =
                            run_value[component];
                    }
                    run_length += 1;
                }

                self.encode_run_pixels(0, run_length, run_length == remaining)?;
                index += run_length;

                if run_length != remaining {
                    // One interruption sample per component, each choosing
                    // its run context from its own Ra/Rb neighbors.
                    for component in 0..component_count {
                        let row = component * pixel_stride;
                        let x = current[row + index].to_i32();
                        let ra_value = current[row + index - 1].to_i32();
                        let rb_value = previous[row + index].to_i32();
                        let reconstructed = self
                            .encode_run_interruption_pixel(component, x, ra_value, rb_value, 0)?;
                        current[row + index] = T::from_i32(reconstructed);
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

    fn encode_regular(
        &mut self,
        component: usize,
        qs: i32,
        x: i32,
        predicted: i32,
    ) -> Result<i32, JpeglsError> {
        let sign = bit_wise_sign(qs);
        let context_index = apply_sign_for_index(qs, sign);

        let (k, context_c, correction) = {
            let context = &self.regular_contexts[component][context_index];
            let k = context.golomb_coding_parameter()?;
            (k, context.c(), context.error_correction(k | self.parameters.near_lossless))
        };
        let predicted_value = self.traits.correct_prediction(predicted + apply_sign(context_c, sign));
        let error_value = self.traits.compute_error_value(apply_sign(x - predicted_value, sign));

        self.encode_mapped_value(k, map_error_value(correction ^ error_value), self.traits.limit())?;
        self.regular_contexts[component][context_index].update_variables_and_bias(
            error_value,
            self.parameters.near_lossless,
            self.reset_threshold,
        )?;

        Ok(self.traits.compute_reconstructed_sample(predicted_value, apply_sign(error_value, sign)))
    }

    fn encode_run_mode(
        &mut self,
        component: usize,
        start_index: usize,
        previous: &[T],
        current: &mut [T],
        width: usize,
    ) -> Result<usize, JpeglsError> {
        let ra = current[start_index - 1];
        let remaining = width - start_index + 1;

        let mut run_length = 0;
        while run_length < remaining
            && self.traits.is_near(current[start_index + run_length].to_i32(), ra.to_i32())
        {
            current[start_index + run_length] = ra;
            run_length += 1;
        }

        self.encode_run_pixels(component, run_length, run_length == remaining)?;
        if run_length == remaining {
            return Ok(run_length);
        }

        let interruption_index = start_index + run_length;
        let x = current[interruption_index].to_i32();
        let rb = previous[interruption_index].to_i32();
        let reconstructed =
            self.encode_run_interruption_pixel(component, x, ra.to_i32(), rb, component)?;
        current[interruption_index] = T::from_i32(reconstructed);
        self.decrement_run_index(component);
        Ok(run_length + 1)
    }

    fn encode_run_pixels(
        &mut self,
        run_index_slot: usize,
        run_length: usize,
        end_of_line: bool,
    ) -> Result<(), JpeglsError> {
        let mut run_length = run_length;
        while run_length >= (1usize << J[self.run_index[run_index_slot]]) {
            self.append_ones_to_bit_stream(1)?;
            run_length -= 1usize << J[self.run_index[run_index_slot]];
            self.increment_run_index(run_index_slot);
        }

        if end_of_line {
            if run_length != 0 {
                self.append_ones_to_bit_stream(1)?;
            }
        } else {
            // Terminating 0 bit and the tail length in one field.
            self.append_to_bit_stream(
                run_length as u32,
                J[self.run_index[run_index_slot]] + 1,
            )?;
        }
        Ok(())
    }

    fn encode_run_interruption_pixel(
        &mut self,
        component: usize,
        x: i32,
        ra: i32,
        rb: i32,
        run_index_slot: usize,
    ) -> Result<i32, JpeglsError> {
        if self.traits.is_near(ra, rb) {
            let error_value = self.traits.compute_error_value(x - ra);
            self.encode_run_interruption_error(component, 1, error_value, run_index_slot)?;
            Ok(self.traits.compute_reconstructed_sample(ra, error_value))
        } else {
            let error_sign = sign(rb - ra);
            let error_value = self.traits.compute_error_value((x - rb) * error_sign);
            self.encode_run_interruption_error(component, 0, error_value, run_index_slot)?;
            Ok(self.traits.compute_reconstructed_sample(rb, error_value * error_sign))
        }
    }

    fn encode_run_interruption_error(
        &mut self,
        component: usize,
        context_index: usize,
        error_value: i32,
        run_index_slot: usize,
    ) -> Result<(), JpeglsError> {
        let (k, map, run_interruption_type) = {
            let context = &self.run_contexts[component][context_index];
            let k = context.golomb_coding_parameter()?;
            (k, context.compute_map(error_value, k), context.run_interruption_type())
        };
        let e_mapped_error_value =
            2 * error_value.abs() - run_interruption_type - i32::from(map);
        debug_assert!(
            error_value
                == self.run_contexts[component][context_index]
                    .decode_error_value(e_mapped_error_value + run_interruption_type, k)
        );

        let limit = self.traits.limit() - J[self.run_index[run_index_slot]] - 1;
        self.encode_mapped_value(k, e_mapped_error_value, limit)?;
        self.run_contexts[component][context_index].update_variables(
            error_value,
            e_mapped_error_value,
            self.reset_threshold,
        );
        Ok(())
    }

    fn encode_mapped_value(
        &mut self,
        k: i32,
        mapped_error: i32,
        limit: i32,
    ) -> Result<(), JpeglsError> {
        let mut high_bits = mapped_error >> k;
        if high_bits < limit - self.traits.qbpp() - 1 {
            if high_bits + 1 > 31 {
                self.append_to_bit_stream(0, high_bits / 2)?;
                high_bits -= high_bits / 2;
            }
            self.append_to_bit_stream(1, high_bits + 1)?;
            self.append_to_bit_stream((mapped_error & ((1 << k) - 1)) as u32, k)?;
            return Ok(());
        }

        // Escape: unary prefix of limit - qbpp length, then the mapped
        // value minus one in qbpp bits.
        if limit - self.traits.qbpp() > 31 {
            self.append_to_bit_stream(0, 31)?;
            self.append_to_bit_stream(1, limit - self.traits.qbpp() - 31)?;
        } else {
            self.append_to_bit_stream(1, limit - self.traits.qbpp())?;
        }
        self.append_to_bit_stream(
            ((mapped_error - 1) & ((1 << self.traits.qbpp()) - 1)) as u32,
            self.traits.qbpp(),
        )?;
        Ok(())
    }

    fn append_to_bit_stream(&mut self, bits: u32, bit_count: i32) -> Result<(), JpeglsError> {
        if bit_count == 0 {
            return Ok(());
        }
        debug_assert!((1..32).contains(&bit_count));
        debug_assert!((bits & !(((1u64 << bit_count) - 1) as u32)) == 0);

        self.free_bit_count -= bit_count;
        if self.free_bit_count >= 0 {
            self.bit_buffer |= bits << self.free_bit_count;
            return Ok(());
        }

        // Place the high part of the bits in the remaining space and flush;
        // a second flush covers the case where stuffing bits reduced the
        // space freed by the first.
        self.bit_buffer |= bits >> -self.free_bit_count;
        self.flush()?;
        if self.free_bit_count < 0 {
            self.bit_buffer |= bits >> -self.free_bit_count;
            self.flush()?;
            if self.free_bit_count < 0 {
                return Err(JpeglsError::InvalidOperation);
            }
        }
        self.bit_buffer |= bits << self.free_bit_count;
        Ok(())
    }

    fn append_ones_to_bit_stream(&mut self, bit_count: i32) -> Result<(), JpeglsError> {
        self.append_to_bit_stream((1u32 << bit_count) - 1, bit_count)
    }

    fn flush(&mut self) -> Result<(), JpeglsError> {
        if self.destination.len() - self.position < 4 {
            return Err(JpeglsError::DestinationTooSmall);
        }

        for _ in 0..4 {
            if self.free_bit_count >= 32 {
                self.free_bit_count = 32;
                break;
            }

            let byte = if self.is_ff_written {
                // Marker escape (T.87, A.1): insert a 0 bit after a 0xFF.
                let byte = (self.bit_buffer >> 25) as u8;
                self.bit_buffer <<= 7;
                self.free_bit_count += 7;
                byte
            } else {
                let byte = (self.bit_buffer >> 24) as u8;
                self.bit_buffer <<= 8;
                self.free_bit_count += 8;
                byte
            };

            self.destination[self.position] = byte;
            self.position += 1;
            self.is_ff_written = byte == JPEG_MARKER_START_BYTE;
        }
        Ok(())
    }

    fn end_scan(&mut self) -> Result<(), JpeglsError> {
        self.flush()?;
        // When the final byte was a 0xFF the flush keeps one stuffing slot
        // occupied; pad to the next byte boundary explicitly.
        if self.is_ff_written {
            self.append_to_bit_stream(0, (self.free_bit_count - 1) % 8)?;
        }
        self.flush()?;
        debug_assert_eq!(self.free_bit_count, 32);
        Ok(())
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

/// Maps a signed error to its non-negative transmitted form:
/// 2e for e >= 0, -2e - 1 for e < 0.
fn map_error_value(error_value: i32) -> i32 {
    (error_value >> 30) ^ (2 * error_value)
}
