//! Encoder facade: parameter validation, marker emission and scan
//! sequencing around the scan encoding engine.

use crate::coding_parameters::{
    compute_default, compute_maximum_near_lossless, validate_preset_coding_parameters,
    CodingParameters, PresetCodingParameters,
};
use crate::constants::{
    MAXIMUM_BITS_PER_SAMPLE, MAXIMUM_COMPONENT_COUNT_IN_SCAN, MINIMUM_BITS_PER_SAMPLE,
    MINIMUM_COMPONENT_COUNT,
};
use crate::decoder::bytes_per_sample;
use crate::error::JpeglsError;
use crate::jpeg_stream_writer::JpegStreamWriter;
use crate::scan_encoder::encode_into;
use crate::{FrameInfo, InterleaveMode};

pub struct JpeglsEncoder<'a> {
    destination: &'a mut [u8],
    frame_info: Option<FrameInfo>,
    near_lossless: i32,
    interleave_mode: InterleaveMode,
    preset_coding_parameters: Option<PresetCodingParameters>,
}

impl<'a> JpeglsEncoder<'a> {
    pub fn new(destination: &'a mut [u8]) -> Self {
        Self {
            destination,
            frame_info: None,
            near_lossless: 0,
            interleave_mode: InterleaveMode::None,
            preset_coding_parameters: None,
        }
    }

    /// Worst-case destination size for a frame: raw size plus marker
    /// overhead and the expansion bound of the scan coder.
    pub fn estimated_destination_size(frame_info: &FrameInfo) -> usize {
        frame_info.width as usize
            * frame_info.height as usize
            * frame_info.component_count as usize
            * bytes_per_sample(frame_info.bits_per_sample)
            * 2
            + 1024
    }

    pub fn set_frame_info(&mut self, frame_info: FrameInfo) -> Result<(), JpeglsError> {
        if frame_info.width == 0
            || frame_info.height == 0
            || !(MINIMUM_BITS_PER_SAMPLE..=MAXIMUM_BITS_PER_SAMPLE)
                .contains(&frame_info.bits_per_sample)
            || !(MINIMUM_COMPONENT_COUNT..=MAXIMUM_COMPONENT_COUNT_IN_SCAN)
                .contains(&frame_info.component_count)
        {
            return Err(JpeglsError::InvalidArgument);
        }
        self.frame_info = Some(frame_info);
        Ok(())
    }

    pub fn set_near_lossless(&mut self, near_lossless: i32) -> Result<(), JpeglsError> {
        if !(0..=255).contains(&near_lossless) {
            return Err(JpeglsError::InvalidArgument);
        }
        self.near_lossless = near_lossless;
        Ok(())
    }

    pub fn set_interleave_mode(&mut self, interleave_mode: InterleaveMode) {
        self.interleave_mode = interleave_mode;
    }

    pub fn set_preset_coding_parameters(&mut self, pc_parameters: PresetCodingParameters) {
        self.preset_coding_parameters = Some(pc_parameters);
    }

    /// Encodes `source` (planar for non-interleaved scans, line- or
    /// pixel-interleaved otherwise, native byte order) and returns the
    /// number of bytes written to the destination.
    pub fn encode(&mut self, source: &[u8]) -> Result<usize, JpeglsError> {
        let frame_info = self.frame_info.ok_or(JpeglsError::InvalidOperation)?;
        let maximum_sample_value = (1 << frame_info.bits_per_sample) - 1;
        if self.near_lossless > compute_maximum_near_lossless(maximum_sample_value) {
            return Err(JpeglsError::InvalidArgument);
        }
        if frame_info.component_count == 1 && self.interleave_mode != InterleaveMode::None {
            return Err(JpeglsError::InvalidArgument);
        }

        let pc_parameters = match &self.preset_coding_parameters {
            Some(pc) => {
                validate_preset_coding_parameters(pc, maximum_sample_value, self.near_lossless)?
            }
            None => compute_default(maximum_sample_value, self.near_lossless),
        };
        let parameters = CodingParameters {
            near_lossless: self.near_lossless,
            interleave_mode: self.interleave_mode,
            restart_interval: 0,
        };

        let mut writer = JpegStreamWriter::new(self.destination);
        writer.write_start_of_image()?;
        writer.write_start_of_frame_segment(&frame_info)?;
        writer.write_preset_parameters_segment(&pc_parameters)?;

        if self.interleave_mode == InterleaveMode::None {
            let plane_size = frame_info.width as usize
                * frame_info.height as usize
                * bytes_per_sample(frame_info.bits_per_sample);
            for component in 0..frame_info.component_count {
                let plane = source
                    .get(component as usize * plane_size..(component as usize + 1) * plane_size)
                    .ok_or(JpeglsError::SourceTooSmall)?;
                writer.write_start_of_scan_segment(
                    component,
                    1,
                    self.near_lossless,
                    InterleaveMode::None,
                )?;
                let written =
                    encode_into(plane, frame_info, pc_parameters, parameters, writer.remaining_slice())?;
                writer.advance(written);
            }
        } else {
            writer.write_start_of_scan_segment(
                0,
                frame_info.component_count,
                self.near_lossless,
                self.interleave_mode,
            )?;
            let written =
                encode_into(source, frame_info, pc_parameters, parameters, writer.remaining_slice())?;
            writer.advance(written);
        }

        writer.write_end_of_image()?;
        Ok(writer.bytes_written())
    }
}
