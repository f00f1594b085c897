//! JPEG-LS codestream reader: walks the marker segments surrounding the
//! entropy-coded scans and collects the frameinfo, preset parameters and
//! per-scan coding parameters the scan decoder needs.

use crate::coding_parameters::{
    compute_maximum_near_lossless, validate_preset_coding_parameters, CodingParameters,
    PresetCodingParameters,
};
use crate::constants::{
    MAXIMUM_BITS_PER_SAMPLE, MAXIMUM_COMPONENT_COUNT, MAXIMUM_COMPONENT_COUNT_IN_SCAN,
    MINIMUM_BITS_PER_SAMPLE, MINIMUM_COMPONENT_COUNT,
};
use crate::error::JpeglsError;
use crate::jpeg_marker_code::{JpegMarkerCode, JPEG_MARKER_START_BYTE};
use crate::{FrameInfo, InterleaveMode};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    BeforeStartOfImage,
    HeaderSection,
    ScanSection,
    EndOfImage,
}

pub struct JpegStreamReader<'a> {
    source: &'a [u8],
    position: usize,
    state: ReaderState,
    frame_info: FrameInfo,
    parameters: CodingParameters,
    preset_coding_parameters: PresetCodingParameters,
    frame_seen: bool,
}

impl<'a> JpegStreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            state: ReaderState::BeforeStartOfImage,
            frame_info: FrameInfo::default(),
            parameters: CodingParameters::default(),
            preset_coding_parameters: PresetCodingParameters::default(),
            frame_seen: false,
        }
    }

    pub fn frame_info(&self) -> FrameInfo {
        self.frame_info
    }

    pub fn parameters(&self) -> CodingParameters {
        self.parameters
    }

    /// Preset coding parameters with defaults filled in, validated against
    /// the frame and the scan's NEAR parameter.
    pub fn validated_preset_coding_parameters(
        &self,
    ) -> Result<PresetCodingParameters, JpeglsError> {
        let maximum_sample_value = (1 << self.frame_info.bits_per_sample) - 1;
        validate_preset_coding_parameters(
            &self.preset_coding_parameters,
            maximum_sample_value,
            self.parameters.near_lossless,
        )
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        &self.source[self.position..]
    }

    pub fn skip_bytes(&mut self, count: usize) {
        self.position += count;
        debug_assert!(self.position <= self.source.len());
    }

    /// Reads marker segments up to (but not including) the first SOS
    /// marker.
    pub fn read_header(&mut self) -> Result<(), JpeglsError> {
        if self.state == ReaderState::BeforeStartOfImage {
            if self.read_marker()? != JpegMarkerCode::StartOfImage {
                return Err(JpeglsError::StartOfImageMarkerNotFound);
            }
            self.state = ReaderState::HeaderSection;
        }

        loop {
            let marker = self.read_marker()?;
            debug!("marker {marker:?} at offset {}", self.position - 2);
            match marker {
                JpegMarkerCode::StartOfFrameJpegls => self.read_start_of_frame_segment()?,
                JpegMarkerCode::JpeglsPresetParameters => self.read_preset_parameters_segment()?,
                JpegMarkerCode::StartOfScan => {
                    if !self.frame_seen {
                        return Err(JpeglsError::ParameterValueNotSupported);
                    }
                    self.position -= 2;
                    return Ok(());
                }
                JpegMarkerCode::DefineRestartInterval => {
                    let length = self.read_segment_length()?;
                    if length < 4 {
                        return Err(JpeglsError::InvalidMarkerSegmentSize);
                    }
                    self.parameters.restart_interval = u32::from(self.read_u16()?);
                    self.position += length as usize - 4;
                    if self.parameters.restart_interval != 0 {
                        // Restart markers inside the scan are not supported.
                        return Err(JpeglsError::ParameterValueNotSupported);
                    }
                }
                JpegMarkerCode::EndOfImage => return Err(JpeglsError::ParameterValueNotSupported),
                JpegMarkerCode::StartOfImage => return Err(JpeglsError::ParameterValueNotSupported),
                _ => self.skip_segment()?,
            }
        }
    }

    /// Reads the SOS segment that starts the next scan and returns the
    /// number of components it covers.
    pub fn read_start_of_scan_segment(&mut self) -> Result<i32, JpeglsError> {
        if self.read_marker()? != JpegMarkerCode::StartOfScan {
            return Err(JpeglsError::UnknownJpegMarkerFound);
        }

        let length = self.read_segment_length()?;
        let components_in_scan = i32::from(self.read_byte()?);
        if components_in_scan < 1
            || components_in_scan > MAXIMUM_COMPONENT_COUNT_IN_SCAN
            || (components_in_scan != 1 && components_in_scan != self.frame_info.component_count)
        {
            return Err(JpeglsError::ParameterValueNotSupported);
        }
        if length as i32 != 2 + 1 + components_in_scan * 2 + 3 {
            return Err(JpeglsError::InvalidMarkerSegmentSize);
        }
        for _ in 0..components_in_scan {
            let _component_id = self.read_byte()?;
            let _mapping_table = self.read_byte()?;
        }

        let near_lossless = i32::from(self.read_byte()?);
        let maximum_sample_value = (1 << self.frame_info.bits_per_sample) - 1;
        if near_lossless > compute_maximum_near_lossless(maximum_sample_value) {
            return Err(JpeglsError::ParameterValueNotSupported);
        }

        let interleave_mode = match self.read_byte()? {
            0 => InterleaveMode::None,
            1 => InterleaveMode::Line,
            2 => InterleaveMode::Sample,
            _ => return Err(JpeglsError::ParameterValueNotSupported),
        };
        if (components_in_scan == 1) != (interleave_mode == InterleaveMode::None) {
            // Multi-component scans must interleave; single-component scans
            // cannot.
            return Err(JpeglsError::ParameterValueNotSupported);
        }

        let _point_transform = self.read_byte()?;

        self.parameters.near_lossless = near_lossless;
        self.parameters.interleave_mode = interleave_mode;
        self.state = ReaderState::ScanSection;
        Ok(components_in_scan)
    }

    /// Consumes the end-of-image marker after the last scan.
    pub fn read_end_of_image(&mut self) -> Result<(), JpeglsError> {
        if self.read_marker()? != JpegMarkerCode::EndOfImage {
            return Err(JpeglsError::EndOfImageMarkerNotFound);
        }
        self.state = ReaderState::EndOfImage;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, JpeglsError> {
        if self.position >= self.source.len() {
            return Err(JpeglsError::SourceTooSmall);
        }
        let value = self.source[self.position];
        self.position += 1;
        Ok(value)
    }

    fn read_u16(&mut self) -> Result<u16, JpeglsError> {
        let high = u16::from(self.read_byte()?);
        let low = u16::from(self.read_byte()?);
        Ok((high << 8) | low)
    }

    fn read_segment_length(&mut self) -> Result<u16, JpeglsError> {
        let length = self.read_u16()?;
        if length < 2 || self.position + (length as usize - 2) > self.source.len() {
            return Err(JpeglsError::InvalidMarkerSegmentSize);
        }
        Ok(length)
    }

    fn read_marker(&mut self) -> Result<JpegMarkerCode, JpeglsError> {
        if self.read_byte()? != JPEG_MARKER_START_BYTE {
            return Err(JpeglsError::JpegMarkerStartByteNotFound);
        }
        let mut marker_byte = self.read_byte()?;
        // Optional fill bytes before a marker.
        while marker_byte == JPEG_MARKER_START_BYTE {
            marker_byte = self.read_byte()?;
        }
        JpegMarkerCode::try_from(marker_byte)
    }

    fn read_start_of_frame_segment(&mut self) -> Result<(), JpeglsError> {
        if self.frame_seen {
            return Err(JpeglsError::ParameterValueNotSupported);
        }

        let length = self.read_segment_length()?;
        let bits_per_sample = i32::from(self.read_byte()?);
        if !(MINIMUM_BITS_PER_SAMPLE..=MAXIMUM_BITS_PER_SAMPLE).contains(&bits_per_sample) {
            return Err(JpeglsError::ParameterValueNotSupported);
        }

        let height = u32::from(self.read_u16()?);
        let width = u32::from(self.read_u16()?);
        if width == 0 || height == 0 {
            return Err(JpeglsError::ParameterValueNotSupported);
        }

        let component_count = i32::from(self.read_byte()?);
        if !(MINIMUM_COMPONENT_COUNT..=MAXIMUM_COMPONENT_COUNT).contains(&component_count) {
            return Err(JpeglsError::ParameterValueNotSupported);
        }
        if length as i32 != 2 + 6 + component_count * 3 {
            return Err(JpeglsError::InvalidMarkerSegmentSize);
        }

        for _ in 0..component_count {
            let _component_id = self.read_byte()?;
            let sampling_factor = self.read_byte()?;
            let _quantization_table = self.read_byte()?;
            if sampling_factor != 0x11 {
                // Subsampling is not defined for JPEG-LS.
                return Err(JpeglsError::ParameterValueNotSupported);
            }
        }

        self.frame_info =
            FrameInfo { width, height, bits_per_sample, component_count };
        self.frame_seen = true;
        Ok(())
    }

    fn read_preset_parameters_segment(&mut self) -> Result<(), JpeglsError> {
        let length = self.read_segment_length()?;
        if length < 3 {
            return Err(JpeglsError::InvalidMarkerSegmentSize);
        }
        let parameter_type = self.read_byte()?;
        if parameter_type == 1 {
            if length != 2 + 1 + 5 * 2 {
                return Err(JpeglsError::InvalidMarkerSegmentSize);
            }
            self.preset_coding_parameters = PresetCodingParameters {
                maximum_sample_value: i32::from(self.read_u16()?),
                threshold1: i32::from(self.read_u16()?),
                threshold2: i32::from(self.read_u16()?),
                threshold3: i32::from(self.read_u16()?),
                reset_value: i32::from(self.read_u16()?),
            };
        } else {
            // Mapping tables and extended parameter types are skipped.
            self.position += length as usize - 3;
        }
        Ok(())
    }

    fn skip_segment(&mut self) -> Result<(), JpeglsError> {
        let length = self.read_segment_length()?;
        self.position += length as usize - 2;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header() -> Vec<u8> {
        vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xF7, 0x00, 0x0B, 0x08, 0x00, 0x10, 0x00, 0x20, 0x01, 0x01, 0x11, 0x00,
        ]
    }

    #[test]
    fn parses_frame_info_from_sof55() {
        let mut data = minimal_header();
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
        let mut reader = JpegStreamReader::new(&data);
        reader.read_header().unwrap();
        let frame_info = reader.frame_info();
        assert_eq!(frame_info.width, 0x20);
        assert_eq!(frame_info.height, 0x10);
        assert_eq!(frame_info.bits_per_sample, 8);
        assert_eq!(frame_info.component_count, 1);
        assert_eq!(reader.read_start_of_scan_segment().unwrap(), 1);
        assert_eq!(reader.parameters().near_lossless, 0);
        assert_eq!(reader.parameters().interleave_mode, InterleaveMode::None);
    }

    #[test]
    fn missing_marker_start_byte_is_reported() {
        let mut reader = JpegStreamReader::new(&[0x33, 0x33]);
        assert_eq!(reader.read_header(), Err(JpeglsError::JpegMarkerStartByteNotFound));
    }

    #[test]
    fn other_jpeg_encodings_are_rejected() {
        // SOF_3 (lossless JPEG) after SOI.
        let mut reader = JpegStreamReader::new(&[0xFF, 0xD8, 0xFF, 0xC3, 0x00, 0x00]);
        assert_eq!(reader.read_header(), Err(JpeglsError::EncodingNotSupported));
    }

    #[test]
    fn unassigned_marker_is_reported_as_unknown() {
        let mut reader = JpegStreamReader::new(&[0xFF, 0xD8, 0xFF, 0x01, 0x00, 0x00]);
        assert_eq!(reader.read_header(), Err(JpeglsError::UnknownJpegMarkerFound));
    }

    #[test]
    fn stream_must_open_with_soi() {
        let mut reader = JpegStreamReader::new(&[0xFF, 0xF7, 0x00, 0x00]);
        assert_eq!(reader.read_header(), Err(JpeglsError::StartOfImageMarkerNotFound));
    }

    #[test]
    fn lse_segment_overrides_presets() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[
            0xFF, 0xF7, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        ]);
        data.extend_from_slice(&[
            0xFF, 0xF8, 0x00, 0x0D, 0x01, // LSE type 1
            0x00, 0xFF, // MAXVAL 255
            0x00, 0x05, // T1
            0x00, 0x0A, // T2
            0x00, 0x15, // T3
            0x00, 0x3F, // RESET 63
        ]);
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
        let mut reader = JpegStreamReader::new(&data);
        reader.read_header().unwrap();
        reader.read_start_of_scan_segment().unwrap();
        let pc = reader.validated_preset_coding_parameters().unwrap();
        assert_eq!(pc.threshold1, 5);
        assert_eq!(pc.threshold2, 10);
        assert_eq!(pc.threshold3, 21);
        assert_eq!(pc.reset_value, 63);
    }

    #[test]
    fn oversized_bits_per_sample_is_rejected() {
        let data = [
            0xFF, 0xD8, 0xFF, 0xF7, 0x00, 0x0B, 0x11, 0x00, 0x10, 0x00, 0x20, 0x01, 0x01, 0x11,
            0x00,
        ];
        let mut reader = JpegStreamReader::new(&data);
        assert_eq!(reader.read_header(), Err(JpeglsError::ParameterValueNotSupported));
    }

    #[test]
    fn unknown_application_segments_are_skipped() {
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB]); // APP0
        data.extend_from_slice(&[
            0xFF, 0xF7, 0x00, 0x0B, 0x08, 0x00, 0x10, 0x00, 0x20, 0x01, 0x01, 0x11, 0x00,
        ]);
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00]);
        let mut reader = JpegStreamReader::new(&data);
        assert!(reader.read_header().is_ok());
    }
}
