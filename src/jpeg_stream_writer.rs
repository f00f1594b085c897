//! JPEG-LS codestream writer: emits the marker segments (SOI, SOF-55, LSE,
//! SOS, EOI) that wrap the entropy-coded scans.

use crate::coding_parameters::PresetCodingParameters;
use crate::error::JpeglsError;
use crate::jpeg_marker_code::{JpegMarkerCode, JPEG_MARKER_START_BYTE};
use crate::{FrameInfo, InterleaveMode};

pub struct JpegStreamWriter<'a> {
    destination: &'a mut [u8],
    position: usize,
}

impl<'a> JpegStreamWriter<'a> {
    pub fn new(destination: &'a mut [u8]) -> Self {
        Self { destination, position: 0 }
    }

    pub fn bytes_written(&self) -> usize {
        self.position
    }

    fn write_byte(&mut self, value: u8) -> Result<(), JpeglsError> {
        if self.position >= self.destination.len() {
            return Err(JpeglsError::DestinationTooSmall);
        }
        self.destination[self.position] = value;
        self.position += 1;
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), JpeglsError> {
        let bytes = value.to_be_bytes();
        self.write_byte(bytes[0])?;
        self.write_byte(bytes[1])
    }

    fn write_marker(&mut self, marker: JpegMarkerCode) -> Result<(), JpeglsError> {
        self.write_byte(JPEG_MARKER_START_BYTE)?;
        self.write_byte(marker as u8)
    }

    pub fn write_start_of_image(&mut self) -> Result<(), JpeglsError> {
        self.write_marker(JpegMarkerCode::StartOfImage)
    }

    pub fn write_end_of_image(&mut self) -> Result<(), JpeglsError> {
        self.write_marker(JpegMarkerCode::EndOfImage)
    }

    pub fn write_start_of_frame_segment(
        &mut self,
        frame_info: &FrameInfo,
    ) -> Result<(), JpeglsError> {
        self.write_marker(JpegMarkerCode::StartOfFrameJpegls)?;
        let length = 2 + 6 + frame_info.component_count as usize * 3;
        self.write_u16(length as u16)?;

        self.write_byte(frame_info.bits_per_sample as u8)?;
        self.write_u16(frame_info.height as u16)?;
        self.write_u16(frame_info.width as u16)?;
        self.write_byte(frame_info.component_count as u8)?;
        for component in 0..frame_info.component_count {
            self.write_byte(component as u8 + 1)?; // component identifier
            self.write_byte(0x11)?; // sampling factors, always 1x1
            self.write_byte(0)?; // quantization table, always 0 in JPEG-LS
        }
        Ok(())
    }

    pub fn write_preset_parameters_segment(
        &mut self,
        pc_parameters: &PresetCodingParameters,
    ) -> Result<(), JpeglsError> {
        self.write_marker(JpegMarkerCode::JpeglsPresetParameters)?;
        self.write_u16(2 + 1 + 5 * 2)?;
        self.write_byte(1)?; // type 1: preset coding parameters

        self.write_u16(pc_parameters.maximum_sample_value as u16)?;
        self.write_u16(pc_parameters.threshold1 as u16)?;
        self.write_u16(pc_parameters.threshold2 as u16)?;
        self.write_u16(pc_parameters.threshold3 as u16)?;
        self.write_u16(pc_parameters.reset_value as u16)
    }

    /// Writes an SOS segment. In non-interleaved mode each scan covers one
    /// component; `first_component` is its zero-based index.
    pub fn write_start_of_scan_segment(
        &mut self,
        first_component: i32,
        component_count: i32,
        near_lossless: i32,
        interleave_mode: InterleaveMode,
    ) -> Result<(), JpeglsError> {
        self.write_marker(JpegMarkerCode::StartOfScan)?;
        let length = 2 + 1 + component_count as usize * 2 + 3;
        self.write_u16(length as u16)?;

        self.write_byte(component_count as u8)?;
        for component in 0..component_count {
            self.write_byte((first_component + component) as u8 + 1)?;
            self.write_byte(0)?; // mapping table selector, none
        }
        self.write_byte(near_lossless as u8)?;
        self.write_byte(interleave_mode as u8)?;
        self.write_byte(0)?; // point transform, none
        Ok(())
    }

    pub fn remaining_slice(&mut self) -> &mut [u8] {
        let start = self.position.min(self.destination.len());
        &mut self.destination[start..]
    }

    pub fn advance(&mut self, count: usize) {
        self.position += count;
        debug_assert!(self.position <= self.destination.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_frame_header_big_endian() {
        let mut buffer = vec![0u8; 64];
        let mut writer = JpegStreamWriter::new(&mut buffer);
        writer.write_start_of_image().unwrap();
        writer
            .write_start_of_frame_segment(&FrameInfo {
                width: 0x0102,
                height: 0x0304,
                bits_per_sample: 8,
                component_count: 1,
            })
            .unwrap();
        let written = writer.bytes_written();
        assert_eq!(&buffer[..4], &[0xFF, 0xD8, 0xFF, 0xF7]);
        assert_eq!(&buffer[4..6], &[0x00, 11]); // segment length
        assert_eq!(buffer[6], 8); // bits per sample
        assert_eq!(&buffer[7..9], &[0x03, 0x04]); // height
        assert_eq!(&buffer[9..11], &[0x01, 0x02]); // width
        assert_eq!(written, 2 + 2 + 11);
    }

    #[test]
    fn full_destination_reports_too_small() {
        let mut buffer = vec![0u8; 1];
        let mut writer = JpegStreamWriter::new(&mut buffer);
        assert_eq!(writer.write_start_of_image(), Err(JpeglsError::DestinationTooSmall));
    }
}
