//! Decoder facade: marker parsing, destination validation and scan
//! sequencing around the scan decoding engine.

use crate::error::JpeglsError;
use crate::jpeg_stream_reader::JpegStreamReader;
use crate::line_sink::RasterSink;
use crate::scan_decoder::decode_into;
use crate::{FrameInfo, InterleaveMode};

pub struct JpeglsDecoder<'a> {
    reader: JpegStreamReader<'a>,
    header_read: bool,
}

impl<'a> JpeglsDecoder<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self { reader: JpegStreamReader::new(source), header_read: false }
    }

    /// Parses the marker segments up to the first scan.
    pub fn read_header(&mut self) -> Result<(), JpeglsError> {
        self.reader.read_header()?;
        self.header_read = true;
        Ok(())
    }

    /// Frame parameters; valid after [`Self::read_header`].
    pub fn frame_info(&self) -> FrameInfo {
        self.reader.frame_info()
    }

    /// Bytes required to hold the decoded image.
    pub fn destination_size(&self) -> usize {
        let frame_info = self.reader.frame_info();
        frame_info.width as usize
            * frame_info.height as usize
            * frame_info.component_count as usize
            * bytes_per_sample(frame_info.bits_per_sample)
    }

    /// Decodes every scan of the image into `destination`. The buffer size
    /// is validated up front; on any failure no further lines are written.
    pub fn decode(&mut self, destination: &mut [u8]) -> Result<(), JpeglsError> {
        if !self.header_read {
            self.read_header()?;
        }
        let frame_info = self.reader.frame_info();
        if destination.len() < self.destination_size() {
            return Err(JpeglsError::DestinationTooSmall);
        }

        let mut components_decoded = 0;
        while components_decoded < frame_info.component_count {
            let components_in_scan = self.reader.read_start_of_scan_segment()?;
            let parameters = self.reader.parameters();
            let pc_parameters = self.reader.validated_preset_coding_parameters()?;

            let plane_index = if parameters.interleave_mode == InterleaveMode::None {
                components_decoded as usize
            } else {
                0
            };
            let mut sink = RasterSink::new(
                destination,
                frame_info.width as usize,
                frame_info.height as usize,
                frame_info.component_count as usize,
                parameters.interleave_mode,
                plane_index,
            );

            let consumed = decode_into(
                self.reader.remaining_data(),
                frame_info,
                pc_parameters,
                parameters,
                &mut sink,
            )?;
            self.reader.skip_bytes(consumed);
            components_decoded += components_in_scan;
        }

        self.reader.read_end_of_image()
    }
}

pub(crate) fn bytes_per_sample(bits_per_sample: i32) -> usize {
    if bits_per_sample <= 8 { 1 } else { 2 }
}
