use crate::error::JpeglsError;

/// JPEG marker codes used by the JPEG-LS interchange format
/// (ISO/IEC 14495-1 / ITU-T T.87).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JpegMarkerCode {
    /// SOI: Marks the start of an image.
    StartOfImage = 0xD8,
    /// EOI: Marks the end of an image.
    EndOfImage = 0xD9,
    /// SOS: Marks the start of scan.
    StartOfScan = 0xDA,
    /// SOF_55: Marks the start of a JPEG-LS encoded frame.
    StartOfFrameJpegls = 0xF7,
    /// LSE: Marks the start of a JPEG-LS preset parameters segment.
    JpeglsPresetParameters = 0xF8,
    /// DNL: Defines the number of lines in a scan.
    DefineNumberOfLines = 0xDC,
    /// DRI: Defines the restart interval used in succeeding scans.
    DefineRestartInterval = 0xDD,
    /// COM: Comment block.
    Comment = 0xFE,

    /// APP0..APP15: Application data segments, skipped by this codec.
    ApplicationData0 = 0xE0,
    ApplicationData1 = 0xE1,
    ApplicationData2 = 0xE2,
    ApplicationData3 = 0xE3,
    ApplicationData4 = 0xE4,
    ApplicationData5 = 0xE5,
    ApplicationData6 = 0xE6,
    ApplicationData7 = 0xE7,
    ApplicationData8 = 0xE8,
    ApplicationData9 = 0xE9,
    ApplicationData10 = 0xEA,
    ApplicationData11 = 0xEB,
    ApplicationData12 = 0xEC,
    ApplicationData13 = 0xED,
    ApplicationData14 = 0xEE,
    ApplicationData15 = 0xEF,
}

impl TryFrom<u8> for JpegMarkerCode {
    type Error = JpeglsError;

    /// Classifies the second byte of a marker. Start-of-frame markers other
    /// than SOF_55 belong to JPEG encodings this codec does not implement;
    /// bytes that are not assigned by ITU-T T.81/T.87 are unknown markers.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xD8 => Ok(Self::StartOfImage),
            0xD9 => Ok(Self::EndOfImage),
            0xDA => Ok(Self::StartOfScan),
            0xF7 => Ok(Self::StartOfFrameJpegls),
            0xF8 => Ok(Self::JpeglsPresetParameters),
            0xDC => Ok(Self::DefineNumberOfLines),
            0xDD => Ok(Self::DefineRestartInterval),
            0xFE => Ok(Self::Comment),
            0xE0..=0xEF => Ok(match value {
                0xE0 => Self::ApplicationData0,
                0xE1 => Self::ApplicationData1,
                0xE2 => Self::ApplicationData2,
                0xE3 => Self::ApplicationData3,
                0xE4 => Self::ApplicationData4,
                0xE5 => Self::ApplicationData5,
                0xE6 => Self::ApplicationData6,
                0xE7 => Self::ApplicationData7,
                0xE8 => Self::ApplicationData8,
                0xE9 => Self::ApplicationData9,
                0xEA => Self::ApplicationData10,
                0xEB => Self::ApplicationData11,
                0xEC => Self::ApplicationData12,
                0xED => Self::ApplicationData13,
                0xEE => Self::ApplicationData14,
                _ => Self::ApplicationData15,
            }),
            // SOF_0..SOF_15 (baseline, progressive, lossless, arithmetic)
            // and the JPEG extension markers: recognised but not supported.
            0xC0..=0xCF | 0xF1..=0xF6 | 0xF9..=0xFD => Err(JpeglsError::EncodingNotSupported),
            _ => Err(JpeglsError::UnknownJpegMarkerFound),
        }
    }
}

pub const JPEG_MARKER_START_BYTE: u8 = 0xFF;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_jpegls_markers() {
        assert_eq!(JpegMarkerCode::try_from(0xF7), Ok(JpegMarkerCode::StartOfFrameJpegls));
        assert_eq!(JpegMarkerCode::try_from(0xF8), Ok(JpegMarkerCode::JpeglsPresetParameters));
        assert_eq!(JpegMarkerCode::try_from(0xDA), Ok(JpegMarkerCode::StartOfScan));
    }

    #[test]
    fn other_sof_markers_are_unsupported_encodings() {
        for byte in [0xC0u8, 0xC3, 0xC9, 0xCF] {
            assert_eq!(JpegMarkerCode::try_from(byte), Err(JpeglsError::EncodingNotSupported));
        }
    }

    #[test]
    fn reserved_bytes_are_unknown_markers() {
        for byte in [0x01u8, 0x02, 0xBF] {
            assert_eq!(JpegMarkerCode::try_from(byte), Err(JpeglsError::UnknownJpegMarkerFound));
        }
    }
}
