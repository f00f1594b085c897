// Malformed-stream scenarios: the stable error codes users match on.

use jpegls_rs::{JpeglsDecoder, JpeglsError};

fn read_header(data: &[u8]) -> Result<(), JpeglsError> {
    JpeglsDecoder::new(data).read_header()
}

#[test]
fn not_a_jpeg_stream() {
    assert_eq!(read_header(&[0x33, 0x33]), Err(JpeglsError::JpegMarkerStartByteNotFound));
}

#[test]
fn lossless_jpeg_sof3_is_not_supported() {
    assert_eq!(
        read_header(&[0xFF, 0xD8, 0xFF, 0xC3, 0x00, 0x00]),
        Err(JpeglsError::EncodingNotSupported)
    );
}

#[test]
fn baseline_jpeg_sof0_is_not_supported() {
    assert_eq!(
        read_header(&[0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x00]),
        Err(JpeglsError::EncodingNotSupported)
    );
}

#[test]
fn tem_marker_is_unknown() {
    assert_eq!(
        read_header(&[0xFF, 0xD8, 0xFF, 0x01, 0x00, 0x00]),
        Err(JpeglsError::UnknownJpegMarkerFound)
    );
}

#[test]
fn stream_without_soi_is_rejected() {
    assert_eq!(
        read_header(&[0xFF, 0xDA, 0x00, 0x00]),
        Err(JpeglsError::StartOfImageMarkerNotFound)
    );
}

#[test]
fn truncated_stream_is_rejected() {
    assert_eq!(read_header(&[0xFF, 0xD8, 0xFF]), Err(JpeglsError::SourceTooSmall));
}

#[test]
fn scan_before_frame_is_rejected() {
    // SOS without a preceding SOF-55.
    let data = [0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(read_header(&data), Err(JpeglsError::ParameterValueNotSupported));
}

#[test]
fn truncated_scan_data_is_invalid() {
    // Valid header for an 8x8 image followed by an empty scan: the first
    // refill finds the EOI marker and no data bits.
    let mut data = vec![
        0xFF, 0xD8, // SOI
        0xFF, 0xF7, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
    ];
    data.extend_from_slice(&[0xFF, 0xD9]); // EOI directly after SOS

    let mut decoder = JpeglsDecoder::new(&data);
    decoder.read_header().unwrap();
    let mut destination = vec![0u8; 64];
    assert_eq!(decoder.decode(&mut destination), Err(JpeglsError::InvalidCompressedData));
}

#[test]
fn nonzero_restart_interval_is_not_supported() {
    let data = [
        0xFF, 0xD8, // SOI
        0xFF, 0xF7, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x11, 0x00,
        0xFF, 0xDD, 0x00, 0x04, 0x00, 0x10, // DRI, interval 16
        0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(read_header(&data), Err(JpeglsError::ParameterValueNotSupported));
}
