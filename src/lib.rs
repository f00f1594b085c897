/*!
# jpegls-rs

`jpegls-rs` is a pure Rust implementation of JPEG-LS (ISO/IEC 14495-1 /
ITU-T T.87), the low-complexity lossless and near-lossless still-image
compression standard built on LOCO-I context modelling and Golomb-Rice
coding. It targets the places JPEG-LS is still the workhorse: medical
imaging (DICOM transfer syntaxes), satellite payloads and archival of
high-fidelity sensor data.

## Decoding

```rust,no_run
use jpegls_rs::JpeglsDecoder;

let data: Vec<u8> = std::fs::read("image.jls").unwrap();
let mut decoder = JpeglsDecoder::new(&data);
decoder.read_header().unwrap();
let mut pixels = vec![0u8; decoder.destination_size()];
decoder.decode(&mut pixels).unwrap();
```

## Encoding

```rust
use jpegls_rs::{FrameInfo, JpeglsEncoder};

let frame_info = FrameInfo { width: 4, height: 4, bits_per_sample: 8, component_count: 1 };
let pixels = vec![128u8; 16];
let mut destination = vec![0u8; JpeglsEncoder::estimated_destination_size(&frame_info)];
let mut encoder = JpeglsEncoder::new(&mut destination);
encoder.set_frame_info(frame_info).unwrap();
let bytes_written = encoder.encode(&pixels).unwrap();
assert!(bytes_written > 0);
```

The crate contains no `unsafe` code and keeps no global state: every
decoder or encoder instance owns its contexts, line buffers and bit cache,
so independent scans decode safely on separate threads.
*/

#![forbid(unsafe_code)]

pub mod bit_reader;
pub mod coding_parameters;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod golomb_lut;
pub mod jpeg_marker_code;
pub mod jpeg_stream_reader;
pub mod jpeg_stream_writer;
pub mod line_sink;
pub mod regular_mode_context;
pub mod run_mode_context;
pub mod scan_decoder;
pub mod scan_encoder;
pub mod traits;

pub use decoder::JpeglsDecoder;
pub use encoder::JpeglsEncoder;
pub use error::JpeglsError;
pub use line_sink::{LineSink, RasterSink};

/// Basic parameters of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Width of the frame in pixels.
    pub width: u32,
    /// Height of the frame in pixels.
    pub height: u32,
    /// Bits per sample (2..=16).
    pub bits_per_sample: i32,
    /// Number of color components (1 for grayscale, 3 for RGB).
    pub component_count: i32,
}

/// Order of the components within a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterleaveMode {
    /// One scan per component, planar layout.
    None = 0,
    /// One scan, a full line of each component in turn.
    Line = 1,
    /// One scan, all components of each pixel in turn.
    Sample = 2,
}
