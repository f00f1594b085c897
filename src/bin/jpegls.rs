//! jpegls CLI - JPEG-LS codec command-line utility.
//!
//! Encodes raw samples to .jls, decodes .jls to raw pixels or PGM, and
//! prints frame information.

use clap::{Parser, Subcommand, ValueEnum};
use jpegls_rs::{FrameInfo, InterleaveMode, JpeglsDecoder, JpeglsEncoder};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

/// JPEG-LS (ISO/IEC 14495-1) encoder/decoder
#[derive(Parser)]
#[command(name = "jpegls")]
#[command(version)]
#[command(about = "JPEG-LS codec for lossless and near-lossless images", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpegls decode -i image.jls -o pixels.raw
    jpegls decode -i image.jls -o image.pgm -f pgm
    jpegls encode -i pixels.raw -o image.jls -W 512 -H 512
    jpegls info -i image.jls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a JPEG-LS image to raw pixels or PGM
    #[command(visible_alias = "d")]
    Decode {
        /// Input .jls file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the decoded pixels
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,
    },

    /// Encode raw pixel data to a JPEG-LS image
    #[command(visible_alias = "e")]
    Encode {
        /// Input raw pixel file (native byte order for 16-bit samples)
        #[arg(short, long)]
        input: PathBuf,

        /// Output .jls file
        #[arg(short, long)]
        output: PathBuf,

        /// Image width in pixels
        #[arg(short = 'W', long)]
        width: u32,

        /// Image height in pixels
        #[arg(short = 'H', long)]
        height: u32,

        /// Bits per sample
        #[arg(short, long, default_value_t = 8)]
        bits: i32,

        /// Number of components (1 = grayscale, 3 = RGB)
        #[arg(short, long, default_value_t = 1)]
        components: i32,

        /// Maximum absolute reconstruction error (0 = lossless)
        #[arg(short, long, default_value_t = 0)]
        near: i32,

        /// Interleave mode for multi-component images
        #[arg(long, default_value = "none", value_enum)]
        interleave: InterleaveArg,
    },

    /// Print frame information of a JPEG-LS image
    #[command(visible_alias = "i")]
    Info {
        /// Input .jls file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Raw binary samples
    Raw,
    /// Portable GrayMap (single component, 8-bit only)
    Pgm,
}

#[derive(Clone, Copy, ValueEnum)]
enum InterleaveArg {
    None,
    Line,
    Sample,
}

impl From<InterleaveArg> for InterleaveMode {
    fn from(value: InterleaveArg) -> Self {
        match value {
            InterleaveArg::None => InterleaveMode::None,
            InterleaveArg::Line => InterleaveMode::Line,
            InterleaveArg::Sample => InterleaveMode::Sample,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Decode { input, output, format } => {
            let data = fs::read(&input).map_err(|e| format!("{}: {e}", input.display()))?;
            let mut decoder = JpeglsDecoder::new(&data);
            decoder.read_header().map_err(|e| e.to_string())?;
            let frame_info = decoder.frame_info();
            let mut pixels = vec![0u8; decoder.destination_size()];
            decoder.decode(&mut pixels).map_err(|e| e.to_string())?;

            match format {
                OutputFormat::Raw => {
                    fs::write(&output, &pixels).map_err(|e| e.to_string())?;
                }
                OutputFormat::Pgm => {
                    if frame_info.component_count != 1 || frame_info.bits_per_sample > 8 {
                        return Err("PGM output requires a single 8-bit component".into());
                    }
                    let mut pgm =
                        format!("P5\n{} {}\n255\n", frame_info.width, frame_info.height)
                            .into_bytes();
                    pgm.extend_from_slice(&pixels);
                    fs::write(&output, &pgm).map_err(|e| e.to_string())?;
                }
            }
            println!(
                "decoded {}x{}x{} ({} bits) -> {}",
                frame_info.width,
                frame_info.height,
                frame_info.component_count,
                frame_info.bits_per_sample,
                output.display()
            );
            Ok(())
        }
        Commands::Encode { input, output, width, height, bits, components, near, interleave } => {
            let pixels = fs::read(&input).map_err(|e| format!("{}: {e}", input.display()))?;
            let frame_info = FrameInfo {
                width,
                height,
                bits_per_sample: bits,
                component_count: components,
            };
            let mut destination =
                vec![0u8; JpeglsEncoder::estimated_destination_size(&frame_info)];
            let mut encoder = JpeglsEncoder::new(&mut destination);
            encoder.set_frame_info(frame_info).map_err(|e| e.to_string())?;
            encoder.set_near_lossless(near).map_err(|e| e.to_string())?;
            encoder.set_interleave_mode(interleave.into());
            let bytes_written = encoder.encode(&pixels).map_err(|e| e.to_string())?;
            fs::write(&output, &destination[..bytes_written]).map_err(|e| e.to_string())?;
            println!(
                "encoded {} samples -> {} bytes ({})",
                pixels.len(),
                bytes_written,
                output.display()
            );
            Ok(())
        }
        Commands::Info { input } => {
            let data = fs::read(&input).map_err(|e| format!("{}: {e}", input.display()))?;
            let mut decoder = JpeglsDecoder::new(&data);
            decoder.read_header().map_err(|e| e.to_string())?;
            let frame_info = decoder.frame_info();
            println!("width:       {}", frame_info.width);
            println!("height:      {}", frame_info.height);
            println!("components:  {}", frame_info.component_count);
            println!("bits/sample: {}", frame_info.bits_per_sample);
            Ok(())
        }
    }
}
