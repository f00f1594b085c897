pub const MINIMUM_BITS_PER_SAMPLE: i32 = 2;
pub const MAXIMUM_BITS_PER_SAMPLE: i32 = 16;

pub const MINIMUM_COMPONENT_COUNT: i32 = 1;
pub const MAXIMUM_COMPONENT_COUNT: i32 = 255;
pub const MAXIMUM_COMPONENT_COUNT_IN_SCAN: i32 = 4;

// Default RESET value as defined in ISO/IEC 14495-1, table C.2.
pub const DEFAULT_RESET_THRESHOLD: i32 = 64;
pub const MINIMUM_RESET_THRESHOLD: i32 = 3;

// Implementation limit for the Golomb coding parameter (theoretical limit
// is 32; legal streams with 16-bit samples never reach 16).
pub const MAX_K_VALUE: i32 = 16;

// Size of the refill buffer used when decoding from a streaming source.
pub const STREAM_BUFFER_SIZE: usize = 40_000;

// Remaining-byte threshold at which the stream buffer slides and refills.
pub const STREAM_REFILL_THRESHOLD: usize = 64;

// Order of the run-length codes, ISO/IEC 14495-1, code segment A.15.
pub const J: [i32; 32] = [
    0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 9, 10, 11, 12, 13,
    14, 15,
];
