use crate::constants::{DEFAULT_RESET_THRESHOLD, MINIMUM_RESET_THRESHOLD};
use crate::error::JpeglsError;
use crate::InterleaveMode;
use std::cmp::{max, min};

/// Parameters of a single scan, collected from the SOS segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodingParameters {
    pub near_lossless: i32,
    pub interleave_mode: InterleaveMode,
    pub restart_interval: u32,
}

impl Default for CodingParameters {
    fn default() -> Self {
        Self {
            near_lossless: 0,
            interleave_mode: InterleaveMode::None,
            restart_interval: 0,
        }
    }
}

/// JPEG-LS preset coding parameters, transmitted in an LSE segment
/// (type 1). A zero field means "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresetCodingParameters {
    pub maximum_sample_value: i32,
    pub threshold1: i32,
    pub threshold2: i32,
    pub threshold3: i32,
    pub reset_value: i32,
}

// Clamping function as defined by ISO/IEC 14495-1, Figure C.3.
const fn clamp(i: i32, j: i32, maximum_sample_value: i32) -> i32 {
    if i > maximum_sample_value || i < j {
        j
    } else {
        i
    }
}

pub fn compute_maximum_near_lossless(maximum_sample_value: i32) -> i32 {
    debug_assert!(maximum_sample_value >= 1);
    min(255, maximum_sample_value / 2)
}

/// Default threshold values as defined by ISO/IEC 14495-1, C.2.4.1.1.1.
pub fn compute_default(maximum_sample_value: i32, near_lossless: i32) -> PresetCodingParameters {
    debug_assert!(maximum_sample_value <= u16::MAX as i32);

    // Basic thresholds, table C.3 (MAXVAL = 255, NEAR = 0).
    const BASIC_T1: i32 = 3;
    const BASIC_T2: i32 = 7;
    const BASIC_T3: i32 = 21;

    if maximum_sample_value >= 128 {
        let factor = (min(maximum_sample_value, 4095) + 128) / 256;
        let threshold1 = clamp(
            factor * (BASIC_T1 - 2) + 2 + 3 * near_lossless,
            near_lossless + 1,
            maximum_sample_value,
        );
        let threshold2 = clamp(
            factor * (BASIC_T2 - 3) + 3 + 5 * near_lossless,
            threshold1,
            maximum_sample_value,
        );
        PresetCodingParameters {
            maximum_sample_value,
            threshold1,
            threshold2,
            threshold3: clamp(
                factor * (BASIC_T3 - 4) + 4 + 7 * near_lossless,
                threshold2,
                maximum_sample_value,
            ),
            reset_value: DEFAULT_RESET_THRESHOLD,
        }
    } else {
        let factor = 256 / (maximum_sample_value + 1);
        let threshold1 = clamp(
            max(2, BASIC_T1 / factor + 3 * near_lossless),
            near_lossless + 1,
            maximum_sample_value,
        );
        let threshold2 = clamp(
            max(3, BASIC_T2 / factor + 5 * near_lossless),
            threshold1,
            maximum_sample_value,
        );
        PresetCodingParameters {
            maximum_sample_value,
            threshold1,
            threshold2,
            threshold3: clamp(
                max(4, BASIC_T3 / factor + 7 * near_lossless),
                threshold2,
                maximum_sample_value,
            ),
            reset_value: DEFAULT_RESET_THRESHOLD,
        }
    }
}

/// Validates transmitted preset parameters against ISO/IEC 14495-1,
/// C.2.4.1.1 (table C.1) and fills in defaults for zero fields.
pub fn validate_preset_coding_parameters(
    pc: &PresetCodingParameters,
    maximum_component_value: i32,
    near_lossless: i32,
) -> Result<PresetCodingParameters, JpeglsError> {
    debug_assert!(maximum_component_value >= 3 && maximum_component_value <= u16::MAX as i32);

    if pc.maximum_sample_value != 0
        && (pc.maximum_sample_value < 1 || pc.maximum_sample_value > maximum_component_value)
    {
        return Err(JpeglsError::ParameterValueNotSupported);
    }

    let maximum_sample_value = if pc.maximum_sample_value != 0 {
        pc.maximum_sample_value
    } else {
        maximum_component_value
    };

    if pc.threshold1 != 0
        && (pc.threshold1 < near_lossless + 1 || pc.threshold1 > maximum_sample_value)
    {
        return Err(JpeglsError::ParameterValueNotSupported);
    }

    let defaults = compute_default(maximum_sample_value, near_lossless);
    let threshold1 = if pc.threshold1 != 0 { pc.threshold1 } else { defaults.threshold1 };

    if pc.threshold2 != 0 && (pc.threshold2 < threshold1 || pc.threshold2 > maximum_sample_value) {
        return Err(JpeglsError::ParameterValueNotSupported);
    }

    let threshold2 = if pc.threshold2 != 0 { pc.threshold2 } else { defaults.threshold2 };

    if pc.threshold3 != 0 && (pc.threshold3 < threshold2 || pc.threshold3 > maximum_sample_value) {
        return Err(JpeglsError::ParameterValueNotSupported);
    }

    if pc.reset_value != 0
        && (pc.reset_value < MINIMUM_RESET_THRESHOLD
            || pc.reset_value > max(255, maximum_sample_value))
    {
        return Err(JpeglsError::ParameterValueNotSupported);
    }

    Ok(PresetCodingParameters {
        maximum_sample_value,
        threshold1,
        threshold2,
        threshold3: if pc.threshold3 != 0 { pc.threshold3 } else { defaults.threshold3 },
        reset_value: if pc.reset_value != 0 { pc.reset_value } else { defaults.reset_value },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_for_8_bit_lossless() {
        let pc = compute_default(255, 0);
        assert_eq!(pc.threshold1, 3);
        assert_eq!(pc.threshold2, 7);
        assert_eq!(pc.threshold3, 21);
        assert_eq!(pc.reset_value, 64);
    }

    #[test]
    fn default_thresholds_for_12_bit() {
        // Table C.3 scaling for MAXVAL = 4095.
        let pc = compute_default(4095, 0);
        assert_eq!(pc.threshold1, 18);
        assert_eq!(pc.threshold2, 67);
        assert_eq!(pc.threshold3, 276);
    }

    #[test]
    fn near_lossless_raises_thresholds() {
        let near = 2;
        let pc = compute_default(255, near);
        assert_eq!(pc.threshold1, 3 + 3 * near);
        assert_eq!(pc.threshold2, 7 + 5 * near);
        assert_eq!(pc.threshold3, 21 + 7 * near);
    }

    #[test]
    fn zero_fields_are_replaced_by_defaults() {
        let validated =
            validate_preset_coding_parameters(&PresetCodingParameters::default(), 255, 0).unwrap();
        assert_eq!(validated, compute_default(255, 0));
    }

    #[test]
    fn out_of_order_thresholds_are_rejected() {
        let pc = PresetCodingParameters {
            maximum_sample_value: 255,
            threshold1: 10,
            threshold2: 5,
            threshold3: 0,
            reset_value: 0,
        };
        assert_eq!(
            validate_preset_coding_parameters(&pc, 255, 0),
            Err(JpeglsError::ParameterValueNotSupported)
        );
    }

    #[test]
    fn custom_reset_value_is_accepted() {
        let pc = PresetCodingParameters { reset_value: 63, ..Default::default() };
        let validated = validate_preset_coding_parameters(&pc, 65535, 0).unwrap();
        assert_eq!(validated.reset_value, 63);
    }

    #[test]
    fn maximum_near_lossless_is_half_range_capped_at_255() {
        assert_eq!(compute_maximum_near_lossless(255), 127);
        assert_eq!(compute_maximum_near_lossless(3), 1);
        assert_eq!(compute_maximum_near_lossless(65535), 255);
    }
}
