use crate::constants::MAX_K_VALUE;
use crate::error::JpeglsError;

/// State of one of the 365 regular-mode contexts: the accumulators A
/// (absolute errors), B (signed errors, bias indicator), the prediction
/// correction C and the occurrence count N.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularModeContext {
    a: i32,
    b: i32,
    c: i32,
    n: i32,
}

impl RegularModeContext {
    pub fn new(range: i32) -> Self {
        Self {
            a: initialization_value_for_a(range),
            b: 0,
            c: 0,
            n: 1,
        }
    }

    pub fn c(&self) -> i32 {
        self.c
    }

    /// Bias correction for k = 0, code segment A.11: returns -1 (applied
    /// by XOR) when 2B <= -N, 0 otherwise. Only meaningful when both k and
    /// NEAR are zero; callers pass `k | near_lossless`.
    pub fn error_correction(&self, k: i32) -> i32 {
        if k != 0 {
            return 0;
        }
        (2 * self.b + self.n - 1) >> 31
    }

    /// Context update, code segments A.12 and A.13: accumulate the
    /// (dequantised) error, halve the accumulators when N reaches the
    /// reset threshold, then steer B into (-N, 0] with a single correction
    /// of C in either direction.
    pub fn update_variables_and_bias(
        &mut self,
        error_value: i32,
        near_lossless: i32,
        reset_threshold: i32,
    ) -> Result<(), JpeglsError> {
        debug_assert!(self.n != 0);

        self.a += error_value.abs();
        self.b += error_value * (2 * near_lossless + 1);

        // A hostile stream cannot push the accumulators this far between
        // resets; treat it as corrupt input rather than overflowing.
        const MAX_ACCUMULATOR: i32 = 65536 * 256;
        if self.a >= MAX_ACCUMULATOR || self.b.abs() >= MAX_ACCUMULATOR {
            return Err(JpeglsError::InvalidCompressedData);
        }

        if self.n == reset_threshold {
            self.a >>= 1;
            self.b >>= 1;
            self.n >>= 1;
        }
        self.n += 1;

        const MIN_C: i32 = -128;
        const MAX_C: i32 = 127;
        if self.b + self.n <= 0 {
            self.b += self.n;
            if self.b <= -self.n {
                self.b = -self.n + 1;
            }
            if self.c > MIN_C {
                self.c -= 1;
            }
        } else if self.b > 0 {
            self.b -= self.n;
            if self.b > 0 {
                self.b = 0;
            }
            if self.c < MAX_C {
                self.c += 1;
            }
        }
        Ok(())
    }

    /// Golomb coding parameter, code segment A.10: the smallest k with
    /// N << k >= A.
    pub fn golomb_coding_parameter(&self) -> Result<i32, JpeglsError> {
        let mut k = 0;
        while (self.n << k) < self.a && k < MAX_K_VALUE {
            k += 1;
        }
        if k == MAX_K_VALUE {
            return Err(JpeglsError::InvalidCompressedData);
        }
        Ok(k)
    }
}

pub fn initialization_value_for_a(range: i32) -> i32 {
    std::cmp::max(2, (range + 32) / 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_keeps_golomb_parameter_defined() {
        let context = RegularModeContext::new(256);
        assert!(context.a >= 2);
        assert_eq!(context.n, 1);
        assert_eq!(context.golomb_coding_parameter().unwrap(), 2);
    }

    #[test]
    fn c_stays_clamped_under_sustained_bias() {
        let mut context = RegularModeContext::new(256);
        for _ in 0..1000 {
            context.update_variables_and_bias(-10, 0, 64).unwrap();
            assert!(context.c >= -128 && context.c <= 127);
            assert!(context.b > -context.n && context.b <= 0, "B in (-N, 0]");
        }
        assert_eq!(context.c, -128);

        let mut context = RegularModeContext::new(256);
        for _ in 0..1000 {
            context.update_variables_and_bias(10, 0, 64).unwrap();
            assert!(context.c >= -128 && context.c <= 127);
        }
        assert_eq!(context.c, 127);
    }

    #[test]
    fn n_is_halved_at_reset_threshold() {
        let mut context = RegularModeContext::new(256);
        for _ in 0..200 {
            context.update_variables_and_bias(1, 0, 64).unwrap();
            assert!(context.n >= 1 && context.n <= 64);
            assert!(context.a >= 1);
        }
    }

    #[test]
    fn error_correction_is_zero_or_minus_one() {
        let mut context = RegularModeContext::new(256);
        assert_eq!(context.error_correction(0), 0);
        assert_eq!(context.error_correction(1), 0);
        // Push B strongly negative without letting the bias update absorb
        // everything; the correction must stay in {0, -1}.
        for _ in 0..10 {
            let _ = context.update_variables_and_bias(-5, 0, 64);
            let correction = context.error_correction(0);
            assert!(correction == 0 || correction == -1);
        }
    }

    #[test]
    fn golomb_parameter_grows_with_a() {
        let mut context = RegularModeContext::new(256);
        for _ in 0..20 {
            context.update_variables_and_bias(100, 0, 64).unwrap();
        }
        assert!(context.golomb_coding_parameter().unwrap() > 2);
    }
}
