use crate::constants::MAX_K_VALUE;
use crate::error::JpeglsError;

/// State of one of the two run-interruption contexts. `run_interruption_type`
/// is 1 for the context used when Ra and Rb are (near-)equal and 0
/// otherwise; `nn` counts negative errors for the sign-bias decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunModeContext {
    run_interruption_type: i32,
    a: i32,
    n: i32,
    nn: i32,
}

impl RunModeContext {
    pub fn new(run_interruption_type: i32, range: i32) -> Self {
        Self {
            run_interruption_type,
            a: crate::regular_mode_context::initialization_value_for_a(range),
            n: 1,
            nn: 0,
        }
    }

    pub fn run_interruption_type(&self) -> i32 {
        self.run_interruption_type
    }

    /// Golomb parameter for the interruption error, code segment A.18.
    pub fn golomb_coding_parameter(&self) -> Result<i32, JpeglsError> {
        let temp = self.a + (self.n >> 1) * self.run_interruption_type;
        let mut n_test = self.n;
        let mut k = 0;
        while n_test < temp {
            n_test <<= 1;
            k += 1;
            if k > MAX_K_VALUE {
                return Err(JpeglsError::InvalidCompressedData);
            }
        }
        Ok(k)
    }

    /// Recovers the signed error from a decoded mapped value. `mapped_value`
    /// is the transmitted value plus the run interruption type (the inverse
    /// of the encoder-side subtraction in [`Self::compute_map`] terms).
    pub fn decode_error_value(&self, mapped_value: i32, k: i32) -> i32 {
        let map = (mapped_value & 1) != 0;
        let error_value_abs = (mapped_value + i32::from(map)) / 2;

        if (k != 0 || (2 * self.nn >= self.n)) == map {
            debug_assert!(map == self.compute_map(-error_value_abs, k));
            -error_value_abs
        } else {
            debug_assert!(map == self.compute_map(error_value_abs, k));
            error_value_abs
        }
    }

    /// Encoder-side sign/bias mapping decision, code segment A.21.
    pub fn compute_map(&self, error_value: i32, k: i32) -> bool {
        if k == 0 && error_value > 0 && 2 * self.nn < self.n {
            return true;
        }
        if error_value < 0 && 2 * self.nn >= self.n {
            return true;
        }
        if error_value < 0 && k != 0 {
            return true;
        }
        false
    }

    /// Context update, code segment A.23.
    pub fn update_variables(
        &mut self,
        error_value: i32,
        e_mapped_error_value: i32,
        reset_threshold: i32,
    ) {
        if error_value < 0 {
            self.nn += 1;
        }
        self.a += (e_mapped_error_value + 1 - self.run_interruption_type) >> 1;

        if self.n == reset_threshold {
            self.a >>= 1;
            self.n >>= 1;
            self.nn >>= 1;
        }
        self.n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The encoder maps an error as
    /// `2 * |error| - run_interruption_type - map`; the decoder adds the
    /// run interruption type back before unmapping. The two must be exact
    /// inverses for every context state and k.
    #[test]
    fn map_and_unmap_are_inverse() {
        for ritype in 0..=1 {
            for nn in 0..8 {
                for n in 1..16 {
                    let mut context = RunModeContext::new(ritype, 256);
                    context.n = n;
                    context.nn = nn;
                    for k in 0..4 {
                        for error_value in -20..=20 {
                            let map = context.compute_map(error_value, k);
                            let e_mapped = 2 * error_value.abs() - ritype - i32::from(map);
                            if e_mapped < 0 {
                                continue; // not producible by the encoder
                            }
                            let decoded = context.decode_error_value(e_mapped + ritype, k);
                            assert_eq!(
                                decoded, error_value,
                                "ritype={ritype} n={n} nn={nn} k={k}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn negative_errors_increment_nn() {
        let mut context = RunModeContext::new(0, 256);
        context.update_variables(-3, 5, 64);
        assert_eq!(context.nn, 1);
        context.update_variables(3, 5, 64);
        assert_eq!(context.nn, 1);
    }

    #[test]
    fn reset_halves_accumulators() {
        let mut context = RunModeContext::new(0, 256);
        context.n = 64;
        context.nn = 10;
        context.a = 40;
        context.update_variables(-1, 1, 64);
        assert_eq!(context.n, 33);
        assert_eq!(context.nn, 5);
        assert!(context.a <= 21);
    }

    #[test]
    fn golomb_parameter_is_bounded() {
        let context = RunModeContext::new(1, 65536);
        let k = context.golomb_coding_parameter().unwrap();
        assert!((0..MAX_K_VALUE + 1).contains(&k));
    }
}
