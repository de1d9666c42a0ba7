//! Decay strategies.
//!
//! Every strategy shares the signature
//! `(learning_rate, step, decay_steps, decay_rate, staircase) -> learning_rate`
//! so that the registry can store them side by side. `step` is the effective
//! step, i.e. already offset by `start_decay_steps`.

/// Signature shared by all decay strategies.
pub type DecayFn = fn(f64, u64, u64, f64, bool) -> f64;

/// `step / decay_steps`, floored when `staircase` is set.
fn progress(step: u64, decay_steps: u64, staircase: bool) -> f64 {
    if decay_steps == 0 {
        return 0.0;
    }
    let p = step as f64 / decay_steps as f64;
    if staircase { p.floor() } else { p }
}

/// Formula: lr * decay_rate^(step / decay_steps)
pub fn exponential_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    decay_rate: f64,
    staircase: bool,
) -> f64 {
    learning_rate * decay_rate.powf(progress(step, decay_steps, staircase))
}

/// Formula: lr / (1 + decay_rate * step / decay_steps)
pub fn inverse_time_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    decay_rate: f64,
    staircase: bool,
) -> f64 {
    learning_rate / (1.0 + decay_rate * progress(step, decay_steps, staircase))
}

/// Formula: lr * exp(-decay_rate * step / decay_steps)
pub fn natural_exp_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    decay_rate: f64,
    staircase: bool,
) -> f64 {
    learning_rate * (-decay_rate * progress(step, decay_steps, staircase)).exp()
}

/// Linear decay from `learning_rate` to `decay_rate` (the end learning rate)
/// over `decay_steps`, then held at `decay_rate`.
pub fn polynomial_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    decay_rate: f64,
    staircase: bool,
) -> f64 {
    let p = progress(step.min(decay_steps), decay_steps, staircase);
    (learning_rate - decay_rate) * (1.0 - p) + decay_rate
}

/// Transformer schedule: `decay_rate` is the model dimension and
/// `decay_steps` the number of warmup steps.
///
/// Formula: lr * d^-0.5 * min(s^-0.5, s * warmup^-1.5), with s = step + 1
pub fn noam_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    decay_rate: f64,
    _staircase: bool,
) -> f64 {
    let step = (step + 1) as f64;
    let warmup = decay_steps.max(1) as f64;
    learning_rate * decay_rate.powf(-0.5) * step.powf(-0.5).min(step * warmup.powf(-1.5))
}

/// Inverse square root schedule, constant during the `decay_steps` warmup.
///
/// Formula: lr / sqrt(max(step, warmup))
pub fn rsqrt_decay(
    learning_rate: f64,
    step: u64,
    decay_steps: u64,
    _decay_rate: f64,
    _staircase: bool,
) -> f64 {
    learning_rate / (step.max(decay_steps).max(1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn exponential_continuous_and_staircase() {
        assert!((exponential_decay(1.0, 0, 10, 0.5, false) - 1.0).abs() < EPS);
        assert!((exponential_decay(1.0, 5, 10, 0.5, false) - 0.5f64.sqrt()).abs() < EPS);
        assert!((exponential_decay(1.0, 5, 10, 0.5, true) - 1.0).abs() < EPS);
        assert!((exponential_decay(1.0, 25, 10, 0.5, true) - 0.25).abs() < EPS);
    }

    #[test]
    fn inverse_time_and_natural_exp() {
        assert!((inverse_time_decay(1.0, 10, 10, 1.0, false) - 0.5).abs() < EPS);
        assert!((natural_exp_decay(2.0, 10, 10, 1.0, false) - 2.0 * (-1.0f64).exp()).abs() < EPS);
        assert!((natural_exp_decay(2.0, 9, 10, 1.0, true) - 2.0).abs() < EPS);
    }

    #[test]
    fn polynomial_reaches_end_rate() {
        assert!((polynomial_decay(1.0, 0, 100, 0.1, false) - 1.0).abs() < EPS);
        assert!((polynomial_decay(1.0, 50, 100, 0.1, false) - 0.55).abs() < EPS);
        assert!((polynomial_decay(1.0, 500, 100, 0.1, false) - 0.1).abs() < EPS);
    }

    #[test]
    fn noam_peaks_at_warmup() {
        let before = noam_decay(1.0, 100, 4000, 512.0, false);
        let peak = noam_decay(1.0, 3999, 4000, 512.0, false);
        let after = noam_decay(1.0, 20000, 4000, 512.0, false);
        assert!(before < peak);
        assert!(after < peak);
    }

    #[test]
    fn rsqrt_constant_during_warmup() {
        let warm = rsqrt_decay(1.0, 10, 100, 0.0, false);
        assert!((warm - 0.1).abs() < EPS);
        assert!((rsqrt_decay(1.0, 400, 100, 0.0, false) - 0.05).abs() < EPS);
    }
}
