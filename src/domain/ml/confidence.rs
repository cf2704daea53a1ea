//! Confidence heuristic.
//!
//! The score is `clamp(1 - final_training_loss, 0, 1)`. Targets live on the `[0, 1]`
//! normalized scale, so a loss near zero reads as high confidence and a loss of one or more
//! reads as none. It is a proxy derived from fit quality, not a calibrated probability and not
//! a statistical interval.

pub fn estimate(final_training_loss: f64) -> f64 {
    if !final_training_loss.is_finite() {
        return 0.0;
    }
    (1.0 - final_training_loss).clamp(0.0, 1.0)
}
