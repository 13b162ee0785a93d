// DSP utilities - gain conversion and output hygiene for the real-time callback

/// Flush denormals to zero
///
/// Denormal numbers (very close to 0) can slow some CPUs down badly.
/// Threshold: 1e-15, well below 32-bit float noise.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Hard clipping to [-1, 1] before integer conversion
#[inline]
pub fn hard_clip(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}

/// Decibels to linear gain. At or below -120 dB is silence; boosts are capped at +24 dB.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db.is_nan() || db <= -120.0 {
        return 0.0;
    }
    10f32.powf(db.min(24.0) / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(0.5), 0.5);
    }

    #[test]
    fn test_hard_clip() {
        assert_eq!(hard_clip(1.5), 1.0);
        assert_eq!(hard_clip(-2.0), -1.0);
        assert_eq!(hard_clip(0.3), 0.3);
    }

    #[test]
    fn test_db_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 0.001);
        assert!((db_to_gain(6.0) - 1.995).abs() < 0.001);
        assert_eq!(db_to_gain(-200.0), 0.0);
        assert_eq!(db_to_gain(f32::NEG_INFINITY), 0.0);
        assert_eq!(db_to_gain(f32::NAN), 0.0);
        assert!((db_to_gain(f32::INFINITY) - 15.85).abs() < 0.01);
    }
}
