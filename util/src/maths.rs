//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{AsPrimitive, Float};

/// Map a value from one range into another.
///
/// Values outside the source range are extrapolated, clamp before mapping if that is not
/// desired.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value into `[min, max]`.
///
/// Unlike `f64::clamp` a NaN value is mapped to `fallback` rather than propagated, which is the
/// behaviour needed anywhere a value ends up driving hardware.
pub fn clamp_finite<T>(value: T, min: T, max: T, fallback: T) -> T
where
    T: Float
{
    if !value.is_finite() {
        if value.is_nan() {
            return fallback
        }
        return if value > T::zero() { max } else { min }
    }

    value.max(min).min(max)
}

/// Arithmetic mean of a slice, or `None` if it is empty.
pub fn mean<T>(values: &[T]) -> Option<f64>
where
    T: AsPrimitive<f64>
{
    if values.is_empty() {
        return None
    }

    let sum: f64 = values.iter().map(|&v| v.as_()).sum();
    Some(sum / values.len() as f64)
}
