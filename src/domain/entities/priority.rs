//! Download priority hint.

/// Relative download priority in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DownloadPriority(f32);

impl DownloadPriority {
    /// Lowest priority.
    pub const LOW: Self = Self(0.25);
    /// System default priority.
    pub const DEFAULT: Self = Self(0.5);
    /// Highest priority.
    pub const HIGH: Self = Self(1.0);

    /// Creates a priority, clamping into `0.0..=1.0`. NaN maps to the default.
    #[must_use]
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self::DEFAULT
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Raw value.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// The higher of two priorities.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 { other } else { self }
    }
}

impl Default for DownloadPriority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_clamps() {
        assert_eq!(DownloadPriority::new(3.0), DownloadPriority::HIGH);
        assert_eq!(DownloadPriority::new(-1.0).value(), 0.0);
        assert_eq!(DownloadPriority::new(f32::NAN), DownloadPriority::DEFAULT);
    }

    #[test]
    fn test_priority_max() {
        let p = DownloadPriority::LOW.max(DownloadPriority::HIGH);
        assert_eq!(p, DownloadPriority::HIGH);
    }
}
