//! Analysis settings.

use crate::error::Error;

/// Limits for the qualitative analysis.
///
/// `limit_order` caps the number of literals per cut set. When the cap
/// bites, the accumulated family is truncated, the truncation is logged
/// once, and the final products are a subset of the true family.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    limit_order: usize,
}

impl Settings {
    pub fn new() -> Self {
        Self { limit_order: 32 }
    }

    pub fn limit_order(&self) -> usize {
        self.limit_order
    }

    /// Sets the maximum cut set order. Must be positive.
    pub fn with_limit_order(mut self, limit_order: usize) -> Result<Self, Error> {
        if limit_order == 0 {
            return Err(Error::InvalidLimitOrder);
        }
        self.limit_order = limit_order;
        Ok(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(Settings::default().limit_order(), 32);
    }

    #[test]
    fn test_limit_validation() {
        assert!(Settings::new().with_limit_order(0).is_err());
        let settings = Settings::new().with_limit_order(4).unwrap();
        assert_eq!(settings.limit_order(), 4);
    }
}
