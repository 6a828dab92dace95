//! Priority constants for [`WorkOptions::with_priority`](crate::WorkOptions::with_priority).
//!
//! Any `i32` is a valid priority; these are just named points on the scale.
//! Zero is the default and takes the collection's fast lane.
//!
//! # Usage
//!
//! ```rust
//! use corral_api::WorkOptions;
//! use corral_api::priority::{HIGH, LOW};
//!
//! let urgent = WorkOptions::default().with_priority(HIGH);
//! let bulk = WorkOptions::default().with_priority(LOW);
//! assert!(urgent.priority > bulk.priority);
//! ```

/// Background priority (-20)
pub const BACKGROUND: i32 = -20;

/// Low priority (-10)
pub const LOW: i32 = -10;

/// Normal priority (0)
pub const NORMAL: i32 = 0;

/// High priority (10)
pub const HIGH: i32 = 10;

/// Critical priority (20)
pub const CRITICAL: i32 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_constants_are_ordered() {
        assert!(BACKGROUND < LOW);
        assert!(LOW < NORMAL);
        assert!(NORMAL < HIGH);
        assert!(HIGH < CRITICAL);
        assert_eq!(NORMAL, 0);
    }
}
