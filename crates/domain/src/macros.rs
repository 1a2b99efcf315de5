//! Macro for implementing Display and FromStr for status enums
//!
//! This macro eliminates boilerplate for status enum conversions by providing
//! a single implementation for both Display and FromStr traits. It handles
//! case-insensitive parsing and consistent string representation.
//!
//! # Example
//!
//! ```rust
//! use pimsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum TaskPhase {
//!     Queued,
//!     Running,
//!     Finished,
//! }
//!
//! impl_domain_status_conversions!(TaskPhase {
//!     Queued => "queued",
//!     Running => "running",
//!     Finished => "finished",
//! });
//! ```

/// Implements Display and FromStr traits for status enums
///
/// This macro generates:
/// - Display trait: converts enum variants to lowercase strings
/// - FromStr trait: parses case-insensitive strings to enum variants
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their string
///   representations
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    // Test enum for macro validation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestStatus {
        Idle,
        Fetching,
        Done,
    }

    impl_domain_status_conversions!(TestStatus {
        Idle => "idle",
        Fetching => "fetching",
        Done => "done",
    });

    #[test]
    fn test_display_conversion() {
        assert_eq!(TestStatus::Idle.to_string(), "idle");
        assert_eq!(TestStatus::Fetching.to_string(), "fetching");
        assert_eq!(TestStatus::Done.to_string(), "done");
    }

    #[test]
    fn test_fromstr_case_insensitive() {
        assert_eq!(TestStatus::from_str("idle").unwrap(), TestStatus::Idle);
        assert_eq!(TestStatus::from_str("FETCHING").unwrap(), TestStatus::Fetching);
        assert_eq!(TestStatus::from_str("DoNe").unwrap(), TestStatus::Done);
    }

    #[test]
    fn test_fromstr_invalid() {
        let result = TestStatus::from_str("stalled");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("Invalid TestStatus: stalled"));
    }

    #[test]
    fn test_roundtrip() {
        for status in [TestStatus::Idle, TestStatus::Fetching, TestStatus::Done] {
            let parsed = TestStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, parsed);
        }
    }
}
