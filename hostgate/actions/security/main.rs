//! Safety evaluation used by `SafetyClassifier`.

/// Case-insensitive denylist scanning of script text.
pub mod denylist;
/// Baseline tier rules per action kind.
pub mod tiers;
/// Combines tier rules, denylist hits and policy into verdicts.
pub mod commander;

pub use commander::{Disposition, SafetyCommander, SafetyVerdict};
pub use denylist::DenylistAnalyzer;
pub use tiers::{TierDecision, TierPolicy};
