//! Advisory recommendations for a candidate folder.
//!
//! Purely informational: nothing in the engine consults an advisory or
//! enforces it. The CLI prints one before asking for confirmation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advisory {
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub recommended_action: String,
}

/// Source of advisories, e.g. a remote assessment service.
pub trait Advisor: Send + Sync {
    fn advise(&self, name: &str, path: &Path) -> Advisory;
}

/// Used when no assessment service is reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAdvisor;

impl Advisor for OfflineAdvisor {
    fn advise(&self, _name: &str, _path: &Path) -> Advisory {
        Advisory {
            is_safe: true,
            risk_level: RiskLevel::Medium,
            reason: "No assessment service available for verification. Proceed with caution; \
                     roaming application data is generally safe to move."
                .into(),
            recommended_action: "Ensure the application is closed before moving.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_advice_is_cautious() {
        let a = OfflineAdvisor.advise("App", Path::new("/data/App"));
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert!(a.recommended_action.contains("closed"));
    }

    #[test]
    fn advisory_json_shape() {
        let json = r#"{"isSafe":false,"riskLevel":"High","reason":"r","recommendedAction":"a"}"#;
        let a: Advisory = serde_json::from_str(json).unwrap();
        assert_eq!(a.risk_level, RiskLevel::High);
        assert!(!a.is_safe);
    }
}
