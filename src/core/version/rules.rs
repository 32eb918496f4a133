// ─── Rule Evaluator ───
// Platform-gating predicates attached to libraries and argument blocks.
// Shared by installation (what to download) and resolution (what to launch).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsConstraint>,
    /// Launcher feature flags (`is_demo_user`, `has_custom_resolution`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// OS version regex. Not evaluated: the platform carries no version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Rule {
    pub fn allow() -> Self {
        Self {
            action: RuleAction::Allow,
            os: None,
            features: None,
        }
    }

    pub fn disallow() -> Self {
        Self {
            action: RuleAction::Disallow,
            os: None,
            features: None,
        }
    }

    pub fn for_os(mut self, name: &str) -> Self {
        self.os.get_or_insert_with(OsConstraint::default).name = Some(name.to_string());
        self
    }

    pub fn for_arch(mut self, arch: &str) -> Self {
        self.os.get_or_insert_with(OsConstraint::default).arch = Some(arch.to_string());
        self
    }

    fn matches(&self, platform: &Platform, features: &HashSet<String>) -> bool {
        if let Some(os) = &self.os {
            if let Some(name) = &os.name {
                if name != platform.os.as_str() {
                    return false;
                }
            }
            if let Some(arch) = &os.arch {
                if !platform.arch_matches(arch) {
                    return false;
                }
            }
        }

        if let Some(required) = &self.features {
            for (feature, wanted) in required {
                if features.contains(feature) != *wanted {
                    return false;
                }
            }
        }

        true
    }
}

/// Evaluate a rule list for `platform` with no launcher features enabled.
///
/// - No rules → allowed.
/// - Otherwise start disallowed and let every matching rule set the
///   decision to its own action. The last matching rule wins.
pub fn evaluate(rules: &[Rule], platform: &Platform) -> bool {
    evaluate_with_features(rules, platform, &HashSet::new())
}

/// Same as [`evaluate`], with a set of enabled launcher feature flags.
pub fn evaluate_with_features(
    rules: &[Rule],
    platform: &Platform,
    features: &HashSet<String>,
) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut allowed = false;
    for rule in rules {
        if rule.matches(platform, features) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsName;

    fn windows() -> Platform {
        Platform::new(OsName::Windows, "x86_64")
    }

    fn linux() -> Platform {
        Platform::new(OsName::Linux, "x86_64")
    }

    #[test]
    fn no_rules_means_allowed() {
        assert!(evaluate(&[], &windows()));
    }

    #[test]
    fn allow_for_linux_only_applies_on_linux() {
        let rules = vec![Rule::allow().for_os("linux")];
        assert!(!evaluate(&rules, &windows()));
        assert!(evaluate(&rules, &linux()));
    }

    #[test]
    fn later_matching_rule_overrides_earlier_one() {
        let rules = vec![Rule::allow(), Rule::disallow().for_os("osx")];
        assert!(evaluate(&rules, &windows()));
        assert!(!evaluate(&rules, &Platform::new(OsName::Osx, "aarch64")));
    }

    #[test]
    fn non_conflicting_rules_are_order_independent() {
        let forward = vec![Rule::allow().for_os("linux"), Rule::allow().for_os("windows")];
        let mut reversed = forward.clone();
        reversed.reverse();

        for platform in [windows(), linux(), Platform::new(OsName::Osx, "x86_64")] {
            assert_eq!(evaluate(&forward, &platform), evaluate(&reversed, &platform));
        }
    }

    #[test]
    fn arch_constraint_uses_alias_equivalence() {
        let rules = vec![Rule::allow().for_arch("x64")];
        assert!(evaluate(&rules, &Platform::new(OsName::Windows, "amd64")));
        assert!(!evaluate(&rules, &Platform::new(OsName::Windows, "x86")));
    }

    #[test]
    fn feature_rules_require_enabled_feature() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow", "features": {"has_custom_resolution": true}}
        ]))
        .unwrap();

        assert!(!evaluate(&rules, &linux()));

        let enabled: HashSet<String> = ["has_custom_resolution".to_string()].into();
        assert!(evaluate_with_features(&rules, &linux(), &enabled));
    }

    #[test]
    fn deserializes_mojang_rule_shape() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow"},
            {"action": "disallow", "os": {"name": "osx", "version": "^10\\.5"}}
        ]))
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].action, RuleAction::Disallow);
        assert_eq!(rules[1].os.as_ref().unwrap().name.as_deref(), Some("osx"));
    }
}
