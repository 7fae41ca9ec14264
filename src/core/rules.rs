// ─── Rule Evaluator ───
// Platform-conditional allow/disallow gates used by libraries and arguments.
//
// Evaluation starts at "disallow"; rules are walked in declaration order and
// every rule whose conditions all hold replaces the running result. The last
// satisfied rule wins.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::platform::PlatformInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regular expression matched against the OS version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
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

    pub fn with_os(mut self, os: OsCondition) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_feature(mut self, name: &str, value: bool) -> Self {
        self.features
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value);
        self
    }

    fn applies(&self, platform: &PlatformInfo, features: &FeatureSet) -> bool {
        if let Some(os) = &self.os {
            if !os_matches(os, platform) {
                return false;
            }
        }

        if let Some(required) = &self.features {
            if !required
                .iter()
                .all(|(name, value)| features.get(name) == *value)
            {
                return false;
            }
        }

        true
    }
}

/// Launch-time feature flags referenced by `features` rule conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    pub is_demo_user: bool,
    pub has_custom_resolution: bool,
    pub has_quick_plays_support: bool,
    pub is_quick_play_singleplayer: bool,
    pub is_quick_play_multiplayer: bool,
    pub is_quick_play_realms: bool,
}

impl FeatureSet {
    /// Unknown feature names read as `false`.
    pub fn get(&self, name: &str) -> bool {
        match name {
            "is_demo_user" => self.is_demo_user,
            "has_custom_resolution" => self.has_custom_resolution,
            "has_quick_plays_support" => self.has_quick_plays_support,
            "is_quick_play_singleplayer" => self.is_quick_play_singleplayer,
            "is_quick_play_multiplayer" => self.is_quick_play_multiplayer,
            "is_quick_play_realms" => self.is_quick_play_realms,
            _ => false,
        }
    }
}

fn os_matches(os: &OsCondition, platform: &PlatformInfo) -> bool {
    if let Some(name) = &os.name {
        if name != platform.os.as_str() {
            return false;
        }
    }

    if let Some(arch) = &os.arch {
        if arch != &platform.arch {
            return false;
        }
    }

    if let Some(pattern) = &os.version {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&platform.os_version) {
                    return false;
                }
            }
            Err(e) => {
                warn!("Ignoring rule with invalid os.version pattern {:?}: {}", pattern, e);
                return false;
            }
        }
    }

    true
}

/// Evaluate `rules` with no launch features enabled.
pub fn evaluate(rules: &[Rule], platform: &PlatformInfo) -> RuleAction {
    evaluate_with_features(rules, platform, &FeatureSet::default())
}

pub fn evaluate_with_features(
    rules: &[Rule],
    platform: &PlatformInfo,
    features: &FeatureSet,
) -> RuleAction {
    let mut result = RuleAction::Disallow;

    for rule in rules {
        if rule.applies(platform, features) {
            result = rule.action;
        }
    }

    result
}

/// Libraries without a rule set are always included.
pub fn library_allowed(rules: Option<&[Rule]>, platform: &PlatformInfo) -> bool {
    match rules {
        None => true,
        Some(rules) => evaluate(rules, platform) == RuleAction::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsName;

    fn linux() -> PlatformInfo {
        PlatformInfo::new(OsName::Linux, "6.1.0", "x86_64", "64")
    }

    fn os_named(name: &str) -> OsCondition {
        OsCondition {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    #[test]
    fn empty_rule_list_disallows() {
        assert_eq!(evaluate(&[], &linux()), RuleAction::Disallow);
    }

    #[test]
    fn last_satisfied_rule_wins() {
        let rules = vec![Rule::allow(), Rule::disallow().with_os(os_named("linux"))];
        assert_eq!(evaluate(&rules, &linux()), RuleAction::Disallow);

        let reversed = vec![Rule::disallow().with_os(os_named("linux")), Rule::allow()];
        assert_eq!(evaluate(&reversed, &linux()), RuleAction::Allow);
    }

    #[test]
    fn non_matching_rules_do_not_contribute() {
        let rules = vec![Rule::allow(), Rule::disallow().with_os(os_named("osx"))];
        assert_eq!(evaluate(&rules, &linux()), RuleAction::Allow);
    }

    #[test]
    fn version_regex_and_arch_conditions() {
        let platform = PlatformInfo::new(OsName::Osx, "10.5.8", "x86", "32");
        let rules = vec![Rule::allow().with_os(OsCondition {
            name: Some("osx".into()),
            version: Some("^10\\.5\\.\\d$".into()),
            arch: None,
        })];
        assert_eq!(evaluate(&rules, &platform), RuleAction::Allow);

        let arch_rules = vec![Rule::allow().with_os(OsCondition {
            arch: Some("x86".into()),
            ..Default::default()
        })];
        assert_eq!(evaluate(&arch_rules, &platform), RuleAction::Allow);
        assert_eq!(evaluate(&arch_rules, &linux()), RuleAction::Disallow);
    }

    #[test]
    fn invalid_version_pattern_fails_condition() {
        let rules = vec![Rule::allow().with_os(OsCondition {
            version: Some("([".into()),
            ..Default::default()
        })];
        assert_eq!(evaluate(&rules, &linux()), RuleAction::Disallow);
    }

    #[test]
    fn feature_conditions_use_supplied_feature_set() {
        let rules = vec![Rule::allow().with_feature("has_custom_resolution", true)];
        assert_eq!(evaluate(&rules, &linux()), RuleAction::Disallow);

        let features = FeatureSet {
            has_custom_resolution: true,
            ..Default::default()
        };
        assert_eq!(
            evaluate_with_features(&rules, &linux(), &features),
            RuleAction::Allow
        );

        let unknown = vec![Rule::allow().with_feature("has_teleporter", true)];
        assert_eq!(
            evaluate_with_features(&unknown, &linux(), &features),
            RuleAction::Disallow
        );
    }

    #[test]
    fn missing_rule_set_means_allowed() {
        assert!(library_allowed(None, &linux()));
        assert!(!library_allowed(Some(&[]), &linux()));
    }

    #[test]
    fn deserializes_descriptor_rule_json() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow"},
            {"action": "disallow", "os": {"name": "osx"}}
        ]))
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].os.as_ref().unwrap().name.as_deref(), Some("osx"));
        assert_eq!(evaluate(&rules, &linux()), RuleAction::Allow);
    }
}
