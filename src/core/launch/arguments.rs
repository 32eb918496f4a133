// ─── Argument Templates ───
// Renders descriptor argument templates into concrete launch arguments.

use std::collections::{HashMap, HashSet};

use crate::core::platform::Platform;
use crate::core::version::{rules, Argument};

/// Feature flag enabled when the user picked a window size.
pub const CUSTOM_RESOLUTION_FEATURE: &str = "has_custom_resolution";

/// Values used for `${key}` tokens the caller did not supply.
const DEFAULT_OVERRIDES: &[(&str, &str)] = &[("resolution_width", "854"), ("resolution_height", "480")];

/// Variables available to templates, backed by the fixed default overrides.
#[derive(Debug, Clone, Default)]
pub struct TemplateVariables {
    values: HashMap<String, String>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str).or_else(|| {
            DEFAULT_OVERRIDES
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| *v)
        })
    }
}

impl From<HashMap<String, String>> for TemplateVariables {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

/// Replace every `${key}` with its value. Unknown keys stay verbatim.
pub fn substitute(template: &str, variables: &TemplateVariables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match variables.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render templates for `platform` with no feature flags enabled.
pub fn render(templates: &[Argument], variables: &TemplateVariables, platform: &Platform) -> Vec<String> {
    render_with_features(templates, variables, platform, &HashSet::new())
}

/// Render templates: literals are substituted, conditional blocks are kept
/// only when their rules allow `platform` and the enabled `features`.
pub fn render_with_features(
    templates: &[Argument],
    variables: &TemplateVariables,
    platform: &Platform,
    features: &HashSet<String>,
) -> Vec<String> {
    let mut out = Vec::new();
    for template in templates {
        match template {
            Argument::Literal(text) => out.push(substitute(text, variables)),
            Argument::Conditional { rules: gate, value } => {
                if rules::evaluate_with_features(gate, platform, features) {
                    out.extend(value.values().iter().map(|v| substitute(v, variables)));
                }
            }
        }
    }
    out
}

/// Split a legacy whitespace-joined argument string into literal templates.
pub fn split_legacy(arguments: &str) -> Vec<Argument> {
    arguments
        .split_whitespace()
        .map(|token| Argument::Literal(token.to_string()))
        .collect()
}

/// Drop repeated arguments, keeping the first occurrence.
///
/// A `--flag` followed by a token that does not start with `-` forms one
/// unit keyed by both tokens; every other token is keyed by its own value.
pub fn dedup_arguments(args: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.into_iter().peekable();

    while let Some(token) = iter.next() {
        let takes_value = token.starts_with("--")
            && iter.peek().map_or(false, |next| !next.starts_with('-'));
        let value = if takes_value { iter.next() } else { None };

        if seen.insert((token.clone(), value.clone())) {
            out.push(token);
            out.extend(value);
        }
    }
    out
}
