mod rules;

use std::path::Path;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use tollgate_core::config::classifier::{RuleSpec, RuleTarget};
use tollgate_core::event::{ExecutionEvent, Payload};
use tollgate_core::types::{Domain, Platform};

use self::rules::{PredicateDef, BUILTIN_RULES};

/// Domain label assigned to an event before it is routed to validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub domain: Domain,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl ClassificationResult {
    pub fn none() -> Self {
        Self {
            domain: Domain::None,
            platform: Platform::Unspecified,
            rule_id: None,
        }
    }
}

enum Matcher {
    Pattern(Regex),
    Extensions(&'static [&'static str]),
}

/// One typed predicate plus the label it assigns.
struct Rule {
    id: String,
    target: RuleTarget,
    matcher: Matcher,
    domain: Domain,
    platform: Platform,
}

impl Rule {
    fn matches(&self, event: &ExecutionEvent) -> bool {
        let text = match (&self.target, &event.payload) {
            (RuleTarget::Command, Payload::Command(cmd)) if !event.tool.is_file() => cmd.as_str(),
            (RuleTarget::Path, Payload::File { path, .. }) if event.tool.is_file() => path.as_str(),
            _ => return false,
        };
        match &self.matcher {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Extensions(exts) => Path::new(text)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e))),
        }
    }
}

/// Ordered, first-match-wins event classifier.
///
/// Pure: holds only compiled rules, performs no I/O. An event matching no
/// rule classifies to `Domain::None`. A command that would match several
/// domains gets only the first one; multi-domain dispatch is not supported.
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Classifier with only the built-in rules.
    pub fn builtin() -> Self {
        Self::with_rules(&[])
    }

    /// Configured rules first, then the built-ins. Rules with an invalid
    /// pattern are skipped.
    pub fn with_rules(custom: &[RuleSpec]) -> Self {
        let mut rules = Vec::with_capacity(custom.len() + BUILTIN_RULES.len());

        for spec in custom {
            match Regex::new(&spec.pattern) {
                Ok(re) => rules.push(Rule {
                    id: spec.id.clone(),
                    target: spec.target,
                    matcher: Matcher::Pattern(re),
                    domain: spec.domain,
                    platform: spec.platform,
                }),
                Err(e) => warn!(rule = %spec.id, "skipping classifier rule with invalid pattern: {e}"),
            }
        }

        for def in BUILTIN_RULES {
            let (target, matcher) = match &def.predicate {
                PredicateDef::Command(pattern) => match Regex::new(pattern) {
                    Ok(re) => (RuleTarget::Command, Matcher::Pattern(re)),
                    Err(e) => {
                        warn!(rule = def.id, "built-in rule failed to compile: {e}");
                        continue;
                    }
                },
                PredicateDef::Extension(exts) => (RuleTarget::Path, Matcher::Extensions(exts)),
            };
            rules.push(Rule {
                id: def.id.to_string(),
                target,
                matcher,
                domain: def.domain,
                platform: def.platform,
            });
        }

        Self { rules }
    }

    pub fn classify(&self, event: &ExecutionEvent) -> ClassificationResult {
        self.rules
            .iter()
            .find(|rule| rule.matches(event))
            .map(|rule| ClassificationResult {
                domain: rule.domain,
                platform: rule.platform,
                rule_id: Some(rule.id.clone()),
            })
            .unwrap_or_else(ClassificationResult::none)
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.id.as_str())
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}
