//! Regex rules for field values
//!
//! The same [`RuleSet`] type backs both kinds of rules:
//! - field rules, checked against each candidate row before matching
//! - source rules, checked against the finished table by the enforcer
//!
//! Patterns are searched for anywhere in the value; anchor them with `^`/`$`
//! to require a full match.

use crate::error::ConfigError;
use crate::table::Row;
use regex::Regex;
use std::fmt;

/// Where a rule set was defined, used to label configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// The global `[field_rules]` table
    Field,
    /// A source's own rules
    Source(String),
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::Field => write!(f, "field_rules"),
            RuleScope::Source(name) => write!(f, "{}_rules", name),
        }
    }
}

/// A compiled rule for one output field
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: String,
    pub pattern: Regex,
}

impl Rule {
    /// True when the pattern is found somewhere in `value`
    pub fn accepts(&self, value: &str) -> bool {
        self.pattern.is_match(value)
    }
}

/// Rules keyed by output field, in definition order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile (field, pattern) pairs, collecting every invalid pattern
    pub fn compile<I, F, P>(scope: &RuleScope, pairs: I) -> Result<Self, Vec<ConfigError>>
    where
        I: IntoIterator<Item = (F, P)>,
        F: Into<String>,
        P: AsRef<str>,
    {
        let mut rules = Vec::new();
        let mut errors = Vec::new();

        for (field, pattern) in pairs {
            let field = field.into();
            match Regex::new(pattern.as_ref()) {
                Ok(pattern) => rules.push(Rule { field, pattern }),
                Err(e) => errors.push(ConfigError::InvalidRegex {
                    scope: scope.to_string(),
                    field,
                    message: e.to_string(),
                }),
            }
        }

        if errors.is_empty() {
            Ok(Self { rules })
        } else {
            Err(errors)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// First rule the row breaks, considering only fields the row carries
    pub fn gate<'a>(&'a self, row: &Row) -> Option<&'a Rule> {
        self.rules.iter().find(|rule| {
            row.get(&rule.field)
                .is_some_and(|value| !rule.accepts(value))
        })
    }

    /// Every rule the row breaks; absent fields are checked as empty strings
    pub fn violations<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| !rule.accepts(row.value_or_empty(&rule.field)))
    }

    /// Report every rule whose field is not in `headers`
    pub fn check_fields(&self, scope: &RuleScope, headers: &[String]) -> Vec<ConfigError> {
        self.rules
            .iter()
            .filter(|rule| !headers.iter().any(|h| *h == rule.field))
            .map(|rule| ConfigError::UnknownRuleField {
                scope: scope.to_string(),
                field: rule.field.clone(),
            })
            .collect()
    }
}
