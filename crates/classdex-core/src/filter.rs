//! Include/exclude name filters.
//!
//! A filter is an ordered chain of include/exclude regular expressions
//! matched against whole names. An empty chain accepts everything; a chain
//! that starts with an exclude accepts anything the excludes leave alone;
//! the first exclude that rejects a name is final.

use regex::Regex;

use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Rule {
    Include(Matcher),
    Exclude(Matcher),
}

#[derive(Debug, Clone)]
struct Matcher {
    raw: String,
    regex: Regex,
}

impl Matcher {
    fn compile(pattern: &str) -> Result<Self, StoreError> {
        // Whole-name matching; the bare pattern would also hit substrings.
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| StoreError::InvalidFilter(e.to_string()))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

/// An ordered include/exclude filter over entity names.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    chain: Vec<Rule>,
}

impl NameFilter {
    /// A filter that accepts every name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an include pattern (full-name regular expression).
    pub fn include(mut self, pattern: &str) -> Result<Self, StoreError> {
        self.chain.push(Rule::Include(Matcher::compile(pattern)?));
        Ok(self)
    }

    /// Append an exclude pattern (full-name regular expression).
    pub fn exclude(mut self, pattern: &str) -> Result<Self, StoreError> {
        self.chain.push(Rule::Exclude(Matcher::compile(pattern)?));
        Ok(self)
    }

    /// Append an include for every name under a dotted prefix.
    pub fn include_prefix(self, prefix: &str) -> Result<Self, StoreError> {
        let pattern = Self::prefix_pattern(prefix);
        self.include(&pattern)
    }

    /// Append an exclude for every name under a dotted prefix.
    pub fn exclude_prefix(self, prefix: &str) -> Result<Self, StoreError> {
        let pattern = Self::prefix_pattern(prefix);
        self.exclude(&pattern)
    }

    /// Escape a dotted prefix into a regex matching it and anything below.
    pub fn prefix_pattern(prefix: &str) -> String {
        format!("{}.*", regex::escape(prefix))
    }

    /// Parse a comma-separated chain where each element starts with `+`
    /// (include) or `-` (exclude), e.g. `"+com\\.x\\..*, -com\\.x\\.gen\\..*"`.
    pub fn parse(spec: &str) -> Result<Self, StoreError> {
        let mut filter = Self::new();
        for element in spec.split(',') {
            let element = element.trim();
            if element.is_empty() {
                continue;
            }
            let (sign, pattern) = element.split_at(1);
            filter = match sign {
                "+" => filter.include(pattern)?,
                "-" => filter.exclude(pattern)?,
                _ => {
                    return Err(StoreError::InvalidFilter(format!(
                        "filter element should start with either + or -: {element}"
                    )))
                }
            };
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Whether the chain accepts a name.
    pub fn accepts(&self, input: &str) -> bool {
        let mut accept = matches!(self.chain.first(), None | Some(Rule::Exclude(_)));

        for rule in &self.chain {
            match rule {
                Rule::Include(matcher) => {
                    // An already-accepted name cannot be re-included.
                    if accept {
                        continue;
                    }
                    accept = matcher.matches(input);
                }
                Rule::Exclude(matcher) => {
                    if !accept {
                        continue;
                    }
                    accept = !matcher.matches(input);
                    if !accept {
                        break;
                    }
                }
            }
        }
        accept
    }
}

impl std::fmt::Display for NameFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .chain
            .iter()
            .map(|rule| match rule {
                Rule::Include(m) => format!("+{}", m.raw),
                Rule::Exclude(m) => format!("-{}", m.raw),
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
