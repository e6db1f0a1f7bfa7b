//! Attribute policy evaluation.
//!
//! A policy is a conjunction of attribute tokens joined by the word `AND`:
//!
//! ```text
//! Role:Authority AND Department:HR
//! ```
//!
//! An attribute string is a comma-separated list of tokens
//! (`Role:Owner,Department:HR`). A policy is satisfied when every clause is
//! present in the attribute set as a whole token. `HR` does not match
//! `HRX`, and it does not match `Department:HR` either.
//!
//! A comma inside a policy is read as another `AND`, so a policy written in
//! attribute form (`Role:Owner,Department:HR`) means what it looks like.
//!
//! An empty policy is public: it is satisfied by every requester, including
//! one with no attributes at all.

use std::collections::BTreeSet;
use std::fmt;

/// The keyword separating policy clauses.
const CONJUNCTION: &str = "AND";

/// The separator between tokens in an attribute string.
const ATTRIBUTE_SEPARATOR: char = ',';

/// A requester's attributes as a set of discrete tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    tokens: BTreeSet<String>,
}

impl AttributeSet {
    /// Parse a comma-separated attribute string. Tokens are trimmed and
    /// empty tokens are dropped.
    pub fn parse(attributes: &str) -> Self {
        let tokens = attributes
            .split(ATTRIBUTE_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { tokens }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

impl fmt::Display for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// A parsed AND-only access policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    clauses: Vec<String>,
    public: bool,
}

impl AccessPolicy {
    /// Parse a policy expression.
    ///
    /// `AND` is only a separator when it stands alone as a word, so a token
    /// such as `Role:BRAND` stays intact. A comma always separates. Words
    /// inside one clause are joined by a single space.
    pub fn parse(policy: &str) -> Self {
        if policy.trim().is_empty() {
            return Self {
                clauses: Vec::new(),
                public: true,
            };
        }

        let mut clauses = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for word in policy.split_whitespace() {
            if word == CONJUNCTION {
                push_clause(&mut clauses, &mut current);
                continue;
            }
            let mut pieces = word.split(ATTRIBUTE_SEPARATOR).peekable();
            while let Some(piece) = pieces.next() {
                if !piece.is_empty() {
                    current.push(piece);
                }
                if pieces.peek().is_some() {
                    push_clause(&mut clauses, &mut current);
                }
            }
        }
        push_clause(&mut clauses, &mut current);

        Self {
            clauses,
            public: false,
        }
    }

    /// True when the policy text was empty.
    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    /// Decide whether `attributes` satisfies this policy.
    pub fn is_satisfied_by(&self, attributes: &AttributeSet) -> bool {
        if self.public {
            return true;
        }
        if attributes.is_empty() {
            return false;
        }
        self.clauses.iter().all(|clause| attributes.contains(clause))
    }

    /// Clauses the attribute set fails to cover. For internal diagnostics
    /// only; never returned to a requester.
    pub fn missing<'a>(&'a self, attributes: &AttributeSet) -> Vec<&'a str> {
        self.clauses
            .iter()
            .filter(|clause| !attributes.contains(clause))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.clauses.join(" AND "))
    }
}

fn push_clause(clauses: &mut Vec<String>, words: &mut Vec<&str>) {
    if !words.is_empty() {
        clauses.push(words.join(" "));
        words.clear();
    }
}

/// Decide whether an attribute string satisfies a policy string.
pub fn satisfies(policy: &str, attributes: &str) -> bool {
    AccessPolicy::parse(policy).is_satisfied_by(&AttributeSet::parse(attributes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truth_table() {
        assert!(satisfies("", "anything"));
        assert!(satisfies("", ""));
        assert!(!satisfies("A", ""));
        assert!(satisfies("A AND B", "A,B"));
        assert!(!satisfies("A AND B", "A"));
    }

    #[test]
    fn test_exact_token_matching() {
        assert!(!satisfies("HR", "Department:HRX"));
        assert!(!satisfies("HR", "Department:HR"));
        assert!(satisfies("Department:HR", "Role:Owner, Department:HR"));
        assert!(!satisfies("Role:Auth", "Role:Authority"));
    }

    #[test]
    fn test_and_is_a_standalone_word() {
        let policy = AccessPolicy::parse("Role:BRAND AND Team:ANDROID");
        assert_eq!(policy.clauses(), &["Role:BRAND", "Team:ANDROID"]);
    }

    #[test]
    fn test_commas_are_conjunctions() {
        let policy = AccessPolicy::parse("Role:Owner,Department:HR");
        assert_eq!(policy.clauses(), &["Role:Owner", "Department:HR"]);
        assert!(satisfies("Role:Owner,Department:HR", "Department:HR,Role:Owner"));
        assert!(!satisfies("Role:Owner,Department:HR", "Role:Owner"));

        let mixed = AccessPolicy::parse("Role:Owner, Department:HR AND Site:Berlin");
        assert_eq!(
            mixed.clauses(),
            &["Role:Owner", "Department:HR", "Site:Berlin"]
        );
        assert_eq!(mixed.to_string(), "Role:Owner AND Department:HR AND Site:Berlin");
    }

    #[test]
    fn test_whitespace_policy_is_public() {
        assert!(AccessPolicy::parse("   ").is_public());
        assert!(satisfies("  \t ", ""));
    }

    #[test]
    fn test_dangling_conjunctions_are_ignored() {
        let policy = AccessPolicy::parse("AND Role:Authority AND");
        assert_eq!(policy.clauses(), &["Role:Authority"]);
        assert_eq!(policy.to_string(), "Role:Authority");
    }

    #[test]
    fn test_missing_lists_unsatisfied_clauses() {
        let policy = AccessPolicy::parse("A AND B AND C");
        let attrs = AttributeSet::parse("B");
        assert_eq!(policy.missing(&attrs), vec!["A", "C"]);
    }

    #[test]
    fn test_attribute_set_display_is_canonical() {
        let attrs = AttributeSet::parse(" b ,a,, b");
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.to_string(), "a,b");
    }

    proptest! {
        #[test]
        fn empty_policy_admits_everyone(attrs in ".{0,40}") {
            prop_assert!(satisfies("", &attrs));
        }

        #[test]
        fn policy_of_own_tokens_is_satisfied(tokens in proptest::collection::vec("[A-Za-z]{1,6}:[A-Za-z]{1,6}", 1..5)) {
            let policy = tokens.join(" AND ");
            let attrs = tokens.join(",");
            prop_assert!(satisfies(&policy, &attrs));
        }

        #[test]
        fn dropping_a_required_token_denies(tokens in proptest::collection::btree_set("[a-z]{1,6}:[a-z]{1,6}", 2..5)) {
            let tokens: Vec<String> = tokens.into_iter().collect();
            let policy = tokens.join(" AND ");
            let attrs = tokens[1..].join(",");
            prop_assert!(!satisfies(&policy, &attrs));
        }
    }
}
