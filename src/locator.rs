//! Declarative element locators
//!
//! A `Locator` describes how to find an element; it never holds on to one.
//! Every use re-resolves it against the live document, which is what lets
//! assertions poll through re-renders and CSS transitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How to find an element in the document.
///
/// In scenario files a locator is a map tagged by `by`:
///
/// ```yaml
/// target: { by: role, role: button, name: Open Dialog }
/// target: { by: css, selector: .select-trigger }
/// target:
///   by: within
///   scope: { by: role, role: dialog }
///   inner: { by: role, role: button, name: Close }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// Accessible role plus optional accessible name. The name must match
    /// in full unless `exact: false` asks for a substring match.
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default = "full_match")]
        exact: bool,
    },
    /// Visible text content; resolves to the innermost element holding it
    Text {
        text: String,
        #[serde(default)]
        exact: bool,
    },
    /// Form control associated with a label (or an `aria-label`)
    Label {
        label: String,
        #[serde(default)]
        exact: bool,
    },
    /// CSS selector
    Css { selector: String },
    /// `inner` resolved among the descendants of `scope`
    Within {
        scope: Box<Locator>,
        inner: Box<Locator>,
    },
    /// Parent element of every match of `of`
    Parent { of: Box<Locator> },
    /// The `index`-th match (0-based) of `of`
    Nth { of: Box<Locator>, index: usize },
}

impl Locator {
    pub fn role(role: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: None,
            exact: true,
        }
    }

    /// Role with an accessible name, matched in full
    pub fn role_named(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name.into()),
            exact: true,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Locator::Label {
            label: label.into(),
            exact: false,
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    /// Require a case-sensitive full match of the name, text or label.
    /// Has no effect on structural locators.
    pub fn exact(mut self) -> Self {
        match &mut self {
            Locator::Role { exact, .. } | Locator::Text { exact, .. } | Locator::Label { exact, .. } => {
                *exact = true
            }
            _ => {}
        }
        self
    }

    /// Match a case-insensitive substring of the name, text or label.
    /// Has no effect on structural locators.
    pub fn loose(mut self) -> Self {
        match &mut self {
            Locator::Role { exact, .. } | Locator::Text { exact, .. } | Locator::Label { exact, .. } => {
                *exact = false
            }
            _ => {}
        }
        self
    }

    /// Resolve `inner` inside every match of `self`
    pub fn locate(self, inner: Locator) -> Self {
        Locator::Within {
            scope: Box::new(self),
            inner: Box::new(inner),
        }
    }

    pub fn parent(self) -> Self {
        Locator::Parent { of: Box::new(self) }
    }

    pub fn nth(self, index: usize) -> Self {
        Locator::Nth {
            of: Box::new(self),
            index,
        }
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// Reject locators that can never match anything
    pub fn validate(&self) -> Result<()> {
        let empty = |what: &str| -> Result<()> {
            Err(Error::ConfigError(format!("{} locator with empty {}", what, what)))
        };
        match self {
            Locator::Role { role, name, .. } => {
                if role.trim().is_empty() {
                    return empty("role");
                }
                if name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(Error::ConfigError(format!("role={} locator with empty name", role)));
                }
                Ok(())
            }
            Locator::Text { text, .. } if text.trim().is_empty() => empty("text"),
            Locator::Label { label, .. } if label.trim().is_empty() => empty("label"),
            Locator::Css { selector } if selector.trim().is_empty() => empty("css"),
            Locator::Within { scope, inner } => {
                scope.validate()?;
                inner.validate()
            }
            Locator::Parent { of } | Locator::Nth { of, .. } => of.validate(),
            _ => Ok(()),
        }
    }
}

fn full_match() -> bool {
    true
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exact_mark = |exact: &bool| if *exact { "s" } else { "i" };
        match self {
            Locator::Role { role, name: None, .. } => write!(f, "role={}", role),
            Locator::Role {
                role,
                name: Some(name),
                exact,
            } => write!(f, "role={}[name={:?}{}]", role, name, exact_mark(exact)),
            Locator::Text { text, exact } => write!(f, "text={:?}{}", text, exact_mark(exact)),
            Locator::Label { label, exact } => write!(f, "label={:?}{}", label, exact_mark(exact)),
            Locator::Css { selector } => write!(f, "css={}", selector),
            Locator::Within { scope, inner } => write!(f, "{} >> {}", scope, inner),
            Locator::Parent { of } => write!(f, "{} >> ..", of),
            Locator::Nth { of, index } => write!(f, "{} >> nth={}", of, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_scoped_locators() {
        let close = Locator::role("dialog").locate(Locator::role_named("button", "Close"));
        assert_eq!(close.to_string(), r#"role=dialog >> role=button[name="Close"s]"#);

        let section = Locator::role_named("heading", "Layout & Structure")
            .exact()
            .parent()
            .locate(Locator::css(".component-preview"));
        assert_eq!(
            section.to_string(),
            r#"role=heading[name="Layout & Structure"s] >> .. >> css=.component-preview"#
        );

        assert_eq!(Locator::css(".alert").first().to_string(), "css=.alert >> nth=0");
    }

    #[test]
    fn parses_tagged_yaml() {
        let yaml = r#"
by: within
scope: { by: css, selector: .select-popover }
inner: { by: text, text: Apple, exact: true }
"#;
        let loc: Locator = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            loc,
            Locator::css(".select-popover").locate(Locator::text("Apple").exact())
        );
    }

    #[test]
    fn role_names_match_in_full_unless_loosened() {
        let yaml = "{ by: role, role: button, name: Close }";
        let loc: Locator = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(loc, Locator::role_named("button", "Close"));
        assert_eq!(loc.to_string(), r#"role=button[name="Close"s]"#);

        let loose: Locator = serde_yaml::from_str("{ by: role, role: button, name: Clo, exact: false }").unwrap();
        assert_eq!(loose, Locator::role_named("button", "Clo").loose());
        assert_eq!(loose.to_string(), r#"role=button[name="Clo"i]"#);

        // text and label stay substring matches by default
        assert_eq!(Locator::text("Apple").to_string(), r#"text="Apple"i"#);
        let text: Locator = serde_yaml::from_str("{ by: text, text: Apple }").unwrap();
        assert_eq!(text, Locator::text("Apple"));
    }

    #[test]
    fn exact_leaves_structural_locators_alone() {
        assert_eq!(Locator::css("img").exact(), Locator::css("img"));
        assert_eq!(Locator::css("img").loose(), Locator::css("img"));
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(Locator::role("button").validate().is_ok());
        assert!(Locator::role_named("button", "  ").validate().is_err());
        assert!(Locator::text("").validate().is_err());
        assert!(Locator::css("main").locate(Locator::css(" ")).validate().is_err());
        assert!(Locator::label("Email").parent().nth(2).validate().is_ok());
    }
}
