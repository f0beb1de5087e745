//! Language profile: the per-language vocabulary the propagation rules read.
//!
//! Frontends for different languages spell operators and built-in types
//! differently. Instead of hard-coding C conventions in the rules, the
//! operator classes and the string / boolean types are looked up here. The
//! default profile covers the C family. Profiles load from JSON; every field
//! is optional and falls back to its default.

use std::path::Path;

use cpg_core::types::Type;
use serde::{Deserialize, Serialize};

/// Error loading a [`LanguageProfile`].
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Operator and type vocabulary for one source language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageProfile {
    pub name: String,
    /// Object type names treated as strings by `+`.
    pub string_types: Vec<String>,
    pub simple_assignment: Vec<String>,
    pub compound_assignment: Vec<String>,
    pub comparison_operators: Vec<String>,
    pub logical_operators: Vec<String>,
    /// Result type of comparisons, logical operators and `!`.
    pub boolean_type: Type,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for LanguageProfile {
    fn default() -> Self {
        LanguageProfile {
            name: "c-family".into(),
            string_types: strings(&["string", "String", "std::string", "java.lang.String", "str"]),
            simple_assignment: strings(&["=", ":="]),
            compound_assignment: strings(&[
                "+=", "-=", "*=", "/=", "%=", "<<=", ">>=", "&=", "|=", "^=",
            ]),
            comparison_operators: strings(&["==", "!=", "<", "<=", ">", ">=", "instanceof"]),
            logical_operators: strings(&["&&", "||", "!", "and", "or", "not"]),
            boolean_type: Type::boolean(),
        }
    }
}

impl LanguageProfile {
    /// Parses a profile from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let json = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether `ty` is one of this language's string types.
    pub fn is_string(&self, ty: &Type) -> bool {
        match ty {
            Type::Object(o) => self.string_types.iter().any(|s| *s == o.name),
            _ => false,
        }
    }

    pub fn is_simple_assignment(&self, op: &str) -> bool {
        self.simple_assignment.iter().any(|s| s == op)
    }

    pub fn is_compound_assignment(&self, op: &str) -> bool {
        self.compound_assignment.iter().any(|s| s == op)
    }

    pub fn is_comparison(&self, op: &str) -> bool {
        self.comparison_operators.iter().any(|s| s == op)
    }

    pub fn is_logical(&self, op: &str) -> bool {
        self.logical_operators.iter().any(|s| s == op)
    }

    /// Operators whose result is always [`boolean_type`](Self::boolean_type).
    pub fn yields_boolean(&self, op: &str) -> bool {
        self.is_comparison(op) || self.is_logical(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_profile_classifies_operators() {
        let p = LanguageProfile::default();
        assert!(p.is_simple_assignment("="));
        assert!(p.is_compound_assignment("+="));
        assert!(!p.is_compound_assignment("="));
        assert!(p.yields_boolean("<="));
        assert!(p.yields_boolean("&&"));
        assert!(!p.yields_boolean("+"));
    }

    #[test]
    fn string_detection_uses_object_names() {
        let p = LanguageProfile::default();
        assert!(p.is_string(&Type::string()));
        assert!(p.is_string(&Type::object("java.lang.String")));
        assert!(!p.is_string(&Type::object("Stringish")));
        assert!(!p.is_string(&Type::char().pointer()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let p = LanguageProfile::from_json(r#"{"name": "go", "string_types": ["string"]}"#)
            .unwrap();
        assert_eq!(p.name, "go");
        assert_eq!(p.string_types, vec!["string".to_string()]);
        assert!(p.is_simple_assignment(":="));
        assert_eq!(p.boolean_type, Type::boolean());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = LanguageProfile::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ProfileError::Parse(_)));
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"logical_operators": ["and"]}}"#).unwrap();
        let p = LanguageProfile::load(file.path()).unwrap();
        assert!(p.is_logical("and"));
        assert!(!p.is_logical("&&"));

        let err = LanguageProfile::load(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(matches!(err, ProfileError::Io { .. }));
    }

    #[test]
    fn json_roundtrip() {
        let p = LanguageProfile::default();
        let back = LanguageProfile::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(p, back);
    }
}
