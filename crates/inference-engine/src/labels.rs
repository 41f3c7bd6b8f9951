//! Ordered class-name list

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of classes the classifier distinguishes
pub const CLASS_COUNT: usize = 4;

/// Class names in model output order.
///
/// Position `i` names the `i`-th score of the model output vector, so the
/// order must match the order the model was trained with. Exactly
/// [`CLASS_COUNT`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    /// Validate and wrap a list of names
    pub fn new<I, S>(names: I) -> Result<Self, InferenceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.into().trim().to_string()).collect();

        if names.len() != CLASS_COUNT {
            return Err(InferenceError::InvalidClassNames(format!(
                "expected {} entries, got {}",
                CLASS_COUNT,
                names.len()
            )));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(InferenceError::InvalidClassNames("blank entry".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(InferenceError::InvalidClassNames(format!("duplicate entry '{}'", name)));
            }
        }

        Ok(Self(names))
    }

    /// Name at an output index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self(
            ["chickenpox", "hfmd", "measles", "unknown"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl TryFrom<Vec<String>> for ClassNames {
    type Error = InferenceError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<ClassNames> for Vec<String> {
    fn from(names: ClassNames) -> Self {
        names.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order() {
        let names = ClassNames::default();
        assert_eq!(names.len(), 4);
        assert_eq!(names.get(0), Some("chickenpox"));
        assert_eq!(names.get(1), Some("hfmd"));
        assert_eq!(names.get(2), Some("measles"));
        assert_eq!(names.get(3), Some("unknown"));
        assert_eq!(names.get(4), None);
    }

    #[test]
    fn test_rejects_invalid_lists() {
        assert!(ClassNames::new(Vec::<String>::new()).is_err());
        assert!(ClassNames::new(["a", "b", "c", " "]).is_err());
        assert!(ClassNames::new(["a", "b", "c", "a"]).is_err());
    }

    #[test]
    fn test_rejects_wrong_count() {
        for names in [vec!["only", "two"], vec!["a", "b", "c"], vec!["a", "b", "c", "d", "e"]] {
            let err = ClassNames::new(names).unwrap_err();
            assert!(matches!(err, InferenceError::InvalidClassNames(_)));
        }
    }

    #[test]
    fn test_trims_names() {
        let names = ClassNames::new([" eczema ", "psoriasis", "acne", "other"]).unwrap();
        assert_eq!(names.get(0), Some("eczema"));
        assert_eq!(names.len(), CLASS_COUNT);
    }

    #[test]
    fn test_deserialize_validates() {
        let names: ClassNames = serde_json::from_str(r#"["a","b","c","d"]"#).unwrap();
        assert_eq!(names.len(), 4);

        let dup: Result<ClassNames, _> = serde_json::from_str(r#"["a","a","b","c"]"#);
        assert!(dup.is_err());

        let short: Result<ClassNames, _> = serde_json::from_str(r#"["a","b","c"]"#);
        assert!(short.is_err());
    }
}
