//! Method identifiers and the method vocabulary
//!
//! A method identifier is `<encoding>_<classifier>`, split on the LAST
//! underscore so that multi-word encodings (`raw_pixels_rf`) keep their
//! underscore. Resolution does not check that either part is registered.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Vocabulary shipped with the binary
const BUILTIN_METHODS: &str = include_str!("../data/methods.toml");

/// Parsed method identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodId {
    pub encoding: String,
    pub classifier: String,
}

impl MethodId {
    /// Human-readable label, e.g. `raw_pixels` + `rf` → "Raw Pixels + Rf"
    pub fn combination_label(&self) -> String {
        format!(
            "{} + {}",
            title_case(&self.encoding),
            title_case(&self.classifier)
        )
    }
}

/// Split a method identifier on its last `_`
///
/// Returns `None` when there is no underscore or either side is empty.
pub fn resolve(method_id: &str) -> Option<MethodId> {
    let (encoding, classifier) = method_id.rsplit_once('_')?;
    if encoding.is_empty() || classifier.is_empty() {
        return None;
    }
    Some(MethodId {
        encoding: encoding.to_string(),
        classifier: classifier.to_string(),
    })
}

/// Underscores become spaces; each word is capitalized, the rest lowercased
fn title_case(tag: &str) -> String {
    tag.replace('_', " ")
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One entry of the method vocabulary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub value: String,
    pub encoding: String,
    pub classifier: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
struct MethodFile {
    #[serde(rename = "method", default)]
    methods: Vec<MethodInfo>,
}

/// Queryable list of known methods
#[derive(Debug, Clone, Default)]
pub struct MethodCatalog {
    methods: Vec<MethodInfo>,
}

impl MethodCatalog {
    /// Parse a vocabulary document
    pub fn parse(content: &str) -> Result<Self, String> {
        let file: MethodFile = toml::from_str(content).map_err(|e| e.to_string())?;

        for entry in &file.methods {
            let parsed = resolve(&entry.value)
                .ok_or_else(|| format!("Invalid method identifier '{}'", entry.value))?;
            if parsed.encoding != entry.encoding || parsed.classifier != entry.classifier {
                return Err(format!(
                    "Method '{}' declares {}/{} but resolves to {}/{}",
                    entry.value, entry.encoding, entry.classifier, parsed.encoding, parsed.classifier
                ));
            }
        }

        Ok(Self {
            methods: file.methods,
        })
    }

    /// Built-in vocabulary
    pub fn builtin() -> Result<Self, String> {
        Self::parse(BUILTIN_METHODS)
    }

    /// Vocabulary from `analysis.methods_file`, falling back to the built-in
    /// list when the file is missing or invalid
    pub fn load(override_path: Option<&Path>) -> Self {
        if let Some(path) = override_path {
            match std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| Self::parse(&content))
            {
                Ok(catalog) => {
                    info!(
                        "Loaded {} methods from {}",
                        catalog.methods.len(),
                        path.display()
                    );
                    return catalog;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Method vocabulary file unusable, using built-in list"
                    );
                }
            }
        }

        Self::builtin().unwrap_or_else(|e| {
            warn!(error = %e, "Built-in method vocabulary invalid");
            Self::default()
        })
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn get(&self, value: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.value == value)
    }
}
