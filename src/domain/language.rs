/// Language Domain Module
///
/// Defines the source languages archlens can scan, plus the per-language
/// declaration patterns the line scanner uses to bind pending markers.

use std::path::Path;
use serde::{Deserialize, Serialize};

/// Supported programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Language {
    Java,
    Kotlin,
    Python,
    JavaScript,
    TypeScript,
    CSharp,
    Rust,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Java,
        Language::Kotlin,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::CSharp,
        Language::Rust,
    ];

    /// Infer language from file extension.
    pub fn from_extension(ext: &str) -> Option<Language> {
        match ext.to_lowercase().as_str() {
            "java" => Some(Language::Java),
            "kt" | "kts" => Some(Language::Kotlin),
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" => Some(Language::TypeScript),
            "cs" => Some(Language::CSharp),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    /// Infer language from a file path.
    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the display name of the language.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Java => "Java",
            Language::Kotlin => "Kotlin",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::CSharp => "C#",
            Language::Rust => "Rust",
        }
    }

    /// Prefixes that start a whole-line comment.
    pub fn comment_prefixes(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["#"],
            _ => &["//", "/*", "*"],
        }
    }

    /// Pattern for a type-level declaration; the last participating group is the name.
    pub fn class_pattern(&self) -> &'static str {
        match self {
            Language::Java | Language::CSharp => {
                r"^\s*(?:(?:public|private|protected|internal|abstract|final|sealed|static|partial)\s+)*(?:class|interface|record|enum)\s+(\w+)"
            }
            Language::Kotlin => {
                r"^\s*(?:(?:public|private|protected|internal|abstract|open|sealed|data|enum)\s+)*(?:class|interface|object)\s+(\w+)"
            }
            Language::Python => r"^\s*class\s+(\w+)",
            Language::JavaScript | Language::TypeScript => {
                r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+(\w+)"
            }
            Language::Rust => r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait)\s+(\w+)",
        }
    }

    /// Pattern for a function-level declaration; the last participating group is the name.
    pub fn function_pattern(&self) -> &'static str {
        match self {
            Language::Java | Language::CSharp => {
                r"^\s*(?:(?:public|private|protected|internal|static|final|abstract|synchronized|native|default|override|virtual|async|sealed)\s+)*(\w[\w<>\[\],.?]*)\s+(\w+)\s*\("
            }
            Language::Kotlin => {
                r"^\s*(?:(?:public|private|protected|internal|override|suspend|open|inline)\s+)*fun\s+(\w+)\s*\("
            }
            Language::Python => r"^\s*(?:async\s+)?def\s+(\w+)\s*\(",
            Language::JavaScript | Language::TypeScript => {
                r"^\s*(?:export\s+)?(?:async\s+)?function\s*\*?\s*(\w+)\s*\(|^\s*(?:export\s+)?(?:const|let)\s+(\w+)\s*=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*=>|\w+\s*=>)|^\s*(?:(?:public|private|protected|static|async|override)\s+)*(\w+)\s*\([^;]*\)\s*(?::\s*[^;{=]+)?\{?\s*$"
            }
            Language::Rust => r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+(\w+)",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
