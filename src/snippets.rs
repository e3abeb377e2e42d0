use std::path::Path;

use crate::models::Language;

const JAVASCRIPT_STARTER: &str = r#"// Welcome to CodeCollab!
// Write your JavaScript code here

function greet(name) {
  return `Hello, ${name}!`;
}

console.log(greet("World"));
"#;

const PYTHON_STARTER: &str = r#"# Welcome to CodeCollab!
# Write your Python code here

def greet(name):
    return f"Hello, {name}!"

print(greet("World"))
"#;

/// Code placed in a session when it is created or its language changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StarterSnippets {
    javascript: String,
    python: String,
}

impl StarterSnippets {
    pub fn new(javascript: impl Into<String>, python: impl Into<String>) -> Self {
        Self {
            javascript: javascript.into(),
            python: python.into(),
        }
    }

    pub fn for_language(&self, language: Language) -> &str {
        match language {
            Language::Javascript => &self.javascript,
            Language::Python => &self.python,
        }
    }

    /// Load overrides from `javascript.js` / `python.py` in `dir`. Missing or
    /// unreadable files keep the built-in snippet.
    pub fn from_dir(dir: &Path) -> Self {
        let mut snippets = Self::default();
        for language in Language::ALL {
            let path = dir.join(file_name(language));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    tracing::info!("loaded {language} starter snippet from {:?}", path);
                    match language {
                        Language::Javascript => snippets.javascript = text,
                        Language::Python => snippets.python = text,
                    }
                }
                Err(e) => {
                    tracing::warn!("using built-in {language} snippet, {:?}: {e}", path);
                }
            }
        }
        snippets
    }
}

impl Default for StarterSnippets {
    fn default() -> Self {
        Self::new(JAVASCRIPT_STARTER, PYTHON_STARTER)
    }
}

fn file_name(language: Language) -> &'static str {
    match language {
        Language::Javascript => "javascript.js",
        Language::Python => "python.py",
    }
}
