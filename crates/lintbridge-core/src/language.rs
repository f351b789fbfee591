//! Languages analyzable by engines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A language an engine can be enabled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Apex,
    C,
    Cpp,
    Css,
    Go,
    Html,
    IPython,
    Java,
    Js,
    Php,
    PlSql,
    Python,
    Secrets,
    Ts,
    Xml,
    Yaml,
}

/// Languages every engine supports, with or without a server connection.
pub const STANDALONE_LANGUAGES: &[Language] = &[
    Language::Cpp,
    Language::C,
    Language::Css,
    Language::Go,
    Language::Html,
    Language::IPython,
    Language::Java,
    Language::Js,
    Language::Php,
    Language::Python,
    Language::Secrets,
    Language::Ts,
    Language::Xml,
    Language::Yaml,
];

/// Languages only available to engines bound to a server connection.
pub const CONNECTED_ADDITIONAL_LANGUAGES: &[Language] = &[Language::Apex, Language::PlSql];

impl Language {
    /// Stable key used on the wire and on analyzer command lines.
    pub fn key(self) -> &'static str {
        match self {
            Language::Apex => "apex",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Css => "css",
            Language::Go => "go",
            Language::Html => "html",
            Language::IPython => "ipython",
            Language::Java => "java",
            Language::Js => "js",
            Language::Php => "php",
            Language::PlSql => "plsql",
            Language::Python => "python",
            Language::Secrets => "secrets",
            Language::Ts => "ts",
            Language::Xml => "xml",
            Language::Yaml => "yaml",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
