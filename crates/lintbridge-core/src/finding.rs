//! Findings produced by analysis engines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rule repositories whose key contains this marker hold taint-analysis rules.
const TAINT_RULE_REPO_SUFFIX: &str = "security";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Blocker,
    Critical,
    Major,
    Minor,
    Info,
}

impl IssueSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueSeverity::Blocker => "BLOCKER",
            IssueSeverity::Critical => "CRITICAL",
            IssueSeverity::Major => "MAJOR",
            IssueSeverity::Minor => "MINOR",
            IssueSeverity::Info => "INFO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BLOCKER" => Some(IssueSeverity::Blocker),
            "CRITICAL" => Some(IssueSeverity::Critical),
            "MAJOR" => Some(IssueSeverity::Major),
            "MINOR" => Some(IssueSeverity::Minor),
            "INFO" => Some(IssueSeverity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Bug,
    Vulnerability,
    CodeSmell,
    SecurityHotspot,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Bug => "BUG",
            RuleType::Vulnerability => "VULNERABILITY",
            RuleType::CodeSmell => "CODE_SMELL",
            RuleType::SecurityHotspot => "SECURITY_HOTSPOT",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VulnerabilityProbability {
    High,
    Medium,
    Low,
}

/// 1-based lines, 0-based line offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_line: u32,
    pub start_line_offset: u32,
    pub end_line: u32,
    pub end_line_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFile {
    pub uri: String,
    #[serde(default)]
    pub relative_path: Option<String>,
}

impl InputFile {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            relative_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLocation {
    #[serde(default)]
    pub input_file: Option<InputFile>,
    #[serde(default)]
    pub text_range: Option<TextRange>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Secondary locations explaining how a finding arises.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flow {
    pub locations: Vec<IssueLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: TextRange,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickFix {
    pub message: String,
    #[serde(default)]
    pub edits: Vec<TextEdit>,
}

/// A unit of analysis output, as produced by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_key: String,
    pub message: String,
    pub severity: IssueSeverity,
    #[serde(default, rename = "type")]
    pub rule_type: Option<RuleType>,
    #[serde(default)]
    pub text_range: Option<TextRange>,
    #[serde(default)]
    pub input_file: Option<InputFile>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub quick_fixes: Vec<QuickFix>,
    #[serde(default)]
    pub rule_description_context_key: Option<String>,
    #[serde(default)]
    pub vulnerability_probability: Option<VulnerabilityProbability>,
}

impl Finding {
    pub fn start_line(&self) -> Option<u32> {
        self.text_range.map(|range| range.start_line)
    }

    pub fn start_line_offset(&self) -> Option<u32> {
        self.text_range.map(|range| range.start_line_offset)
    }

    pub fn end_line(&self) -> Option<u32> {
        self.text_range.map(|range| range.end_line)
    }

    pub fn end_line_offset(&self) -> Option<u32> {
        self.text_range.map(|range| range.end_line_offset)
    }
}

/// Returns true when a rule is a taint-analysis vulnerability rule.
pub fn is_taint(rule_key: &str, rule_type: RuleType) -> bool {
    rule_key.contains(TAINT_RULE_REPO_SUFFIX) && rule_type == RuleType::Vulnerability
}
