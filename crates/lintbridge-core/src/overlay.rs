//! Issue identity overlay.
//!
//! [`merge`] combines a fresh [`Finding`] with the [`TrackedRecord`] kept for
//! the same logical issue. Identity and classification metadata come from the
//! record; location, message, flows, and quick fixes always come from the
//! fresh finding.

use crate::finding::{
    is_taint, Finding, Flow, InputFile, IssueSeverity, QuickFix, RuleType, TextRange,
    VulnerabilityProbability,
};

/// Tracking metadata persisted for a logical finding across analysis runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRecord {
    /// Severity chosen by the user, overriding the analyzer's.
    pub severity_override: Option<IssueSeverity>,
    pub rule_type: RuleType,
    /// Identity assigned by the server once the issue is synchronized.
    pub server_issue_key: Option<String>,
}

impl TrackedRecord {
    /// First record for a finding never tracked before. Findings without a
    /// classification are tracked as code smells.
    pub fn for_finding(finding: &Finding) -> Self {
        Self {
            severity_override: None,
            rule_type: finding.rule_type.unwrap_or(RuleType::CodeSmell),
            server_issue_key: None,
        }
    }
}

/// Read-only view of a fresh finding with tracked metadata applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFinding {
    finding: Finding,
    severity: IssueSeverity,
    rule_type: RuleType,
    server_issue_key: Option<String>,
}

/// Overlays `tracked` onto `finding`.
pub fn merge(finding: Finding, tracked: &TrackedRecord) -> MergedFinding {
    MergedFinding {
        severity: tracked.severity_override.unwrap_or(finding.severity),
        rule_type: tracked.rule_type,
        server_issue_key: tracked.server_issue_key.clone(),
        finding,
    }
}

impl MergedFinding {
    pub fn severity(&self) -> IssueSeverity {
        self.severity
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn server_issue_key(&self) -> Option<&str> {
        self.server_issue_key.as_deref()
    }

    pub fn rule_key(&self) -> &str {
        &self.finding.rule_key
    }

    pub fn message(&self) -> &str {
        &self.finding.message
    }

    pub fn text_range(&self) -> Option<TextRange> {
        self.finding.text_range
    }

    pub fn start_line(&self) -> Option<u32> {
        self.finding.start_line()
    }

    pub fn start_line_offset(&self) -> Option<u32> {
        self.finding.start_line_offset()
    }

    pub fn end_line(&self) -> Option<u32> {
        self.finding.end_line()
    }

    pub fn end_line_offset(&self) -> Option<u32> {
        self.finding.end_line_offset()
    }

    pub fn flows(&self) -> &[Flow] {
        &self.finding.flows
    }

    pub fn quick_fixes(&self) -> &[QuickFix] {
        &self.finding.quick_fixes
    }

    pub fn input_file(&self) -> Option<&InputFile> {
        self.finding.input_file.as_ref()
    }

    pub fn rule_description_context_key(&self) -> Option<&str> {
        self.finding.rule_description_context_key.as_deref()
    }

    pub fn vulnerability_probability(&self) -> Option<VulnerabilityProbability> {
        self.finding.vulnerability_probability
    }

    pub fn is_taint(&self) -> bool {
        is_taint(self.rule_key(), self.rule_type)
    }

    /// The fresh finding this view was built from.
    pub fn finding(&self) -> &Finding {
        &self.finding
    }
}
