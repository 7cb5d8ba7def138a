/// Python code-quality heuristics for migration review. Line-based regex
/// scanning only; no parsing, no execution of the submitted code.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::mcp::args::require_str;
use crate::mcp::{ToolDescriptor, ToolError, ToolSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    /// Score deduction per finding.
    pub fn penalty(&self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 10,
            Severity::Low => 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub issue: &'static str,
    pub severity: Severity,
    pub line: usize,
    pub snippet: String,
}

struct IssuePattern {
    issue: &'static str,
    severity: Severity,
    pattern: Regex,
    advice: &'static str,
    safe_example: &'static str,
}

pub struct QualityTools {
    patterns: Vec<IssuePattern>,
}

impl Default for QualityTools {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityTools {
    pub fn new() -> Self {
        let patterns = vec![
            IssuePattern {
                issue: "eval_usage",
                severity: Severity::Critical,
                pattern: Regex::new(r"\beval\s*\(").expect("pattern is valid"),
                advice: "eval() executes arbitrary code; use ast.literal_eval or explicit parsing",
                safe_example: "import ast\nvalue = ast.literal_eval(user_input)",
            },
            IssuePattern {
                issue: "division_by_zero",
                severity: Severity::High,
                // A literal zero divisor not followed by more digits or a
                // decimal point.
                pattern: Regex::new(r"/\s*0($|[^0-9.])").expect("pattern is valid"),
                advice: "guard the divisor before dividing",
                safe_example: "result = total / count if count else 0",
            },
            IssuePattern {
                issue: "bare_except",
                severity: Severity::Medium,
                pattern: Regex::new(r"except\s*:").expect("pattern is valid"),
                advice: "catch specific exception types so real failures stay visible",
                safe_example: "try:\n    risky()\nexcept ValueError as exc:\n    log.warning(exc)",
            },
            IssuePattern {
                issue: "unguarded_open",
                severity: Severity::Low,
                // open() outside a with-statement leaks the handle on error.
                pattern: Regex::new(r"^\s*\w+\s*=\s*open\s*\(").expect("pattern is valid"),
                advice: "use a with-statement so the file is closed on every path",
                safe_example: "with open(path) as handle:\n    data = handle.read()",
            },
        ];
        Self { patterns }
    }

    pub fn analyze(&self, code: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (idx, line) in code.lines().enumerate() {
            let stripped = strip_comment(line);
            for pattern in &self.patterns {
                if pattern.pattern.is_match(stripped) {
                    findings.push(Finding {
                        issue: pattern.issue,
                        severity: pattern.severity,
                        line: idx + 1,
                        snippet: line.trim().to_string(),
                    });
                }
            }
        }
        findings
    }

    /// 100 minus the per-finding penalties, floored at zero.
    pub fn score(&self, findings: &[Finding]) -> u32 {
        let deductions: u32 = findings.iter().map(|f| f.severity.penalty()).sum();
        100u32.saturating_sub(deductions)
    }

    fn suggest(&self, issue: &str) -> Result<Value, ToolError> {
        let pattern = self
            .patterns
            .iter()
            .find(|p| p.issue == issue)
            .ok_or_else(|| {
                let known: Vec<&str> = self.patterns.iter().map(|p| p.issue).collect();
                ToolError::bad_argument(
                    "issue",
                    format!("unknown issue type; known: {}", known.join(", ")),
                )
            })?;
        Ok(json!({
            "issue": pattern.issue,
            "severity": pattern.severity.label(),
            "advice": pattern.advice,
            "safe_example": pattern.safe_example,
        }))
    }
}

/// Drop a trailing `#` comment unless the hash sits inside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (idx, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn findings_json(findings: &[Finding]) -> Vec<Value> {
    findings
        .iter()
        .map(|f| {
            json!({
                "issue": f.issue,
                "severity": f.severity.label(),
                "line": f.line,
                "snippet": f.snippet,
            })
        })
        .collect()
}

#[async_trait]
impl ToolSet for QualityTools {
    fn server_name(&self) -> &'static str {
        "quality-mcp"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "analyze_code",
                description: "Scan Python code for known risk patterns",
                input_schema: json!({
                    "type": "object",
                    "properties": {"code": {"type": "string"}},
                    "required": ["code"],
                }),
            },
            ToolDescriptor {
                name: "quality_score",
                description: "Score Python code 0-100 from the findings of the risk scan",
                input_schema: json!({
                    "type": "object",
                    "properties": {"code": {"type": "string"}},
                    "required": ["code"],
                }),
            },
            ToolDescriptor {
                name: "suggest_fix",
                description: "Show the safe replacement pattern for a known issue type",
                input_schema: json!({
                    "type": "object",
                    "properties": {"issue": {"type": "string"}},
                    "required": ["issue"],
                }),
            },
        ]
    }

    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        match name {
            "analyze_code" => {
                let code = require_str(arguments, "code")?;
                let findings = self.analyze(code);
                Ok(json!({
                    "finding_count": findings.len(),
                    "findings": findings_json(&findings),
                }))
            }
            "quality_score" => {
                let code = require_str(arguments, "code")?;
                let findings = self.analyze(code);
                Ok(json!({
                    "score": self.score(&findings),
                    "finding_count": findings.len(),
                    "findings": findings_json(&findings),
                }))
            }
            "suggest_fix" => {
                let issue = require_str(arguments, "issue")?;
                self.suggest(issue)
            }
            other => Err(self.unknown_tool(other)),
        }
    }
}
