//! Bytecode heuristics
//!
//! A versioned, data-driven rule set scanned against deployed bytecode:
//! known malicious/locking function selectors, suspicious textual patterns
//! (blacklist identifiers, 90-100% tax constants, owner-gated transfers),
//! an over-represented standard selector, and a code-size ceiling. The
//! scanner is generic over the rules so detection data can evolve without
//! touching detection logic.

use lazy_static::lazy_static;
use regex::bytes::Regex;
use tracing::debug;

/// A known-bad 4-byte function selector, hex-encoded without 0x
#[derive(Debug, Clone)]
pub struct SelectorRule {
    pub selector: &'static str,
    pub label: &'static str,
}

/// A byte-level pattern matched against the raw bytecode
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: Regex,
    pub label: &'static str,
}

/// Versioned honeypot detection rules
pub struct RuleSet {
    pub version: u32,
    pub selectors: Vec<SelectorRule>,
    pub patterns: Vec<PatternRule>,
    /// Standard selector whose repetition signals tampered bytecode
    pub repeated_selector: &'static str,
}

lazy_static! {
    /// Built-in rule set. Selectors collected from tokens observed locking
    /// sells behind blacklists or delayed trading enablement.
    pub static ref DEFAULT_RULES: RuleSet = RuleSet {
        version: 1,
        selectors: vec![
            SelectorRule { selector: "3b124fe3", label: "_isBlacklisted(address)" },
            SelectorRule { selector: "6b7f4e0a", label: "botBlacklist(address)" },
            SelectorRule { selector: "c9567bf9", label: "openTrading()" },
        ],
        patterns: vec![
            PatternRule {
                pattern: Regex::new(r"(?i)(blacklist|bot|sniper)").expect("static regex"),
                label: "blacklist identifier",
            },
            PatternRule {
                pattern: Regex::new(r"(?is)(tax|fee).{0,50}(9[0-9]|100)").expect("static regex"),
                label: "tax/fee >= 90%",
            },
            PatternRule {
                pattern: Regex::new(r"(?is)onlyOwner.{0,80}transfer").expect("static regex"),
                label: "owner-gated transfer",
            },
        ],
        // transfer(address,uint256)
        repeated_selector: "a9059cbb",
    };
}

/// Findings from one scan, tagged with the rule-set version that produced
/// them
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub rule_version: u32,
    pub findings: Vec<String>,
}

impl ScanReport {
    pub fn is_suspicious(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Scan deployed bytecode against a rule set.
///
/// `repeat_threshold` and `max_code_size` are calibration parameters kept
/// configurable; their defaults (2 and 50,000) come from field observation.
pub fn scan(
    code: &[u8],
    rules: &RuleSet,
    repeat_threshold: usize,
    max_code_size: usize,
) -> ScanReport {
    let mut findings = Vec::new();
    let hex_code = hex::encode(code);

    for rule in &rules.selectors {
        if hex_code.contains(rule.selector) {
            findings.push(format!("suspicious selector {} ({})", rule.selector, rule.label));
        }
    }

    let repeats = count_occurrences(&hex_code, rules.repeated_selector);
    if repeats > repeat_threshold {
        findings.push(format!(
            "selector {} repeated {} times (threshold {})",
            rules.repeated_selector, repeats, repeat_threshold
        ));
    }

    for rule in &rules.patterns {
        if rule.pattern.is_match(code) {
            findings.push(format!("pattern match: {}", rule.label));
        }
    }

    if code.len() > max_code_size {
        findings.push(format!(
            "unusually large contract: {} bytes (ceiling {})",
            code.len(),
            max_code_size
        ));
    }

    if !findings.is_empty() {
        debug!("bytecode scan v{}: {:?}", rules.version, findings);
    }

    ScanReport {
        rule_version: rules.version,
        findings,
    }
}

/// Case-insensitive search for a blacklist-capable marker, used by the
/// restriction probe
pub fn has_blacklist_marker(code: &[u8]) -> bool {
    lazy_static! {
        static ref BLACKLIST: Regex = Regex::new(r"(?i)blacklist").expect("static regex");
    }
    BLACKLIST.is_match(code)
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        count += 1;
        start += pos + needle.len();
    }
    count
}
