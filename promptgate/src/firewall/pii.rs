// promptgate/src/firewall/pii.rs
//
// PII detection over configurable regex types, with four sanitization
// methods. Sanitization is a projection: placeholders never re-match, so
// sanitizing twice is a no-op.

use std::collections::HashMap;
use std::time::Instant;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::config::{PiiAction, PiiConfig, SanitizationMethod};
use super::types::{
    Decision, DetectorDetails, DetectorResult, PiiKind, SanitizationChange, Severity, ThreatKind,
};

const CRITICAL_TYPES: &[PiiKind] = &[PiiKind::Ssn, PiiKind::BankAccount, PiiKind::Passport];

pub struct PiiDetector {
    config:   PiiConfig,
    patterns: Vec<(PiiKind, PiiAction, Regex)>,
}

impl PiiDetector {
    pub fn new(config: PiiConfig) -> Self {
        let mut patterns = Vec::new();
        for (kind, type_config) in &config.pii_types {
            if !type_config.enabled {
                continue;
            }
            match Regex::new(&type_config.pattern) {
                Ok(re) => patterns.push((*kind, type_config.action, re)),
                // Invalid patterns are skipped, not fatal.
                Err(e) => warn!("skipping invalid PII pattern for {}: {}", kind, e),
            }
        }
        // Deterministic scan order regardless of map iteration.
        patterns.sort_by_key(|(kind, _, _)| kind.to_string());
        Self { config, patterns }
    }

    pub fn detect(&self, text: &str) -> DetectorResult {
        let started = Instant::now();

        if !self.config.enabled {
            return DetectorResult::pass(ThreatKind::Pii, elapsed_ms(started));
        }

        let mut detected_types: Vec<PiiKind> = Vec::new();
        let mut match_counts: HashMap<PiiKind, usize> = HashMap::new();
        let mut sanitized = text.to_string();
        let mut changes: Vec<SanitizationChange> = Vec::new();

        for (kind, action, re) in &self.patterns {
            let matches: Vec<String> = re.find_iter(text).map(|m| m.as_str().to_string()).collect();
            if matches.is_empty() {
                continue;
            }
            detected_types.push(*kind);
            match_counts.insert(*kind, matches.len());

            if *action == PiiAction::Sanitize {
                for value in &matches {
                    let replacement = self.replacement_for(*kind, value);
                    sanitized = sanitized.replace(value.as_str(), &replacement);
                    changes.push(SanitizationChange { pii_type: *kind, replacement });
                }
            }
        }

        let detected = !detected_types.is_empty();
        let (decision, severity) = if !detected {
            (Decision::Allowed, Severity::Low)
        } else {
            let has_critical = detected_types.iter().any(|t| CRITICAL_TYPES.contains(t));
            if self.config.block_if_critical && has_critical {
                (Decision::Blocked, Severity::Critical)
            } else if self.config.block_if_multiple && detected_types.len() >= 3 {
                (Decision::Blocked, Severity::High)
            } else if detected_types.iter().any(|t| {
                self.config
                    .pii_types
                    .get(t)
                    .map(|c| c.action == PiiAction::Block)
                    .unwrap_or(false)
            }) {
                (Decision::Blocked, Severity::Medium)
            } else {
                (Decision::Sanitized, Severity::Medium)
            }
        };

        let reasoning = if detected {
            let names: Vec<String> = detected_types.iter().map(|t| t.to_string()).collect();
            format!("Detected {} PII type(s): {}", detected_types.len(), names.join(", "))
        } else {
            "No PII detected".to_string()
        };

        DetectorResult {
            threat:     ThreatKind::Pii,
            detected,
            confidence: if detected { 1.0 } else { 0.0 },
            severity,
            decision,
            details: DetectorDetails::Pii {
                detected_types,
                match_counts,
                sanitized_text: (decision == Decision::Sanitized).then(|| sanitized),
                changes,
            },
            context:    None,
            latency_ms: elapsed_ms(started),
            reasoning,
        }
    }

    fn replacement_for(&self, kind: PiiKind, value: &str) -> String {
        match self.config.sanitization_method {
            SanitizationMethod::Redact => redact_placeholder(kind),
            SanitizationMethod::Mask => mask_value(kind, value),
            SanitizationMethod::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(value.as_bytes());
                hex::encode(&hasher.finalize()[..4])
            }
            SanitizationMethod::Remove => String::new(),
        }
    }
}

fn redact_placeholder(kind: PiiKind) -> String {
    format!("[{}]", kind.to_string().to_uppercase())
}

/// Type-specific partial reveal: keep the trailing four characters.
fn mask_value(kind: PiiKind, value: &str) -> String {
    let tail: String = if value.chars().count() >= 4 {
        value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect()
    } else {
        return redact_placeholder(kind);
    };
    match kind {
        PiiKind::Ssn        => format!("***-**-{tail}"),
        PiiKind::CreditCard => format!("****-****-****-{tail}"),
        PiiKind::Phone      => format!("***-***-{tail}"),
        _ => redact_placeholder(kind),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::config::{PiiConfig, SanitizationMethod};

    fn detector_with(method: SanitizationMethod) -> PiiDetector {
        let mut config = PiiConfig::default();
        config.sanitization_method = method;
        PiiDetector::new(config)
    }

    #[test]
    fn ssn_blocks_as_critical() {
        let result = detector_with(SanitizationMethod::Redact).detect("My SSN is 123-45-6789.");
        assert!(result.detected);
        assert_eq!(result.decision, Decision::Blocked);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn email_sanitizes_with_redaction() {
        let result =
            detector_with(SanitizationMethod::Redact).detect("Contact me at user@example.com");
        assert_eq!(result.decision, Decision::Sanitized);
        match result.details {
            DetectorDetails::Pii { sanitized_text, .. } => {
                let sanitized = sanitized_text.unwrap();
                assert!(sanitized.contains("[EMAIL]"));
                assert!(!sanitized.contains("user@example.com"));
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn mask_keeps_last_four() {
        let result =
            detector_with(SanitizationMethod::Mask).detect("Call 555-867-5309 after noon");
        match result.details {
            DetectorDetails::Pii { sanitized_text, .. } => {
                assert_eq!(sanitized_text.unwrap(), "Call ***-***-5309 after noon");
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn hash_replaces_with_hex_prefix() {
        let result =
            detector_with(SanitizationMethod::Hash).detect("Contact me at user@example.com");
        match result.details {
            DetectorDetails::Pii { sanitized_text, .. } => {
                let sanitized = sanitized_text.unwrap();
                assert!(!sanitized.contains("user@example.com"));
                // 8 hex chars in place of the address.
                let replaced = sanitized.trim_start_matches("Contact me at ");
                assert_eq!(replaced.len(), 8);
                assert!(replaced.chars().all(|c| c.is_ascii_hexdigit()));
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn sanitization_is_a_projection() {
        let detector = detector_with(SanitizationMethod::Redact);
        let first = detector.detect("Contact me at user@example.com");
        let sanitized = match first.details {
            DetectorDetails::Pii { sanitized_text, .. } => sanitized_text.unwrap(),
            _ => panic!("wrong details variant"),
        };
        let second = detector.detect(&sanitized);
        assert!(!second.detected, "placeholders must not re-match");
    }

    #[test]
    fn three_types_block_as_high() {
        let mut config = PiiConfig::default();
        config.block_if_critical = false; // isolate the multiple-types rule
        let detector = PiiDetector::new(config);
        let result = detector.detect(
            "I'm user@example.com, call 555-867-5309, SSN 123-45-6789.",
        );
        assert_eq!(result.decision, Decision::Blocked);
        assert_eq!(result.severity, Severity::High);
    }

    #[test]
    fn clean_text_passes() {
        let result = detector_with(SanitizationMethod::Redact).detect("What is the weather today?");
        assert!(!result.detected);
        assert_eq!(result.decision, Decision::Allowed);
    }
}
