// promptgate/src/firewall/types.rs
//
// Shared types flowing through the online guardrail pipeline.
// Every classification axis is a closed enum; detector details are typed
// variants rather than string-keyed maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Classification axes ───────────────────────────────────────────────────────

/// Threat families the firewall can report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    PromptInjection,
    Jailbreak,
    HarmfulContent,
    Pii,
    RateLimit,
    Encoding,
}

impl std::fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptInjection => write!(f, "prompt_injection"),
            Self::Jailbreak       => write!(f, "jailbreak"),
            Self::HarmfulContent  => write!(f, "harmful_content"),
            Self::Pii             => write!(f, "pii"),
            Self::RateLimit       => write!(f, "rate_limit"),
            Self::Encoding        => write!(f, "encoding"),
        }
    }
}

/// Terminal decision for a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Blocked,
    Sanitized,
    Throttled,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allowed   => write!(f, "allowed"),
            Self::Blocked   => write!(f, "blocked"),
            Self::Sanitized => write!(f, "sanitized"),
            Self::Throttled => write!(f, "throttled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low      => write!(f, "low"),
            Self::Medium   => write!(f, "medium"),
            Self::High     => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

// ── Detector-local taxonomies ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InjectionTechnique {
    InstructionOverride,
    RolePlaying,
    DelimiterAttack,
    SystemPromptExtraction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JailbreakTechnique {
    DanMode,
    RolePlay,
    HypotheticalScenario,
    SystemOverride,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HarmCategory {
    Violence,
    Illegal,
    HateSpeech,
    SelfHarm,
    Explicit,
}

impl std::fmt::Display for HarmCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Violence   => write!(f, "violence"),
            Self::Illegal    => write!(f, "illegal"),
            Self::HateSpeech => write!(f, "hate_speech"),
            Self::SelfHarm   => write!(f, "self_harm"),
            Self::Explicit   => write!(f, "explicit"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
    Phone,
    BankAccount,
    Passport,
}

impl std::fmt::Display for PiiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ssn         => write!(f, "ssn"),
            Self::CreditCard  => write!(f, "credit_card"),
            Self::Email       => write!(f, "email"),
            Self::Phone       => write!(f, "phone"),
            Self::BankAccount => write!(f, "bank_account"),
            Self::Passport    => write!(f, "passport"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    Base64,
    Url,
}

/// Which legitimate-context library matched (harmful-content detector).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContextCategory {
    Educational,
    Medical,
    Historical,
    Technical,
    News,
    Metaphorical,
}

/// Rate-limit axis that tripped, if any.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LimitAxis {
    Burst,
    PerUser,
    PerIp,
    PerSession,
}

// ── Context-aware annotations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationContext {
    Educational,
    DirectRequest,
    Hypothetical,
    Neutral,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MultiTurnPattern {
    GradualEscalation,
    ContextSwitch,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationAnalysis {
    pub escalation_detected:  bool,
    pub escalation_score:     f32,
    pub keywords_in_history:  usize,
    pub keywords_current:     usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTurnFinding {
    pub pattern:    MultiTurnPattern,
    pub confidence: f32,
    pub reasoning:  String,
}

/// Output of the context-aware pass, attached to each adjusted detector result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAnnotations {
    pub is_educational:      bool,
    pub is_direct_request:   bool,
    pub is_hypothetical:     bool,
    pub context_type:        ConversationContext,
    pub escalation:          EscalationAnalysis,
    pub multi_turn:          Option<MultiTurnFinding>,
    pub conversation_length: usize,
    /// adjusted − base confidence
    pub confidence_delta:    f32,
}

// ── Detector results ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizationChange {
    pub pii_type:    PiiKind,
    pub replacement: String,
}

/// Per-detector payload. One variant per detector, no free-form maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "snake_case")]
pub enum DetectorDetails {
    RateLimit {
        limit_axis:         Option<LimitAxis>,
        requests_remaining: u32,
    },
    Encoding {
        encodings:        Vec<EncodingKind>,
        base64_segments:  usize,
        url_segments:     usize,
        decoded_text:     Option<String>,
        requires_recheck: bool,
    },
    Pii {
        detected_types: Vec<PiiKind>,
        match_counts:   HashMap<PiiKind, usize>,
        sanitized_text: Option<String>,
        changes:        Vec<SanitizationChange>,
    },
    Harmful {
        categories:         Vec<HarmCategory>,
        keywords_found:     Vec<String>,
        evasion_detected:   bool,
        legitimate_context: Option<ContextCategory>,
    },
    Injection {
        technique: InjectionTechnique,
    },
    Jailbreak {
        technique: JailbreakTechnique,
    },
    None,
}

/// Verdict emitted by a single detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorResult {
    pub threat:     ThreatKind,
    pub detected:   bool,
    pub confidence: f32,
    pub severity:   Severity,
    pub decision:   Decision,
    pub details:    DetectorDetails,
    pub context:    Option<ContextAnnotations>,
    pub latency_ms: f64,
    pub reasoning:  String,
}

impl DetectorResult {
    /// A non-detecting placeholder for a disabled or timed-out detector.
    pub fn pass(threat: ThreatKind, latency_ms: f64) -> Self {
        Self {
            threat,
            detected:   false,
            confidence: 0.0,
            severity:   Severity::Low,
            decision:   Decision::Allowed,
            details:    DetectorDetails::None,
            context:    None,
            latency_ms,
            reasoning:  String::new(),
        }
    }
}

// ── Request / response contracts ──────────────────────────────────────────────

/// Inbound evaluation request. Only `input_text` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardRequest {
    pub input_text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Prior conversation messages, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl GuardRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { input_text: text.into(), ..Default::default() }
    }
}

/// Summary block carried for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub detectors_run:      usize,
    pub threats_detected:   Vec<ThreatKind>,
    pub was_decoded:        bool,
    pub original_encodings: Vec<EncodingKind>,
}

/// Terminal response for one request. Status is the `decision` field; there
/// is no separate error channel for expected outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardResponse {
    pub decision:         Decision,
    pub confidence:       f32,
    pub evaluation_id:    String,
    pub latency_ms:       f64,
    pub threat:           Option<ThreatKind>,
    pub severity:         Option<Severity>,
    pub user_message:     Option<String>,
    pub sanitized_input:  Option<String>,
    pub detector_results: Vec<DetectorResult>,
    pub timestamp:        DateTime<Utc>,
    pub summary:          EvaluationSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::High.max(Severity::Critical), Severity::Critical);
    }

    #[test]
    fn threat_kind_serializes_snake_case() {
        let s = serde_json::to_string(&ThreatKind::PromptInjection).unwrap();
        assert_eq!(s, "\"prompt_injection\"");
        assert_eq!(ThreatKind::RateLimit.to_string(), "rate_limit");
    }

    #[test]
    fn guard_request_defaults() {
        let req: GuardRequest = serde_json::from_str(r#"{"input_text":"hi"}"#).unwrap();
        assert_eq!(req.input_text, "hi");
        assert!(req.user_id.is_none());
        assert!(req.conversation_history.is_empty());
    }
}
