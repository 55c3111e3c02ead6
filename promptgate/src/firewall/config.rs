// promptgate/src/firewall/config.rs
//
// Configuration for the online guardrail pipeline. All thresholds are biased
// user-friendly: a detector must be very confident before the firewall blocks.
// `FirewallConfig::from_env()` is built once per process at boot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{HarmCategory, PiiKind, ThreatKind};

// ── Per-axis rate quotas ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowQuota {
    /// Requests per minute. `None` = unlimited.
    pub rpm: Option<u32>,
    /// Requests per hour.
    pub rph: Option<u32>,
    /// Requests per day.
    pub rpd: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled:            bool,
    pub per_user:           WindowQuota,
    pub per_ip:             WindowQuota,
    pub per_session:        WindowQuota,
    pub burst_protection:   bool,
    pub burst_window_ms:    i64,
    pub burst_max_requests: usize,
    pub timeout_ms:         u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled:            true,
            per_user:           WindowQuota { rpm: Some(60),  rph: Some(1_000), rpd: Some(10_000) },
            per_ip:             WindowQuota { rpm: Some(100), rph: Some(5_000), rpd: Some(50_000) },
            per_session:        WindowQuota { rpm: Some(30),  rph: Some(500),   rpd: None },
            burst_protection:   true,
            burst_window_ms:    1_000,
            burst_max_requests: 10,
            timeout_ms:         50,
        }
    }
}

// ── Encoding detection ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub enabled:             bool,
    pub detect_base64:       bool,
    pub detect_url_encoding: bool,
    /// Decode and hand the plaintext back for one re-check cycle.
    pub decode_and_recheck:  bool,
    pub max_decode_size:     usize,
    pub timeout_ms:          u64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            enabled:             true,
            detect_base64:       true,
            detect_url_encoding: true,
            decode_and_recheck:  true,
            max_decode_size:     10_240,
            timeout_ms:          50,
        }
    }
}

// ── PII ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    Sanitize,
    Block,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationMethod {
    Redact,
    Mask,
    Hash,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiTypeConfig {
    pub enabled: bool,
    pub action:  PiiAction,
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiConfig {
    pub enabled:             bool,
    pub pii_types:           HashMap<PiiKind, PiiTypeConfig>,
    pub sanitization_method: SanitizationMethod,
    /// Block when 3+ distinct PII types are present.
    pub block_if_multiple:   bool,
    /// Block on SSN / bank account / passport regardless of per-type action.
    pub block_if_critical:   bool,
    pub timeout_ms:          u64,
}

impl Default for PiiConfig {
    fn default() -> Self {
        let mut pii_types = HashMap::new();
        pii_types.insert(PiiKind::Ssn, PiiTypeConfig {
            enabled: true,
            action:  PiiAction::Sanitize,
            pattern: r"\b\d{3}-\d{2}-\d{4}\b|\b\d{9}\b".to_string(),
        });
        pii_types.insert(PiiKind::CreditCard, PiiTypeConfig {
            enabled: true,
            action:  PiiAction::Sanitize,
            pattern: r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b".to_string(),
        });
        pii_types.insert(PiiKind::Email, PiiTypeConfig {
            enabled: true,
            action:  PiiAction::Sanitize,
            pattern: r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b".to_string(),
        });
        pii_types.insert(PiiKind::Phone, PiiTypeConfig {
            enabled: true,
            action:  PiiAction::Sanitize,
            pattern: r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b".to_string(),
        });
        pii_types.insert(PiiKind::BankAccount, PiiTypeConfig {
            enabled: true,
            action:  PiiAction::Block,
            pattern: r"\b\d{8,17}\b".to_string(),
        });
        Self {
            enabled:             true,
            pii_types,
            sanitization_method: SanitizationMethod::Redact,
            block_if_multiple:   true,
            block_if_critical:   true,
            timeout_ms:          50,
        }
    }
}

// ── Harmful content ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmCategoryConfig {
    pub enabled:       bool,
    pub threshold:     f32,
    pub keywords:      Vec<String>,
    /// Adds the high-risk-phrase probe on top of keyword scoring.
    pub context_aware: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmfulContentConfig {
    pub enabled:    bool,
    pub categories: HashMap<HarmCategory, HarmCategoryConfig>,
    /// Minimum confidence to report the category as detected.
    pub blocking_bar: f32,
    pub timeout_ms: u64,
}

fn kws(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for HarmfulContentConfig {
    fn default() -> Self {
        let mut categories = HashMap::new();
        categories.insert(HarmCategory::Violence, HarmCategoryConfig {
            enabled:       true,
            threshold:     0.95,
            keywords:      kws(&["bomb", "weapon", "kill", "murder", "violence",
                                 "attack", "explosive", "explosives"]),
            // Off by default for user-friendliness; educational queries pass.
            context_aware: false,
        });
        categories.insert(HarmCategory::Illegal, HarmCategoryConfig {
            enabled:       true,
            threshold:     0.95,
            keywords:      kws(&["illegal", "drug", "hack", "steal", "fraud"]),
            context_aware: false,
        });
        categories.insert(HarmCategory::HateSpeech, HarmCategoryConfig {
            enabled:       true,
            threshold:     0.75,
            keywords:      kws(&["hate", "discrimination", "racist"]),
            context_aware: false,
        });
        categories.insert(HarmCategory::SelfHarm, HarmCategoryConfig {
            enabled:       true,
            threshold:     0.90,
            keywords:      kws(&["suicide", "self harm", "hurt myself"]),
            context_aware: false,
        });
        categories.insert(HarmCategory::Explicit, HarmCategoryConfig {
            enabled:       true,
            threshold:     0.70,
            keywords:      kws(&["explicit", "sexual", "pornographic"]),
            context_aware: false,
        });
        Self {
            enabled:      true,
            categories,
            blocking_bar: 0.92,
            timeout_ms:   50,
        }
    }
}

// ── Prompt injection / jailbreak ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    pub enabled: bool,
    /// Multiplier applied on legitimate (educational/news) context.
    pub legitimacy_discount: f32,
    pub timeout_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self { enabled: true, legitimacy_discount: 0.15, timeout_ms: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailbreakConfig {
    pub enabled:             bool,
    pub detect_dan_mode:     bool,
    pub detect_role_play:    bool,
    pub detect_hypothetical: bool,
    pub legitimacy_discount: f32,
    pub timeout_ms:          u64,
}

impl Default for JailbreakConfig {
    fn default() -> Self {
        Self {
            enabled:             true,
            detect_dan_mode:     true,
            detect_role_play:    true,
            detect_hypothetical: true,
            legitimacy_discount: 0.15,
            timeout_ms:          50,
        }
    }
}

// ── Context-aware detection ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    pub enabled:                  bool,
    /// Messages retained per identifier.
    pub max_conversation_history: usize,
    pub conversation_ttl_seconds: i64,
    /// Educational reduction, exposed as two independent knobs. The effective
    /// multiplier is their product (default 0.1 × 0.2 = 0.02).
    pub educational_multiplier:     f32,
    pub educational_context_factor: f32,
    pub direct_request_multiplier:  f32,
    pub escalation_multiplier:      f32,
    pub detect_gradual_escalation:  bool,
    pub detect_context_switching:   bool,
    pub timeout_ms:                 u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled:                    true,
            max_conversation_history:   5,
            conversation_ttl_seconds:   3_600,
            educational_multiplier:     0.1,
            educational_context_factor: 0.2,
            direct_request_multiplier:  1.1,
            escalation_multiplier:      1.2,
            detect_gradual_escalation:  true,
            detect_context_switching:   true,
            timeout_ms:                 50,
        }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    Block,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    pub rate_limit:         RateLimitConfig,
    pub encoding_detection: EncodingConfig,
    pub pii:                PiiConfig,
    pub harmful_content:    HarmfulContentConfig,
    pub prompt_injection:   InjectionConfig,
    pub jailbreak:          JailbreakConfig,
    pub context_aware:      ContextConfig,

    /// Global online budget in milliseconds.
    pub max_evaluation_time_ms: u64,
    pub parallel_detection:     bool,
    pub early_exit_on_block:    bool,

    /// Primary-threat selection when multiple detectors fire.
    pub priority_order: Vec<ThreatKind>,

    /// On internal error: allow (true) or block (false).
    pub fail_open:      bool,
    pub timeout_action: TimeoutAction,

    /// The user-friendliness gate: below this confidence the firewall allows
    /// the request regardless of per-detector verdicts.
    pub min_blocking_confidence: f32,
    /// Below this confidence (or in educational context) the gate also allows.
    pub educational_allow_threshold: f32,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            rate_limit:         RateLimitConfig::default(),
            encoding_detection: EncodingConfig::default(),
            pii:                PiiConfig::default(),
            harmful_content:    HarmfulContentConfig::default(),
            prompt_injection:   InjectionConfig::default(),
            jailbreak:          JailbreakConfig::default(),
            context_aware:      ContextConfig::default(),
            max_evaluation_time_ms: 50,
            parallel_detection:     true,
            early_exit_on_block:    true,
            priority_order: vec![
                ThreatKind::RateLimit,
                ThreatKind::Encoding,
                ThreatKind::HarmfulContent,
                ThreatKind::PromptInjection,
                ThreatKind::Jailbreak,
                ThreatKind::Pii,
            ],
            fail_open:      false,
            timeout_action: TimeoutAction::Block,
            min_blocking_confidence:     0.92,
            educational_allow_threshold: 0.80,
        }
    }
}

impl FirewallConfig {
    /// Build the boot configuration, honoring environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("FIREWALL_MAX_EVAL_TIME_MS") {
            if let Ok(ms) = v.parse() {
                config.max_evaluation_time_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("FIREWALL_PARALLEL_DETECTION") {
            config.parallel_detection = v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("FIREWALL_FAIL_OPEN") {
            config.fail_open = v.eq_ignore_ascii_case("true");
        }
        config
    }

    pub fn priority_index(&self, threat: ThreatKind) -> usize {
        self.priority_order
            .iter()
            .position(|t| *t == threat)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quotas_match_policy() {
        let cfg = FirewallConfig::default();
        assert_eq!(cfg.rate_limit.per_user.rpm, Some(60));
        assert_eq!(cfg.rate_limit.per_session.rpd, None);
        assert_eq!(cfg.rate_limit.burst_max_requests, 10);
        assert_eq!(cfg.max_evaluation_time_ms, 50);
    }

    #[test]
    fn priority_order_starts_with_rate_limit() {
        let cfg = FirewallConfig::default();
        assert_eq!(cfg.priority_index(ThreatKind::RateLimit), 0);
        assert!(cfg.priority_index(ThreatKind::Encoding) < cfg.priority_index(ThreatKind::Pii));
    }

    #[test]
    fn educational_reduction_is_compound() {
        let cfg = ContextConfig::default();
        let effective = cfg.educational_multiplier * cfg.educational_context_factor;
        assert!((effective - 0.02).abs() < 1e-6);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = FirewallConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: FirewallConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.priority_order, cfg.priority_order);
        assert_eq!(back.min_blocking_confidence, cfg.min_blocking_confidence);
    }
}
