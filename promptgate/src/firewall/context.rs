// promptgate/src/firewall/context.rs
//
// Context-aware detection over per-identifier conversation history.
// Two jobs: adjust other detectors' confidences from conversational context
// (educational phrasing pulls hard toward allow), and flag multi-turn attacks
// no single-message detector can see — gradual keyword escalation and the
// greeting→attack context switch.

use std::sync::Arc;
use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::state::window::{now_ms, StateStore};
use super::config::ContextConfig;
use super::types::{
    ContextAnnotations, ConversationContext, EscalationAnalysis, MultiTurnFinding,
    MultiTurnPattern, Severity,
};

// ── Feature lexicons ──────────────────────────────────────────────────────────

const EDUCATIONAL_INDICATORS: &[&str] = &[
    "explain how",
    "explain the",
    "what is",
    "tell me about",
    "for my research",
    "for my paper",
    "for my thesis",
    "for my book",
    "writing a book",
    "writing a paper",
    "in a story",
    "historical context",
    "how does it work",
    "history of",
    "chemistry of",
    "physics behind",
    "difference between",
    "ethical hacking",
    "ethical security",
    "protect against",
    "how do hackers",
    "how do experts",
    "latest",
    "recent",
    "in the news",
    "incident in",
    "cyber attack",
    "hacking incident",
];

const DIRECT_REQUEST_INDICATORS: &[&str] = &[
    "how to make",
    "how to create",
    "how to build",
    "tell me how to",
    "show me how to",
    "i want to",
    "i need to",
];

const HYPOTHETICAL_INDICATORS: &[&str] = &[
    "hypothetically",
    "what if",
    "suppose",
    "imagine",
    "in a hypothetical",
];

/// Content-danger vocabulary tracked for the escalation score that feeds the
/// confidence multiplier.
const PROGRESSION_KEYWORDS: &[&str] = &[
    "bomb", "weapon", "hack", "kill", "violence",
    "illegal", "explosive", "attack", "harmful",
];

/// Wider vocabulary for the multi-turn attack probes; also covers
/// instruction-level words like "ignore" and "jailbreak".
const MULTI_TURN_KEYWORDS: &[&str] = &[
    "bomb", "weapon", "hack", "kill", "violence", "illegal",
    "explosive", "attack", "harmful", "ignore", "bypass", "jailbreak",
];

/// Subset that keeps hypothetical framing dangerous.
const HYPOTHETICAL_DANGER: &[&str] = &["bomb", "weapon", "hack", "kill", "explosive"];

const GREETING_WORDS: &[&str] = &["hello", "hi ", "help", "question"];
const ATTACK_WORDS: &[&str] = &["ignore", "bypass", "jailbreak", "hack"];

static PROGRESSION_AC: OnceLock<AhoCorasick> = OnceLock::new();
static MULTI_TURN_AC: OnceLock<AhoCorasick> = OnceLock::new();

fn automaton(cell: &'static OnceLock<AhoCorasick>, words: &[&str]) -> &'static AhoCorasick {
    cell.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(words)
            .expect("keyword automaton")
    })
}

fn progression_automaton() -> &'static AhoCorasick {
    automaton(&PROGRESSION_AC, PROGRESSION_KEYWORDS)
}

fn multi_turn_automaton() -> &'static AhoCorasick {
    automaton(&MULTI_TURN_AC, MULTI_TURN_KEYWORDS)
}

/// Distinct keywords from the automaton's list present in one message.
fn count_distinct(ac: &AhoCorasick, lower: &str) -> usize {
    let mut seen = vec![false; ac.patterns_len()];
    for m in ac.find_iter(lower) {
        seen[m.pattern().as_usize()] = true;
    }
    seen.iter().filter(|s| **s).count()
}

// ── Assessment ────────────────────────────────────────────────────────────────

/// Request-level context assessment, computed once and applied to every
/// detector result of the request.
#[derive(Debug, Clone)]
pub struct ContextAssessment {
    pub is_educational:      bool,
    pub is_direct_request:   bool,
    pub is_hypothetical:     bool,
    pub context_type:        ConversationContext,
    pub escalation:          EscalationAnalysis,
    pub multi_turn:          Option<MultiTurnFinding>,
    pub conversation_length: usize,
    pub multiplier:          f32,
}

impl ContextAssessment {
    /// Context-adjusted confidence, the adjusted detected flag, and severity.
    pub fn adjust(&self, base_confidence: f32) -> (f32, bool, Severity) {
        let scaled = if base_confidence > 0.0 {
            (base_confidence * self.multiplier).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let (confidence, detected) = match &self.multi_turn {
            Some(finding) => (scaled.max(finding.confidence), true),
            None => (scaled, base_confidence > 0.0 && scaled >= 0.7),
        };

        (confidence, detected, self.severity_for(confidence))
    }

    fn severity_for(&self, confidence: f32) -> Severity {
        if self.multi_turn.is_some() {
            if confidence >= 0.9 {
                Severity::Critical
            } else if confidence >= 0.8 {
                Severity::High
            } else {
                Severity::Medium
            }
        } else if confidence >= 0.9 {
            Severity::Critical
        } else if confidence >= 0.8 {
            Severity::High
        } else if confidence >= 0.7 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn annotations(&self, base_confidence: f32, adjusted: f32) -> ContextAnnotations {
        ContextAnnotations {
            is_educational:      self.is_educational,
            is_direct_request:   self.is_direct_request,
            is_hypothetical:     self.is_hypothetical,
            context_type:        self.context_type,
            escalation:          self.escalation.clone(),
            multi_turn:          self.multi_turn.clone(),
            conversation_length: self.conversation_length,
            confidence_delta:    adjusted - base_confidence,
        }
    }
}

// ── Detector ──────────────────────────────────────────────────────────────────

pub struct ContextAwareDetector {
    config: ContextConfig,
    store:  Arc<StateStore>,
}

impl ContextAwareDetector {
    pub fn new(config: ContextConfig, store: Arc<StateStore>) -> Self {
        let _ = (progression_automaton(), multi_turn_automaton());
        Self { config, store }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Assess the current message against the identifier's history. Does not
    /// record the message; the orchestrator records once per request.
    pub fn assess(&self, text: &str, identifier: &str) -> ContextAssessment {
        self.store.maybe_sweep_conversations(self.config.conversation_ttl_seconds);

        let history = self
            .store
            .conversation(identifier, self.config.max_conversation_history)
            .read()
            .texts();

        let lower = text.to_lowercase();
        let is_educational = EDUCATIONAL_INDICATORS.iter().any(|i| lower.contains(i));
        let is_direct_request = DIRECT_REQUEST_INDICATORS.iter().any(|i| lower.contains(i));
        let is_hypothetical = HYPOTHETICAL_INDICATORS.iter().any(|i| lower.contains(i));

        let context_type = if is_educational {
            ConversationContext::Educational
        } else if is_direct_request {
            ConversationContext::DirectRequest
        } else if is_hypothetical {
            ConversationContext::Hypothetical
        } else {
            ConversationContext::Neutral
        };

        let escalation = self.analyze_progression(&lower, &history);
        let multi_turn = self.detect_multi_turn(&lower, &history);

        let mut multiplier = 1.0f32;
        if is_educational {
            multiplier *= self.config.educational_multiplier * self.config.educational_context_factor;
        }
        if is_direct_request {
            multiplier *= self.config.direct_request_multiplier;
        }
        if is_hypothetical {
            if HYPOTHETICAL_DANGER.iter().any(|kw| lower.contains(kw)) {
                multiplier *= 0.9;
            } else {
                multiplier *= 0.7;
            }
        }
        if escalation.escalation_detected {
            multiplier *= self.config.escalation_multiplier;
        }

        ContextAssessment {
            is_educational,
            is_direct_request,
            is_hypothetical,
            context_type,
            escalation,
            multi_turn,
            conversation_length: history.len(),
            multiplier,
        }
    }

    /// Append the message to the identifier's ring. One call per request.
    pub fn record_turn(&self, identifier: &str, text: &str) {
        if !self.config.enabled {
            return;
        }
        self.store
            .conversation(identifier, self.config.max_conversation_history)
            .write()
            .push(text.to_string(), now_ms());
    }

    pub fn clear_history(&self, identifier: &str) {
        self.store.clear_conversation(identifier);
    }

    fn analyze_progression(&self, lower: &str, history: &[String]) -> EscalationAnalysis {
        if history.is_empty() {
            return EscalationAnalysis::default();
        }

        let ac = progression_automaton();
        let history_hits: usize = history
            .iter()
            .map(|msg| count_distinct(ac, &msg.to_lowercase()))
            .sum();
        let current_hits = count_distinct(ac, lower);

        let escalation_score = if history_hits > 0 && current_hits > 0 {
            (history_hits as f32 * 0.2 + current_hits as f32 * 0.3).min(1.0)
        } else {
            0.0
        };

        EscalationAnalysis {
            escalation_detected: escalation_score >= 0.5,
            escalation_score,
            keywords_in_history: history_hits,
            keywords_current:    current_hits,
        }
    }

    fn detect_multi_turn(&self, lower: &str, history: &[String]) -> Option<MultiTurnFinding> {
        if history.len() < 2 {
            return None;
        }

        // Gradual escalation: dangerous keyword counts rising across turns.
        if self.config.detect_gradual_escalation {
            let ac = multi_turn_automaton();
            let mut counts: Vec<usize> = history
                .iter()
                .map(|msg| count_distinct(ac, &msg.to_lowercase()))
                .collect();
            counts.push(count_distinct(ac, lower));

            if counts.len() >= 3 {
                let first = counts[0];
                let current = *counts.last().unwrap();
                if current > first && current > 0 {
                    let prior: usize = counts[..counts.len() - 1].iter().sum();
                    let ratio = current as f32 / prior.max(1) as f32;
                    if ratio >= 0.5 {
                        return Some(MultiTurnFinding {
                            pattern:    MultiTurnPattern::GradualEscalation,
                            confidence: (0.7 + ratio * 0.25).min(0.95),
                            reasoning:  "Gradual escalation detected across conversation".to_string(),
                        });
                    }
                }
            }
        }

        // Context switch: benign opening turns, attack vocabulary now.
        if self.config.detect_context_switching {
            let opening = history
                .iter()
                .take(2)
                .map(|m| m.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            let opening_padded = format!("{opening} ");
            if GREETING_WORDS.iter().any(|w| opening_padded.contains(w))
                && ATTACK_WORDS.iter().any(|w| lower.contains(w))
            {
                return Some(MultiTurnFinding {
                    pattern:    MultiTurnPattern::ContextSwitch,
                    confidence: 0.85,
                    reasoning:  "Context switching detected: safe conversation, then attack"
                        .to_string(),
                });
            }
        }

        None
    }
}
