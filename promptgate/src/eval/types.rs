// promptgate/src/eval/types.rs
//
// Records flowing through the offline multi-layer evaluator. Severity is
// shared with the firewall; outcome and layer are closed enums of their own.

use serde::{Deserialize, Serialize};

pub use crate::firewall::types::Severity;

// ── Axes ──────────────────────────────────────────────────────────────────────

/// Threat domain an evaluation runs under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    PromptInjection,
    Jailbreak,
    DataExtraction,
    Adversarial,
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PromptInjection => write!(f, "prompt_injection"),
            Self::Jailbreak       => write!(f, "jailbreak"),
            Self::DataExtraction  => write!(f, "data_extraction"),
            Self::Adversarial     => write!(f, "adversarial"),
        }
    }
}

/// Ternary verdict: did the model resist the attack?
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Resistant,
    Vulnerable,
    Uncertain,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resistant  => write!(f, "resistant"),
            Self::Vulnerable => write!(f, "vulnerable"),
            Self::Uncertain  => write!(f, "uncertain"),
        }
    }
}

/// Which evidence produced the final verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvalLayer {
    Layer1Semantic,
    Layer1Structural,
    Layer3Llm,
    Ensemble,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Semantic,
    Structural,
    DataLeakage,
}

// ── Context ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub technique: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub language: Option<String>,
}

/// One captured prompt/response pair to score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalContext {
    /// System prompt the target ran under; may carry secrets.
    pub base_prompt: String,
    /// The adversarial user text.
    pub attack_prompt: String,
    pub model_response: String,
    #[serde(default)]
    pub judge_question: Option<String>,
    #[serde(default)]
    pub metadata: SampleMetadata,
    /// Original response latency, seconds.
    #[serde(default)]
    pub response_time: f64,
}

// ── Signal-level records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    /// −1.0 (vulnerable) to +1.0 (resistant).
    pub score: f32,
    pub confidence: f32,
    /// Response ↔ attack prompt.
    pub direct_similarity: f32,
    /// Response ↔ base prompt; data-extraction only, 0 elsewhere.
    pub base_similarity: f32,
    pub safe_similarity: f32,
    pub unsafe_similarity: f32,
    pub outcome: Outcome,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralPatternMatch {
    pub pattern_name: String,
    pub matches: Vec<String>,
    pub score: f32,
    pub confidence: f32,
    pub position_weight: f32,
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralAnalysis {
    pub patterns: Vec<StructuralPatternMatch>,
    pub outcome: Outcome,
    pub confidence: f32,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakageAnalysis {
    pub leakage_detected: bool,
    pub leaked_values: Vec<String>,
    pub sensitive_values_found: Vec<String>,
    pub confidence: f32,
    pub outcome: Outcome,
    pub reasoning: String,
}

/// Normalized view of one analyzer's output, as seen by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReading {
    pub signal: SignalKind,
    pub outcome: Outcome,
    pub score: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer1Result {
    pub semantic: SemanticAnalysis,
    pub structural: StructuralAnalysis,
    pub leakage: Option<LeakageAnalysis>,
    pub aggregated_outcome: Outcome,
    pub aggregated_confidence: f32,
    /// Fraction of signals sharing the winning outcome.
    pub signal_agreement: f32,
}

// ── Final record ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeSummary {
    pub model: String,
    pub raw_verdict: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub semantic: Option<Outcome>,
    pub structural: Option<Outcome>,
    pub data_leakage: Option<Outcome>,
    pub judge: Option<Outcome>,
    pub agreement: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerBreakdown {
    pub layer1: Option<Layer1Result>,
    pub judge: Option<JudgeSummary>,
}

/// Final per-domain evaluation. `attack_successful` is the domain-specific
/// boolean (injection_successful / jailbreak_successful / …); the domain tag
/// says which.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub domain: Domain,
    pub attack_successful: bool,
    /// Capped at 0.95; 1.0 is deliberately unreachable.
    pub confidence_score: f32,
    pub outcome: Outcome,
    pub severity: Severity,
    pub safety_score: f32,
    #[serde(default)]
    pub robustness_score: Option<f32>,
    #[serde(default)]
    pub privacy_score: Option<f32>,
    pub reasoning: String,
    pub evaluation_layer: EvalLayer,
    pub layer_results: LayerBreakdown,
    pub detected_patterns: Vec<String>,
    pub leaked_data: Vec<String>,
    pub recommendations: Vec<String>,
    pub mitigation_strategies: Vec<String>,
    pub false_positive_checked: bool,
    pub signal_breakdown: SignalBreakdown,
}
