// promptgate/src/eval/domains/mod.rs
//
// Per-domain evaluation profiles: structural pattern library, false-positive
// fingerprints, default baseline corpora, signal weights, and the judge
// contract. The four domains share one engine; everything domain-specific
// lives here.

mod adversarial;
mod data_extraction;
mod jailbreak;
mod prompt_injection;

use super::types::Domain;

/// One structural pattern: regex indicators, a signed score (positive =
/// resistant, negative = vulnerable), a base confidence, and optional
/// false-positive regexes that nullify the match.
pub struct PatternDef {
    pub name:                  &'static str,
    pub indicators:            &'static [&'static str],
    pub score:                 f32,
    pub confidence_base:       f32,
    pub false_positive_checks: &'static [&'static str],
}

/// Refusal-context fingerprint that demotes vulnerable verdicts.
pub struct FpPatternDef {
    pub name:                 &'static str,
    pub pattern:              &'static str,
    pub confidence_reduction: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub semantic:   f32,
    pub structural: f32,
    pub leakage:    Option<f32>,
}

/// Weights for the signal-strength factor of the confidence calculator.
#[derive(Debug, Clone, Copy)]
pub struct StrengthWeights {
    pub semantic:   f32,
    pub structural: f32,
    pub leakage:    f32,
}

pub struct DomainProfile {
    pub domain:           Domain,
    pub patterns:         &'static [PatternDef],
    pub false_positives:  &'static [FpPatternDef],
    pub safe_baselines:   &'static [&'static str],
    pub unsafe_baselines: &'static [&'static str],
    pub signal_weights:   SignalWeights,
    pub strength_weights: StrengthWeights,
    /// Run the leakage detector before Layer 1 and let a positive verdict
    /// override the whole pipeline.
    pub leakage_precheck: bool,
    /// Feed the leakage verdict into Layer-1 aggregation as its own signal.
    pub leakage_signal:   bool,
    /// Compare the response embedding against the base prompt as well.
    pub base_prompt_similarity: bool,
    pub judge_question:   &'static str,
    /// JSON key the judge answers under (e.g. "injection_successful").
    pub verdict_key:      &'static str,
    /// Optional domain score key ("privacy_score" / "robustness_score").
    pub extra_score_key:  Option<&'static str>,
}

impl Domain {
    pub fn profile(&self) -> &'static DomainProfile {
        match self {
            Domain::PromptInjection => prompt_injection::profile(),
            Domain::Jailbreak       => jailbreak::profile(),
            Domain::DataExtraction  => data_extraction::profile(),
            Domain::Adversarial     => adversarial::profile(),
        }
    }

    pub fn all() -> [Domain; 4] {
        [
            Domain::PromptInjection,
            Domain::Jailbreak,
            Domain::DataExtraction,
            Domain::Adversarial,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_domain_has_a_complete_profile() {
        for domain in Domain::all() {
            let profile = domain.profile();
            assert_eq!(profile.domain, domain);
            assert!(!profile.patterns.is_empty());
            assert!(!profile.false_positives.is_empty());
            assert!(profile.safe_baselines.len() >= 10);
            assert!(profile.unsafe_baselines.len() >= 10);
            assert!(!profile.verdict_key.is_empty());
        }
    }

    #[test]
    fn signal_weights_are_sane() {
        for domain in Domain::all() {
            let w = domain.profile().signal_weights;
            let total = w.semantic + w.structural + w.leakage.unwrap_or(0.0);
            assert!(total > 0.5 && total <= 1.0, "{domain}: {total}");
        }
    }

    #[test]
    fn leakage_domains_are_consistent() {
        assert!(Domain::PromptInjection.profile().leakage_precheck);
        assert!(Domain::DataExtraction.profile().leakage_precheck);
        assert!(Domain::DataExtraction.profile().leakage_signal);
        assert!(!Domain::Jailbreak.profile().leakage_precheck);
        assert!(Domain::DataExtraction.profile().base_prompt_similarity);
    }

    #[test]
    fn all_profile_regexes_compile() {
        for domain in Domain::all() {
            let profile = domain.profile();
            for pattern in profile.patterns {
                for indicator in pattern.indicators {
                    regex::Regex::new(&format!("(?i){indicator}"))
                        .unwrap_or_else(|e| panic!("{domain}/{}: {e}", pattern.name));
                }
                for fp in pattern.false_positive_checks {
                    regex::Regex::new(&format!("(?i){fp}")).expect("fp check regex");
                }
            }
            for fp in profile.false_positives {
                regex::Regex::new(&format!("(?i){}", fp.pattern)).expect("fp fingerprint regex");
            }
        }
    }
}
