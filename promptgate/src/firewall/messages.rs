// promptgate/src/firewall/messages.rs
//
// Fixed user-facing messages per threat kind. Neutral wording only; nothing
// here reveals the triggering pattern or the confidence value.

use super::types::{HarmCategory, ThreatKind};

pub const PROMPT_INJECTION_BLOCKED: &str =
    "I cannot help with that request. Please rephrase your question.";
pub const JAILBREAK_BLOCKED: &str =
    "I cannot help with that request. Please rephrase your question.";
pub const HARMFUL_CONTENT_GENERIC: &str =
    "I cannot help with that. Please ask something else.";
pub const PII_BLOCKED: &str =
    "I cannot process messages containing sensitive personal information. \
     Please remove any personal details and try again.";
pub const PII_SANITIZED: &str =
    "Your message has been processed with sensitive information removed for your protection.";
pub const RATE_LIMIT_EXCEEDED: &str =
    "Too many requests. Please wait a moment before trying again.";
pub const GENERIC_BLOCKED: &str =
    "I cannot help with that request. Please rephrase your question.";

/// Message for a blocked threat.
pub fn for_threat(threat: ThreatKind) -> &'static str {
    match threat {
        ThreatKind::PromptInjection | ThreatKind::Encoding => PROMPT_INJECTION_BLOCKED,
        ThreatKind::Jailbreak      => JAILBREAK_BLOCKED,
        ThreatKind::HarmfulContent => HARMFUL_CONTENT_GENERIC,
        ThreatKind::Pii            => PII_BLOCKED,
        ThreatKind::RateLimit      => RATE_LIMIT_EXCEEDED,
    }
}

/// Category-specific harmful-content message. All categories currently share
/// the neutral phrasing; the split point is kept so categories can diverge.
pub fn for_harmful_category(category: HarmCategory) -> &'static str {
    match category {
        HarmCategory::Violence
        | HarmCategory::Illegal
        | HarmCategory::HateSpeech
        | HarmCategory::SelfHarm
        | HarmCategory::Explicit => HARMFUL_CONTENT_GENERIC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_neutral() {
        for threat in [
            ThreatKind::PromptInjection,
            ThreatKind::Jailbreak,
            ThreatKind::HarmfulContent,
            ThreatKind::Pii,
            ThreatKind::RateLimit,
            ThreatKind::Encoding,
        ] {
            let msg = for_threat(threat);
            assert!(!msg.contains("confidence"));
            assert!(!msg.contains("pattern"));
            assert!(!msg.is_empty());
        }
    }
}
