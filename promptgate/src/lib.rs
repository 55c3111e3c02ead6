// promptgate/src/lib.rs
//
// promptgate — input guardrail firewall and multi-layer response evaluator
// for LLM applications.
//
// Two subsystems over shared primitives:
//   firewall — online, latency-bounded: decides allow / block / sanitize /
//              throttle before a prompt reaches the downstream model
//   eval     — offline: scores captured prompt/response pairs along four
//              threat domains with confidence-escalating layers

pub mod error;
pub mod eval;
pub mod firewall;
pub mod state;

pub use error::{Error, Result};
pub use eval::{Domain, EvalConfig, EvalContext, EvalReport, Outcome, ResponseEvaluator};
pub use firewall::{
    Decision, FirewallConfig, FirewallEvaluator, GuardRequest, GuardResponse, Severity, ThreatKind,
};
