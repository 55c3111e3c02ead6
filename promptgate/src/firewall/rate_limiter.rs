// promptgate/src/firewall/rate_limiter.rs
//
// Sliding-window rate limiting across three identifier axes plus a burst
// quota. Stamps are recorded only when the request is admitted, so rejected
// requests never consume quota.
//
// Concurrency: all needed per-key write guards are taken up front in a fixed
// axis order (burst, user, ip, session) before any check, so two in-flight
// requests for the same identifier cannot both observe the last free slot.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::state::window::{now_ms, BurstWindow, RateWindow, StateStore, W_HOUR_MS, W_MINUTE_MS};
use super::config::{RateLimitConfig, WindowQuota};
use super::types::{Decision, DetectorDetails, DetectorResult, LimitAxis, Severity, ThreatKind};

pub struct RateLimiter {
    config: RateLimitConfig,
    store:  Arc<StateStore>,
}

struct AxisCheck {
    axis:   LimitAxis,
    quota:  WindowQuota,
    window: Arc<RwLock<RateWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<StateStore>) -> Self {
        Self { config, store }
    }

    pub fn check(
        &self,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        session_id: Option<&str>,
    ) -> DetectorResult {
        self.check_at(user_id, ip_address, session_id, now_ms())
    }

    /// Clock-injectable variant.
    pub fn check_at(
        &self,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        session_id: Option<&str>,
        now: i64,
    ) -> DetectorResult {
        let started = Instant::now();

        if !self.config.enabled {
            return DetectorResult::pass(ThreatKind::RateLimit, elapsed_ms(started));
        }

        // Missing axes are skipped; anonymous callers still hit the burst
        // check through a composite key.
        let burst_key = user_id
            .or(ip_address)
            .or(session_id)
            .unwrap_or("anonymous")
            .to_string();

        let burst: Option<Arc<RwLock<BurstWindow>>> = self
            .config
            .burst_protection
            .then(|| self.store.burst_window(&burst_key));

        let mut axes: Vec<AxisCheck> = Vec::with_capacity(3);
        if let Some(id) = user_id {
            axes.push(AxisCheck {
                axis:   LimitAxis::PerUser,
                quota:  self.config.per_user,
                window: self.store.rate_window(LimitAxis::PerUser, id),
            });
        }
        if let Some(id) = ip_address {
            axes.push(AxisCheck {
                axis:   LimitAxis::PerIp,
                quota:  self.config.per_ip,
                window: self.store.rate_window(LimitAxis::PerIp, id),
            });
        }
        if let Some(id) = session_id {
            axes.push(AxisCheck {
                axis:   LimitAxis::PerSession,
                quota:  self.config.per_session,
                window: self.store.rate_window(LimitAxis::PerSession, id),
            });
        }

        // Fixed lock order: burst first, then the axes.
        let mut burst_guard = burst.as_ref().map(|b| b.write());
        let mut axis_guards: Vec<_> = axes.iter().map(|a| a.window.write()).collect();

        let mut tripped: Option<LimitAxis> = None;
        let mut remaining = u32::MAX;

        if let Some(guard) = burst_guard.as_mut() {
            guard.prune(now, self.config.burst_window_ms);
            if guard.len() >= self.config.burst_max_requests {
                tripped = Some(LimitAxis::Burst);
            }
        }

        if tripped.is_none() {
            for (check, guard) in axes.iter().zip(axis_guards.iter_mut()) {
                guard.prune(now);
                match window_remaining(guard, check.quota, now) {
                    Some(rem) => remaining = remaining.min(rem),
                    None => {
                        tripped = Some(check.axis);
                        break;
                    }
                }
            }
        }

        let exceeded = tripped.is_some();
        if !exceeded {
            if let Some(guard) = burst_guard.as_mut() {
                guard.record(now);
            }
            for guard in axis_guards.iter_mut() {
                guard.record(now);
            }
        }

        let requests_remaining = if exceeded {
            0
        } else if remaining == u32::MAX {
            0
        } else {
            remaining
        };

        DetectorResult {
            threat:     ThreatKind::RateLimit,
            detected:   exceeded,
            confidence: if exceeded { 1.0 } else { 0.0 },
            severity:   if exceeded { Severity::Medium } else { Severity::Low },
            decision:   if exceeded { Decision::Throttled } else { Decision::Allowed },
            details: DetectorDetails::RateLimit {
                limit_axis: tripped,
                requests_remaining,
            },
            context:    None,
            latency_ms: elapsed_ms(started),
            reasoning: if exceeded {
                "Rate limit exceeded".to_string()
            } else {
                "Rate limit within limits".to_string()
            },
        }
    }

    /// Admin/test hook: forget all quota state for an identifier.
    pub fn reset(&self, identifier: &str) {
        self.store.reset_identifier(identifier);
    }
}

/// Remaining capacity across the axis windows, or `None` when any window is
/// already at its limit. An unset limit is treated as unlimited.
fn window_remaining(window: &RateWindow, quota: WindowQuota, now: i64) -> Option<u32> {
    let rpm_count = window.count_within(now, W_MINUTE_MS);
    if let Some(rpm) = quota.rpm {
        if rpm_count >= rpm as usize {
            return None;
        }
    }
    let rph_count = window.count_within(now, W_HOUR_MS);
    if let Some(rph) = quota.rph {
        if rph_count >= rph as usize {
            return None;
        }
    }
    let rpd_count = window.total();
    if let Some(rpd) = quota.rpd {
        if rpd_count >= rpd as usize {
            return None;
        }
    }

    let mut remaining = u32::MAX;
    if let Some(rpm) = quota.rpm {
        remaining = remaining.min(rpm.saturating_sub(rpm_count as u32));
    }
    if let Some(rph) = quota.rph {
        remaining = remaining.min(rph.saturating_sub(rph_count as u32));
    }
    if let Some(rpd) = quota.rpd {
        remaining = remaining.min(rpd.saturating_sub(rpd_count as u32));
    }
    Some(remaining)
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::config::RateLimitConfig;

    fn limiter(config: RateLimitConfig) -> RateLimiter {
        RateLimiter::new(config, Arc::new(StateStore::new()))
    }

    fn small_quota() -> RateLimitConfig {
        let mut cfg = RateLimitConfig::default();
        cfg.per_user = WindowQuota { rpm: Some(5), rph: Some(100), rpd: Some(1_000) };
        cfg
    }

    #[test]
    fn nth_request_allowed_nplus1_throttled() {
        let rl = limiter(small_quota());
        let base = now_ms();
        for i in 0..5 {
            // Spread past the burst window so only the RPM quota is in play.
            let r = rl.check_at(Some("alice"), None, None, base + i * 2_000);
            assert!(!r.detected, "request {} should be admitted", i + 1);
        }
        let r = rl.check_at(Some("alice"), None, None, base + 11_000);
        assert!(r.detected);
        assert_eq!(r.decision, Decision::Throttled);
        match r.details {
            DetectorDetails::RateLimit { limit_axis, requests_remaining } => {
                assert_eq!(limit_axis, Some(LimitAxis::PerUser));
                assert_eq!(requests_remaining, 0);
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn last_admitted_request_reports_zero_remaining() {
        let rl = limiter(small_quota());
        let base = now_ms();
        let mut last_remaining = u32::MAX;
        for i in 0..5 {
            let r = rl.check_at(Some("bob"), None, None, base + i * 2_000);
            if let DetectorDetails::RateLimit { requests_remaining, .. } = r.details {
                last_remaining = requests_remaining;
            }
        }
        assert_eq!(last_remaining, 0);
    }

    #[test]
    fn rejected_requests_do_not_consume_quota() {
        let rl = limiter(small_quota());
        let base = now_ms();
        for i in 0..5 {
            rl.check_at(Some("carol"), None, None, base + i * 2_000);
        }
        // Two rejected attempts.
        assert!(rl.check_at(Some("carol"), None, None, base + 12_000).detected);
        assert!(rl.check_at(Some("carol"), None, None, base + 14_000).detected);
        // A minute past the first stamp, one slot opens again.
        let r = rl.check_at(Some("carol"), None, None, base + W_MINUTE_MS + 1_000);
        assert!(!r.detected);
    }

    #[test]
    fn burst_trips_before_axis_quotas() {
        let rl = limiter(RateLimitConfig::default());
        let base = now_ms();
        for i in 0..10 {
            let r = rl.check_at(Some("dave"), None, None, base + i * 10);
            assert!(!r.detected, "burst slot {} should be admitted", i);
        }
        let r = rl.check_at(Some("dave"), None, None, base + 500);
        assert!(r.detected);
        match r.details {
            DetectorDetails::RateLimit { limit_axis, .. } => {
                assert_eq!(limit_axis, Some(LimitAxis::Burst));
            }
            _ => panic!("wrong details variant"),
        }
    }

    #[test]
    fn anonymous_callers_fall_through_to_burst() {
        let rl = limiter(RateLimitConfig::default());
        let base = now_ms();
        for i in 0..10 {
            assert!(!rl.check_at(None, None, None, base + i * 10).detected);
        }
        assert!(rl.check_at(None, None, None, base + 500).detected);
    }

    #[test]
    fn missing_axes_are_skipped() {
        let mut cfg = small_quota();
        cfg.burst_protection = false;
        let rl = limiter(cfg);
        let base = now_ms();
        // No identifiers and no burst protection: nothing to throttle on.
        for i in 0..50 {
            assert!(!rl.check_at(None, None, None, base + i).detected);
        }
    }

    #[test]
    fn reset_reopens_the_quota() {
        let rl = limiter(small_quota());
        let base = now_ms();
        for i in 0..5 {
            rl.check_at(Some("frank"), None, None, base + i * 2_000);
        }
        assert!(rl.check_at(Some("frank"), None, None, base + 11_000).detected);
        rl.reset("frank");
        assert!(!rl.check_at(Some("frank"), None, None, base + 12_000).detected);
    }

    #[test]
    fn disabled_limiter_passes() {
        let mut cfg = RateLimitConfig::default();
        cfg.enabled = false;
        let rl = limiter(cfg);
        let base = now_ms();
        for i in 0..100 {
            assert!(!rl.check_at(Some("eve"), None, None, base + i).detected);
        }
    }
}
