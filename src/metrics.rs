//! Metrics Engine (component D). Pure scoring functions over a
//! `MailboxMetrics` row; the rolling-window rotation and atomic counter
//! increments themselves live in `store::mailbox_metrics` (§5: never
//! read-modify-write in application code, only in one SQL statement).

use serde::Serialize;

use crate::model::MailboxMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    pub hard_score: f64,
    pub soft_score: f64,
}

fn rate(numerator: i32, denominator: i32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Composite 0-100 risk score, §4.4. Each component is independently capped
/// before summing so no single signal can exceed its budget.
pub fn risk_score(metrics: &MailboxMetrics, consecutive_pauses: i32) -> RiskAssessment {
    let bounce_rate_1h = rate(metrics.bounce_1h, metrics.sent_1h);
    let bounce_rate_24h = rate(metrics.bounce_24h, metrics.sent_24h);
    let failure_rate_1h = rate(metrics.failure_1h, metrics.sent_1h);
    let failure_rate_24h = rate(metrics.failure_24h, metrics.sent_24h);

    let bounce_component = (bounce_rate_1h * 2.0 + bounce_rate_24h) * 10.0;
    let bounce_component = bounce_component.clamp(0.0, 40.0);

    let failure_component = (failure_rate_1h * 2.0 + failure_rate_24h) * 8.0;
    let failure_component = failure_component.clamp(0.0, 30.0);

    let velocity_contribution = (metrics.velocity * 0.2).clamp(0.0, 20.0);

    let escalation_component = (3.0 * consecutive_pauses as f64).min(10.0);

    let score = (bounce_component + failure_component + velocity_contribution + escalation_component)
        .clamp(0.0, 100.0);

    let hard_score = ((0.7 * bounce_rate_24h + 0.3 * failure_rate_24h) * 10.0).min(100.0);
    let soft_score = metrics.velocity * 20.0;

    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        hard_score,
        soft_score,
    }
}

/// `soft_score` above doesn't fold in `warning_count` since that lives on
/// the `Mailbox`/`Domain` row, not `MailboxMetrics`; callers with both at
/// hand should add `warning_count * 10.0` themselves before comparing.
pub fn soft_score_with_warnings(base_soft_score: f64, warning_count: i32) -> f64 {
    base_soft_score + warning_count as f64 * 10.0
}

/// `bounceDelta`/`failureDelta` velocity inputs: the change in rate since
/// the previous observation, computed by the caller from
/// `prev_bounce_rate`/`prev_failure_rate` and supplied back in here before
/// persisting the updated `velocity` column.
pub fn velocity(bounce_delta: f64, failure_delta: f64) -> f64 {
    (bounce_delta * 50.0 + failure_delta * 30.0).clamp(-100.0, 100.0)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn metrics(sent_1h: i32, bounce_1h: i32, sent_24h: i32, bounce_24h: i32) -> MailboxMetrics {
        MailboxMetrics {
            mailbox_id: Uuid::new_v4(),
            sent_1h,
            bounce_1h,
            failure_1h: 0,
            window_1h_start: Utc::now(),
            sent_24h,
            bounce_24h,
            failure_24h: 0,
            window_24h_start: Utc::now(),
            sent_7d: 0,
            bounce_7d: 0,
            failure_7d: 0,
            window_7d_start: Utc::now(),
            risk_score: 0.0,
            velocity: 0.0,
            prev_bounce_rate: 0.0,
            prev_failure_rate: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_activity_is_zero_risk() {
        let m = metrics(0, 0, 0, 0);
        let a = risk_score(&m, 0);
        assert_eq!(a.score, 0.0);
        assert_eq!(a.level, RiskLevel::Low);
    }

    #[test]
    fn heavy_1h_bounce_rate_caps_at_forty() {
        let m = metrics(10, 10, 10, 10);
        let a = risk_score(&m, 0);
        assert!(a.score <= 100.0);
        assert_eq!(a.hard_score, 10.0);
    }

    #[test]
    fn escalation_caps_at_ten_regardless_of_pause_count() {
        let m = metrics(0, 0, 0, 0);
        let a = risk_score(&m, 50);
        assert_eq!(a.score, 10.0);
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(80.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(30.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
    }

    #[test]
    fn velocity_clamps_to_range() {
        assert_eq!(velocity(10.0, 10.0), 100.0);
        assert_eq!(velocity(-10.0, -10.0), -100.0);
    }
}
