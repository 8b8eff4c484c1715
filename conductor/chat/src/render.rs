//! Terminal rendering of conductor messages

use companion_core::{ConductorMessage, DailyLimit, DenyReason, NotifyLevel, QuotaState};

/// Text line for a message, or `None` if it has no visible form
pub fn render(msg: &ConductorMessage) -> Option<String> {
    match msg {
        ConductorMessage::UserTurn { persona_id, text, .. } => {
            Some(format!("you → {persona_id}: {text}"))
        }
        ConductorMessage::BubbleRevealed { text, media, .. } => {
            let mut line = format!("  » {text}");
            for m in media {
                line.push_str(&format!("\n    [{:?}] {}", m.kind, m.url));
            }
            Some(line)
        }
        ConductorMessage::Composing { active: true, .. } => Some("  …".to_string()),
        ConductorMessage::Composing { active: false, .. }
        | ConductorMessage::TurnDelivered { .. } => None,
        ConductorMessage::QuotaBlocked { reason } => Some(render_denial(reason)),
        ConductorMessage::QuotaUpdated { .. } => None,
        ConductorMessage::Notify { level, message } => {
            let tag = match level {
                NotifyLevel::Info => "info",
                NotifyLevel::Warning => "warn",
                NotifyLevel::Error => "error",
            };
            Some(format!("[{tag}] {message}"))
        }
    }
}

/// Limit prompt for a refused send
pub fn render_denial(reason: &DenyReason) -> String {
    match reason {
        DenyReason::Loading => "[quota] still checking your allowance, try again in a moment".into(),
        DenyReason::QuotaExhausted { detail } => format!(
            "[quota] you've used all {} turns on the {} plan today; resets at {}",
            detail.daily_limit,
            detail.tier,
            detail.reset_at.format("%Y-%m-%d %H:%M UTC")
        ),
    }
}

/// One-line quota summary
pub fn render_quota(state: &QuotaState) -> String {
    let provisional = if state.is_provisional { " (provisional)" } else { "" };
    match state.daily_limit {
        DailyLimit::Unlimited => format!("[quota] {} plan, unlimited{provisional}", state.tier),
        DailyLimit::Limited(limit) => format!(
            "[quota] {} plan, {}/{} used{provisional}",
            state.tier, state.daily_used, limit
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::quota::QuotaDetail;
    use companion_core::{Tier, TurnId};
    use pretty_assertions::assert_eq;

    fn exhausted_free() -> QuotaState {
        serde_json::from_str(
            r#"{"tier":"free","daily_limit":20,"daily_used":20,
                "reset_at":"2026-10-18T00:00:00Z","is_provisional":false}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_exhausted_prompt_names_plan_and_reset() {
        let reason = DenyReason::QuotaExhausted {
            detail: QuotaDetail {
                tier: Tier::Free,
                daily_limit: 20,
                reset_at: exhausted_free().reset_at,
            },
        };
        assert_eq!(
            render_denial(&reason),
            "[quota] you've used all 20 turns on the free plan today; resets at 2026-10-18 00:00 UTC"
        );
    }

    #[test]
    fn test_quota_summary() {
        assert_eq!(render_quota(&exhausted_free()), "[quota] free plan, 20/20 used");
    }

    #[test]
    fn test_silent_messages() {
        let msg = ConductorMessage::TurnDelivered {
            turn_id: TurnId::new(),
            bubble_count: 2,
        };
        assert_eq!(render(&msg), None);
    }
}
