//! Tier resolution over an organization's ladder.

use omnily_core::loyalty::{fallback_ladder, TierDefinition};

/// Tier applicable to `points`: the highest-threshold rung whose threshold
/// is at or below the balance. An empty ladder resolves against the
/// fallback ladder. Never fails.
pub fn resolve_tier(points: u64, tiers: &[TierDefinition]) -> TierDefinition {
    if tiers.is_empty() {
        return resolve_tier(points, &fallback_ladder());
    }

    let mut sorted: Vec<&TierDefinition> = tiers.iter().collect();
    sorted.sort_by(|a, b| b.threshold.cmp(&a.threshold));

    if let Some(tier) = sorted.iter().find(|t| t.threshold <= points) {
        return (*tier).clone();
    }

    // Below every threshold (ladder without a 0 rung): lowest rung.
    sorted
        .last()
        .map(|t| (*t).clone())
        .unwrap_or_else(|| TierDefinition::new("Bronze", 0, 1.0, "#a3a3a3"))
}

/// Looks up a tier by name in the ladder (fallback when empty).
pub fn find_tier(name: &str, tiers: &[TierDefinition]) -> Option<TierDefinition> {
    if tiers.is_empty() {
        return fallback_ladder().into_iter().find(|t| t.name == name);
    }
    tiers.iter().find(|t| t.name == name).cloned()
}

/// The next rung above `points`, if any.
pub fn next_tier(points: u64, tiers: &[TierDefinition]) -> Option<TierDefinition> {
    let ladder = if tiers.is_empty() {
        fallback_ladder()
    } else {
        tiers.to_vec()
    };
    ladder
        .into_iter()
        .filter(|t| t.threshold > points)
        .min_by_key(|t| t.threshold)
}

/// Progress toward the next rung as a fraction [0.0, 1.0]. 1.0 at the top.
pub fn tier_progress(points: u64, tiers: &[TierDefinition]) -> f64 {
    let current = resolve_tier(points, tiers);
    match next_tier(points, tiers) {
        Some(next) => {
            let span = next.threshold.saturating_sub(current.threshold) as f64;
            if span <= 0.0 {
                return 1.0;
            }
            (points.saturating_sub(current.threshold) as f64 / span).min(1.0)
        }
        None => 1.0,
    }
}
