//! Tier tables: label/colour buckets for the score and penalty columns.
//!
//! The engine only picks a tier for a value. Colours are opaque strings
//! handed through to whatever renders them.

use serde::{Deserialize, Serialize};

/// Score bucket: applies to values `>= min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTier {
    pub min: f64,
    pub label: String,
    pub color: String,
}

/// Penalty bucket: applies to values in `min..=max`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTier {
    pub min: f64,
    pub max: f64,
    pub label: String,
    pub color: String,
}

impl ScoreTier {
    pub fn new(min: f64, label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            min,
            label: label.into(),
            color: color.into(),
        }
    }
}

impl PenaltyTier {
    pub fn new(min: f64, max: f64, label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            min,
            max,
            label: label.into(),
            color: color.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

pub fn default_score_tiers() -> Vec<ScoreTier> {
    vec![
        ScoreTier::new(90.0, "Leviathan", "#EE82EE"),
        ScoreTier::new(75.0, "Gold", "#FFD700"),
        ScoreTier::new(50.0, "Silver", "#C0C0C0"),
        ScoreTier::new(25.0, "Bronze", "#CD7F32"),
        ScoreTier::new(f64::NEG_INFINITY, "Subpar", "#8B4513"),
    ]
}

pub fn default_penalty_tiers() -> Vec<PenaltyTier> {
    vec![
        PenaltyTier::new(0.0, 0.0, "N/A", "#D3D3D3"),
        PenaltyTier::new(1.0, 5.0, "Minimal", "#40A040"),
        PenaltyTier::new(6.0, 10.0, "Low", "#0028FF"),
        PenaltyTier::new(11.0, 15.0, "Moderate", "#808080"),
        PenaltyTier::new(16.0, 20.0, "High", "#3280CD"),
        PenaltyTier::new(21.0, f64::INFINITY, "Severe", "#74BAEC"),
    ]
}

/// Keep score tiers sorted by descending `min`, which is the order
/// `score_tier` relies on.
pub fn sort_score_tiers(tiers: &mut [ScoreTier]) {
    tiers.sort_by(|a, b| b.min.total_cmp(&a.min));
}

/// First tier whose `min` the value reaches. Tiers must be sorted by
/// descending `min`.
pub fn score_tier(tiers: &[ScoreTier], value: f64) -> Option<&ScoreTier> {
    tiers.iter().find(|t| value >= t.min)
}

/// First tier whose range holds the value.
pub fn penalty_tier(tiers: &[PenaltyTier], value: f64) -> Option<&PenaltyTier> {
    tiers.iter().find(|t| t.contains(value))
}

/// Tier labels and colours are stored in `;`/`|` separated lists.
pub(crate) fn is_valid_tier_text(text: &str) -> bool {
    !text.contains(';') && !text.contains('|')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_score_tiers() {
        let tiers = default_score_tiers();
        assert_eq!(score_tier(&tiers, 95.0).unwrap().label, "Leviathan");
        assert_eq!(score_tier(&tiers, 90.0).unwrap().label, "Leviathan");
        assert_eq!(score_tier(&tiers, 74.9).unwrap().label, "Silver");
        assert_eq!(score_tier(&tiers, -3.0).unwrap().label, "Subpar");
    }

    #[test]
    fn test_default_penalty_tiers() {
        let tiers = default_penalty_tiers();
        assert_eq!(penalty_tier(&tiers, 0.0).unwrap().label, "N/A");
        assert_eq!(penalty_tier(&tiers, 5.0).unwrap().label, "Minimal");
        assert_eq!(penalty_tier(&tiers, 300.0).unwrap().label, "Severe");
        assert!(penalty_tier(&tiers, 5.5).is_none());
        assert!(penalty_tier(&tiers, -1.0).is_none());
    }

    #[test]
    fn test_sort_score_tiers() {
        let mut tiers = vec![
            ScoreTier::new(10.0, "low", "#000"),
            ScoreTier::new(50.0, "high", "#fff"),
        ];
        sort_score_tiers(&mut tiers);
        assert_eq!(tiers[0].label, "high");
        assert_eq!(score_tier(&tiers, 20.0).unwrap().label, "low");
        assert!(score_tier(&tiers, 5.0).is_none());
    }
}
