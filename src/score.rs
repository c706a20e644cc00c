//! Compression quality scoring.
//!
//! Maps a size-reduction percentage onto ten half-star tiers. The table is
//! checked top-down and the lower bound of each tier is inclusive, so e.g.
//! exactly 88.0 lands in the 4.0 tier, and 87.9 in the 3.5 tier below it.

/// Indicator color a presentation layer should use for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreColor {
    Green,
    Yellow,
    Orange,
    Red,
}

/// One scored compression result: half-star tier in 0.5..=5.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub tier: f64,
    pub label: &'static str,
    pub color: ScoreColor,
}

const TIERS: &[(f64, f64, &str)] = &[
    (97.0, 5.0, "Incredible"),
    (93.0, 4.5, "Outstanding"),
    (88.0, 4.0, "Excellent"),
    (80.0, 3.5, "Great"),
    (70.0, 3.0, "Good"),
    (55.0, 2.5, "Decent"),
    (40.0, 2.0, "Moderate"),
    (25.0, 1.5, "Some savings"),
    (10.0, 1.0, "Minimal"),
];

/// Score a compression ratio percentage. Total over all of f64, including
/// negative ratios (output larger than input).
pub fn score(ratio_percent: f64) -> Score {
    for &(floor, tier, label) in TIERS {
        if ratio_percent >= floor {
            return Score {
                tier,
                label,
                color: color_for(tier),
            };
        }
    }
    Score {
        tier: 0.5,
        label: "Very low",
        color: color_for(0.5),
    }
}

fn color_for(tier: f64) -> ScoreColor {
    if tier >= 4.0 {
        ScoreColor::Green
    } else if tier >= 2.5 {
        ScoreColor::Yellow
    } else if tier >= 1.5 {
        ScoreColor::Orange
    } else {
        ScoreColor::Red
    }
}

/// Render a tier as a five-unit star string, e.g. 3.5 -> `★★★½☆`.
pub fn stars(tier: f64) -> String {
    let halves = (tier * 2.0).round() as usize;
    let full = halves / 2;
    let half = halves % 2;
    let mut out = String::new();
    for _ in 0..full {
        out.push('★');
    }
    if half == 1 {
        out.push('½');
    }
    for _ in (full + half)..5 {
        out.push('☆');
    }
    out
}
