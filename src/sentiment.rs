//! Lexicon sentiment scoring.
//!
//! A VADER-style scorer: word valences from a small general plus financial
//! lexicon, flipped by nearby negations, scaled by intensity boosters, then
//! squashed into `[-1, 1]` with `x / sqrt(x² + 15)`.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Anything that maps text to a sentiment score in `[-1, 1]`.
pub trait SentimentScorer {
    /// Pure and deterministic; `0.0` for empty text.
    fn score(&self, text: &str) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    /// Positive above `0.05`, negative below `-0.05`, neutral otherwise.
    pub fn from_score(score: f64) -> Self {
        if score > 0.05 {
            SentimentLabel::Positive
        } else if score < -0.05 {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SentimentLabel::Positive => "Positive",
            SentimentLabel::Negative => "Negative",
            SentimentLabel::Neutral => "Neutral",
        })
    }
}

/// Mean of `scores`, `None` when empty.
pub fn average(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

const NORMALIZATION_ALPHA: f64 = 15.0;
const NEGATION_SCALAR: f64 = -0.74;
const BOOSTER_INCREMENT: f64 = 0.293;
/// How many preceding tokens a negation or booster reaches.
const MODIFIER_WINDOW: usize = 3;

static LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        // general
        ("good", 1.9), ("great", 3.1), ("excellent", 3.2), ("positive", 2.6),
        ("strong", 2.3), ("stronger", 2.2), ("best", 3.2), ("better", 1.9),
        ("happy", 2.7), ("optimistic", 2.5), ("confident", 2.2), ("success", 2.7),
        ("successful", 2.8), ("win", 2.8), ("wins", 2.7), ("improve", 1.9),
        ("improved", 2.1), ("improves", 1.9), ("robust", 2.1), ("healthy", 1.8),
        ("bad", -2.5), ("poor", -2.1), ("worse", -2.1), ("worst", -3.1),
        ("negative", -2.7), ("weak", -1.9), ("weaker", -1.9), ("fail", -2.5),
        ("failed", -2.3), ("fails", -2.2), ("failure", -2.4), ("concern", -1.4),
        ("concerns", -1.5), ("worried", -1.8), ("worries", -1.8), ("fear", -2.2),
        ("fears", -2.1), ("risk", -1.1), ("risks", -1.1), ("uncertain", -1.2),
        ("uncertainty", -1.4), ("crisis", -3.1), ("problem", -1.7), ("trouble", -1.9),
        // markets
        ("gain", 2.0), ("gains", 2.0), ("gained", 1.9), ("rally", 2.1),
        ("rallies", 2.1), ("rallied", 2.1), ("surge", 2.0), ("surged", 2.0),
        ("surges", 2.0), ("soar", 2.2), ("soared", 2.2), ("jump", 1.5),
        ("jumped", 1.5), ("rise", 1.3), ("rises", 1.3), ("rose", 1.3),
        ("record", 1.2), ("profit", 1.9), ("profits", 1.9), ("profitable", 2.2),
        ("growth", 2.1), ("grow", 1.7), ("grew", 1.7), ("beat", 1.6),
        ("beats", 1.6), ("upgrade", 1.9), ("upgraded", 1.9), ("outperform", 2.0),
        ("bullish", 2.4), ("boost", 1.7), ("boosted", 1.7), ("recovery", 1.6),
        ("recovers", 1.6), ("recovered", 1.6), ("dividend", 1.1), ("expansion", 1.3),
        ("loss", -2.0), ("losses", -2.1), ("fall", -1.5), ("falls", -1.5),
        ("fell", -1.5), ("drop", -1.4), ("drops", -1.4), ("dropped", -1.4),
        ("decline", -1.6), ("declines", -1.6), ("declined", -1.6), ("slump", -2.3),
        ("slumped", -2.3), ("plunge", -2.5), ("plunged", -2.5), ("crash", -3.0),
        ("crashed", -3.0), ("tumble", -2.1), ("tumbled", -2.1), ("slide", -1.6),
        ("slid", -1.6), ("miss", -1.3), ("missed", -1.5), ("downgrade", -2.0),
        ("downgraded", -2.0), ("underperform", -1.9), ("bearish", -2.4), ("selloff", -2.3),
        ("layoffs", -2.2), ("default", -2.4), ("debt", -0.8), ("inflation", -0.9),
        ("slowdown", -1.8), ("recession", -2.8), ("volatile", -1.2), ("volatility", -1.1),
        ("fraud", -3.2), ("penalty", -1.9), ("probe", -1.3), ("lawsuit", -1.8),
    ]
    .into_iter()
    .collect()
});

const NEGATIONS: [&str; 14] = [
    "not", "no", "never", "none", "nobody", "nothing", "neither", "nor", "without", "cannot",
    "isnt", "wasnt", "dont", "didnt",
];

static BOOSTERS: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    [
        ("very", BOOSTER_INCREMENT),
        ("extremely", BOOSTER_INCREMENT),
        ("highly", BOOSTER_INCREMENT),
        ("sharply", BOOSTER_INCREMENT),
        ("significantly", BOOSTER_INCREMENT),
        ("strongly", BOOSTER_INCREMENT),
        ("hugely", BOOSTER_INCREMENT),
        ("slightly", -BOOSTER_INCREMENT),
        ("marginally", -BOOSTER_INCREMENT),
        ("somewhat", -BOOSTER_INCREMENT),
        ("barely", -BOOSTER_INCREMENT),
    ]
    .into_iter()
    .collect()
});

/// The built-in lexicon scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconScorer;

fn tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|raw| {
            raw.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

fn normalize(sum: f64) -> f64 {
    let score = sum / (sum * sum + NORMALIZATION_ALPHA).sqrt();
    score.clamp(-1.0, 1.0)
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let tokens = tokens(text);
        let mut sum = 0.0;
        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = LEXICON.get(token.as_str()) else {
                continue;
            };
            let mut valence = base;
            let window = &tokens[i.saturating_sub(MODIFIER_WINDOW)..i];
            for modifier in window {
                if let Some(&boost) = BOOSTERS.get(modifier.as_str()) {
                    valence += boost * valence.signum();
                }
            }
            if window.iter().any(|t| NEGATIONS.contains(&t.as_str())) {
                valence *= NEGATION_SCALAR;
            }
            sum += valence;
        }
        if sum == 0.0 { 0.0 } else { normalize(sum) }
    }
}
