use analysis_core::NewsArticle;
use serde::{Deserialize, Serialize};

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "rallies", "surge", "surges", "soar", "soars", "gain", "gains", "profit",
    "growth", "beat", "beats", "upgrade", "upgraded", "outperform", "strong", "positive", "rise",
    "rises", "increase", "breakthrough", "innovation", "success", "exceed", "exceeds", "momentum",
    "optimistic", "record", "advance", "jump", "jumps", "win", "wins", "dividend", "buyback",
    "upside", "recovery", "rebound", "expansion", "robust", "accelerating", "raised", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "declines", "loss", "losses", "fall", "falls", "plunge", "plunges",
    "crash", "miss", "misses", "downgrade", "downgraded", "underperform", "weak", "negative",
    "drop", "drops", "decrease", "concern", "concerns", "risk", "fail", "fails", "disappoint",
    "disappoints", "slump", "warning", "pessimistic", "retreat", "fear", "fears", "trouble",
    "dilution", "headwind", "lawsuit", "litigation", "recall", "investigation", "probe", "default",
    "bankruptcy", "layoff", "layoffs", "downside", "overvalued", "bubble", "lowered", "suspended",
    "tumble", "tumbles", "sinks",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't", "wasn't", "won't",
    "hardly", "barely", "without",
];

const NEGATION_WINDOW: usize = 3;

/// Normalization constant mapping a raw word-score sum into (-1, 1).
const NORMALIZATION_ALPHA: f64 = 15.0;

const POLARITY_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentStatus {
    Bullish,
    Bearish,
    Mixed,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineSentiment {
    pub title: String,
    pub polarity: Polarity,
    pub compound: f64,
    pub link: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub status: SentimentStatus,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub articles: Vec<HeadlineSentiment>,
}

/// Compound polarity of a headline in (-1, 1). Lexicon hits count ±1 and
/// flip sign when a negation word precedes them within a short window.
pub fn compound_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':' | '"' | '(' | ')'))
        .filter(|w| !w.is_empty())
        .collect();

    let mut raw = 0.0;
    for (i, word) in words.iter().enumerate() {
        let value = if POSITIVE_WORDS.contains(word) {
            1.0
        } else if NEGATIVE_WORDS.contains(word) {
            -1.0
        } else {
            continue;
        };

        let negated = words[i.saturating_sub(NEGATION_WINDOW)..i]
            .iter()
            .any(|w| NEGATION_WORDS.contains(w));
        raw += if negated { -value } else { value };
    }

    raw / (raw * raw + NORMALIZATION_ALPHA).sqrt()
}

impl Polarity {
    pub fn from_compound(compound: f64) -> Self {
        if compound > POLARITY_THRESHOLD {
            Polarity::Positive
        } else if compound < -POLARITY_THRESHOLD {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }
}

impl SentimentStatus {
    pub fn from_counts(positive: usize, negative: usize) -> Self {
        if positive > 0 && negative > 0 {
            SentimentStatus::Mixed
        } else if positive > negative {
            SentimentStatus::Bullish
        } else if negative > positive {
            SentimentStatus::Bearish
        } else {
            SentimentStatus::Neutral
        }
    }
}

/// Classify each headline and tally the result.
pub fn summarize_headlines(articles: &[NewsArticle]) -> SentimentSummary {
    let articles: Vec<HeadlineSentiment> = articles
        .iter()
        .map(|a| {
            let compound = compound_score(&a.title);
            HeadlineSentiment {
                title: a.title.clone(),
                polarity: Polarity::from_compound(compound),
                compound,
                link: a.article_url.clone(),
                source: a.source.clone(),
            }
        })
        .collect();

    let count = |p: Polarity| articles.iter().filter(|a| a.polarity == p).count();
    let positive = count(Polarity::Positive);
    let negative = count(Polarity::Negative);
    let neutral = count(Polarity::Neutral);

    SentimentSummary {
        status: SentimentStatus::from_counts(positive, negative),
        positive,
        negative,
        neutral,
        articles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::article;

    #[test]
    fn test_headline_polarity() {
        assert_eq!(Polarity::from_compound(compound_score("Apple shares surge on record profit")), Polarity::Positive);
        assert_eq!(Polarity::from_compound(compound_score("Chipmaker stock plunges after earnings miss")), Polarity::Negative);
        assert_eq!(Polarity::from_compound(compound_score("Company schedules annual meeting")), Polarity::Neutral);
    }

    #[test]
    fn test_negation_flips_polarity() {
        assert!(compound_score("Results did not disappoint") > 0.0);
        assert!(compound_score("Guidance is not strong") < 0.0);
    }

    #[test]
    fn test_compound_is_bounded() {
        let score = compound_score("surge rally gain profit growth beat upgrade record jump soar");
        assert!(score > 0.9 && score < 1.0);
    }

    #[test]
    fn test_status_rules() {
        assert_eq!(SentimentStatus::from_counts(2, 1), SentimentStatus::Mixed);
        assert_eq!(SentimentStatus::from_counts(2, 0), SentimentStatus::Bullish);
        assert_eq!(SentimentStatus::from_counts(0, 1), SentimentStatus::Bearish);
        assert_eq!(SentimentStatus::from_counts(0, 0), SentimentStatus::Neutral);
    }

    #[test]
    fn test_summarize_headlines() {
        let news = vec![
            article("1", "Shares rally after upgrade", 0),
            article("2", "Board announces new director", 1),
            article("3", "Analysts see strong growth ahead", 2),
        ];
        let summary = summarize_headlines(&news);
        assert_eq!((summary.positive, summary.negative, summary.neutral), (2, 0, 1));
        assert_eq!(summary.status, SentimentStatus::Bullish);
        assert_eq!(summary.articles[0].link, "https://news.example/1");
    }
}
