use std::fmt;

use crate::classifier::NeuralScorer;
use crate::errors::{Result, SentiError};
use crate::lexicon::LexiconScorer;

/// Compound scores at or above this value are labeled positive.
pub const POSITIVE_THRESHOLD: f64 = 0.05;

/// Compound scores at or below this value are labeled negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.05;

/// Trait for sentiment scorers.
///
/// A scorer fills the fields it is responsible for and leaves the others empty.
pub trait Scorer {
    /// Scores a text.
    ///
    /// # Arguments
    ///
    /// * `text` - A non-empty text.
    ///
    /// # Returns
    ///
    /// A partial result.
    fn score(&self, text: &str) -> PartialResult;
}

/// Scores produced by one or more scorers. Missing fields are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartialResult {
    pub negative: Option<f64>,
    pub neutral: Option<f64>,
    pub positive: Option<f64>,
    pub compound: Option<f64>,
    pub custom: Option<f64>,
}

impl PartialResult {
    /// Merges two partial results. Fields of `other` take precedence.
    pub fn merge(self, other: Self) -> Self {
        Self {
            negative: other.negative.or(self.negative),
            neutral: other.neutral.or(self.neutral),
            positive: other.positive.or(self.positive),
            compound: other.compound.or(self.compound),
            custom: other.custom.or(self.custom),
        }
    }
}

/// Scores of both analyzers for one text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SentimentResult {
    negative: f64,
    neutral: f64,
    positive: f64,
    compound: f64,
    custom: f64,
}

impl SentimentResult {
    /// Proportion of negative sentiment by the lexicon scorer.
    pub const fn negative(&self) -> f64 {
        self.negative
    }

    /// Proportion of neutral tokens by the lexicon scorer.
    pub const fn neutral(&self) -> f64 {
        self.neutral
    }

    /// Proportion of positive sentiment by the lexicon scorer.
    pub const fn positive(&self) -> f64 {
        self.positive
    }

    /// Normalized polarity by the lexicon scorer.
    pub const fn compound(&self) -> f64 {
        self.compound
    }

    /// Positive probability by the neural classifier.
    pub const fn custom(&self) -> f64 {
        self.custom
    }

    /// Returns the label derived from the compound score.
    pub fn label(&self) -> Label {
        Label::from_compound(self.compound)
    }
}

impl TryFrom<PartialResult> for SentimentResult {
    type Error = SentiError;

    fn try_from(partial: PartialResult) -> Result<Self> {
        let missing = |name| SentiError::invalid_argument("partial", format!("{name} is missing"));
        Ok(Self {
            negative: partial.negative.ok_or_else(|| missing("negative"))?,
            neutral: partial.neutral.ok_or_else(|| missing("neutral"))?,
            positive: partial.positive.ok_or_else(|| missing("positive"))?,
            compound: partial.compound.ok_or_else(|| missing("compound"))?,
            custom: partial.custom.ok_or_else(|| missing("custom"))?,
        })
    }
}

/// Three-way sentiment label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Label {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Label {
    /// Derives a label from a compound score.
    ///
    /// # Examples
    ///
    /// ```
    /// use senti::Label;
    ///
    /// assert_eq!(Label::Positive, Label::from_compound(0.05));
    /// assert_eq!(Label::Negative, Label::from_compound(-0.05));
    /// assert_eq!(Label::Neutral, Label::from_compound(0.0));
    /// ```
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POSITIVE_THRESHOLD {
            Self::Positive
        } else if compound <= NEGATIVE_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    /// Returns the display text, e.g. `"Positive:"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "Positive:",
            Self::Negative => "Negative:",
            Self::Neutral => "Neutral:",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one request: the scores (if any text was given) and the label.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Analysis {
    pub result: Option<SentimentResult>,
    pub label: Label,
}

/// Runs the lexicon scorer and the neural scorer, and merges their results.
pub struct Analyzer<L = LexiconScorer, N = NeuralScorer> {
    lexicon: L,
    neural: N,
}

impl<L, N> Analyzer<L, N>
where
    L: Scorer,
    N: Scorer,
{
    /// Creates a new analyzer.
    ///
    /// # Arguments
    ///
    /// * `lexicon` - A scorer filling the negative, neutral, positive and compound fields.
    /// * `neural` - A scorer filling the custom field.
    pub fn new(lexicon: L, neural: N) -> Self {
        Self { lexicon, neural }
    }

    pub fn lexicon_scorer(&self) -> &L {
        &self.lexicon
    }

    pub fn neural_scorer(&self) -> &N {
        &self.neural
    }

    /// Analyzes a submitted text.
    ///
    /// An absent or empty text skips both scorers and yields an empty result labeled neutral.
    ///
    /// # Errors
    ///
    /// Returns an error if the scorers together leave a field empty.
    pub fn analyze(&self, text: Option<&str>) -> Result<Analysis> {
        let text = match text {
            Some(text) if !text.is_empty() => text,
            _ => return Ok(Analysis::default()),
        };
        let partial = self.lexicon.score(text).merge(self.neural.score(text));
        let result = SentimentResult::try_from(partial)?;
        Ok(Analysis {
            result: Some(result),
            label: result.label(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    struct FixedScorer {
        partial: PartialResult,
        calls: Cell<usize>,
    }

    impl FixedScorer {
        fn new(partial: PartialResult) -> Self {
            Self {
                partial,
                calls: Cell::new(0),
            }
        }
    }

    impl Scorer for FixedScorer {
        fn score(&self, _text: &str) -> PartialResult {
            self.calls.set(self.calls.get() + 1);
            self.partial
        }
    }

    fn lexicon_part(compound: f64) -> PartialResult {
        PartialResult {
            negative: Some(0.1),
            neutral: Some(0.5),
            positive: Some(0.4),
            compound: Some(compound),
            custom: None,
        }
    }

    fn custom_part(custom: f64) -> PartialResult {
        PartialResult {
            custom: Some(custom),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_boundaries() {
        assert_eq!(Label::Positive, Label::from_compound(0.05));
        assert_eq!(Label::Negative, Label::from_compound(-0.05));
        assert_eq!(Label::Neutral, Label::from_compound(0.0));
        assert_eq!(Label::Neutral, Label::from_compound(0.0499));
        assert_eq!(Label::Neutral, Label::from_compound(-0.0499));
        assert_eq!(Label::Positive, Label::from_compound(1.0));
        assert_eq!(Label::Negative, Label::from_compound(-1.0));
    }

    #[test]
    fn test_label_display() {
        assert_eq!("Positive:", Label::Positive.to_string());
        assert_eq!("Negative:", Label::Negative.to_string());
        assert_eq!("Neutral:", Label::default().to_string());
    }

    #[test]
    fn test_partial_merge() {
        let merged = lexicon_part(0.3).merge(custom_part(0.81));
        assert_eq!(Some(0.3), merged.compound);
        assert_eq!(Some(0.81), merged.custom);

        let overridden = custom_part(0.1).merge(custom_part(0.2));
        assert_eq!(Some(0.2), overridden.custom);
    }

    #[test]
    fn test_sentiment_result_missing_field() {
        let r = SentimentResult::try_from(lexicon_part(0.3));
        assert_eq!(
            "InvalidArgumentError: partial: custom is missing",
            &r.err().unwrap().to_string()
        );
    }

    #[test]
    fn test_analyze_empty_skips_scorers() {
        let analyzer = Analyzer::new(
            FixedScorer::new(lexicon_part(0.9)),
            FixedScorer::new(custom_part(0.9)),
        );
        assert_eq!(Analysis::default(), analyzer.analyze(None).unwrap());
        assert_eq!(Analysis::default(), analyzer.analyze(Some("")).unwrap());
        assert_eq!(Label::Neutral, analyzer.analyze(Some("")).unwrap().label);
        assert_eq!(0, analyzer.lexicon_scorer().calls.get());
        assert_eq!(0, analyzer.neural_scorer().calls.get());
    }

    #[test]
    fn test_analyze_merges() {
        let analyzer = Analyzer::new(
            FixedScorer::new(lexicon_part(-0.4)),
            FixedScorer::new(custom_part(0.12)),
        );
        let analysis = analyzer.analyze(Some("whatever")).unwrap();
        let result = analysis.result.unwrap();
        assert_eq!(Label::Negative, analysis.label);
        assert_eq!(0.1, result.negative());
        assert_eq!(0.5, result.neutral());
        assert_eq!(0.4, result.positive());
        assert_eq!(-0.4, result.compound());
        assert_eq!(0.12, result.custom());
        assert_eq!(1, analyzer.lexicon_scorer().calls.get());
        assert_eq!(1, analyzer.neural_scorer().calls.get());
    }

    #[test]
    fn test_analyze_incomplete() {
        let analyzer = Analyzer::new(
            FixedScorer::new(lexicon_part(0.4)),
            FixedScorer::new(PartialResult::default()),
        );
        assert!(analyzer.analyze(Some("text")).is_err());
    }

    #[test]
    fn test_analyze_idempotent() {
        let analyzer = Analyzer::new(
            LexiconScorer::default(),
            FixedScorer::new(custom_part(0.5)),
        );
        let a = analyzer.analyze(Some("What a great day!")).unwrap();
        let b = analyzer.analyze(Some("What a great day!")).unwrap();
        assert_eq!(a, b);
        assert_eq!(Label::Positive, a.label);
    }
}
