use std::borrow::Cow;
use std::io::Read;

use hashbrown::{HashMap, HashSet};

use crate::analyzer::{PartialResult, Scorer};
use crate::errors::{Result, SentiError};
use crate::utils::{is_upper, round_to, strip_punct_if_word};

const BUILTIN_LEXICON: &str = include_str!("../data/lexicon.tsv");
const BUILTIN_EMOJIS: &str = include_str!("../data/emoji.tsv");

// Emoji presentation selector. Dropped so that a described emoji is not glued to it.
const VARIATION_SELECTOR: char = '\u{fe0f}';

// Empirically derived intensity increments.
const B_INCR: f64 = 0.293;
const B_DECR: f64 = -0.293;
const C_INCR: f64 = 0.733;
const N_SCALAR: f64 = -0.74;

// Normalization constant of the compound score.
const ALPHA: f64 = 15.0;

const NEGATIONS: &[&str] = &[
    "aint", "arent", "cannot", "cant", "couldnt", "darent", "didnt", "doesnt", "ain't", "aren't",
    "can't", "couldn't", "daren't", "didn't", "doesn't", "dont", "hadnt", "hasnt", "havent",
    "isnt", "mightnt", "mustnt", "neither", "don't", "hadn't", "hasn't", "haven't", "isn't",
    "mightn't", "mustn't", "neednt", "needn't", "never", "none", "nope", "nor", "not", "nothing",
    "nowhere", "oughtnt", "shant", "shouldnt", "uhuh", "wasnt", "werent", "oughtn't", "shan't",
    "shouldn't", "uh-uh", "wasn't", "weren't", "without", "wont", "wouldnt", "won't", "wouldn't",
    "rarely", "seldom", "despite",
];

const BOOSTERS_INCR: &[&str] = &[
    "absolutely", "amazingly", "awfully", "completely", "considerable", "considerably",
    "decidedly", "deeply", "effing", "enormous", "enormously", "entirely", "especially",
    "exceptional", "exceptionally", "extreme", "extremely", "fabulously", "flipping", "flippin",
    "frackin", "fracking", "fricking", "frickin", "frigging", "friggin", "fully", "fuckin",
    "fucking", "fuggin", "fugging", "greatly", "hella", "highly", "hugely", "incredible",
    "incredibly", "intensely", "major", "majorly", "more", "most", "particularly", "purely",
    "quite", "really", "remarkably", "so", "substantially", "thoroughly", "total", "totally",
    "tremendous", "tremendously", "uber", "unbelievably", "unusually", "utter", "utterly", "very",
];

const BOOSTERS_DECR: &[&str] = &[
    "almost", "barely", "hardly", "just enough", "kind of", "kinda", "kindof", "kind-of", "less",
    "little", "marginal", "marginally", "occasional", "occasionally", "partly", "scarce",
    "scarcely", "slight", "slightly", "somewhat", "sort of", "sorta", "sortof", "sort-of",
];

const SPECIAL_CASES: &[(&str, f64)] = &[
    ("the shit", 3.0),
    ("the bomb", 3.0),
    ("bad ass", 1.5),
    ("badass", 1.5),
    ("bus stop", 0.0),
    ("yeah right", -2.0),
    ("kiss of death", -1.5),
    ("to die for", 3.0),
    ("beating heart", 3.1),
    ("broken heart", -2.9),
];

/// Sentiment lexicon: a mapping from a lower-cased token to its mean valence.
#[derive(Clone, Debug)]
pub struct Lexicon {
    valences: HashMap<String, f64>,
}

impl Lexicon {
    /// Creates the lexicon bundled with this crate.
    pub fn builtin() -> Self {
        let valences = BUILTIN_LEXICON
            .lines()
            .filter_map(|line| {
                let mut cols = line.split('\t');
                let token = cols.next()?;
                let valence = cols.next()?.parse().ok()?;
                Some((token.to_lowercase(), valence))
            })
            .collect();
        Self { valences }
    }

    /// Reads a lexicon in the VADER format.
    ///
    /// Each line holds a token and its mean valence separated by a tab. Further columns
    /// (standard deviation and raw ratings) are ignored.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Errors
    ///
    /// Returns an error when `rdr` fails, or when a line has no valence column or the valence
    /// is not a number.
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(rdr);
        let mut valences = HashMap::new();
        for record in rdr.records() {
            let record = record?;
            let token = record.get(0).unwrap_or_default();
            if token.is_empty() {
                continue;
            }
            let valence = record
                .get(1)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    SentiError::invalid_model(format!("invalid valence for token {token:?}"))
                })?;
            valences.insert(token.to_lowercase(), valence);
        }
        if valences.is_empty() {
            return Err(SentiError::invalid_model("the lexicon is empty"));
        }
        Ok(Self { valences })
    }

    /// Gets the valence of a lower-cased token.
    pub fn get(&self, token: &str) -> Option<f64> {
        self.valences.get(token).copied()
    }

    fn contains(&self, token: &str) -> bool {
        self.valences.contains_key(token)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.valences.len()
    }

    /// Returns `true` if the lexicon has no entries.
    pub fn is_empty(&self) -> bool {
        self.valences.is_empty()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<S> FromIterator<(S, f64)> for Lexicon
where
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self {
            valences: iter
                .into_iter()
                .map(|(token, valence)| (token.into().to_lowercase(), valence))
                .collect(),
        }
    }
}

/// Intensity scores of a text.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PolarityScores {
    /// Proportion of negative sentiment in [0, 1].
    pub negative: f64,

    /// Proportion of neutral tokens in [0, 1].
    pub neutral: f64,

    /// Proportion of positive sentiment in [0, 1].
    pub positive: f64,

    /// Normalized aggregate polarity in [-1, 1].
    pub compound: f64,
}

struct Tokens<'a> {
    words: Vec<&'a str>,
    lowers: Vec<String>,
    is_cap_diff: bool,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let words: Vec<_> = text.split_whitespace().map(strip_punct_if_word).collect();
        let lowers = words.iter().map(|w| w.to_lowercase()).collect();
        let n_caps = words.iter().filter(|w| is_upper(w)).count();
        Self {
            is_cap_diff: n_caps > 0 && n_caps < words.len(),
            words,
            lowers,
        }
    }

    #[inline]
    fn lower(&self, i: usize) -> &str {
        &self.lowers[i]
    }
}

/// Rule-based scorer over a sentiment lexicon.
pub struct LexiconScorer {
    lexicon: Lexicon,
    boosters: HashMap<&'static str, f64>,
    negations: HashSet<&'static str>,
    special_cases: HashMap<&'static str, f64>,
    emojis: HashMap<char, &'static str>,
}

impl LexiconScorer {
    /// Creates a new scorer.
    ///
    /// # Arguments
    ///
    /// * `lexicon` - A sentiment lexicon.
    ///
    /// # Returns
    ///
    /// A new scorer.
    pub fn new(lexicon: Lexicon) -> Self {
        let boosters = BOOSTERS_INCR
            .iter()
            .map(|&w| (w, B_INCR))
            .chain(BOOSTERS_DECR.iter().map(|&w| (w, B_DECR)))
            .collect();
        Self {
            lexicon,
            boosters,
            negations: NEGATIONS.iter().copied().collect(),
            special_cases: SPECIAL_CASES.iter().copied().collect(),
            emojis: BUILTIN_EMOJIS
                .lines()
                .filter_map(|line| {
                    let (emoji, description) = line.split_once('\t')?;
                    let mut chars = emoji.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Some((c, description)),
                        _ => None,
                    }
                })
                .collect(),
        }
    }

    /// Returns the lexicon.
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Scores a text.
    ///
    /// This function never fails. A text without any token gets all-zero scores.
    ///
    /// # Examples
    ///
    /// ```
    /// use senti::{Lexicon, LexiconScorer};
    ///
    /// let scorer = LexiconScorer::new(Lexicon::builtin());
    /// let scores = scorer.polarity_scores("I love this");
    /// assert!(scores.compound > 0.05);
    /// ```
    pub fn polarity_scores(&self, text: &str) -> PolarityScores {
        let text = self.describe_emojis(text);
        let text = text.as_ref();
        let tokens = Tokens::new(text);
        let n = tokens.words.len();
        let mut sentiments = Vec::with_capacity(n);
        for i in 0..n {
            let lower = tokens.lower(i);
            if self.boosters.contains_key(lower)
                || (i + 1 < n && lower == "kind" && tokens.lower(i + 1) == "of")
            {
                sentiments.push(0.0);
                continue;
            }
            sentiments.push(self.sentiment_valence(&tokens, i));
        }
        Self::but_check(&tokens, &mut sentiments);
        Self::score_valence(&sentiments, text)
    }

    /// Replaces each known emoji with its description, separated from the surrounding words.
    fn describe_emojis<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !text
            .chars()
            .any(|c| c == VARIATION_SELECTOR || self.emojis.contains_key(&c))
        {
            return Cow::Borrowed(text);
        }
        let mut result = String::with_capacity(text.len() * 2);
        let mut prev_space = true;
        let mut prev_emoji = false;
        for c in text.chars() {
            if c == VARIATION_SELECTOR {
                continue;
            }
            match self.emojis.get(&c) {
                Some(description) => {
                    if !prev_space {
                        result.push(' ');
                    }
                    result.push_str(description);
                    prev_space = false;
                    prev_emoji = true;
                }
                None => {
                    if prev_emoji && !c.is_whitespace() {
                        result.push(' ');
                    }
                    result.push(c);
                    prev_space = c.is_whitespace();
                    prev_emoji = false;
                }
            }
        }
        Cow::Owned(result.trim().to_string())
    }

    fn is_negated(&self, lower: &str) -> bool {
        self.negations.contains(lower) || lower.contains("n't")
    }

    fn scalar_inc_dec(&self, word: &str, lower: &str, valence: f64, is_cap_diff: bool) -> f64 {
        let Some(&scalar) = self.boosters.get(lower) else {
            return 0.0;
        };
        let mut scalar = if valence < 0.0 { -scalar } else { scalar };
        if is_upper(word) && is_cap_diff {
            if valence > 0.0 {
                scalar += C_INCR;
            } else {
                scalar -= C_INCR;
            }
        }
        scalar
    }

    fn sentiment_valence(&self, tokens: &Tokens, i: usize) -> f64 {
        let lower = tokens.lower(i);
        let Some(base) = self.lexicon.get(lower) else {
            return 0.0;
        };
        let n = tokens.words.len();
        let mut valence = base;

        // "no" directly before another sentiment word negates it instead of carrying valence.
        if lower == "no" && i + 1 < n && self.lexicon.contains(tokens.lower(i + 1)) {
            valence = 0.0;
        }
        if (i > 0 && tokens.lower(i - 1) == "no")
            || (i > 1 && tokens.lower(i - 2) == "no")
            || (i > 2
                && tokens.lower(i - 3) == "no"
                && matches!(tokens.lower(i - 1), "or" | "nor"))
        {
            valence = base * N_SCALAR;
        }

        if is_upper(tokens.words[i]) && tokens.is_cap_diff {
            if valence > 0.0 {
                valence += C_INCR;
            } else {
                valence -= C_INCR;
            }
        }

        for start_i in 0..3 {
            if i <= start_i {
                break;
            }
            let j = i - (start_i + 1);
            if self.lexicon.contains(tokens.lower(j)) {
                continue;
            }
            let mut s =
                self.scalar_inc_dec(tokens.words[j], tokens.lower(j), valence, tokens.is_cap_diff);
            if start_i == 1 {
                s *= 0.95;
            } else if start_i == 2 {
                s *= 0.9;
            }
            valence += s;
            valence = self.negation_check(valence, tokens, start_i, i);
            if start_i == 2 {
                valence = self.special_idioms_check(valence, tokens, i);
            }
        }

        self.least_check(valence, tokens, i)
    }

    fn negation_check(&self, valence: f64, tokens: &Tokens, start_i: usize, i: usize) -> f64 {
        let w = |k: usize| tokens.lower(i - k);
        match start_i {
            0 => {
                if self.is_negated(w(1)) {
                    return valence * N_SCALAR;
                }
            }
            1 => {
                if w(2) == "never" && matches!(w(1), "so" | "this") {
                    return valence * 1.25;
                } else if w(2) == "without" && w(1) == "doubt" {
                    return valence;
                } else if self.is_negated(w(2)) {
                    return valence * N_SCALAR;
                }
            }
            _ => {
                if (w(3) == "never" && matches!(w(2), "so" | "this"))
                    || matches!(w(1), "so" | "this")
                {
                    return valence * 1.25;
                } else if w(3) == "without" && (w(2) == "doubt" || w(1) == "doubt") {
                    return valence;
                } else if self.is_negated(w(3)) {
                    return valence * N_SCALAR;
                }
            }
        }
        valence
    }

    fn special_idioms_check(&self, mut valence: f64, tokens: &Tokens, i: usize) -> f64 {
        let w = |k: usize| tokens.lower(k);
        let onezero = format!("{} {}", w(i - 1), w(i));
        let twoonezero = format!("{} {} {}", w(i - 2), w(i - 1), w(i));
        let twoone = format!("{} {}", w(i - 2), w(i - 1));
        let threetwoone = format!("{} {} {}", w(i - 3), w(i - 2), w(i - 1));
        let threetwo = format!("{} {}", w(i - 3), w(i - 2));

        for seq in [&onezero, &twoonezero, &twoone, &threetwoone, &threetwo] {
            if let Some(&v) = self.special_cases.get(seq.as_str()) {
                valence = v;
                break;
            }
        }
        let n = tokens.words.len();
        if n - 1 > i {
            let zeroone = format!("{} {}", w(i), w(i + 1));
            if let Some(&v) = self.special_cases.get(zeroone.as_str()) {
                valence = v;
            }
        }
        if n - 1 > i + 1 {
            let zeroonetwo = format!("{} {} {}", w(i), w(i + 1), w(i + 2));
            if let Some(&v) = self.special_cases.get(zeroonetwo.as_str()) {
                valence = v;
            }
        }

        // Multi-word dampeners such as "sort of".
        for ngram in [&threetwoone, &threetwo, &twoone] {
            if let Some(&b) = self.boosters.get(ngram.as_str()) {
                valence += b;
            }
        }
        valence
    }

    fn least_check(&self, valence: f64, tokens: &Tokens, i: usize) -> f64 {
        if i > 1 && tokens.lower(i - 1) == "least" && !self.lexicon.contains("least") {
            if tokens.lower(i - 2) != "at" && tokens.lower(i - 2) != "very" {
                return valence * N_SCALAR;
            }
        } else if i > 0 && tokens.lower(i - 1) == "least" && !self.lexicon.contains("least") {
            return valence * N_SCALAR;
        }
        valence
    }

    fn but_check(tokens: &Tokens, sentiments: &mut [f64]) {
        let Some(bi) = tokens.lowers.iter().position(|w| w == "but") else {
            return;
        };
        for (si, s) in sentiments.iter_mut().enumerate() {
            if si < bi {
                *s *= 0.5;
            } else if si > bi {
                *s *= 1.5;
            }
        }
    }

    fn punctuation_emphasis(text: &str) -> f64 {
        let ep_count = text.matches('!').count().min(4);
        let qm_count = text.matches('?').count();
        let qm_amplifier = match qm_count {
            0 | 1 => 0.0,
            2 | 3 => qm_count as f64 * 0.18,
            _ => 0.96,
        };
        ep_count as f64 * 0.292 + qm_amplifier
    }

    fn score_valence(sentiments: &[f64], text: &str) -> PolarityScores {
        if sentiments.is_empty() {
            return PolarityScores::default();
        }
        let amplifier = Self::punctuation_emphasis(text);
        let mut sum_s: f64 = sentiments.iter().sum();
        if sum_s > 0.0 {
            sum_s += amplifier;
        } else if sum_s < 0.0 {
            sum_s -= amplifier;
        }
        let compound = (sum_s / (sum_s * sum_s + ALPHA).sqrt()).clamp(-1.0, 1.0);

        let mut pos_sum = 0.0;
        let mut neg_sum = 0.0;
        let mut neu_count = 0.0;
        for &s in sentiments {
            if s > 0.0 {
                pos_sum += s + 1.0;
            } else if s < 0.0 {
                neg_sum += s - 1.0;
            } else {
                neu_count += 1.0;
            }
        }
        if pos_sum > neg_sum.abs() {
            pos_sum += amplifier;
        } else if pos_sum < neg_sum.abs() {
            neg_sum -= amplifier;
        }
        let total = pos_sum + neg_sum.abs() + neu_count;

        PolarityScores {
            negative: round_to((neg_sum / total).abs(), 3),
            neutral: round_to((neu_count / total).abs(), 3),
            positive: round_to((pos_sum / total).abs(), 3),
            compound: round_to(compound, 4),
        }
    }
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self::new(Lexicon::builtin())
    }
}

impl Scorer for LexiconScorer {
    fn score(&self, text: &str) -> PartialResult {
        let scores = self.polarity_scores(text);
        PartialResult {
            negative: Some(scores.negative),
            neutral: Some(scores.neutral),
            positive: Some(scores.positive),
            compound: Some(scores.compound),
            custom: None,
        }
    }
}
