use std::io::{Read, Write};

use bincode::{Decode, Encode};
use hashbrown::{HashMap, HashSet};

use crate::errors::{Result, SentiError};
use crate::utils;

/// Magic header of vocabulary files.
pub const VOCABULARY_MAGIC: &[u8] = b"SentiVocab 1.0\n";

/// Length of sequences fed to the classifier unless the model says otherwise.
pub const DEFAULT_MAX_LENGTH: usize = 1225;

/// Characters replaced by the separator before splitting.
pub const DEFAULT_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n";

/// Id used for padding, and for unknown tokens when the vocabulary has no OOV token.
pub const PADDING_ID: u32 = 0;

#[derive(Decode, Encode)]
struct VocabularyData {
    word_index: Vec<(String, u32)>,
    num_words: Option<u32>,
    oov_token: Option<String>,
    lower: bool,
    filters: String,
    split: String,
}

/// Mapping from tokens to ids, together with the tokenizer settings the mapping was built with.
#[derive(Clone, Debug)]
pub struct Vocabulary {
    word_index: HashMap<String, u32>,
    num_words: Option<u32>,
    oov_token: Option<String>,
    lower: bool,
    filters: HashSet<char>,
    split: String,
}

impl Vocabulary {
    /// Creates a new vocabulary with the default tokenizer settings.
    ///
    /// # Arguments
    ///
    /// * `word_index` - Pairs of a token and its id. Ids must be 1 or greater.
    ///
    /// # Errors
    ///
    /// Returns an error when an id is 0 or a token appears twice.
    pub fn new<I, S>(word_index: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let mut map = HashMap::new();
        for (token, id) in word_index {
            let token = token.into();
            if id == PADDING_ID {
                return Err(SentiError::invalid_argument(
                    "word_index",
                    format!("id of {token:?} must be >= 1"),
                ));
            }
            if map.insert(token, id).is_some() {
                return Err(SentiError::invalid_argument(
                    "word_index",
                    "duplicated token",
                ));
            }
        }
        Ok(Self {
            word_index: map,
            num_words: None,
            oov_token: None,
            lower: true,
            filters: DEFAULT_FILTERS.chars().collect(),
            split: " ".to_string(),
        })
    }

    /// Only ids less than `num_words` are regarded as known.
    pub fn num_words(mut self, num_words: Option<u32>) -> Self {
        self.num_words = num_words;
        self
    }

    /// Sets the token that unknown tokens are mapped to.
    ///
    /// # Errors
    ///
    /// Returns an error when `oov_token` is not in the vocabulary.
    pub fn oov_token(mut self, oov_token: Option<String>) -> Result<Self> {
        if let Some(token) = oov_token.as_ref() {
            if !self.word_index.contains_key(token) {
                return Err(SentiError::invalid_argument(
                    "oov_token",
                    format!("{token:?} is not in the vocabulary"),
                ));
            }
        }
        self.oov_token = oov_token;
        Ok(self)
    }

    /// Lower-cases text before tokenization if `lower` is true.
    pub fn lower(mut self, lower: bool) -> Self {
        self.lower = lower;
        self
    }

    /// Sets the characters replaced by the separator.
    pub fn filters(mut self, filters: &str) -> Self {
        self.filters = filters.chars().collect();
        self
    }

    /// Sets the separator.
    ///
    /// # Errors
    ///
    /// Returns an error when `split` is empty.
    pub fn split<S>(mut self, split: S) -> Result<Self>
    where
        S: Into<String>,
    {
        let split = split.into();
        if split.is_empty() {
            return Err(SentiError::invalid_argument("split", "must not be empty"));
        }
        self.split = split;
        Ok(self)
    }

    /// Exports the vocabulary.
    ///
    /// # Arguments
    ///
    /// * `wtr` - Byte-oriented sink object.
    ///
    /// # Errors
    ///
    /// When `wtr` generates an error, it will be returned as is.
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        let mut word_index: Vec<_> = self
            .word_index
            .iter()
            .map(|(token, &id)| (token.clone(), id))
            .collect();
        word_index.sort_unstable_by(|(a_token, a_id), (b_token, b_id)| {
            a_id.cmp(b_id).then_with(|| a_token.cmp(b_token))
        });
        let mut filters: Vec<char> = self.filters.iter().copied().collect();
        filters.sort_unstable();
        let data = VocabularyData {
            word_index,
            num_words: self.num_words,
            oov_token: self.oov_token.clone(),
            lower: self.lower,
            filters: filters.into_iter().collect(),
            split: self.split.clone(),
        };
        utils::write_with_magic(wtr, VOCABULARY_MAGIC, &data)
    }

    /// Creates a vocabulary from a reader.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error or the data is not a valid vocabulary, an error variant
    /// will be returned.
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let data: VocabularyData = utils::read_with_magic(rdr, VOCABULARY_MAGIC, "vocabulary")
            .map_err(|e| match e {
                SentiError::DecodeError(e) => {
                    SentiError::invalid_model(format!("broken vocabulary: {e}"))
                }
                e => e,
            })?;
        Self::new(data.word_index)
            .and_then(|v| v.oov_token(data.oov_token))
            .and_then(|v| v.split(data.split))
            .map(|v| {
                v.num_words(data.num_words)
                    .lower(data.lower)
                    .filters(&data.filters)
            })
            .map_err(|e| SentiError::invalid_model(format!("broken vocabulary: {e}")))
    }

    /// Gets the id of a token without applying `num_words`.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.word_index.get(token).copied()
    }

    /// Returns the number of tokens.
    pub fn len(&self) -> usize {
        self.word_index.len()
    }

    /// Returns `true` if the vocabulary has no tokens.
    pub fn is_empty(&self) -> bool {
        self.word_index.is_empty()
    }

    /// Returns the largest id [`Self::texts_to_sequence()`] can produce.
    pub fn max_id(&self) -> u32 {
        let max = self.word_index.values().copied().max().unwrap_or(PADDING_ID);
        match self.num_words {
            Some(n) => max.min(n.saturating_sub(1)).max(self.unknown_id()),
            None => max,
        }
    }

    /// Returns the id assigned to unknown tokens.
    pub fn unknown_id(&self) -> u32 {
        self.oov_token
            .as_deref()
            .and_then(|token| self.get(token))
            .unwrap_or(PADDING_ID)
    }

    /// Splits a text into tokens.
    ///
    /// # Examples
    ///
    /// ```
    /// use senti::Vocabulary;
    ///
    /// let vocab = Vocabulary::new([("hello", 1)]).unwrap();
    /// assert_eq!(vec!["hello", "world"], vocab.tokenize("Hello, World!"));
    /// ```
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.lower {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let mut replaced = String::with_capacity(text.len());
        for c in text.chars() {
            if self.filters.contains(&c) {
                replaced.push_str(&self.split);
            } else {
                replaced.push(c);
            }
        }
        replaced
            .split(self.split.as_str())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }

    /// Converts a text into a sequence of ids. Unknown tokens are mapped to
    /// [`Self::unknown_id()`].
    pub fn texts_to_sequence(&self, text: &str) -> Vec<u32> {
        let unknown_id = self.unknown_id();
        self.tokenize(text)
            .iter()
            .map(|token| match (self.get(token), self.num_words) {
                (Some(id), Some(n)) if id >= n => unknown_id,
                (Some(id), _) => id,
                (None, _) => unknown_id,
            })
            .collect()
    }

    /// Converts a text into a sequence of exactly `max_length` ids.
    pub fn encode(&self, text: &str, max_length: usize) -> Vec<u32> {
        pad_sequence(&self.texts_to_sequence(text), max_length)
    }
}

/// Converts a text into a sequence of exactly `max_length` ids using `vocabulary`.
///
/// # Examples
///
/// ```
/// use senti::{encode, Vocabulary};
///
/// let vocab = Vocabulary::new([("i", 1), ("love", 2), ("this", 3)]).unwrap();
/// assert_eq!(vec![0, 0, 1, 2, 3], encode("I love this", &vocab, 5));
/// ```
pub fn encode(text: &str, vocabulary: &Vocabulary, max_length: usize) -> Vec<u32> {
    vocabulary.encode(text, max_length)
}

/// Fits a sequence to `max_length`: longer sequences lose their head, and shorter ones are
/// filled with [`PADDING_ID`] in front.
pub fn pad_sequence(sequence: &[u32], max_length: usize) -> Vec<u32> {
    if sequence.len() >= max_length {
        sequence[sequence.len() - max_length..].to_vec()
    } else {
        let mut padded = vec![PADDING_ID; max_length - sequence.len()];
        padded.extend_from_slice(sequence);
        padded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::new([
            ("<oov>", 1),
            ("i", 2),
            ("love", 3),
            ("this", 4),
            ("hate", 5),
            ("movie", 6),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_zero_id() {
        let v = Vocabulary::new([("a", 0)]);
        assert_eq!(
            "InvalidArgumentError: word_index: id of \"a\" must be >= 1",
            &v.err().unwrap().to_string()
        );
    }

    #[test]
    fn test_oov_token_not_in_vocabulary() {
        assert!(vocab().oov_token(Some("[UNK]".to_string())).is_err());
    }

    #[test]
    fn test_tokenize() {
        let v = vocab();
        assert_eq!(
            vec!["i", "love", "this", "movie", "really"],
            v.tokenize("I LOVE this movie...   really!!")
        );
        assert!(v.tokenize("").is_empty());
        assert!(v.tokenize("?!.,").is_empty());
    }

    #[test]
    fn test_tokenize_no_lower() {
        let v = vocab().lower(false);
        assert_eq!(vec!["I", "LOVE"], v.tokenize("I LOVE"));
    }

    #[test]
    fn test_tokenize_custom_split() {
        let v = vocab().filters("").split("|").unwrap();
        assert_eq!(vec!["i love", "this!"], v.tokenize("I love||this!"));
    }

    #[test]
    fn test_texts_to_sequence_unknown_is_zero() {
        let v = vocab();
        assert_eq!(vec![2, 3, 0, 6], v.texts_to_sequence("I love that movie"));
    }

    #[test]
    fn test_texts_to_sequence_oov_token() {
        let v = vocab().oov_token(Some("<oov>".to_string())).unwrap();
        assert_eq!(vec![2, 3, 1, 6], v.texts_to_sequence("I love that movie"));
    }

    #[test]
    fn test_texts_to_sequence_num_words() {
        let v = vocab().num_words(Some(5));
        assert_eq!(vec![2, 3, 4, 0], v.texts_to_sequence("I love this movie"));
        assert_eq!(4, v.max_id());
    }

    #[test]
    fn test_pad_sequence() {
        assert_eq!(vec![0, 0, 1, 2], pad_sequence(&[1, 2], 4));
        assert_eq!(vec![1, 2], pad_sequence(&[1, 2], 2));
        assert_eq!(vec![3, 4], pad_sequence(&[1, 2, 3, 4], 2));
        assert_eq!(Vec::<u32>::new(), pad_sequence(&[1, 2], 0));
    }

    #[test]
    fn test_encode_fixed_length() {
        let v = vocab();
        for text in ["", "I love this", "hate hate hate hate hate hate", "unknown words only"] {
            assert_eq!(DEFAULT_MAX_LENGTH, encode(text, &v, DEFAULT_MAX_LENGTH).len());
            assert_eq!(3, encode(text, &v, 3).len());
        }
        assert_eq!(vec![5, 6], encode("I hate this movie hate movie", &v, 2));
    }

    #[test]
    fn test_write_read() {
        let v = vocab()
            .oov_token(Some("<oov>".to_string()))
            .unwrap()
            .num_words(Some(6))
            .filters("!?");
        let mut buf = vec![];
        v.write(&mut buf).unwrap();
        assert!(buf.starts_with(VOCABULARY_MAGIC));

        let w = Vocabulary::read(buf.as_slice()).unwrap();
        assert_eq!(v.len(), w.len());
        assert_eq!(Some(6), w.get("movie"));
        assert_eq!(1, w.unknown_id());
        assert_eq!(
            v.texts_to_sequence("I love, this movie!"),
            w.texts_to_sequence("I love, this movie!")
        );
        assert_eq!(vec!["i", "love,", "this"], w.tokenize("I love, this!"));
    }

    #[test]
    fn test_read_truncated() {
        let mut buf = vec![];
        vocab().write(&mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(Vocabulary::read(buf.as_slice()).is_err());
    }
}
