//! # Senti
//!
//! Senti scores the sentiment of a text with two independent analyzers: a rule-based scorer
//! over a sentiment lexicon, and a pretrained neural classifier over a padded id sequence.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use senti::{Analyzer, Classifier, ClassifierModel, LexiconScorer, NeuralScorer, Vocabulary};
//!
//! let f = BufReader::new(File::open("tokenizer.vocab").unwrap());
//! let vocabulary = Vocabulary::read(f).unwrap();
//! let f = BufReader::new(File::open("classifier.model").unwrap());
//! let classifier = Classifier::new(ClassifierModel::read(f).unwrap()).unwrap();
//!
//! let neural = NeuralScorer::new(vocabulary, classifier).unwrap();
//! let analyzer = Analyzer::new(LexiconScorer::default(), neural);
//!
//! let analysis = analyzer.analyze(Some("I love this")).unwrap();
//! println!("{} {:?}", analysis.label, analysis.result);
//! ```

mod analyzer;
mod classifier;
mod errors;
mod lexicon;
mod utils;
mod vocabulary;

pub use analyzer::{
    Analysis, Analyzer, Label, PartialResult, Scorer, SentimentResult, NEGATIVE_THRESHOLD,
    POSITIVE_THRESHOLD,
};
pub use classifier::{
    Activation, Classifier, ClassifierModel, LayerModel, NeuralScorer, MODEL_MAGIC,
};
pub use errors::{InvalidArgumentError, InvalidModelError, Result, SentiError};
pub use lexicon::{Lexicon, LexiconScorer, PolarityScores};
pub use vocabulary::{
    encode, pad_sequence, Vocabulary, DEFAULT_FILTERS, DEFAULT_MAX_LENGTH, PADDING_ID,
    VOCABULARY_MAGIC,
};
