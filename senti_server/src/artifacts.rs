use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use senti::{
    Analyzer, Classifier, ClassifierModel, Lexicon, LexiconScorer, NeuralScorer, Vocabulary,
};

/// Opens an artifact. Files ending in `.zst` are decompressed on the fly.
// analyze/src/main.rs carries a copy of this function. Keep the two identical.
pub fn open(path: &Path) -> io::Result<Box<dyn Read>> {
    let f = BufReader::new(File::open(path)?);
    if path.extension().is_some_and(|ext| ext == "zst") {
        Ok(Box::new(zstd::Decoder::with_buffer(f)?))
    } else {
        Ok(Box::new(f))
    }
}

/// Loads the lexicon, the vocabulary and the classifier, and builds the analyzer.
pub fn load_analyzer(
    model: &Path,
    vocab: &Path,
    lexicon: Option<&Path>,
) -> Result<Analyzer, Box<dyn std::error::Error>> {
    let lexicon = match lexicon {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading lexicon");
            Lexicon::read(open(path)?)?
        }
        None => Lexicon::builtin(),
    };
    tracing::info!(entries = lexicon.len(), "lexicon ready");

    tracing::info!(path = %vocab.display(), "loading vocabulary");
    let vocabulary = Vocabulary::read(open(vocab)?)?;
    tracing::info!(tokens = vocabulary.len(), "vocabulary ready");

    tracing::info!(path = %model.display(), "loading classifier");
    let classifier = Classifier::new(ClassifierModel::read(open(model)?)?)?;
    tracing::info!(
        input_length = classifier.input_length(),
        vocab_size = classifier.vocab_size(),
        "classifier ready"
    );

    let neural = NeuralScorer::new(vocabulary, classifier)?;
    Ok(Analyzer::new(LexiconScorer::new(lexicon), neural))
}
