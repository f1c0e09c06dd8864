use std::fs::File;
use std::io::{self, prelude::*, stdin, stdout, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use senti::{
    Analyzer, Classifier, ClassifierModel, Lexicon, LexiconScorer, NeuralScorer, Vocabulary,
};

#[derive(Parser, Debug)]
#[command(about = "A program to score the sentiment of each line of the standard input.")]
struct Args {
    /// The classifier model file
    #[arg(long)]
    model: PathBuf,

    /// The vocabulary file of the classifier
    #[arg(long)]
    vocab: PathBuf,

    /// A lexicon in the VADER format replacing the built-in one
    #[arg(long)]
    lexicon: Option<PathBuf>,
}

// Same as `open()` in senti_server/src/artifacts.rs. Keep the two identical.
fn open(path: &Path) -> io::Result<Box<dyn Read>> {
    let f = BufReader::new(File::open(path)?);
    if path.extension().is_some_and(|ext| ext == "zst") {
        Ok(Box::new(zstd::Decoder::with_buffer(f)?))
    } else {
        Ok(Box::new(f))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let lexicon = if let Some(path) = args.lexicon {
        eprintln!("Loading lexicon file...");
        Lexicon::read(open(&path)?)?
    } else {
        Lexicon::builtin()
    };

    eprintln!("Loading vocabulary file...");
    let vocabulary = Vocabulary::read(open(&args.vocab)?)?;

    eprintln!("Loading model file...");
    let classifier = Classifier::new(ClassifierModel::read(open(&args.model)?)?)?;

    let analyzer = Analyzer::new(
        LexiconScorer::new(lexicon),
        NeuralScorer::new(vocabulary, classifier)?,
    );

    eprintln!("Start analysis");
    let mut n_lines = 0;
    let start = Instant::now();
    let mut out = BufWriter::new(stdout().lock());
    for line in stdin().lock().lines() {
        let line = line?;
        let analysis = analyzer.analyze(Some(&line))?;
        match analysis.result {
            Some(r) => writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                analysis.label,
                r.negative(),
                r.neutral(),
                r.positive(),
                r.compound(),
                r.custom(),
            )?,
            None => writeln!(out, "{}", analysis.label)?,
        }
        n_lines += 1;
    }
    out.flush()?;
    let duration = start.elapsed();
    eprintln!("Elapsed: {} [sec]", duration.as_secs_f64());
    eprintln!(
        "Speed: {} [lines/sec]",
        n_lines as f64 / duration.as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::env;
    use std::fs;

    #[test]
    fn test_open() {
        let dir = env::temp_dir().join(format!("senti-analyze-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let plain = dir.join("lexicon.txt");
        fs::write(&plain, "good\t1.9\n").unwrap();
        let compressed = dir.join("lexicon.txt.zst");
        fs::write(&compressed, zstd::encode_all("bad\t-2.5\n".as_bytes(), 3).unwrap()).unwrap();

        let mut buf = String::new();
        open(&plain).unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!("good\t1.9\n", buf);

        let lexicon = Lexicon::read(open(&compressed).unwrap()).unwrap();
        assert_eq!(Some(-2.5), lexicon.get("bad"));

        assert!(open(&dir.join("missing")).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
