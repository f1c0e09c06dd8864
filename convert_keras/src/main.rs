use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use senti::{Activation, Classifier, ClassifierModel, LayerModel, Vocabulary, DEFAULT_MAX_LENGTH};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    name = "convert_keras",
    about = "A program to convert an exported Keras tokenizer and classifier."
)]
struct Args {
    /// Output of `Tokenizer.to_json()`
    #[arg(long)]
    tokenizer_in: PathBuf,

    /// Layer weights exported as JSON
    #[arg(long)]
    weights_in: PathBuf,

    /// Length of the padded input sequence
    #[arg(long, default_value_t = DEFAULT_MAX_LENGTH as u32)]
    input_length: u32,

    /// Vocabulary file. Compressed if the name ends in `.zst`
    #[arg(long)]
    vocab_out: PathBuf,

    /// Model file. Compressed if the name ends in `.zst`
    #[arg(long)]
    model_out: PathBuf,
}

#[derive(Deserialize)]
struct TokenizerJson {
    config: TokenizerConfig,
}

#[derive(Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    num_words: Option<u32>,
    #[serde(default)]
    oov_token: Option<String>,
    #[serde(default = "default_lower")]
    lower: bool,
    #[serde(default)]
    filters: Option<String>,
    #[serde(default)]
    split: Option<String>,
    // Keras stores the index as a JSON document inside a string.
    word_index: String,
}

fn default_lower() -> bool {
    true
}

#[derive(Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActivationJson {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl From<ActivationJson> for Activation {
    fn from(activation: ActivationJson) -> Self {
        match activation {
            ActivationJson::Linear => Self::Linear,
            ActivationJson::Relu => Self::Relu,
            ActivationJson::Sigmoid => Self::Sigmoid,
            ActivationJson::Tanh => Self::Tanh,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LayerJson {
    Embedding {
        #[serde(default)]
        mask_zero: bool,
        embeddings: Vec<Vec<f32>>,
    },
    Lstm {
        #[serde(default)]
        return_sequences: bool,
        kernel: Vec<Vec<f32>>,
        recurrent_kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
    },
    GlobalAveragePooling1d,
    GlobalMaxPooling1d,
    Flatten,
    Dense {
        activation: ActivationJson,
        kernel: Vec<Vec<f32>>,
        bias: Vec<f32>,
    },
    Dropout,
}

#[derive(Deserialize)]
struct WeightsJson {
    layers: Vec<LayerJson>,
}

/// Flattens a matrix row-major and returns it with its number of columns.
fn flatten(name: &str, rows: Vec<Vec<f32>>) -> Result<(u32, Vec<f32>), String> {
    let cols = rows.first().map_or(0, Vec::len);
    if cols == 0 {
        return Err(format!("{name} is empty"));
    }
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in rows {
        if row.len() != cols {
            return Err(format!("{name} has rows of different lengths"));
        }
        data.extend(row);
    }
    let cols = u32::try_from(cols).map_err(|_| format!("{name} is too wide"))?;
    Ok((cols, data))
}

fn convert_layers(layers: Vec<LayerJson>) -> Result<Vec<LayerModel>, String> {
    let mut result = vec![];
    for layer in layers {
        let layer = match layer {
            LayerJson::Embedding {
                mask_zero,
                embeddings,
            } => {
                let input_dim = u32::try_from(embeddings.len())
                    .map_err(|_| "embeddings has too many rows".to_string())?;
                let (output_dim, embeddings) = flatten("embeddings", embeddings)?;
                LayerModel::Embedding {
                    input_dim,
                    output_dim,
                    mask_zero,
                    embeddings,
                }
            }
            LayerJson::Lstm {
                return_sequences,
                kernel,
                recurrent_kernel,
                bias,
            } => {
                let (gates, kernel) = flatten("lstm kernel", kernel)?;
                if gates % 4 != 0 {
                    return Err(format!(
                        "lstm kernel must have a multiple of 4 columns, but has {gates}"
                    ));
                }
                let (_, recurrent_kernel) = flatten("lstm recurrent kernel", recurrent_kernel)?;
                LayerModel::Lstm {
                    units: gates / 4,
                    return_sequences,
                    kernel,
                    recurrent_kernel,
                    bias,
                }
            }
            LayerJson::GlobalAveragePooling1d => LayerModel::GlobalAveragePooling1d,
            LayerJson::GlobalMaxPooling1d => LayerModel::GlobalMaxPooling1d,
            LayerJson::Flatten => LayerModel::Flatten,
            LayerJson::Dense {
                activation,
                kernel,
                bias,
            } => {
                let (units, kernel) = flatten("dense kernel", kernel)?;
                LayerModel::Dense {
                    units,
                    activation: activation.into(),
                    kernel,
                    bias,
                }
            }
            // Dropout is the identity at inference time.
            LayerJson::Dropout => continue,
        };
        result.push(layer);
    }
    Ok(result)
}

fn parse_tokenizer(json: &str) -> Result<Vocabulary, Box<dyn std::error::Error>> {
    let TokenizerJson { config } = serde_json::from_str(json)?;
    let word_index: HashMap<String, u32> = serde_json::from_str(&config.word_index)?;
    let mut vocabulary = Vocabulary::new(word_index)?
        .num_words(config.num_words)
        .lower(config.lower)
        .oov_token(config.oov_token)?;
    if let Some(filters) = config.filters {
        vocabulary = vocabulary.filters(&filters);
    }
    if let Some(split) = config.split {
        vocabulary = vocabulary.split(split)?;
    }
    Ok(vocabulary)
}

/// Parses the weights and checks that they form a valid classifier.
fn parse_weights(
    json: &str,
    input_length: u32,
) -> Result<(ClassifierModel, Classifier), Box<dyn std::error::Error>> {
    let WeightsJson { layers } = serde_json::from_str(json)?;
    let model = ClassifierModel::new(input_length, convert_layers(layers)?);
    let classifier = Classifier::new(model.clone())?;
    Ok((model, classifier))
}

fn save<F>(path: &Path, write: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn Write) -> senti::Result<()>,
{
    let mut f = BufWriter::new(fs::File::create(path)?);
    if path.extension().is_some_and(|ext| ext == "zst") {
        let mut encoder = zstd::Encoder::new(&mut f, 19)?;
        encoder.multithread(n_workers())?;
        write(&mut encoder)?;
        encoder.finish()?;
    } else {
        write(&mut f)?;
    }
    f.flush()?;
    Ok(())
}

fn n_workers() -> u32 {
    std::thread::available_parallelism().map_or(1, |n| n.get() as u32)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    eprintln!("Loading tokenizer file...");
    let vocabulary = parse_tokenizer(&fs::read_to_string(&args.tokenizer_in)?)?;
    eprintln!("# of tokens: {}", vocabulary.len());

    eprintln!("Loading weights file...");
    let (model, classifier) =
        parse_weights(&fs::read_to_string(&args.weights_in)?, args.input_length)?;
    if vocabulary.max_id() as usize >= classifier.vocab_size() {
        return Err(format!(
            "the vocabulary has id {}, but the embedding has only {} rows",
            vocabulary.max_id(),
            classifier.vocab_size()
        )
        .into());
    }

    eprintln!("Saving vocabulary file...");
    save(&args.vocab_out, |wtr| vocabulary.write(wtr))?;

    eprintln!("Saving model file...");
    save(&args.model_out, |wtr| model.write(wtr))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENIZER: &str = r##"{
        "class_name": "Tokenizer",
        "config": {
            "num_words": null,
            "filters": "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~\t\n",
            "lower": true,
            "split": " ",
            "char_level": false,
            "oov_token": "<OOV>",
            "document_count": 2,
            "word_index": "{\"<OOV>\": 1, \"good\": 2, \"bad\": 3}"
        }
    }"##;

    const WEIGHTS: &str = r#"{
        "layers": [
            {"type": "embedding", "mask_zero": true, "embeddings": [[0.0], [0.0], [1.0], [-1.0]]},
            {"type": "global_average_pooling1d"},
            {"type": "dropout"},
            {"type": "dense", "activation": "sigmoid", "kernel": [[2.0]], "bias": [0.0]}
        ]
    }"#;

    #[test]
    fn test_parse_tokenizer() {
        let vocabulary = parse_tokenizer(TOKENIZER).unwrap();
        assert_eq!(3, vocabulary.len());
        assert_eq!(Some(2), vocabulary.get("good"));
        assert_eq!(1, vocabulary.unknown_id());
        assert_eq!(vec![2, 1, 3], vocabulary.texts_to_sequence("Good, ugly; BAD!"));
    }

    #[test]
    fn test_parse_tokenizer_invalid() {
        assert!(parse_tokenizer("{}").is_err());
        let json = TOKENIZER.replace("\\\"good\\\": 2", "\\\"good\\\": 0");
        assert!(parse_tokenizer(&json).is_err());
    }

    #[test]
    fn test_parse_weights() {
        let (model, classifier) = parse_weights(WEIGHTS, 4).unwrap();
        assert_eq!(3, model.layers().len());
        assert_eq!(4, classifier.input_length());
        assert_eq!(4, classifier.vocab_size());
        assert!(classifier.predict(&[0, 0, 2, 2]) > 0.5);
        assert!(classifier.predict(&[0, 0, 3, 3]) < 0.5);
    }

    #[test]
    fn test_parse_weights_without_sigmoid_output() {
        let json = WEIGHTS.replace("\"sigmoid\"", "\"relu\"");
        assert!(parse_weights(&json, 4).is_err());
    }

    #[test]
    fn test_flatten() {
        assert_eq!(
            (2, vec![1.0, 2.0, 3.0, 4.0]),
            flatten("m", vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap()
        );
        assert!(flatten("m", vec![vec![1.0, 2.0], vec![3.0]]).is_err());
        assert!(flatten("m", vec![]).is_err());
    }

    #[test]
    fn test_convert_lstm() {
        let layers = convert_layers(vec![LayerJson::Lstm {
            return_sequences: false,
            kernel: vec![vec![0.0; 8]],
            recurrent_kernel: vec![vec![0.0; 8]; 2],
            bias: vec![0.0; 8],
        }])
        .unwrap();
        assert!(matches!(
            layers[0],
            LayerModel::Lstm {
                units: 2,
                return_sequences: false,
                ..
            }
        ));
    }
}
