use std::io::{Read, Write};

use bincode::{Decode, Encode};
use ndarray::{s, Array1, Array2, Axis};

use crate::analyzer::{PartialResult, Scorer};
use crate::errors::{Result, SentiError};
use crate::utils::{self, round_to};
use crate::vocabulary::{pad_sequence, Vocabulary, PADDING_ID};

/// Magic header of model files.
pub const MODEL_MAGIC: &[u8] = b"SentiModel 1.0\n";

/// Activation function of a dense layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    #[inline(always)]
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Linear => x,
            Self::Relu => x.max(0.0),
            Self::Sigmoid => sigmoid(x),
            Self::Tanh => x.tanh(),
        }
    }
}

#[inline(always)]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Weights of a layer. Matrices are stored row-major.
#[derive(Clone, Debug, Decode, Encode)]
pub enum LayerModel {
    /// Lookup table of `input_dim` rows and `output_dim` columns. If `mask_zero` is set,
    /// padding ids are removed from the sequence.
    Embedding {
        input_dim: u32,
        output_dim: u32,
        mask_zero: bool,
        embeddings: Vec<f32>,
    },

    /// Long short-term memory with gates ordered as input, forget, cell and output.
    /// `kernel` is `input_dim × 4·units`, `recurrent_kernel` is `units × 4·units`.
    Lstm {
        units: u32,
        return_sequences: bool,
        kernel: Vec<f32>,
        recurrent_kernel: Vec<f32>,
        bias: Vec<f32>,
    },

    GlobalAveragePooling1d,

    GlobalMaxPooling1d,

    Flatten,

    /// Fully connected layer. `kernel` is `input_dim × units`. Applied to each timestep when
    /// the input is a sequence.
    Dense {
        units: u32,
        activation: Activation,
        kernel: Vec<f32>,
        bias: Vec<f32>,
    },
}

/// Model data of the neural classifier.
#[derive(Clone, Debug, Decode, Encode)]
pub struct ClassifierModel {
    input_length: u32,
    layers: Vec<LayerModel>,
}

impl ClassifierModel {
    /// Creates a new model.
    ///
    /// # Arguments
    ///
    /// * `input_length` - The length of id sequences the model consumes.
    /// * `layers` - Layers in the order they are applied.
    pub fn new(input_length: u32, layers: Vec<LayerModel>) -> Self {
        Self {
            input_length,
            layers,
        }
    }

    pub fn input_length(&self) -> u32 {
        self.input_length
    }

    pub fn layers(&self) -> &[LayerModel] {
        &self.layers
    }

    /// Exports the model data.
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
        utils::write_with_magic(wtr, MODEL_MAGIC, self)
    }

    /// Creates a model from a reader.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Errors
    ///
    /// When `rdr` generates an error or the data is not a model, an error variant will be
    /// returned. Shapes are checked by [`Classifier::new()`].
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        utils::read_with_magic(rdr, MODEL_MAGIC, "classifier model")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Ids(usize),
    // `None` length means the sequence is masked and its length varies.
    Sequence(Option<usize>, usize),
    Vector(usize),
}

enum Layer {
    Embedding {
        table: Array2<f32>,
        mask_zero: bool,
    },
    Lstm {
        units: usize,
        return_sequences: bool,
        kernel: Array2<f32>,
        recurrent_kernel: Array2<f32>,
        bias: Array1<f32>,
    },
    GlobalAveragePooling,
    GlobalMaxPooling,
    Flatten,
    Dense {
        activation: Activation,
        kernel: Array2<f32>,
        bias: Array1<f32>,
    },
}

enum Tensor {
    Ids(Vec<u32>),
    Sequence(Array2<f32>),
    Vector(Array1<f32>),
}

fn matrix(name: &str, rows: usize, cols: usize, data: Vec<f32>) -> Result<Array2<f32>> {
    let len = data.len();
    Array2::from_shape_vec((rows, cols), data).map_err(|_| {
        SentiError::invalid_model(format!(
            "{name} must have {rows}x{cols} values, but has {len}"
        ))
    })
}

fn vector(name: &str, len: usize, data: Vec<f32>) -> Result<Array1<f32>> {
    if data.len() != len {
        return Err(SentiError::invalid_model(format!(
            "{name} must have {len} values, but has {}",
            data.len()
        )));
    }
    Ok(Array1::from(data))
}

impl Layer {
    fn new(model: LayerModel, input: Shape) -> Result<(Self, Shape)> {
        let mismatch = |layer: &str| {
            SentiError::invalid_model(format!("{layer} cannot take an input of shape {input:?}"))
        };
        Ok(match (model, input) {
            (
                LayerModel::Embedding {
                    input_dim,
                    output_dim,
                    mask_zero,
                    embeddings,
                },
                Shape::Ids(len),
            ) => {
                let output_dim = output_dim as usize;
                let table = matrix("embeddings", input_dim as usize, output_dim, embeddings)?;
                let len = if mask_zero { None } else { Some(len) };
                (
                    Self::Embedding { table, mask_zero },
                    Shape::Sequence(len, output_dim),
                )
            }
            (LayerModel::Embedding { .. }, _) => return Err(mismatch("embedding")),
            (_, Shape::Ids(_)) => {
                return Err(SentiError::invalid_model(
                    "the first layer must be an embedding",
                ))
            }
            (
                LayerModel::Lstm {
                    units,
                    return_sequences,
                    kernel,
                    recurrent_kernel,
                    bias,
                },
                Shape::Sequence(len, dim),
            ) => {
                let units = units as usize;
                let kernel = matrix("lstm kernel", dim, 4 * units, kernel)?;
                let recurrent_kernel =
                    matrix("lstm recurrent kernel", units, 4 * units, recurrent_kernel)?;
                let bias = vector("lstm bias", 4 * units, bias)?;
                let output = if return_sequences {
                    Shape::Sequence(len, units)
                } else {
                    Shape::Vector(units)
                };
                (
                    Self::Lstm {
                        units,
                        return_sequences,
                        kernel,
                        recurrent_kernel,
                        bias,
                    },
                    output,
                )
            }
            (LayerModel::Lstm { .. }, _) => return Err(mismatch("lstm")),
            (LayerModel::GlobalAveragePooling1d, Shape::Sequence(_, dim)) => {
                (Self::GlobalAveragePooling, Shape::Vector(dim))
            }
            (LayerModel::GlobalMaxPooling1d, Shape::Sequence(_, dim)) => {
                (Self::GlobalMaxPooling, Shape::Vector(dim))
            }
            (LayerModel::GlobalAveragePooling1d | LayerModel::GlobalMaxPooling1d, _) => {
                return Err(mismatch("pooling"))
            }
            (LayerModel::Flatten, Shape::Sequence(Some(len), dim)) => {
                (Self::Flatten, Shape::Vector(len * dim))
            }
            (LayerModel::Flatten, Shape::Vector(dim)) => (Self::Flatten, Shape::Vector(dim)),
            (LayerModel::Flatten, _) => return Err(mismatch("flatten (masked input)")),
            (
                LayerModel::Dense {
                    units,
                    activation,
                    kernel,
                    bias,
                },
                Shape::Sequence(_, dim) | Shape::Vector(dim),
            ) => {
                let units = units as usize;
                let kernel = matrix("dense kernel", dim, units, kernel)?;
                let bias = vector("dense bias", units, bias)?;
                let output = match input {
                    Shape::Sequence(len, _) => Shape::Sequence(len, units),
                    _ => Shape::Vector(units),
                };
                (
                    Self::Dense {
                        activation,
                        kernel,
                        bias,
                    },
                    output,
                )
            }
        })
    }

    fn forward(&self, input: Tensor) -> Tensor {
        match (self, input) {
            (Self::Embedding { table, mask_zero }, Tensor::Ids(ids)) => {
                let ids: Vec<_> = if *mask_zero {
                    ids.into_iter().filter(|&id| id != PADDING_ID).collect()
                } else {
                    ids
                };
                let mut out = Array2::zeros((ids.len(), table.ncols()));
                for (mut row, &id) in out.rows_mut().into_iter().zip(&ids) {
                    // Ids outside of the table stay zero vectors.
                    if (id as usize) < table.nrows() {
                        row.assign(&table.row(id as usize));
                    }
                }
                Tensor::Sequence(out)
            }
            (
                Self::Lstm {
                    units,
                    return_sequences,
                    kernel,
                    recurrent_kernel,
                    bias,
                },
                Tensor::Sequence(xs),
            ) => {
                let u = *units;
                let mut h = Array1::<f32>::zeros(u);
                let mut c = Array1::<f32>::zeros(u);
                let mut hs = Array2::<f32>::zeros((xs.nrows(), u));
                for (x, mut h_out) in xs.rows().into_iter().zip(hs.rows_mut()) {
                    let z = x.dot(kernel) + h.dot(recurrent_kernel) + bias;
                    let i = z.slice(s![..u]).mapv(sigmoid);
                    let f = z.slice(s![u..2 * u]).mapv(sigmoid);
                    let g = z.slice(s![2 * u..3 * u]).mapv(f32::tanh);
                    let o = z.slice(s![3 * u..]).mapv(sigmoid);
                    c = f * &c + i * g;
                    h = o * c.mapv(f32::tanh);
                    h_out.assign(&h);
                }
                if *return_sequences {
                    Tensor::Sequence(hs)
                } else {
                    Tensor::Vector(h)
                }
            }
            (Self::GlobalAveragePooling, Tensor::Sequence(xs)) => {
                let dim = xs.ncols();
                Tensor::Vector(xs.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(dim)))
            }
            (Self::GlobalMaxPooling, Tensor::Sequence(xs)) => {
                if xs.nrows() == 0 {
                    Tensor::Vector(Array1::zeros(xs.ncols()))
                } else {
                    Tensor::Vector(xs.fold_axis(Axis(0), f32::NEG_INFINITY, |&a, &b| a.max(b)))
                }
            }
            (Self::Flatten, Tensor::Sequence(xs)) => Tensor::Vector(xs.iter().copied().collect()),
            (
                Self::Dense {
                    activation,
                    kernel,
                    bias,
                },
                Tensor::Sequence(xs),
            ) => Tensor::Sequence((xs.dot(kernel) + bias).mapv(|x| activation.apply(x))),
            (
                Self::Dense {
                    activation,
                    kernel,
                    bias,
                },
                Tensor::Vector(x),
            ) => Tensor::Vector((x.dot(kernel) + bias).mapv(|x| activation.apply(x))),
            // Shapes are checked in `Classifier::new()`, so only no-op flattening remains.
            (_, input) => input,
        }
    }
}

/// Neural classifier that computes the probability of a sequence being positive.
pub struct Classifier {
    input_length: usize,
    vocab_size: usize,
    layers: Vec<Layer>,
}

impl Classifier {
    /// Creates a new classifier.
    ///
    /// # Arguments
    ///
    /// * `model` - A model data.
    ///
    /// # Errors
    ///
    /// Returns an error when the first layer is not an embedding, when layer shapes do not
    /// chain, or when the output is not a single sigmoid unit.
    pub fn new(model: ClassifierModel) -> Result<Self> {
        let input_length = model.input_length as usize;
        if input_length == 0 {
            return Err(SentiError::invalid_model("input_length must be >= 1"));
        }
        let vocab_size = match model.layers.first() {
            Some(LayerModel::Embedding { input_dim, .. }) => *input_dim as usize,
            _ => {
                return Err(SentiError::invalid_model(
                    "the first layer must be an embedding",
                ))
            }
        };
        let final_sigmoid = matches!(
            model.layers.last(),
            Some(LayerModel::Dense {
                activation: Activation::Sigmoid,
                ..
            })
        );
        let mut shape = Shape::Ids(input_length);
        let mut layers = Vec::with_capacity(model.layers.len());
        for layer_model in model.layers {
            let (layer, output) = Layer::new(layer_model, shape)?;
            layers.push(layer);
            shape = output;
        }
        if shape != Shape::Vector(1) || !final_sigmoid {
            return Err(SentiError::invalid_model(
                "the last layer must be a dense layer with a single sigmoid unit",
            ));
        }
        Ok(Self {
            input_length,
            vocab_size,
            layers,
        })
    }

    /// Returns the length of sequences the classifier consumes.
    pub fn input_length(&self) -> usize {
        self.input_length
    }

    /// Returns the number of rows of the embedding table.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Runs a forward pass.
    ///
    /// # Arguments
    ///
    /// * `sequence` - A sequence of ids. It is padded or truncated to
    ///   [`Self::input_length()`] if the length differs.
    ///
    /// # Returns
    ///
    /// A probability in [0, 1].
    pub fn predict(&self, sequence: &[u32]) -> f32 {
        let ids = if sequence.len() == self.input_length {
            sequence.to_vec()
        } else {
            pad_sequence(sequence, self.input_length)
        };
        let mut tensor = Tensor::Ids(ids);
        for layer in &self.layers {
            tensor = layer.forward(tensor);
        }
        match tensor {
            Tensor::Vector(y) => y[0].clamp(0.0, 1.0),
            _ => unreachable!("output shape is checked in Classifier::new()"),
        }
    }
}

/// Scorer that feeds the encoded text to the neural classifier.
pub struct NeuralScorer {
    vocabulary: Vocabulary,
    classifier: Classifier,
}

impl NeuralScorer {
    /// Creates a new scorer.
    ///
    /// # Errors
    ///
    /// Returns an error when the vocabulary can produce ids beyond the embedding table.
    pub fn new(vocabulary: Vocabulary, classifier: Classifier) -> Result<Self> {
        if vocabulary.max_id() as usize >= classifier.vocab_size() {
            return Err(SentiError::invalid_model(format!(
                "the vocabulary has ids up to {}, but the embedding only has {} rows",
                vocabulary.max_id(),
                classifier.vocab_size()
            )));
        }
        Ok(Self {
            vocabulary,
            classifier,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Returns the positive probability of `text` rounded to 2 decimal places.
    pub fn probability(&self, text: &str) -> f64 {
        let sequence = self
            .vocabulary
            .encode(text, self.classifier.input_length());
        round_to(f64::from(self.classifier.predict(&sequence)), 2)
    }
}

impl Scorer for NeuralScorer {
    fn score(&self, text: &str) -> PartialResult {
        PartialResult {
            custom: Some(self.probability(text)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(input_dim: u32, output_dim: u32, mask_zero: bool, w: &[f32]) -> LayerModel {
        LayerModel::Embedding {
            input_dim,
            output_dim,
            mask_zero,
            embeddings: w.to_vec(),
        }
    }

    fn dense(units: u32, activation: Activation, kernel: &[f32], bias: &[f32]) -> LayerModel {
        LayerModel::Dense {
            units,
            activation,
            kernel: kernel.to_vec(),
            bias: bias.to_vec(),
        }
    }

    fn pooling_model(mask_zero: bool) -> ClassifierModel {
        ClassifierModel::new(
            4,
            vec![
                embedding(4, 1, mask_zero, &[0.0, 1.0, -1.0, 0.0]),
                LayerModel::GlobalAveragePooling1d,
                dense(1, Activation::Sigmoid, &[2.0], &[0.0]),
            ],
        )
    }

    fn lstm_model(input_length: u32) -> ClassifierModel {
        ClassifierModel::new(
            input_length,
            vec![
                embedding(2, 1, false, &[0.0, 1.0]),
                LayerModel::Lstm {
                    units: 1,
                    return_sequences: false,
                    kernel: vec![0.0, 0.0, 1.0, 0.0],
                    recurrent_kernel: vec![0.0; 4],
                    bias: vec![0.0; 4],
                },
                dense(1, Activation::Sigmoid, &[1.0], &[0.0]),
            ],
        )
    }

    fn assert_close(expected: f32, actual: f32) {
        assert!(
            (expected - actual).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_predict_average_pooling() {
        let classifier = Classifier::new(pooling_model(false)).unwrap();
        assert_close(0.731_058_6, classifier.predict(&[0, 0, 1, 1]));
        assert_close(0.5, classifier.predict(&[0, 0, 0, 0]));
        assert_close(0.268_941_4, classifier.predict(&[2, 2, 0, 0]));
    }

    #[test]
    fn test_predict_masked_average_pooling() {
        let classifier = Classifier::new(pooling_model(true)).unwrap();
        assert_close(0.880_797, classifier.predict(&[0, 0, 1, 1]));
        assert_close(0.5, classifier.predict(&[0, 0, 0, 0]));
    }

    #[test]
    fn test_predict_max_pooling() {
        let model = ClassifierModel::new(
            3,
            vec![
                embedding(3, 2, false, &[0.0, 0.0, 1.0, -1.0, -2.0, 0.5]),
                LayerModel::GlobalMaxPooling1d,
                dense(1, Activation::Sigmoid, &[1.0, 1.0], &[0.0]),
            ],
        );
        let classifier = Classifier::new(model).unwrap();
        // max over rows [0, 0], [1, -1], [-2, 0.5] is [1, 0.5]
        assert_close(0.817_574_5, classifier.predict(&[0, 1, 2]));
    }

    #[test]
    fn test_predict_flatten() {
        let model = ClassifierModel::new(
            3,
            vec![
                embedding(3, 1, false, &[0.0, 1.0, -1.0]),
                LayerModel::Flatten,
                dense(2, Activation::Relu, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0], &[0.0, 0.5]),
                dense(1, Activation::Sigmoid, &[1.0, 0.0], &[0.0]),
            ],
        );
        let classifier = Classifier::new(model).unwrap();
        assert_close(0.731_058_6, classifier.predict(&[1, 2, 1]));
        assert_close(0.5, classifier.predict(&[2, 2, 2]));
    }

    #[test]
    fn test_predict_lstm() {
        let classifier = Classifier::new(lstm_model(1)).unwrap();
        assert_close(0.545_300_4, classifier.predict(&[1]));

        let classifier = Classifier::new(lstm_model(2)).unwrap();
        assert_close(0.564_173_7, classifier.predict(&[1, 1]));
        assert_close(0.5, classifier.predict(&[0, 0]));
    }

    #[test]
    fn test_predict_pads_input() {
        let classifier = Classifier::new(pooling_model(false)).unwrap();
        assert_eq!(
            classifier.predict(&[0, 0, 1, 1]),
            classifier.predict(&[1, 1])
        );
        assert_eq!(
            classifier.predict(&[0, 0, 1, 1]),
            classifier.predict(&[2, 2, 2, 0, 0, 1, 1])
        );
    }

    #[test]
    fn test_predict_out_of_table_id() {
        let classifier = Classifier::new(pooling_model(false)).unwrap();
        assert_close(0.5, classifier.predict(&[9, 9, 9, 9]));
    }

    #[test]
    fn test_new_first_layer_not_embedding() {
        let model = ClassifierModel::new(1, vec![dense(1, Activation::Sigmoid, &[1.0], &[0.0])]);
        assert_eq!(
            "InvalidModelError: the first layer must be an embedding",
            &Classifier::new(model).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_new_output_not_sigmoid() {
        let model = ClassifierModel::new(
            4,
            vec![
                embedding(4, 1, false, &[0.0; 4]),
                LayerModel::GlobalAveragePooling1d,
                dense(1, Activation::Linear, &[1.0], &[0.0]),
            ],
        );
        assert!(Classifier::new(model).is_err());
    }

    #[test]
    fn test_new_output_not_scalar() {
        let model = ClassifierModel::new(
            4,
            vec![
                embedding(4, 1, false, &[0.0; 4]),
                LayerModel::GlobalAveragePooling1d,
                dense(2, Activation::Sigmoid, &[1.0, 1.0], &[0.0, 0.0]),
            ],
        );
        assert!(Classifier::new(model).is_err());
    }

    #[test]
    fn test_new_wrong_kernel_size() {
        let model = ClassifierModel::new(
            4,
            vec![
                embedding(4, 2, false, &[0.0; 8]),
                LayerModel::GlobalAveragePooling1d,
                dense(1, Activation::Sigmoid, &[1.0], &[0.0]),
            ],
        );
        assert_eq!(
            "InvalidModelError: dense kernel must have 2x1 values, but has 1",
            &Classifier::new(model).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_new_flatten_after_mask() {
        let model = ClassifierModel::new(
            4,
            vec![
                embedding(4, 1, true, &[0.0; 4]),
                LayerModel::Flatten,
                dense(1, Activation::Sigmoid, &[1.0, 1.0, 1.0, 1.0], &[0.0]),
            ],
        );
        assert!(Classifier::new(model).is_err());
    }

    #[test]
    fn test_new_pooling_without_sequence() {
        let model = ClassifierModel::new(
            4,
            vec![
                embedding(4, 1, false, &[0.0; 4]),
                LayerModel::GlobalAveragePooling1d,
                LayerModel::GlobalAveragePooling1d,
                dense(1, Activation::Sigmoid, &[1.0], &[0.0]),
            ],
        );
        assert!(Classifier::new(model).is_err());
    }

    #[test]
    fn test_write_read() {
        let mut buf = vec![];
        lstm_model(2).write(&mut buf).unwrap();
        assert!(buf.starts_with(MODEL_MAGIC));

        let model = ClassifierModel::read(buf.as_slice()).unwrap();
        assert_eq!(2, model.input_length());
        assert_eq!(3, model.layers().len());
        let classifier = Classifier::new(model).unwrap();
        assert_close(0.564_173_7, classifier.predict(&[1, 1]));
    }

    #[test]
    fn test_read_vocabulary_as_model() {
        let mut buf = vec![];
        Vocabulary::new([("a", 1)]).unwrap().write(&mut buf).unwrap();
        assert_eq!(
            "InvalidModelError: the file is not a classifier model",
            &ClassifierModel::read(buf.as_slice()).err().unwrap().to_string()
        );
    }

    #[test]
    fn test_neural_scorer() {
        let vocab = Vocabulary::new([("good", 1), ("bad", 2)]).unwrap();
        let scorer =
            NeuralScorer::new(vocab, Classifier::new(pooling_model(false)).unwrap()).unwrap();
        assert_eq!(0.62, scorer.probability("good"));
        assert_eq!(0.38, scorer.probability("bad"));
        assert_eq!(0.5, scorer.probability(""));
        assert_eq!(Some(0.82), scorer.score("good good, really good").custom);
    }

    #[test]
    fn test_neural_scorer_vocabulary_too_large() {
        let vocab = Vocabulary::new([("good", 1), ("bad", 4)]).unwrap();
        let classifier = Classifier::new(pooling_model(false)).unwrap();
        assert!(NeuralScorer::new(vocab, classifier).is_err());
    }
}
