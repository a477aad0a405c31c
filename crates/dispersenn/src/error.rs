//! Error types for the dispersenn pipeline.
//!
//! Every module that can fail imports its error type from here, keeping the
//! hierarchy in one place.
//!
//! ## Hierarchy
//!
//! ```text
//! TrainError (top-level)
//! ├── ConfigError   (configuration validation, topology planning, file loading)
//! ├── DatasetError  (VCF / locs / NPY / PNG inputs, corpus layout)
//! └── IbdError      (isolation-by-distance regression)
//! ```
//!
//! Configuration errors are always raised before any tensor is allocated.
//! Data errors abort the current example; nothing is skipped silently.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TrainResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrainResult<T> = Result<T, TrainError>;

// ---------------------------------------------------------------------------
// TrainError
// ---------------------------------------------------------------------------

/// Top-level error type for the dispersenn pipeline.
///
/// Lower-level functions return their module-specific error types, which
/// coerce into `TrainError` via [`From`].
#[derive(Debug, Error)]
pub enum TrainError {
    /// A configuration validation or topology error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A dataset loading or access error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// The isolation-by-distance estimator rejected its input.
    #[error("IBD error: {0}")]
    Ibd(#[from] IbdError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by libtorch.
    #[cfg(feature = "tch-backend")]
    #[error("Torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// The dataset is empty and no training can be performed.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A shape mismatch was detected between two arrays or tensors.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A checkpoint could not be saved or loaded.
    #[error("Checkpoint error: {message} (path: {path:?})")]
    Checkpoint {
        /// Human-readable description.
        message: String,
        /// Path that was being accessed.
        path: PathBuf,
    },

    /// An output file could not be written.
    #[error("Cannot write `{path}`: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TrainError {
    /// Construct a [`TrainError::Checkpoint`].
    pub fn checkpoint<S: Into<String>>(msg: S, path: impl Into<PathBuf>) -> Self {
        TrainError::Checkpoint { message: msg.into(), path: path.into() }
    }

    /// Construct a [`TrainError::ShapeMismatch`].
    pub fn shape_mismatch(expected: Vec<usize>, actual: Vec<usize>) -> Self {
        TrainError::ShapeMismatch { expected, actual }
    }

    /// Construct a [`TrainError::Write`].
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrainError::Write { path: path.into(), source }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a configuration, or when a
/// configuration describes a topology that cannot be built.
///
/// All variants are fatal and are reported before any compute-heavy path.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The configuration selects a branch that has no defined numeric
    /// behaviour (multi-partition final stage, multi-channel classification).
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    /// More pair combinations were requested than exist.
    #[error(
        "Cannot sample {requested} distinct combinations of size {size} from n={n} \
         (only {available} exist)"
    )]
    InsufficientCombinations {
        /// Requested number of combinations (`pairs`).
        requested: usize,
        /// Individuals available.
        n: usize,
        /// Combination size.
        size: usize,
        /// `C(n, size)`, saturated at `u128::MAX`.
        available: u128,
    },

    /// Training or validation set size is not divisible by the batch size.
    #[error(
        "{set} set has {len} examples, which is not divisible by batch_size={batch_size}"
    )]
    SplitNotDivisible {
        /// `"training"` or `"validation"`.
        set: &'static str,
        /// Number of examples in the set.
        len: usize,
        /// Configured batch size.
        batch_size: usize,
    },

    /// A configuration file could not be read from (or written to) disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }

    /// Construct a [`ConfigError::Unsupported`].
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        ConfigError::Unsupported(msg.into())
    }
}

// ---------------------------------------------------------------------------
// DatasetError
// ---------------------------------------------------------------------------

/// Errors produced while reading genotype, location, raster or NPY inputs.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A required data file or directory was not found on disk.
    #[error("Data not found at `{path}`: {message}")]
    DataNotFound {
        /// Path that was expected to contain data.
        path: PathBuf,
        /// Additional context.
        message: String,
    },

    /// A VCF data line could not be parsed.
    #[error("Malformed VCF record at line {line}: {message}")]
    VcfFormat {
        /// 1-based line number in the VCF stream.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Fewer variant rows were available than `num_snps`.
    #[error("Not enough SNPs: found {found}, need {required}")]
    NotEnoughSnps {
        /// Rows available.
        found: usize,
        /// Rows required.
        required: usize,
    },

    /// Fewer sample columns were available than `n · phase`.
    #[error("Not enough samples: found {found} columns, need {required}")]
    NotEnoughSamples {
        /// Columns available.
        found: usize,
        /// Columns required.
        required: usize,
    },

    /// A locations file line could not be parsed.
    #[error("Malformed locations record at line {line}: {message}")]
    LocsFormat {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A raster pixel had zero intensity, so its log is undefined.
    #[error("Non-positive intensity {value} at pixel ({row}, {col}) in {channel} channel")]
    NonPositiveIntensity {
        /// Channel name.
        channel: &'static str,
        /// Pixel row.
        row: usize,
        /// Pixel column.
        col: usize,
        /// Offending value.
        value: f64,
    },

    /// An average-pooling window contained no pixels.
    #[error("Empty pooling window at cell ({row}, {col}) for a {height}x{width} image")]
    EmptyWindow {
        /// Coarse-grid row.
        row: usize,
        /// Coarse-grid column.
        col: usize,
        /// Source image height.
        height: usize,
        /// Source image width.
        width: usize,
    },

    /// An image could not be decoded or encoded.
    #[error("Image error in `{path}`: {message}")]
    Image {
        /// Path of the image.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// A numpy array file could not be parsed or written.
    #[error("NumPy error in `{path}`: {message}")]
    Npy {
        /// Path of the `.npy` file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// A sample index is out of bounds.
    #[error("Index {idx} out of bounds (dataset has {len} samples)")]
    IndexOutOfBounds {
        /// The requested index.
        idx: usize,
        /// Total length of the dataset.
        len: usize,
    },

    /// Normalization statistics are unusable (zero standard deviation).
    #[error("Degenerate normalization statistics for {channel}: {reason}")]
    DegenerateStats {
        /// Channel name.
        channel: &'static str,
        /// Description of the problem.
        reason: String,
    },

    /// A data format error with no specific path context.
    #[error("Format error: {0}")]
    Format(String),

    /// A low-level I/O error while reading a data file.
    #[error("I/O error reading `{path}`: {source}")]
    IoError {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error that carries no path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    /// Construct a [`DatasetError::DataNotFound`].
    pub fn not_found<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::DataNotFound { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::VcfFormat`].
    pub fn vcf<S: Into<String>>(line: usize, msg: S) -> Self {
        DatasetError::VcfFormat { line, message: msg.into() }
    }

    /// Construct a [`DatasetError::Image`].
    pub fn image<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::Image { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::Npy`].
    pub fn npy<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::Npy { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::IoError`].
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::IoError { path: path.into(), source }
    }

    /// Construct a [`DatasetError::Format`].
    pub fn format<S: Into<String>>(msg: S) -> Self {
        DatasetError::Format(msg.into())
    }
}

// ---------------------------------------------------------------------------
// IbdError
// ---------------------------------------------------------------------------

/// Errors produced by the isolation-by-distance estimator.
#[derive(Debug, Error)]
pub enum IbdError {
    /// Fewer than two individuals remain after trimming padding.
    #[error("Need at least 2 individuals, found {found}")]
    TooFewIndividuals {
        /// Effective sample size.
        found: usize,
    },

    /// A phase-1 genotype was not a dosage in {0, 1, 2}.
    #[error("Invalid dosage {value} at SNP {snp}, individual {individual}")]
    InvalidDosage {
        /// Offending value.
        value: u8,
        /// Row index.
        snp: usize,
        /// Column index.
        individual: usize,
    },

    /// Two individuals share a location, so `ln(distance)` is undefined.
    #[error("Individuals {i} and {j} are at zero distance")]
    ZeroDistance {
        /// First individual.
        i: usize,
        /// Second individual.
        j: usize,
    },

    /// A regression input has zero variance.
    #[error("Zero variance in {quantity}")]
    ZeroVariance {
        /// Which quantity (`"log distance"` or `"genetic similarity"`).
        quantity: &'static str,
    },

    /// No within-individual variation, so Rousset's `a` is undefined.
    #[error("Within-individual sum of squares is zero across all pairs")]
    ZeroDenominator,

    /// The regression slope is zero, so `Nw = 1/b` is undefined.
    #[error("Regression slope is zero; Nw is undefined")]
    ZeroSlope,

    /// Genotype and location matrices disagree on sample count.
    #[error("Genotypes describe {genotypes} individuals but locations have {locations}")]
    SampleMismatch {
        /// Individuals in the genotype matrix.
        genotypes: usize,
        /// Columns in the location matrix.
        locations: usize,
    },
}
