// ============================================================
// Layer 3 — Training Errors
// ============================================================
// None of these has a transient cause, so nothing retries:
// each one stops the run and carries enough context (epoch,
// batch, path) to tell where it happened.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// A batch mixed sequences of different lengths, or aligned
    /// fields (fillers/roles, targets) disagreed on size.
    #[error("shape mismatch at item {position}: expected length {expected}, found {found}")]
    ShapeMismatch {
        expected: usize,
        found:    usize,
        position: usize,
    },

    /// A dataset produced zero batches.
    #[error("{split} set yields no batches (every length bucket is smaller than batch_size)")]
    EmptyBatchSet { split: String },

    /// Serialising a checkpoint slot failed.
    #[error("failed to write checkpoint '{path}': {message}")]
    CheckpointWrite { path: String, message: String },

    /// Training or validation loss became NaN or infinite.
    #[error("loss diverged at epoch {epoch}, batch {batch}: {loss}")]
    NumericDivergence { epoch: usize, batch: usize, loss: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("progress log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A tensor could not be read back as host data.
    #[error("cannot read tensor data: {0}")]
    TensorData(String),

    /// Any of the above, raised inside the epoch loop.
    #[error("epoch {epoch}, batch {batch}: {source}")]
    AtStep {
        epoch:  usize,
        batch:  usize,
        source: Box<TrainingError>,
    },
}

impl TrainingError {
    pub fn empty(split: impl Into<String>) -> Self {
        Self::EmptyBatchSet { split: split.into() }
    }

    /// Attach the loop position. Errors that already carry one are
    /// returned unchanged.
    pub fn at_step(self, epoch: usize, batch: usize) -> Self {
        match self {
            Self::NumericDivergence { .. } | Self::AtStep { .. } => self,
            other => Self::AtStep { epoch, batch, source: Box::new(other) },
        }
    }

    /// The underlying error, without loop position.
    pub fn root(&self) -> &TrainingError {
        match self {
            Self::AtStep { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;
