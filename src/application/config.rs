// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Hyperparameters for the three training modes. Serialisable so
// each run leaves its configuration (and the model dimensions it
// derived from the data) next to its checkpoints; later runs read
// that record back to rebuild a module before loading weights
// into it.
//
//   {output_dir}/{prefix}_seq2seq.json
//   {output_dir}/{prefix}_mix.json
//   {output_dir}/{prefix}_tpdn.json
//
// Reference: Rust Book §13 (Iterators and Closures)
//            serde documentation (derive)

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::data::{roles::RoleScheme, tasks::TaskKind};
use crate::domain::error::{TrainingError, TrainingResult};
use crate::ml::driver::{EvalSchedule, LoopSettings};

// ─── Backend selection ────────────────────────────────────────────────────────
/// Which Burn backend (and therefore which device) runs the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Wgpu,
    Ndarray,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wgpu" | "gpu"    => Ok(Self::Wgpu),
            "ndarray" | "cpu" => Ok(Self::Ndarray),
            other => Err(format!("unknown backend '{other}' (expected wgpu or ndarray)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wgpu    => "wgpu",
            Self::Ndarray => "ndarray",
        })
    }
}

// ─── Shared loop settings ─────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub max_epochs:    usize,
    pub patience:      usize,
    /// Validate every this many batches (seq2seq / mix)
    pub print_every:   usize,
    pub learning_rate: f64,
    pub batch_size:    usize,
    pub seed:          u64,
    pub backend:       BackendKind,
    pub output_dir:    String,
    /// Names every artefact of the run
    pub prefix:        String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_epochs:    100,
            patience:      1,
            print_every:   1000,
            learning_rate: 0.001,
            batch_size:    32,
            seed:          42,
            backend:       BackendKind::Ndarray,
            output_dir:    "models".to_string(),
            prefix:        "digits".to_string(),
        }
    }
}

impl LoopConfig {
    pub fn settings(&self, schedule: EvalSchedule) -> TrainingResult<LoopSettings> {
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidConfig("learning_rate must be positive".into()));
        }
        let settings = LoopSettings {
            max_epochs: self.max_epochs,
            patience:   self.patience,
            schedule,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }

    pub fn progress_file(&self) -> PathBuf {
        self.output_path().join(format!("progress_{}", self.prefix))
    }
}

// ─── Model dimensions ─────────────────────────────────────────────────────────
/// Sizes derived from the data at training time. Needed to rebuild
/// a module with the same shape before loading its weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceDims {
    pub vocab_size: usize,
    pub max_len:    usize,
    pub hidden:     usize,
    pub num_parses: usize,
}

/// Sizes of a role encoder, derived from its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEncoderDims {
    pub num_fillers: usize,
    pub num_roles:   usize,
    pub max_len:     usize,
    pub target_dim:  usize,
}

/// A configuration together with the dimensions it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord<C, D = SequenceDims> {
    pub config: C,
    pub dims:   D,
}

pub fn record_name(prefix: &str, mode: &str) -> String {
    format!("{prefix}_{mode}.json")
}

// ─── Mode configs ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seq2SeqConfig {
    #[serde(flatten)]
    pub run:        LoopConfig,
    pub train_file: String,
    /// Without a dev file, 10% of the training file is held out
    pub dev_file:   Option<String>,
    pub task:       TaskKind,
    pub hidden:     usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixConfig {
    #[serde(flatten)]
    pub run:         LoopConfig,
    pub train_file:  String,
    pub dev_file:    Option<String>,
    pub task:        TaskKind,
    pub role_scheme: RoleScheme,
    pub filler_dim:  usize,
    pub role_dim:    usize,
    pub hidden:      usize,
    /// Prefix of a seq2seq run whose decoder initialises this one
    pub decoder_from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TpdnConfig {
    #[serde(flatten)]
    pub run:         LoopConfig,
    /// JSONL samples, or digit sequences when `encoder_from` is set
    pub train_file:  String,
    pub dev_file:    Option<String>,
    /// Prefix of a seq2seq run whose encoder produces the targets
    pub encoder_from: Option<String>,
    pub role_scheme: RoleScheme,
    /// Learn the role assignment instead of using `role_scheme`
    pub role_learning: bool,
    /// Role vocabulary of a role-learning encoder; defaults to the scheme's
    pub num_roles:   Option<usize>,
    pub filler_dim:  usize,
    pub role_dim:    usize,
    pub burn_in:     usize,
}

/// Share of the training file kept for training when no dev file is given
pub const TRAIN_FRACTION: f64 = 0.9;

fn require_positive(name: &str, value: usize) -> TrainingResult<()> {
    if value == 0 {
        return Err(TrainingError::InvalidConfig(format!("{name} must be at least 1")));
    }
    Ok(())
}

impl Seq2SeqConfig {
    /// Validated loop settings; validates every run every `print_every` batches.
    pub fn settings(&self) -> TrainingResult<LoopSettings> {
        require_positive("hidden", self.hidden)?;
        self.run.settings(EvalSchedule::EveryBatches(self.run.print_every))
    }
}

impl MixConfig {
    pub fn settings(&self) -> TrainingResult<LoopSettings> {
        require_positive("filler_dim", self.filler_dim)?;
        require_positive("role_dim", self.role_dim)?;
        require_positive("hidden", self.hidden)?;
        self.run.settings(EvalSchedule::EveryBatches(self.run.print_every))
    }
}

impl TpdnConfig {
    /// Role encoders are validated once per epoch.
    pub fn settings(&self) -> TrainingResult<LoopSettings> {
        require_positive("filler_dim", self.filler_dim)?;
        require_positive("role_dim", self.role_dim)?;
        if let Some(n) = self.num_roles {
            require_positive("num_roles", n)?;
        }
        self.run.settings(EvalSchedule::EndOfEpoch)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("wgpu".parse::<BackendKind>().unwrap(), BackendKind::Wgpu);
        assert_eq!("CPU".parse::<BackendKind>().unwrap(), BackendKind::Ndarray);
        assert!("cuda".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_settings_reject_bad_values() {
        let mut cfg = LoopConfig::default();
        assert!(cfg.settings(EvalSchedule::EndOfEpoch).is_ok());

        cfg.batch_size = 0;
        assert!(cfg.settings(EvalSchedule::EndOfEpoch).is_err());

        cfg = LoopConfig { patience: 0, ..LoopConfig::default() };
        assert!(cfg.settings(EvalSchedule::EndOfEpoch).is_err());

        cfg = LoopConfig { print_every: 0, ..LoopConfig::default() };
        assert!(cfg.settings(EvalSchedule::EveryBatches(cfg.print_every)).is_err());
    }

    #[test]
    fn test_zero_model_widths_rejected() {
        let s2s = Seq2SeqConfig {
            run:        LoopConfig::default(),
            train_file: "train.txt".into(),
            dev_file:   None,
            task:       TaskKind::Reverse,
            hidden:     0,
        };
        assert!(matches!(s2s.settings(), Err(TrainingError::InvalidConfig(m)) if m.contains("hidden")));

        let mix = MixConfig {
            run:          LoopConfig::default(),
            train_file:   "train.txt".into(),
            dev_file:     None,
            task:         TaskKind::Reverse,
            role_scheme:  RoleScheme::Ltr,
            filler_dim:   4,
            role_dim:     0,
            hidden:       8,
            decoder_from: None,
        };
        assert!(matches!(mix.settings(), Err(TrainingError::InvalidConfig(m)) if m.contains("role_dim")));

        let mut tpdn = TpdnConfig {
            run:           LoopConfig::default(),
            train_file:    "samples.jsonl".into(),
            dev_file:      None,
            encoder_from:  None,
            role_scheme:   RoleScheme::Ltr,
            role_learning: true,
            num_roles:     Some(0),
            filler_dim:    4,
            role_dim:      4,
            burn_in:       0,
        };
        assert!(matches!(tpdn.settings(), Err(TrainingError::InvalidConfig(m)) if m.contains("num_roles")));
        tpdn.num_roles = Some(3);
        assert_eq!(tpdn.settings().unwrap().schedule, EvalSchedule::EndOfEpoch);
        tpdn.filler_dim = 0;
        assert!(tpdn.settings().is_err());
    }

    #[test]
    fn test_progress_file_named_by_prefix() {
        let cfg = LoopConfig { output_dir: "runs".into(), prefix: "rev".into(), ..LoopConfig::default() };
        assert_eq!(cfg.progress_file(), PathBuf::from("runs/progress_rev"));
        assert_eq!(record_name("rev", "seq2seq"), "rev_seq2seq.json");
    }

    #[test]
    fn test_run_record_round_trip_keeps_flattened_loop() {
        let cfg = Seq2SeqConfig {
            run:        LoopConfig::default(),
            train_file: "train.txt".into(),
            dev_file:   None,
            task:       TaskKind::Reverse,
            hidden:     60,
        };
        let rec = RunRecord {
            config: cfg,
            dims:   SequenceDims { vocab_size: 10, max_len: 6, hidden: 60, num_parses: 16 },
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"prefix\":\"digits\""));
        let back: RunRecord<Seq2SeqConfig> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dims, rec.dims);
        assert_eq!(back.config.task, TaskKind::Reverse);
    }
}
