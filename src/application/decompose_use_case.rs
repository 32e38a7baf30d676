// ============================================================
// Layer 2 — TPDN Use Case
// ============================================================
// Fits a tensor-product role encoder to a set of target vectors.
// The targets come from one of two places:
//
//   JSONL samples  — {"fillers": [...], "roles": [...], "target": [...]}
//                    one per line; roles may be left out and are
//                    then assigned by the configured role scheme
//
//   seq2seq run    — digit sequences, encoded by the checkpointed
//                    encoder of an earlier run (`encoder_from`)
//
// Pipeline:
//
//   Step 1: Load samples or sequences             (Layer 4 - data)
//   Step 2: Derive role-encoder dimensions        (Layer 4 - data)
//   Step 3: Save run record, open metrics CSV     (Layer 6 - infra)
//   Step 4: Pick backend; encode targets if asked (Layer 2 / 5)
//   Step 5: Batches, role encoder, epoch driver   (Layer 4 / 5)
//   Step 6: Reload best checkpoint, re-score      (Layer 6 / 5)
//
// Validation runs once per epoch. A role-learning encoder only
// competes for the checkpoint once its burn-in is over.

use anyhow::{bail, Result};
use burn::{module::AutodiffModule, optim::AdamConfig, tensor::backend::AutodiffBackend};
use rand::{rngs::StdRng, SeedableRng};

use crate::application::{
    backend::{dispatch, BackendJob},
    config::{record_name, RoleEncoderDims, RunRecord, SequenceDims, TpdnConfig, TRAIN_FRACTION},
    train_use_case::{batch_split, encoder_config, load_seq2seq_record, load_split, TrainReport},
};
use crate::data::{
    loader::{assign_roles, read_tpr_records, TprRecord},
    roles::RoleAssigner,
    splitter::split_train_dev,
};
use crate::domain::{
    sequence::{Sequence, TprSample},
    traits::RoleFunction,
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger, progress::ProgressLog};
use crate::ml::{
    driver::{run_epochs, LoopSettings},
    interfaces::RoleEncoder,
    model::{RoleLearningEncoderConfig, TensorProductEncoderConfig},
    routines::TpdnRoutine,
    targets::encode_targets,
    trainer::TprLearner,
    validator::dev_loss_tpr,
};

/// Where the training targets come from.
enum TpdnSource {
    Samples {
        train: Vec<TprSample>,
        dev:   Vec<TprSample>,
    },
    Encoder {
        slot:  String,
        dims:  SequenceDims,
        train: Vec<Sequence>,
        dev:   Vec<Sequence>,
    },
}

pub struct TpdnUseCase {
    config: TpdnConfig,
}

impl TpdnUseCase {
    pub fn new(config: TpdnConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;
        let settings = cfg.settings()?;
        let mut rng = StdRng::seed_from_u64(cfg.run.seed);
        let ckpt = CheckpointManager::new(cfg.run.output_path())?;

        // ── Steps 1-2: targets and dimensions ─────────────────────────────────
        let (source, roles, mut dims) = match &cfg.encoder_from {
            None => samples_source(cfg, &mut rng)?,
            Some(from) => {
                let (train, dev) = load_split(&cfg.train_file, cfg.dev_file.as_deref(), &mut rng)?;
                let record = load_seq2seq_record(&ckpt, from, &[train.as_slice(), dev.as_slice()])?;
                tracing::info!("Targets come from the encoder of seq2seq run '{from}'");

                let seq = record.dims;
                let roles = RoleAssigner::new(cfg.role_scheme, seq.max_len);
                let dims = RoleEncoderDims {
                    num_fillers: seq.vocab_size,
                    num_roles:   roles.num_roles(),
                    max_len:     seq.max_len,
                    target_dim:  seq.hidden,
                };
                let source = TpdnSource::Encoder { slot: format!("encoder_{from}"), dims: seq, train, dev };
                (source, roles, dims)
            }
        };
        if cfg.role_learning {
            dims.num_roles = cfg.num_roles.unwrap_or(dims.num_roles);
        }
        tracing::info!(
            "Role encoder dims: {:?} ({}, {})",
            dims,
            cfg.role_scheme,
            if cfg.role_learning { "learned roles" } else { "fixed roles" },
        );

        // ── Step 3: run record and metrics ────────────────────────────────────
        ckpt.save_config(&record_name(&cfg.run.prefix, "tpdn"), &RunRecord { config: cfg.clone(), dims })?;
        let metrics = MetricsLogger::create(ckpt.dir(), &format!("metrics_{}.csv", cfg.run.prefix))?;

        // ── Steps 4-6 ─────────────────────────────────────────────────────────
        dispatch(
            cfg.run.backend,
            TpdnJob { cfg, dims, roles, source, ckpt: &ckpt, metrics, settings, rng },
        )
    }
}

/// Samples read from JSONL, with roles filled in where missing.
fn samples_source(cfg: &TpdnConfig, rng: &mut StdRng) -> Result<(TpdnSource, RoleAssigner, RoleEncoderDims)> {
    let records = read_tpr_records(&cfg.train_file)?;
    let (train, dev) = match &cfg.dev_file {
        Some(path) => (records, read_tpr_records(path)?),
        None       => split_train_dev(records, TRAIN_FRACTION, rng),
    };

    let all = || train.iter().chain(dev.iter());
    let max_len = all().map(|r| r.fillers.len()).max().unwrap_or(0).max(1);
    let num_fillers = all().flat_map(|r| r.fillers.iter().copied()).max().map_or(1, |m| m + 1);
    let explicit_roles = all()
        .filter_map(|r| r.roles.as_ref())
        .flat_map(|r| r.iter().copied())
        .max()
        .map_or(0, |m| m + 1);
    let target_dim = check_target_dim(all())?;

    let roles = RoleAssigner::new(cfg.role_scheme, max_len);
    let dims = RoleEncoderDims {
        num_fillers,
        num_roles: roles.num_roles().max(explicit_roles),
        max_len,
        target_dim,
    };
    let source = TpdnSource::Samples {
        train: assign_roles(train, &roles),
        dev:   assign_roles(dev, &roles),
    };
    Ok((source, roles, dims))
}

/// Every record must carry a target of the same, non-zero size.
fn check_target_dim<'a>(mut records: impl Iterator<Item = &'a TprRecord>) -> Result<usize> {
    let Some(first) = records.next() else {
        bail!("role-encoder dataset is empty");
    };
    let dim = first.target.len();
    if dim == 0 {
        bail!("role-encoder targets are empty vectors");
    }
    if let Some(other) = records.find(|r| r.target.len() != dim) {
        bail!("target sizes differ: {} and {}", dim, other.target.len());
    }
    Ok(dim)
}

struct TpdnJob<'a> {
    cfg:      &'a TpdnConfig,
    dims:     RoleEncoderDims,
    roles:    RoleAssigner,
    source:   TpdnSource,
    ckpt:     &'a CheckpointManager,
    metrics:  MetricsLogger,
    settings: LoopSettings,
    rng:      StdRng,
}

impl BackendJob for TpdnJob<'_> {
    type Output = TrainReport;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<TrainReport> {
        let TpdnJob { cfg, dims, roles, source, ckpt, metrics, settings, mut rng } = self;

        let (train, dev) = match source {
            TpdnSource::Samples { train, dev } => (train, dev),
            TpdnSource::Encoder { slot, dims: seq, train, dev } => {
                let encoder = ckpt.load_module::<B::InnerBackend, _>(
                    encoder_config(&seq).init::<B::InnerBackend>(&device),
                    &slot,
                    &device,
                )?;
                let chunk = cfg.run.batch_size;
                (
                    encode_targets::<B::InnerBackend, _>(&encoder, &train, &roles, chunk, &device)?,
                    encode_targets::<B::InnerBackend, _>(&encoder, &dev, &roles, chunk, &device)?,
                )
            }
        };
        let (mut train, dev) = batch_split(&train, &dev, cfg.run.batch_size, &mut rng)?;

        let fit = RoleEncoderFit::<B> {
            cfg,
            ckpt,
            settings: &settings,
            dev:      &dev,
            device:   device.clone(),
        };
        if cfg.role_learning {
            let encoder = RoleLearningEncoderConfig::new(
                dims.num_fillers,
                dims.num_roles,
                dims.max_len,
                cfg.filler_dim,
                cfg.role_dim,
                dims.target_dim,
            )
            .init::<B>(&device);
            fit.run(encoder, &mut train, metrics, cfg.burn_in, &mut rng)
        } else {
            let encoder = TensorProductEncoderConfig::new(
                dims.num_fillers,
                dims.num_roles,
                cfg.filler_dim,
                cfg.role_dim,
                dims.target_dim,
            )
            .init::<B>(&device);
            // Fixed roles have nothing to anneal, so every epoch may checkpoint
            fit.run(encoder, &mut train, metrics, 0, &mut rng)
        }
    }
}

/// Everything a role-encoder run needs besides the encoder itself.
struct RoleEncoderFit<'a, B: AutodiffBackend> {
    cfg:      &'a TpdnConfig,
    ckpt:     &'a CheckpointManager,
    settings: &'a LoopSettings,
    dev:      &'a [Vec<TprSample>],
    device:   B::Device,
}

impl<B: AutodiffBackend> RoleEncoderFit<'_, B> {
    fn run<R>(
        self,
        encoder: R,
        train:   &mut [Vec<TprSample>],
        metrics: MetricsLogger,
        burn_in: usize,
        rng:     &mut StdRng,
    ) -> Result<TrainReport>
    where
        R: RoleEncoder<B> + AutodiffModule<B>,
        R::InnerModule: RoleEncoder<B::InnerBackend>,
    {
        let learner = TprLearner::new(encoder, AdamConfig::new().init(), self.cfg.run.learning_rate, self.device.clone());
        let mut routine =
            TpdnRoutine::new(learner, self.dev, self.ckpt, &self.cfg.run.prefix, burn_in, self.device.clone())
                .with_metrics(metrics);

        let mut progress = ProgressLog::create(&self.cfg.run.progress_file())?;
        let outcome = run_epochs(&mut routine, train, self.settings, &mut progress, rng)?;

        let reloaded_dev_loss = if outcome.saved_losses.is_empty() {
            tracing::warn!("No checkpoint was saved; nothing to reload");
            None
        } else {
            let encoder = self.ckpt.load_module::<B::InnerBackend, _>(
                routine.learner.role_encoder.valid(),
                routine.slot(),
                &self.device,
            )?;
            let v = dev_loss_tpr::<B::InnerBackend, _>(&encoder, self.dev, &self.device)?;
            tracing::info!("Reloaded best checkpoint: dev loss {:.6} (mse {:.6})", v.loss.total, v.loss.mse);
            Some(v.loss.total)
        };

        Ok(TrainReport { outcome, reloaded_dev_loss })
    }
}
