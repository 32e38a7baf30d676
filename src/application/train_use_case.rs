// ============================================================
// Layer 2 — Seq2Seq and Mix Use Cases
// ============================================================
// Orchestrates a sequence-to-sequence training run in order:
//
//   Step 1: Load train (and dev) sequences   (Layer 4 - data)
//   Step 2: Split off a dev set if needed    (Layer 4 - data)
//   Step 3: Derive model dimensions          (Layer 4 - data)
//   Step 4: Save run record                  (Layer 6 - infra)
//   Step 5: Length-bucketed batches          (Layer 4 - data)
//   Step 6: Pick backend, build models       (Layer 2 / 5)
//   Step 7: Run the epoch driver             (Layer 5 - ml)
//   Step 8: Reload best checkpoint, re-score (Layer 6 / 5)
//
// The mix run is the same pipeline with a tensor-product role
// encoder in place of the sequence encoder, optionally starting
// from the decoder of an earlier seq2seq run.
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{module::AutodiffModule, optim::AdamConfig, tensor::backend::AutodiffBackend};
use rand::{rngs::StdRng, SeedableRng};

use crate::application::{
    backend::{dispatch, BackendJob},
    config::{record_name, MixConfig, RunRecord, Seq2SeqConfig, SequenceDims, TRAIN_FRACTION},
};
use crate::data::{
    batcher::{batchify, covered_items},
    loader::{filler_vocab_size, load_sequences, max_len},
    roles::{RoleAssigner, RoleScheme},
    splitter::split_train_dev,
};
use crate::domain::{
    error::TrainingError,
    sequence::Sequence,
    traits::{LengthKeyed, RoleFunction},
};
use crate::infra::{checkpoint::CheckpointManager, progress::ProgressLog};
use crate::ml::{
    driver::{run_epochs, LoopSettings, TrainingOutcome},
    model::{PositionDecoderConfig, PositionalEncoderConfig, TensorProductEncoderConfig},
    routines::{MixRoutine, Seq2SeqRoutine},
    trainer::{MixLearner, Seq2SeqLearner},
    validator::{dev_loss, dev_loss_mix},
};

/// What a finished run hands back to the CLI.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub outcome: TrainingOutcome,

    /// Dev loss of the reloaded best checkpoint; None if nothing was saved
    pub reloaded_dev_loss: Option<f64>,
}

// ─── Shared steps ─────────────────────────────────────────────────────────────
/// Train and dev sequences; without a dev file the train file is split.
pub(crate) fn load_split(
    train_file: &str,
    dev_file:   Option<&str>,
    rng:        &mut StdRng,
) -> Result<(Vec<Sequence>, Vec<Sequence>)> {
    let train = load_sequences(train_file)?;
    match dev_file {
        Some(path) => Ok((train, load_sequences(path)?)),
        None => {
            let (train, dev) = split_train_dev(train, TRAIN_FRACTION, rng);
            tracing::info!("No dev file; held out {} of {} sequences", dev.len(), train.len() + dev.len());
            Ok((train, dev))
        }
    }
}

/// Batch both splits; a split that yields no batch is an error.
pub(crate) fn batch_split<T: LengthKeyed + Clone>(
    train:      &[T],
    dev:        &[T],
    batch_size: usize,
    rng:        &mut StdRng,
) -> Result<(Vec<Vec<T>>, Vec<Vec<T>>)> {
    let train_batches = batchify(train, batch_size, rng)?;
    let dev_batches   = batchify(dev, batch_size, rng)?;
    tracing::info!(
        "Batches: {} train ({} of {} items), {} dev ({} of {} items)",
        train_batches.len(),
        covered_items(train, batch_size),
        train.len(),
        dev_batches.len(),
        covered_items(dev, batch_size),
        dev.len(),
    );
    if train_batches.is_empty() {
        return Err(TrainingError::empty("train").into());
    }
    if dev_batches.is_empty() {
        return Err(TrainingError::empty("dev").into());
    }
    Ok((train_batches, dev_batches))
}

/// Parse ids are balanced-tree node ids, bounded like tree roles.
fn parse_vocab(max_len: usize) -> usize {
    RoleAssigner::new(RoleScheme::Tree, max_len).num_roles()
}

pub(crate) fn encoder_config(d: &SequenceDims) -> PositionalEncoderConfig {
    PositionalEncoderConfig::new(d.vocab_size, d.max_len, d.hidden)
}

pub(crate) fn decoder_config(d: &SequenceDims) -> PositionDecoderConfig {
    PositionDecoderConfig::new(d.vocab_size, d.max_len, d.hidden, d.num_parses)
}

/// Dimensions and config of an earlier seq2seq run in the same directory.
pub(crate) fn load_seq2seq_record(
    ckpt:      &CheckpointManager,
    prefix:    &str,
    sequences: &[&[Sequence]],
) -> Result<RunRecord<Seq2SeqConfig>> {
    let record: RunRecord<Seq2SeqConfig> = ckpt.load_config(&record_name(prefix, "seq2seq"))?;
    let (len, vocab) = (max_len(sequences), filler_vocab_size(sequences));
    if len > record.dims.max_len || vocab > record.dims.vocab_size {
        bail!(
            "data (max_len {len}, vocab {vocab}) does not fit seq2seq run '{prefix}' (max_len {}, vocab {})",
            record.dims.max_len,
            record.dims.vocab_size
        );
    }
    Ok(record)
}

// ─── Seq2SeqUseCase ───────────────────────────────────────────────────────────
pub struct Seq2SeqUseCase {
    config: Seq2SeqConfig,
}

impl Seq2SeqUseCase {
    pub fn new(config: Seq2SeqConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;
        let settings = cfg.settings()?;
        let mut rng = StdRng::seed_from_u64(cfg.run.seed);

        // ── Steps 1-3: data and dimensions ────────────────────────────────────
        let (train, dev) = load_split(&cfg.train_file, cfg.dev_file.as_deref(), &mut rng)?;
        let sets = [train.as_slice(), dev.as_slice()];
        let len = max_len(&sets);
        let dims = SequenceDims {
            vocab_size: filler_vocab_size(&sets),
            max_len:    len,
            hidden:     cfg.hidden,
            num_parses: parse_vocab(len),
        };
        tracing::info!("Model dims: {:?}", dims);

        // ── Step 4: run record ────────────────────────────────────────────────
        let ckpt = CheckpointManager::new(cfg.run.output_path())?;
        ckpt.save_config(
            &record_name(&cfg.run.prefix, "seq2seq"),
            &RunRecord { config: cfg.clone(), dims },
        )?;

        // ── Step 5: batches ───────────────────────────────────────────────────
        let (train, dev) = batch_split(&train, &dev, cfg.run.batch_size, &mut rng)?;

        // ── Steps 6-8 ─────────────────────────────────────────────────────────
        dispatch(cfg.run.backend, Seq2SeqJob { cfg, dims, train, dev, ckpt: &ckpt, settings, rng })
    }
}

struct Seq2SeqJob<'a> {
    cfg:      &'a Seq2SeqConfig,
    dims:     SequenceDims,
    train:    Vec<Vec<Sequence>>,
    dev:      Vec<Vec<Sequence>>,
    ckpt:     &'a CheckpointManager,
    settings: LoopSettings,
    rng:      StdRng,
}

impl BackendJob for Seq2SeqJob<'_> {
    type Output = TrainReport;

    fn run<B: AutodiffBackend>(mut self, device: B::Device) -> Result<TrainReport> {
        let encoder = encoder_config(&self.dims).init::<B>(&device);
        let decoder = decoder_config(&self.dims).init::<B>(&device);
        let learner = Seq2SeqLearner::new(
            encoder,
            decoder,
            AdamConfig::new().init(),
            AdamConfig::new().init(),
            self.cfg.run.learning_rate,
            device.clone(),
        );
        let mut routine =
            Seq2SeqRoutine::new(learner, &self.dev, &self.cfg.task, self.ckpt, &self.cfg.run.prefix, device.clone());

        let mut progress = ProgressLog::create(&self.cfg.run.progress_file())?;
        let outcome = run_epochs(&mut routine, &mut self.train, &self.settings, &mut progress, &mut self.rng)?;

        let reloaded_dev_loss = if outcome.saved_losses.is_empty() {
            tracing::warn!("No checkpoint was saved; nothing to reload");
            None
        } else {
            let (encoder_slot, decoder_slot) = routine.slots();
            let encoder = self.ckpt.load_module::<B::InnerBackend, _>(
                routine.learner.encoder.valid(),
                encoder_slot,
                &device,
            )?;
            let decoder = self.ckpt.load_module::<B::InnerBackend, _>(
                routine.learner.decoder.valid(),
                decoder_slot,
                &device,
            )?;
            let loss = dev_loss::<B::InnerBackend, _, _>(&encoder, &decoder, &self.dev, &self.cfg.task, &device)?;
            tracing::info!("Reloaded best checkpoint: dev loss {loss:.6}");
            Some(loss)
        };

        Ok(TrainReport { outcome, reloaded_dev_loss })
    }
}

// ─── MixUseCase ───────────────────────────────────────────────────────────────
pub struct MixUseCase {
    config: MixConfig,
}

impl MixUseCase {
    pub fn new(config: MixConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        let cfg = &self.config;
        let settings = cfg.settings()?;
        let mut rng = StdRng::seed_from_u64(cfg.run.seed);

        let (train, dev) = load_split(&cfg.train_file, cfg.dev_file.as_deref(), &mut rng)?;
        let sets = [train.as_slice(), dev.as_slice()];
        let ckpt = CheckpointManager::new(cfg.run.output_path())?;

        // A warm-started decoder fixes the dimensions
        let (dims, warm_start) = match &cfg.decoder_from {
            Some(from) => {
                let record = load_seq2seq_record(&ckpt, from, &sets)?;
                tracing::info!("Decoder starts from seq2seq run '{from}'");
                (record.dims, Some(format!("decoder_{from}")))
            }
            None => {
                let len = max_len(&sets);
                let dims = SequenceDims {
                    vocab_size: filler_vocab_size(&sets),
                    max_len:    len,
                    hidden:     cfg.hidden,
                    num_parses: parse_vocab(len),
                };
                (dims, None)
            }
        };
        let roles = RoleAssigner::new(cfg.role_scheme, dims.max_len);
        tracing::info!("Model dims: {:?}, {} roles ({})", dims, roles.num_roles(), cfg.role_scheme);

        ckpt.save_config(&record_name(&cfg.run.prefix, "mix"), &RunRecord { config: cfg.clone(), dims })?;
        let (train, dev) = batch_split(&train, &dev, cfg.run.batch_size, &mut rng)?;

        dispatch(
            cfg.run.backend,
            MixJob { cfg, dims, roles, warm_start, train, dev, ckpt: &ckpt, settings, rng },
        )
    }
}

struct MixJob<'a> {
    cfg:        &'a MixConfig,
    dims:       SequenceDims,
    roles:      RoleAssigner,
    warm_start: Option<String>,
    train:      Vec<Vec<Sequence>>,
    dev:        Vec<Vec<Sequence>>,
    ckpt:       &'a CheckpointManager,
    settings:   LoopSettings,
    rng:        StdRng,
}

impl BackendJob for MixJob<'_> {
    type Output = TrainReport;

    fn run<B: AutodiffBackend>(mut self, device: B::Device) -> Result<TrainReport> {
        let role_encoder = TensorProductEncoderConfig::new(
            self.dims.vocab_size,
            self.roles.num_roles(),
            self.cfg.filler_dim,
            self.cfg.role_dim,
            self.dims.hidden,
        )
        .init::<B>(&device);

        let mut decoder = decoder_config(&self.dims).init::<B>(&device);
        if let Some(slot) = &self.warm_start {
            decoder = self.ckpt.load_module::<B, _>(decoder, slot, &device)?;
        }

        let learner = MixLearner::new(
            role_encoder,
            decoder,
            AdamConfig::new().init(),
            AdamConfig::new().init(),
            self.cfg.run.learning_rate,
            device.clone(),
        );
        let mut routine = MixRoutine::new(
            learner,
            &self.dev,
            &self.cfg.task,
            &self.roles,
            self.ckpt,
            &self.cfg.run.prefix,
            device.clone(),
        );

        let mut progress = ProgressLog::create(&self.cfg.run.progress_file())?;
        let outcome = run_epochs(&mut routine, &mut self.train, &self.settings, &mut progress, &mut self.rng)?;

        let reloaded_dev_loss = if outcome.saved_losses.is_empty() {
            tracing::warn!("No checkpoint was saved; nothing to reload");
            None
        } else {
            let (role_slot, decoder_slot) = routine.slots();
            let role_encoder = self.ckpt.load_module::<B::InnerBackend, _>(
                routine.learner.role_encoder.valid(),
                role_slot,
                &device,
            )?;
            let decoder = self.ckpt.load_module::<B::InnerBackend, _>(
                routine.learner.decoder.valid(),
                decoder_slot,
                &device,
            )?;
            let loss = dev_loss_mix::<B::InnerBackend, _, _>(
                &role_encoder,
                &self.roles,
                &decoder,
                &self.dev,
                &self.cfg.task,
                &device,
            )?;
            tracing::info!("Reloaded best checkpoint: dev loss {loss:.6}");
            Some(loss)
        };

        Ok(TrainReport { outcome, reloaded_dev_loss })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::{BackendKind, LoopConfig};
    use crate::data::tasks::TaskKind;
    use rand::Rng;
    use std::{fs, path::PathBuf};

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tpdn_usecase_{name}"));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_digits(path: &PathBuf, n: usize, len: usize, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let lines: Vec<String> = (0..n)
            .map(|_| (0..len).map(|_| rng.gen_range(0..10).to_string()).collect::<Vec<_>>().join(" "))
            .collect();
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn loop_config(dir: &PathBuf) -> LoopConfig {
        LoopConfig {
            max_epochs:  2,
            patience:    2,
            print_every: 2,
            batch_size:  4,
            backend:     BackendKind::Ndarray,
            output_dir:  dir.display().to_string(),
            ..LoopConfig::default()
        }
    }

    fn seq2seq_config(dir: &PathBuf) -> Seq2SeqConfig {
        let train = dir.join("train.txt");
        write_digits(&train, 40, 4, 1);
        Seq2SeqConfig {
            run:        loop_config(dir),
            train_file: train.display().to_string(),
            dev_file:   None,
            task:       TaskKind::Reverse,
            hidden:     16,
        }
    }

    #[test]
    fn test_seq2seq_run_leaves_record_slots_and_progress() {
        let dir = scratch("seq2seq");
        let report = Seq2SeqUseCase::new(seq2seq_config(&dir)).execute().unwrap();

        assert!(report.outcome.best_loss.is_finite());
        let reloaded = report.reloaded_dev_loss.unwrap();
        assert!((reloaded - report.outcome.best_loss).abs() < 0.05 * report.outcome.best_loss.max(1.0));

        assert!(dir.join("digits_seq2seq.json").exists());
        assert!(dir.join("encoder_digits.mpk").exists());
        assert!(dir.join("decoder_digits.mpk").exists());
        let progress = fs::read_to_string(dir.join("progress_digits")).unwrap();
        assert!(progress.lines().all(|l| l.split('\t').count() == 3));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_mix_warm_starts_from_seq2seq_decoder() {
        let dir = scratch("mix");
        let s2s = seq2seq_config(&dir);
        Seq2SeqUseCase::new(s2s.clone()).execute().unwrap();

        let mix = MixConfig {
            run:          LoopConfig { max_epochs: 1, ..s2s.run.clone() },
            train_file:   s2s.train_file.clone(),
            dev_file:     None,
            task:         TaskKind::Reverse,
            role_scheme:  RoleScheme::Ltr,
            filler_dim:   4,
            role_dim:     4,
            hidden:       999,
            decoder_from: Some("digits".into()),
        };
        let report = MixUseCase::new(mix).execute().unwrap();
        assert!(report.reloaded_dev_loss.is_some());
        assert!(dir.join("mix_tpr_digits.mpk").exists());

        // hidden comes from the seq2seq record, not the mix config
        let ckpt = CheckpointManager::new(&dir).unwrap();
        let rec: RunRecord<MixConfig> = ckpt.load_config("digits_mix.json").unwrap();
        assert_eq!(rec.dims.hidden, 16);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_small_dataset_is_empty_batch_set() {
        let dir = scratch("tiny");
        let mut cfg = seq2seq_config(&dir);
        write_digits(&dir.join("train.txt"), 3, 4, 2);
        cfg.run.batch_size = 8;
        let err = Seq2SeqUseCase::new(cfg).execute().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainingError>(),
            Some(TrainingError::EmptyBatchSet { .. })
        ));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_split_holds_out_a_tenth() {
        let dir = scratch("split");
        let path = dir.join("all.txt");
        write_digits(&path, 50, 3, 3);
        let mut rng = StdRng::seed_from_u64(0);
        let (train, dev) = load_split(path.to_str().unwrap(), None, &mut rng).unwrap();
        assert_eq!((train.len(), dev.len()), (45, 5));
        fs::remove_dir_all(&dir).ok();
    }
}
