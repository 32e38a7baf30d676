// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores module weights using Burn's CompactRecorder.
//
// Each trainable module owns one named slot. A slot is
// overwritten every time the dev loss improves, so at the end of
// a run it holds the best weights seen:
//
//   models/
//     encoder_digits.mpk      ← best encoder
//     decoder_digits.mpk      ← best decoder
//     digits_seq2seq.json     ← run configuration + model dims
//     .staging/               ← in-flight writes
//
// Writes go to .staging first and are then renamed over the
// slot, so a crash mid-write leaves the previous best intact.
// Modules trained together are all staged before any of them is
// renamed, so their slots always come from the same evaluation.
//
// Burn's CompactRecorder:
//   - Serialises module parameters to named MessagePack
//   - Stores floats at half precision
//   - Type-safe: loading fails if the architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, FileRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::error::{TrainingError, TrainingResult};

const STAGING_DIR: &str = ".staging";

/// Extension CompactRecorder appends to every record path
const SLOT_EXTENSION: &str = "mpk";

/// A slot written to the staging area but not yet live.
#[derive(Debug)]
pub struct StagedSlot {
    written: PathBuf,
    target:  PathBuf,
}

/// Manages the checkpoint slots of one run directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the directory (and its staging
    /// area) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(STAGING_DIR))
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of a slot, extension included.
    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(slot).with_extension(SLOT_EXTENSION)
    }

    pub fn has_slot(&self, slot: &str) -> bool {
        self.slot_path(slot).exists()
    }

    /// Record `module` into `slot`, replacing the previous contents.
    ///
    /// Any failure is a CheckpointWrite error; the run must not
    /// continue un-checkpointed.
    pub fn save_module<B: Backend, M: Module<B>>(&self, module: &M, slot: &str) -> TrainingResult<()> {
        let staged = self.stage_module::<B, M>(module, slot)?;
        self.commit(vec![staged])
    }

    /// Write `module` into the staging area only.
    pub fn stage_module<B: Backend, M: Module<B>>(&self, module: &M, slot: &str) -> TrainingResult<StagedSlot> {
        let staged = self.dir.join(STAGING_DIR).join(slot);

        CompactRecorder::new()
            .record(module.clone().into_record(), staged.clone())
            .map_err(|e| TrainingError::CheckpointWrite {
                path:    staged.display().to_string(),
                message: e.to_string(),
            })?;

        let extension = <CompactRecorder as FileRecorder<B>>::file_extension();
        Ok(StagedSlot {
            written: staged.with_extension(extension),
            target:  self.slot_path(slot),
        })
    }

    /// Move staged slots over their live files.
    pub fn commit(&self, staged: Vec<StagedSlot>) -> TrainingResult<()> {
        for slot in staged {
            fs::rename(&slot.written, &slot.target).map_err(|e| TrainingError::CheckpointWrite {
                path:    slot.target.display().to_string(),
                message: e.to_string(),
            })?;
            tracing::debug!("Saved checkpoint '{}'", slot.target.display());
        }
        Ok(())
    }

    /// Load the weights in `slot` into `module`.
    pub fn load_module<B: Backend, M: Module<B>>(
        &self,
        module: M,
        slot:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.dir.join(slot);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has this slot been trained?", path.display())
            })?;
        Ok(module.load_record(record))
    }

    /// Save a run configuration as pretty JSON.
    pub fn save_config<T: Serialize>(&self, name: &str, cfg: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{PositionalEncoder, PositionalEncoderConfig};
    use burn::backend::NdArray;
    use serde::Deserialize;

    type TestBackend = NdArray;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tpdn_ckpt_{name}"));
        fs::remove_dir_all(&dir).ok();
        dir
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Dims {
        hidden: usize,
    }

    #[test]
    fn test_config_round_trip() {
        let dir = temp_dir("config");
        let mgr = CheckpointManager::new(&dir).unwrap();
        mgr.save_config("digits_seq2seq.json", &Dims { hidden: 60 }).unwrap();
        let back: Dims = mgr.load_config("digits_seq2seq.json").unwrap();
        assert_eq!(back, Dims { hidden: 60 });
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_overwrites_slot_and_leaves_no_staging_file() {
        let dir = temp_dir("slot");
        let mgr = CheckpointManager::new(&dir).unwrap();
        let device = Default::default();
        let cfg = PositionalEncoderConfig::new(5, 4, 6);

        let first: PositionalEncoder<TestBackend> = cfg.init(&device);
        mgr.save_module::<TestBackend, _>(&first, "encoder_digits").unwrap();
        let second: PositionalEncoder<TestBackend> = cfg.init(&device);
        mgr.save_module::<TestBackend, _>(&second, "encoder_digits").unwrap();

        assert!(mgr.has_slot("encoder_digits"));
        let staged = fs::read_dir(dir.join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);

        // Loading restores the last save (stored at half precision)
        let loaded = mgr
            .load_module::<TestBackend, _>(cfg.init(&device), "encoder_digits", &device)
            .unwrap();
        let a: Vec<f32> = loaded.output.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = second.output.weight.val().into_data().to_vec().unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-2));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_slot_extension_matches_recorder() {
        assert_eq!(<CompactRecorder as FileRecorder<TestBackend>>::file_extension(), SLOT_EXTENSION);
    }

    #[test]
    fn test_staged_slots_stay_hidden_until_commit() {
        let dir = temp_dir("staged");
        let mgr = CheckpointManager::new(&dir).unwrap();
        let device = Default::default();
        let module: PositionalEncoder<TestBackend> = PositionalEncoderConfig::new(5, 4, 6).init(&device);

        let a = mgr.stage_module::<TestBackend, _>(&module, "mix_tpr_digits").unwrap();
        let b = mgr.stage_module::<TestBackend, _>(&module, "mix_decoder_digits").unwrap();
        assert!(!mgr.has_slot("mix_tpr_digits"));
        assert!(!mgr.has_slot("mix_decoder_digits"));

        mgr.commit(vec![a, b]).unwrap();
        assert!(mgr.has_slot("mix_tpr_digits"));
        assert!(mgr.has_slot("mix_decoder_digits"));
        let reloaded = mgr.load_module::<TestBackend, _>(
            PositionalEncoderConfig::new(5, 4, 6).init(&device),
            "mix_decoder_digits",
            &device,
        );
        assert!(reloaded.is_ok());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_slot_fails_to_load() {
        let dir = temp_dir("missing");
        let mgr = CheckpointManager::new(&dir).unwrap();
        let device = Default::default();
        let module: PositionalEncoder<TestBackend> = PositionalEncoderConfig::new(5, 4, 6).init(&device);
        assert!(mgr.load_module::<TestBackend, _>(module, "nope", &device).is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
