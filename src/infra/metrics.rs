// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records role-encoder metrics to a CSV file after each epoch.
//
// The progress log only keeps the total dev loss. Learned role
// assignment is easier to diagnose with the components next to
// each other and the regularisation temperature alongside:
//
//   epoch,temperature,train_mse,dev_total,dev_mse,dev_one_hot,
//   dev_unique_role,dev_l2,roles_used,low_confidence_pct
//
// Output file: {output_dir}/metrics_{prefix}.csv
//
// How to read the metrics:
//   - dev_one_hot should fall once the temperature ramps up
//   - roles_used well below the role vocabulary means several
//     positions share a role
//   - low_confidence_pct near 0 means the assignment is discrete
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::ml::{loss::LossBreakdown, validator::TprValidation};

/// One row of metrics for a single role-encoder epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:       usize,
    pub temperature: f64,

    /// Mean MSE over training batches
    pub train_mse: f64,

    pub dev_total:       f64,
    pub dev_mse:         f64,
    pub dev_one_hot:     f64,
    pub dev_unique_role: f64,
    pub dev_l2:          f64,

    /// Zero for encoders with fixed roles
    pub roles_used:         usize,
    pub low_confidence_pct: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, temperature: f64, train: &LossBreakdown, dev: &TprValidation) -> Self {
        let (roles_used, low_confidence_pct) = dev
            .roles
            .as_ref()
            .map(|r| (r.roles_used, r.low_confidence_pct()))
            .unwrap_or((0, 0.0));

        Self {
            epoch,
            temperature,
            train_mse:       train.mse,
            dev_total:       dev.loss.total,
            dev_mse:         dev.loss.mse,
            dev_one_hot:     dev.loss.one_hot,
            dev_unique_role: dev.loss.unique_role,
            dev_l2:          dev.loss.l2,
            roles_used,
            low_confidence_pct,
        }
    }
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh CSV at `dir/file_name` with its header row.
    pub fn create(dir: &Path, file_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(file_name);

        let mut f = fs::File::create(&csv_path)?;
        writeln!(
            f,
            "epoch,temperature,train_mse,dev_total,dev_mse,dev_one_hot,dev_unique_role,dev_l2,roles_used,low_confidence_pct"
        )?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.4},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{:.2}",
            m.epoch,
            m.temperature,
            m.train_mse,
            m.dev_total,
            m.dev_mse,
            m.dev_one_hot,
            m.dev_unique_role,
            m.dev_l2,
            m.roles_used,
            m.low_confidence_pct,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::validator::RoleDiagnostics;

    #[test]
    fn test_row_per_epoch_after_header() {
        let dir = std::env::temp_dir().join("tpdn_metrics_test");
        fs::remove_dir_all(&dir).ok();
        let logger = MetricsLogger::create(&dir, "metrics_digits.csv").unwrap();

        let dev = TprValidation {
            loss: LossBreakdown { total: 0.5, mse: 0.4, one_hot: 0.1, ..Default::default() },
            roles: Some(RoleDiagnostics { roles_used: 3, low_confidence: 1, positions: 4 }),
        };
        let train = LossBreakdown { mse: 0.45, total: 0.45, ..Default::default() };
        logger.log(&EpochMetrics::new(0, 0.25, &train, &dev)).unwrap();
        logger.log(&EpochMetrics::new(1, 0.5, &train, &dev)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("epoch,temperature"));
        assert!(lines[1].starts_with("0,0.2500,0.450000,0.500000"));
        assert!(lines[2].ends_with(",3,25.00"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fixed_roles_report_zero_diagnostics() {
        let m = EpochMetrics::new(2, 1.0, &LossBreakdown::default(), &TprValidation::default());
        assert_eq!(m.roles_used, 0);
        assert_eq!(m.low_confidence_pct, 0.0);
    }
}
