// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the run directory:
//
//   checkpoint.rs — Best-so-far module weights, one slot per
//                   trainable module, written through a staging
//                   area and renamed into place. Also the run
//                   configuration as JSON.
//
//   progress.rs   — Tab-separated (epoch, batch, dev_loss) log,
//                   flushed after every line
//
//   metrics.rs    — Per-epoch role-encoder CSV: loss components,
//                   temperature, role diagnostics
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Module checkpoint slots and run configuration
pub mod checkpoint;

/// Validation progress log
pub mod progress;

/// Role-encoder metrics CSV
pub mod metrics;
