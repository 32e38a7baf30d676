// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between files on disk and tensor batches:
//
//   sequence / JSONL files
//       │
//       ▼
//   loader            → Vec<Sequence> / Vec<TprSample>
//       │
//       ▼
//   splitter          → train / dev (when no dev file is given)
//       │
//       ▼
//   batcher::batchify → length-homogeneous, shuffled batches
//       │
//       ▼
//   TensorBatcher     → Burn tensors on the run's device
//
// roles and tasks provide the pure collaborator functions
// (role assignment, input → output mapping, digit parses).
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads digit-sequence and role-encoder dataset files
pub mod loader;

/// Length-bucketed batching and tensor batch construction
pub mod batcher;

/// Seeded train/dev split
pub mod splitter;

/// Fixed role-assignment schemes
pub mod roles;

/// Digit tasks: target mapping and per-element parses
pub mod tasks;
