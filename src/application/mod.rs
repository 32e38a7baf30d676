// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the other layers together for one training
// mode at a time. It reads files through Layer 4, picks a
// backend, builds models and routines from Layer 5 and leaves
// checkpoints, run records and logs through Layer 6.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1); logging goes to tracing
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Run configuration, model dimensions, run records
pub mod config;

/// Backend selection
pub mod backend;

/// Seq2seq and mix training workflows
pub mod train_use_case;

/// Role-encoder (TPDN) training workflow
pub mod decompose_use_case;
