// ============================================================
// Layer 5 — ML / Training Layer (Burn)
// ============================================================
// Everything that builds a graph, computes a loss or steps an
// optimiser lives here. The data layer only turns plain
// sequences into tensors; the application layer only wires
// configs, files and backends together.
//
// What's in this layer:
//
//   interfaces.rs — Encoder / decoder / role-encoder contracts,
//                   and the optional regularisation capability
//
//   loss.rs       — Sequence NLL, MSE, loss breakdown
//
//   trainer.rs    — One optimisation step per batch for the
//                   three training modes
//
//   validator.rs  — Dev-set losses (no gradient), role
//                   diagnostics
//
//   annealing.rs  — Burn-in and temperature ramp for learned
//                   role assignment
//
//   driver.rs     — The epoch loop: periodic validation,
//                   checkpoint-on-improvement, early stopping
//
//   routines.rs   — The three modes plugged into the driver
//
//   targets.rs    — Role-encoder targets from a trained encoder
//
//   model.rs      — Small reference architectures implementing
//                   the contracts
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            McCoy et al. (2019) RNNs Implicitly Implement
//            Tensor-Product Representations

/// Model contracts consumed by the trainers
pub mod interfaces;

/// Loss functions
pub mod loss;

/// Single-batch trainers
pub mod trainer;

/// Validation scorers
pub mod validator;

/// Regularisation temperature schedule
pub mod annealing;

/// Generic epoch driver
pub mod driver;

/// Training modes as driver routines
pub mod routines;

/// Target vectors from a checkpointed encoder
pub mod targets;

/// Reference encoder / decoder architectures
pub mod model;
