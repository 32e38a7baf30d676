// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits describing what a training run
// works on: digit sequences, role-encoder samples, the pure
// collaborator functions (role assignment, target mapping) and
// the error taxonomy shared by every other layer.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Tensor-facing contracts (encoder, decoder, role encoder) live
// in Layer 5 next to the rest of the Burn code.

// Sequences and role-encoder samples
pub mod sequence;

// Pure collaborator traits (role functions, digit tasks, batching keys)
pub mod traits;

// TrainingError: the fatal failure kinds of a run
pub mod error;
