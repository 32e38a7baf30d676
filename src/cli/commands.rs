// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands, one per training mode:
//
//   seq2seq — sequence encoder + decoder on a digit task
//   mix     — tensor-product encoder + decoder on a digit task
//   tpdn    — tensor-product encoder fitted to target vectors
//
// Loop settings shared by all three live in LoopArgs and are
// flattened into each command.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::config::{BackendKind, LoopConfig, MixConfig, Seq2SeqConfig, TpdnConfig};
use crate::data::{roles::RoleScheme, tasks::TaskKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a sequence encoder and decoder on a digit task
    Seq2seq(Seq2SeqArgs),

    /// Train a tensor-product encoder with a decoder on a digit task
    Mix(MixArgs),

    /// Fit a tensor-product encoder to target encodings
    Tpdn(TpdnArgs),
}

// ─── Shared loop flags ────────────────────────────────────────────────────────
#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    /// Upper bound on training epochs
    #[arg(long, default_value_t = 100)]
    pub max_epochs: usize,

    /// Stop after this many gated epochs without a new best dev loss
    #[arg(long, default_value_t = 1)]
    pub patience: usize,

    /// Validate every N batches (seq2seq and mix)
    #[arg(long, default_value_t = 1000)]
    pub print_every: usize,

    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Seeds the train/dev split and batch shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// wgpu or ndarray
    #[arg(long, default_value = "ndarray")]
    pub backend: BackendKind,

    /// Directory for checkpoints, run records and logs
    #[arg(long, default_value = "models")]
    pub output_dir: String,

    /// Names every file the run writes
    #[arg(long, default_value = "digits")]
    pub prefix: String,
}

impl From<LoopArgs> for LoopConfig {
    fn from(a: LoopArgs) -> Self {
        LoopConfig {
            max_epochs:    a.max_epochs,
            patience:      a.patience,
            print_every:   a.print_every,
            learning_rate: a.lr,
            batch_size:    a.batch_size,
            seed:          a.seed,
            backend:       a.backend,
            output_dir:    a.output_dir,
            prefix:        a.prefix,
        }
    }
}

// ─── seq2seq ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct Seq2SeqArgs {
    /// Digit sequences, one per line, space separated
    #[arg(long)]
    pub train_file: String,

    /// Held-out sequences; 10% of the train file is used if omitted
    #[arg(long)]
    pub dev_file: Option<String>,

    /// autoencode, reverse or sort
    #[arg(long, default_value = "autoencode")]
    pub task: TaskKind,

    #[arg(long, default_value_t = 60)]
    pub hidden: usize,

    #[command(flatten)]
    pub run: LoopArgs,
}

impl From<Seq2SeqArgs> for Seq2SeqConfig {
    fn from(a: Seq2SeqArgs) -> Self {
        Seq2SeqConfig {
            run:        a.run.into(),
            train_file: a.train_file,
            dev_file:   a.dev_file,
            task:       a.task,
            hidden:     a.hidden,
        }
    }
}

// ─── mix ──────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct MixArgs {
    #[arg(long)]
    pub train_file: String,

    #[arg(long)]
    pub dev_file: Option<String>,

    #[arg(long, default_value = "autoencode")]
    pub task: TaskKind,

    /// ltr, rtl, bidirectional, bow or tree
    #[arg(long, default_value = "ltr")]
    pub role_scheme: RoleScheme,

    #[arg(long, default_value_t = 20)]
    pub filler_dim: usize,

    #[arg(long, default_value_t = 20)]
    pub role_dim: usize,

    /// Ignored when --decoder-from is given
    #[arg(long, default_value_t = 60)]
    pub hidden: usize,

    /// Start from the decoder of this seq2seq run prefix
    #[arg(long)]
    pub decoder_from: Option<String>,

    #[command(flatten)]
    pub run: LoopArgs,
}

impl From<MixArgs> for MixConfig {
    fn from(a: MixArgs) -> Self {
        MixConfig {
            run:          a.run.into(),
            train_file:   a.train_file,
            dev_file:     a.dev_file,
            task:         a.task,
            role_scheme:  a.role_scheme,
            filler_dim:   a.filler_dim,
            role_dim:     a.role_dim,
            hidden:       a.hidden,
            decoder_from: a.decoder_from,
        }
    }
}

// ─── tpdn ─────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TpdnArgs {
    /// JSONL samples, or digit sequences with --encoder-from
    #[arg(long)]
    pub train_file: String,

    #[arg(long)]
    pub dev_file: Option<String>,

    /// Encode the sequences with the encoder of this seq2seq run prefix
    #[arg(long)]
    pub encoder_from: Option<String>,

    #[arg(long, default_value = "ltr")]
    pub role_scheme: RoleScheme,

    /// Learn the role assignment instead of using --role-scheme
    #[arg(long)]
    pub role_learning: bool,

    /// Role vocabulary of the role-learning encoder
    #[arg(long)]
    pub num_roles: Option<usize>,

    #[arg(long, default_value_t = 20)]
    pub filler_dim: usize,

    #[arg(long, default_value_t = 20)]
    pub role_dim: usize,

    /// Epochs before regularisation switches on
    #[arg(long, default_value_t = 0)]
    pub burn_in: usize,

    #[command(flatten)]
    pub run: LoopArgs,
}

impl From<TpdnArgs> for TpdnConfig {
    fn from(a: TpdnArgs) -> Self {
        TpdnConfig {
            run:           a.run.into(),
            train_file:    a.train_file,
            dev_file:      a.dev_file,
            encoder_from:  a.encoder_from,
            role_scheme:   a.role_scheme,
            role_learning: a.role_learning,
            num_roles:     a.num_roles,
            filler_dim:    a.filler_dim,
            role_dim:      a.role_dim,
            burn_in:       a.burn_in,
        }
    }
}
