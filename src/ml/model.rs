// ============================================================
// Layer 5 — Reference Models
// ============================================================
// Small concrete implementations of the model contracts, enough
// to run every training mode end to end. The trainers only rely
// on the traits in ml::interfaces, so any Burn module that
// implements them can replace these.
//
//   PositionalEncoder    — filler + position embeddings, tanh,
//                          mean-pooled, projected to `hidden`
//   PositionDecoder      — per output position: latent + position
//                          + parse embeddings → log-softmax
//   TensorProductEncoder — Σ_positions filler ⊗ role, flattened,
//                          projected to `hidden`
//   RoleLearningEncoder  — like TensorProductEncoder, but the role
//                          vector of each position is a softmax
//                          mixture over a learned role vocabulary;
//                          implements RoleRegularizer
//
// Reference: Burn Book §3 (Building Blocks)
//            Smolensky (1990) Tensor product variable binding

use burn::{
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, relu, softmax},
};

use crate::ml::interfaces::{
    RegularizationTerms, RoleEncoder, RoleEncoding, RoleRegularizer, SequenceDecoder,
    SequenceEncoder,
};

/// Position ids 0..seq_len repeated for every row: [batch, seq_len]
fn position_ids<B: Backend>(batch_size: usize, seq_len: usize, device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::<B, 1, Int>::arange(0..seq_len as i64, device)
        .unsqueeze::<2>()
        .expand([batch_size, seq_len])
}

/// Σ_l filler_l ⊗ role_l for every row.
/// fillers: [batch, len, F], roles: [batch, len, R] → [batch, F·R]
fn bind<B: Backend>(fillers: Tensor<B, 3>, roles: Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch_size, _, filler_dim] = fillers.dims();
    let [_, _, role_dim] = roles.dims();
    fillers
        .swap_dims(1, 2)
        .matmul(roles)
        .reshape([batch_size, filler_dim * role_dim])
}

// ─── PositionalEncoder ────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct PositionalEncoderConfig {
    pub vocab_size: usize,
    pub max_len:    usize,
    pub hidden:     usize,
}

impl PositionalEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PositionalEncoder<B> {
        PositionalEncoder {
            filler_embedding:   EmbeddingConfig::new(self.vocab_size, self.hidden).init(device),
            position_embedding: EmbeddingConfig::new(self.max_len, self.hidden).init(device),
            output:             LinearConfig::new(self.hidden, self.hidden).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct PositionalEncoder<B: Backend> {
    pub filler_embedding:   Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub output:             Linear<B>,
}

impl<B: Backend> SequenceEncoder<B> for PositionalEncoder<B> {
    fn encode(&self, fillers: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let [batch_size, seq_len] = fillers.dims();
        let positions = position_ids::<B>(batch_size, seq_len, &fillers.device());

        let x = (self.filler_embedding.forward(fillers) + self.position_embedding.forward(positions)).tanh();
        let [_, _, hidden] = x.dims();
        let pooled = x.mean_dim(1).reshape([batch_size, hidden]);
        self.output.forward(pooled).tanh()
    }
}

// ─── PositionDecoder ──────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct PositionDecoderConfig {
    pub vocab_size: usize,
    pub max_len:    usize,
    pub hidden:     usize,
    /// Size of the parse-id vocabulary (tree path codes)
    pub num_parses: usize,
}

impl PositionDecoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PositionDecoder<B> {
        PositionDecoder {
            position_embedding: EmbeddingConfig::new(self.max_len, self.hidden).init(device),
            parse_embedding:    EmbeddingConfig::new(self.num_parses, self.hidden).init(device),
            hidden_layer:       LinearConfig::new(self.hidden, self.hidden).init(device),
            output:             LinearConfig::new(self.hidden, self.vocab_size).init(device),
            max_len:            self.max_len,
            num_parses:         self.num_parses,
        }
    }
}

#[derive(Module, Debug)]
pub struct PositionDecoder<B: Backend> {
    pub position_embedding: Embedding<B>,
    pub parse_embedding:    Embedding<B>,
    pub hidden_layer:       Linear<B>,
    pub output:             Linear<B>,
    pub max_len:            usize,
    pub num_parses:         usize,
}

impl<B: Backend> PositionDecoder<B> {
    /// [batch] ids embedded to [batch, hidden]
    fn embed_column(&self, table: &Embedding<B>, ids: Vec<i32>, device: &B::Device) -> Tensor<B, 2> {
        let batch_size = ids.len();
        let ids = Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device).reshape([batch_size, 1]);
        let embedded = table.forward(ids);
        let [_, _, hidden] = embedded.dims();
        embedded.reshape([batch_size, hidden])
    }
}

impl<B: Backend> SequenceDecoder<B> for PositionDecoder<B> {
    fn decode(
        &self,
        encoding:   Tensor<B, 2>,
        output_len: usize,
        parses:     &[Vec<usize>],
    ) -> Vec<Tensor<B, 2>> {
        let [batch_size, _] = encoding.dims();
        let device = encoding.device();

        (0..output_len)
            .map(|index| {
                let position = index.min(self.max_len - 1) as i32;
                let pos = self.embed_column(&self.position_embedding, vec![position; batch_size], &device);

                // Missing or out-of-vocabulary parse ids fall back to the last slot
                let parse_ids: Vec<i32> = (0..batch_size)
                    .map(|row| {
                        let id = parses
                            .get(row)
                            .and_then(|p| p.get(index))
                            .copied()
                            .unwrap_or(0);
                        id.min(self.num_parses - 1) as i32
                    })
                    .collect();
                let parse = self.embed_column(&self.parse_embedding, parse_ids, &device);

                let h = self.hidden_layer.forward(encoding.clone() + pos + parse).tanh();
                log_softmax(self.output.forward(h), 1)
            })
            .collect()
    }
}

// ─── TensorProductEncoder ─────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TensorProductEncoderConfig {
    pub num_fillers: usize,
    pub num_roles:   usize,
    pub filler_dim:  usize,
    pub role_dim:    usize,
    /// Width of the final linear layer (the target encoding size)
    pub hidden:      usize,
}

impl TensorProductEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TensorProductEncoder<B> {
        TensorProductEncoder {
            filler_embedding: EmbeddingConfig::new(self.num_fillers, self.filler_dim).init(device),
            role_embedding:   EmbeddingConfig::new(self.num_roles, self.role_dim).init(device),
            output:           LinearConfig::new(self.filler_dim * self.role_dim, self.hidden).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct TensorProductEncoder<B: Backend> {
    pub filler_embedding: Embedding<B>,
    pub role_embedding:   Embedding<B>,
    pub output:           Linear<B>,
}

impl<B: Backend> RoleEncoder<B> for TensorProductEncoder<B> {
    fn encode(&self, fillers: Tensor<B, 2, Int>, roles: Tensor<B, 2, Int>) -> RoleEncoding<B> {
        let bound = bind(
            self.filler_embedding.forward(fillers),
            self.role_embedding.forward(roles),
        );
        RoleEncoding {
            encoding:         self.output.forward(bound),
            role_predictions: None,
        }
    }
}

// ─── RoleLearningEncoder ──────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct RoleLearningEncoderConfig {
    pub num_fillers: usize,
    pub num_roles:   usize,
    pub max_len:     usize,
    pub filler_dim:  usize,
    pub role_dim:    usize,
    pub hidden:      usize,
    /// Width of the role-assignment network
    #[config(default = 32)]
    pub assigner_dim: usize,
    #[config(default = 1.0)]
    pub one_hot_weight: f64,
    #[config(default = 0.001)]
    pub l2_weight: f64,
    #[config(default = 1.0)]
    pub unique_role_weight: f64,
}

impl RoleLearningEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RoleLearningEncoder<B> {
        RoleLearningEncoder {
            filler_embedding:   EmbeddingConfig::new(self.num_fillers, self.filler_dim).init(device),
            role_embedding:     EmbeddingConfig::new(self.num_roles, self.role_dim).init(device),
            assigner_filler:    EmbeddingConfig::new(self.num_fillers, self.assigner_dim).init(device),
            assigner_position:  EmbeddingConfig::new(self.max_len, self.assigner_dim).init(device),
            assigner_output:    LinearConfig::new(self.assigner_dim, self.num_roles).init(device),
            output:             LinearConfig::new(self.filler_dim * self.role_dim, self.hidden).init(device),
            regularize:         false,
            temperature:        0.0,
            one_hot_weight:     self.one_hot_weight,
            l2_weight:          self.l2_weight,
            unique_role_weight: self.unique_role_weight,
        }
    }
}

#[derive(Module, Debug)]
pub struct RoleLearningEncoder<B: Backend> {
    pub filler_embedding:  Embedding<B>,
    pub role_embedding:    Embedding<B>,
    pub assigner_filler:   Embedding<B>,
    pub assigner_position: Embedding<B>,
    pub assigner_output:   Linear<B>,
    pub output:            Linear<B>,
    pub regularize:         bool,
    pub temperature:        f64,
    pub one_hot_weight:     f64,
    pub l2_weight:          f64,
    pub unique_role_weight: f64,
}

impl<B: Backend> RoleLearningEncoder<B> {
    /// Role probabilities per position: [batch, seq_len, num_roles]
    pub fn predict_roles(&self, fillers: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = fillers.dims();
        let positions = position_ids::<B>(batch_size, seq_len, &fillers.device());
        let h = (self.assigner_filler.forward(fillers) + self.assigner_position.forward(positions)).tanh();
        softmax(self.assigner_output.forward(h), 2)
    }
}

impl<B: Backend> RoleEncoder<B> for RoleLearningEncoder<B> {
    /// The supplied roles are ignored; roles come from predict_roles.
    fn encode(&self, fillers: Tensor<B, 2, Int>, _roles: Tensor<B, 2, Int>) -> RoleEncoding<B> {
        let [batch_size, seq_len] = fillers.dims();
        let probs = self.predict_roles(fillers.clone());

        let role_table = self.role_embedding.weight.val(); // [num_roles, role_dim]
        let [num_roles, role_dim] = role_table.dims();
        let roles = probs
            .clone()
            .reshape([batch_size * seq_len, num_roles])
            .matmul(role_table)
            .reshape([batch_size, seq_len, role_dim]);

        let bound = bind(self.filler_embedding.forward(fillers), roles);
        RoleEncoding {
            encoding:         self.output.forward(bound),
            role_predictions: Some(probs),
        }
    }

    fn regularizer(&self) -> Option<&dyn RoleRegularizer<B>> {
        Some(self)
    }

    fn regularizer_mut(&mut self) -> Option<&mut dyn RoleRegularizer<B>> {
        Some(self)
    }
}

impl<B: Backend> RoleRegularizer<B> for RoleLearningEncoder<B> {
    fn regularization_loss(&self, role_predictions: Tensor<B, 3>) -> RegularizationTerms<B> {
        let device = role_predictions.device();
        if !self.regularize {
            return RegularizationTerms::zeros(&device);
        }
        let scale = self.temperature;

        // 1 - Σ p² is 0 exactly when a distribution is one-hot
        let one_hot = role_predictions
            .clone()
            .powf_scalar(2.0)
            .sum_dim(2)
            .neg()
            .add_scalar(1.0)
            .mean()
            .mul_scalar(scale * self.one_hot_weight);

        let l2 = self
            .role_embedding
            .weight
            .val()
            .powf_scalar(2.0)
            .mean()
            .mul_scalar(scale * self.l2_weight);

        // Expected uses of each role within a sequence; anything above 1 is a collision
        let usage = role_predictions.sum_dim(1);
        let unique_role = relu(usage.sub_scalar(1.0))
            .powf_scalar(2.0)
            .sum_dim(2)
            .mean()
            .mul_scalar(scale * self.unique_role_weight);

        RegularizationTerms { one_hot, l2, unique_role }
    }

    fn use_regularization(&mut self, enabled: bool) {
        self.regularize = enabled;
    }

    fn set_regularization_temp(&mut self, temperature: f64) {
        self.temperature = temperature.clamp(0.0, 1.0);
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::loss::scalar;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ids(rows: [[i32; 3]; 2]) -> Tensor<TestBackend, 2, Int> {
        Tensor::from_ints(rows, &Default::default())
    }

    #[test]
    fn test_encoder_decoder_shapes() {
        let device = Default::default();
        let encoder = PositionalEncoderConfig::new(10, 6, 8).init::<TestBackend>(&device);
        let decoder = PositionDecoderConfig::new(10, 6, 8, 16).init::<TestBackend>(&device);

        let encoding = encoder.encode(ids([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(encoding.dims(), [2, 8]);

        let outputs = decoder.decode(encoding, 3, &[vec![4, 5, 3], vec![4, 5, 3]]);
        assert_eq!(outputs.len(), 3);
        assert!(outputs.iter().all(|o| o.dims() == [2, 10]));
    }

    #[test]
    fn test_tensor_product_encoder_shape() {
        let device = Default::default();
        let tpe = TensorProductEncoderConfig::new(10, 3, 4, 5, 8).init::<TestBackend>(&device);
        let out = tpe.encode(ids([[1, 2, 3], [4, 5, 6]]), ids([[0, 1, 2], [0, 1, 2]]));
        assert_eq!(out.encoding.dims(), [2, 8]);
        assert!(out.role_predictions.is_none());
        assert!(tpe.regularizer().is_none());
    }

    #[test]
    fn test_role_learner_predictions_are_distributions() {
        let device = Default::default();
        let rle = RoleLearningEncoderConfig::new(10, 4, 3, 4, 5, 8).init::<TestBackend>(&device);
        let out = rle.encode(ids([[1, 2, 3], [4, 5, 6]]), ids([[0; 3]; 2]));
        let preds = out.role_predictions.unwrap();
        assert_eq!(preds.dims(), [2, 3, 4]);

        let row_sums: Vec<f32> = preds.sum_dim(2).into_data().convert::<f32>().to_vec().unwrap();
        assert!(row_sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_regularization_off_until_enabled() {
        let device = Default::default();
        let mut rle = RoleLearningEncoderConfig::new(10, 4, 3, 4, 5, 8).init::<TestBackend>(&device);
        let preds = rle.predict_roles(ids([[1, 2, 3], [4, 5, 6]]));

        let off = rle.regularization_loss(preds.clone()).sum();
        assert_eq!(scalar(off), 0.0);

        let reg = rle.regularizer_mut().unwrap();
        reg.use_regularization(true);
        reg.set_regularization_temp(1.0);
        let on = rle.regularization_loss(preds).sum();
        assert!(scalar(on) > 0.0);
    }

    #[test]
    fn test_one_hot_predictions_have_no_one_hot_penalty() {
        let device = Default::default();
        let mut rle = RoleLearningEncoderConfig::new(10, 3, 3, 2, 2, 4)
            .with_l2_weight(0.0)
            .init::<TestBackend>(&device);
        rle.use_regularization(true);
        rle.set_regularization_temp(1.0);

        // each sequence uses each role exactly once → no collisions either
        let eye = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &device,
        );
        let preds = eye.unsqueeze::<3>().repeat_dim(0, 2);
        let terms = rle.regularization_loss(preds);
        assert!(scalar(terms.one_hot).abs() < 1e-6);
        assert!(scalar(terms.unique_role).abs() < 1e-6);
    }

    #[test]
    fn test_collapsed_roles_are_penalised() {
        let device = Default::default();
        let mut rle = RoleLearningEncoderConfig::new(10, 3, 3, 2, 2, 4).init::<TestBackend>(&device);
        rle.use_regularization(true);
        rle.set_regularization_temp(1.0);

        // all three positions on role 0
        let collapsed = Tensor::<TestBackend, 2>::from_floats(
            [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &device,
        )
        .unsqueeze::<3>();
        let terms = rle.regularization_loss(collapsed);
        // usage of role 0 is 3 → (3 - 1)² = 4
        assert!((scalar(terms.unique_role) - 4.0).abs() < 1e-4);
    }
}
