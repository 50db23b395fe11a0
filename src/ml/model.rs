use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct BiasClassifierConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    pub num_classes: usize,
}

impl BiasClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiasClassifier<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let embed_norm         = LayerNormConfig::new(self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let dropout = DropoutConfig::new(self.dropout).init();
        let head = ClassificationHead {
            dense:    LinearConfig::new(self.d_model, self.d_model).init(device),
            out_proj: LinearConfig::new(self.d_model, self.num_classes).init(device),
            dropout:  DropoutConfig::new(self.dropout).init(),
        };
        BiasClassifier {
            token_embedding, position_embedding, embed_norm, layers, dropout, head,
            max_seq_len: self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `mask_pad`: [batch, seq_len], true where the position is padding.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_input  = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(attn_input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

/// Sentence-level head on the first token: dense → tanh → projection.
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    pub dense:    Linear<B>,
    pub out_proj: Linear<B>,
    pub dropout:  Dropout,
}

impl<B: Backend> ClassificationHead<B> {
    /// hidden: [batch, d_model] → logits: [batch, num_classes]
    pub fn forward(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout.forward(hidden);
        let x = burn::tensor::activation::tanh(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.out_proj.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct BiasClassifier<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub embed_norm:         LayerNorm<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub dropout:            Dropout,
    pub head:               ClassificationHead<B>,
    pub max_seq_len:        usize,
}

impl<B: Backend> BiasClassifier<B> {
    /// input_ids, attention_mask: [batch, seq_len] → logits: [batch, num_classes]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();
        let mask_pad = attention_mask.equal_elem(0);

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(self.embed_norm.forward(tok_emb + pos_emb));
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }

        let [_, _, d_model] = x.dims();
        let first_token = x
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);

        self.head.forward(first_token)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::sync::{Mutex, MutexGuard};

    // NdArray keeps one process-wide RNG; tests that draw weights hold this
    // so a seeded test sees an uninterrupted stream.
    static BACKEND_RNG: Mutex<()> = Mutex::new(());

    pub(crate) fn backend_rng_guard() -> MutexGuard<'static, ()> {
        BACKEND_RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn tiny_config(num_classes: usize) -> BiasClassifierConfig {
        BiasClassifierConfig::new(32, 16, 8, 2, 1, 16, 0.0, num_classes)
    }

    #[test]
    fn test_forward_produces_one_logit_row_per_article() {
        let _guard = backend_rng_guard();
        let device = Default::default();
        let model: BiasClassifier<NdArray> = tiny_config(3).init(&device);

        let ids  = Tensor::<NdArray, 1, Int>::from_ints([3, 4, 5, 0, 6, 7, 0, 0].as_slice(), &device)
            .reshape([2, 4]);
        let mask = Tensor::<NdArray, 1, Int>::from_ints([1, 1, 1, 0, 1, 1, 0, 0].as_slice(), &device)
            .reshape([2, 4]);

        let logits = model.forward(ids, mask);
        assert_eq!(logits.dims(), [2, 3]);
    }
}
