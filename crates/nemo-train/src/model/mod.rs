//! Transfer-learning classifier: frozen VGG16 features, trainable head

pub mod vgg;

pub use vgg::{Vgg16Config, Vgg16Features};

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig, Relu},
    tensor::{activation, backend::Backend, ElementConversion, Int, Tensor},
};

/// Topology of the classifier, saved beside trained weights
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub num_classes: usize,
    #[config(default = 64)]
    pub hidden_units: usize,
    /// Channels of the first backbone block
    #[config(default = 64)]
    pub backbone_width: usize,
}

impl ClassifierConfig {
    pub fn backbone(&self) -> Vgg16Config {
        Vgg16Config::new().with_width(self.backbone_width)
    }

    /// Classifier on top of `backbone`, which is frozen here
    pub fn init_with<B: Backend>(
        &self,
        backbone: Vgg16Features<B>,
        device: &B::Device,
    ) -> TransferClassifier<B> {
        let features = self.backbone().out_channels();

        TransferClassifier {
            backbone: backbone.freeze(),
            hidden: LinearConfig::new(features, self.hidden_units).init(device),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    /// Classifier with a randomly initialised backbone; weights are
    /// expected to be loaded afterwards
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransferClassifier<B> {
        self.init_with(self.backbone().init(device), device)
    }
}

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    backbone: Vgg16Features<B>,
    hidden: Linear<B>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> TransferClassifier<B> {
    /// Class logits, `[batch, classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);

        // Global max-pool over the spatial dimensions
        let [batch, channels, _, _] = features.dims();
        let pooled = features.max_dim(3).max_dim(2).reshape([batch, channels]);

        let x = self.activation.forward(self.hidden.forward(pooled));
        self.output.forward(x)
    }

    /// Class probabilities, `[batch, classes]`
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        activation::softmax(self.forward(images), 1)
    }
}

/// Mean categorical cross-entropy of `logits` against one-hot `targets`
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let log_probs = activation::log_softmax(logits, 1);
    (log_probs * targets).sum_dim(1).mean().neg()
}

/// Number of rows whose highest logit is at the index in `labels`
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    let [batch, _] = logits.dims();
    let predicted = logits.argmax(1).reshape([batch]);
    let correct: i64 = predicted.equal(labels).int().sum().into_scalar().elem();
    correct as usize
}
