//! VGG16 convolutional backbone (no classifier top)

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{backend::Backend, Tensor},
};
use nemo_core::NemoError;
use std::path::Path;

/// Convolutions per block and the channel multiple of each block
const BLOCKS: [(usize, usize); 5] = [(2, 1), (2, 2), (3, 4), (3, 8), (3, 8)];

#[derive(Config, Debug)]
pub struct Vgg16Config {
    /// Channels of the first block; later blocks use 2x, 4x, 8x, 8x
    #[config(default = 64)]
    pub width: usize,
}

impl Vgg16Config {
    /// Channels of the final feature map
    pub fn out_channels(&self) -> usize {
        self.width * BLOCKS[BLOCKS.len() - 1].1
    }

    /// Randomly initialised backbone
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16Features<B> {
        let mut in_channels = 3;
        let blocks = BLOCKS
            .iter()
            .map(|&(convs, multiple)| {
                let out_channels = self.width * multiple;
                let block = VggBlock::new(in_channels, out_channels, convs, device);
                in_channels = out_channels;
                block
            })
            .collect();

        Vgg16Features { blocks }
    }
}

/// 3x3 same-padded convolutions with ReLU, then a 2x2 max-pool
#[derive(Module, Debug)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> VggBlock<B> {
    fn new(in_channels: usize, out_channels: usize, convs: usize, device: &B::Device) -> Self {
        let convs = (0..convs)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                Conv2dConfig::new([input, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Same)
                    .init(device)
            })
            .collect();

        Self {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self
            .convs
            .iter()
            .fold(x, |x, conv| self.activation.forward(conv.forward(x)));
        self.pool.forward(x)
    }
}

/// The 13 convolution layers of VGG16 in five pooled blocks
#[derive(Module, Debug)]
pub struct Vgg16Features<B: Backend> {
    blocks: Vec<VggBlock<B>>,
}

impl<B: Backend> Vgg16Features<B> {
    /// `[batch, 3, h, w]` -> `[batch, 8 * width, h / 32, w / 32]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(images, |x, block| block.forward(x))
    }

    /// Replace the weights with pretrained ones from a burn record file
    pub fn load_pretrained<P: AsRef<Path>>(
        self,
        path: P,
        device: &B::Device,
    ) -> nemo_core::Result<Self> {
        let path = path.as_ref();
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| NemoError::Model(format!("failed to load backbone {:?}: {:?}", path, e)))
    }

    /// Exclude every backbone parameter from gradient updates
    pub fn freeze(self) -> Self {
        self.no_grad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_map_shape() {
        let device = Default::default();
        let config = Vgg16Config::new().with_width(2);
        let backbone = config.init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let features = backbone.forward(images);

        assert_eq!(features.dims(), [2, config.out_channels(), 2, 2]);
        assert_eq!(config.out_channels(), 16);
    }

    #[test]
    fn test_full_width_layer_count() {
        let device = Default::default();
        let backbone = Vgg16Config::new().init::<TestBackend>(&device);

        let convs: usize = backbone.blocks.iter().map(|b| b.convs.len()).sum();
        assert_eq!(convs, 13);
        // VGG16 without its top has 14,714,688 parameters
        assert_eq!(backbone.num_params(), 14_714_688);
    }

    #[test]
    fn test_load_pretrained_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.mpk");
        let config = Vgg16Config::new().with_width(2);

        let original = config.init::<TestBackend>(&device);
        original
            .clone()
            .save_file(path.clone(), &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
            .unwrap();

        let images = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = original.forward(images.clone()).into_data().to_vec::<f32>().unwrap();

        let loaded = config
            .init::<TestBackend>(&device)
            .load_pretrained(&path, &device)
            .unwrap();
        let actual = loaded.forward(images).into_data().to_vec::<f32>().unwrap();

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_load_pretrained_missing_file() {
        let device = Default::default();
        let result = Vgg16Config::new()
            .with_width(2)
            .init::<TestBackend>(&device)
            .load_pretrained("/no/such/backbone.mpk", &device);
        assert!(matches!(result, Err(NemoError::Model(_))));
    }
}
