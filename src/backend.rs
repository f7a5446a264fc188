//! Burn backend selection

use burn::backend::Autodiff;

#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray<f32>;

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn::backend::Wgpu;

/// Backend used while fitting the classifier head
pub type TrainingBackend = Autodiff<InferenceBackend>;

pub fn default_device() -> <InferenceBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}

pub fn backend_name() -> &'static str {
    #[cfg(feature = "wgpu")]
    {
        "wgpu"
    }
    #[cfg(not(feature = "wgpu"))]
    {
        "ndarray (CPU)"
    }
}
