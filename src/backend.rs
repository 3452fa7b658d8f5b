//! Backend abstraction - Multi-backend support
//!
//! NdArray (CPU) is always available; `--features wgpu` or `--features cuda`
//! switches the default to a GPU backend.

use burn::backend::Autodiff;

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA, then WGPU, then NdArray
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
pub type DefaultBackend = burn::backend::Wgpu;

#[cfg(all(not(feature = "cuda"), not(feature = "wgpu")))]
pub type DefaultBackend = burn::backend::NdArray;

/// The default autodiff backend for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    <DefaultBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "wgpu"))]
    {
        "WGPU (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), not(feature = "wgpu")))]
    {
        "NdArray (CPU)"
    }
}
