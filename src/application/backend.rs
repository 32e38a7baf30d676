// ============================================================
// Layer 2 — Backend Dispatch
// ============================================================
// Every use case is generic over the Burn backend. The concrete
// backend is picked once, here, from the run configuration:
//
//   wgpu    → Autodiff<Wgpu>     (GPU through WebGPU)
//   ndarray → Autodiff<NdArray>  (CPU)
//
// The device is created here and handed down explicitly; nothing
// below this point looks up a global device.
//
// Reference: Burn Book §2 (Backends)

use anyhow::Result;
use burn::{
    backend::{
        ndarray::{NdArray, NdArrayDevice},
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    },
    tensor::backend::AutodiffBackend,
};

use crate::application::config::BackendKind;

/// A job that can run on any autodiff backend.
pub trait BackendJob {
    type Output;

    fn run<B: AutodiffBackend>(self, device: B::Device) -> Result<Self::Output>;
}

pub fn dispatch<J: BackendJob>(kind: BackendKind, job: J) -> Result<J::Output> {
    match kind {
        BackendKind::Wgpu => {
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            job.run::<Autodiff<Wgpu>>(device)
        }
        BackendKind::Ndarray => {
            let device = NdArrayDevice::default();
            tracing::info!("Using NdArray device: {:?}", device);
            job.run::<Autodiff<NdArray>>(device)
        }
    }
}
