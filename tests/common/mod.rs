//! Common test utilities for jitcell integration tests

use std::sync::Arc;

#[allow(unused_imports)]
pub use jitcell::testing::{RecordingPublisher, ScriptedBackend};
#[allow(unused_imports)]
pub use jitcell::{BackendFault, Kernel, KernelConfig, PublishEvent, StreamName, Submission};

/// A kernel over `backend` with the default configuration
pub fn kernel(backend: ScriptedBackend) -> (Kernel<ScriptedBackend>, Arc<RecordingPublisher>) {
    kernel_with(backend, KernelConfig::default())
}

#[allow(dead_code)]
pub fn kernel_with(
    backend: ScriptedBackend,
    config: KernelConfig,
) -> (Kernel<ScriptedBackend>, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let kernel = Kernel::new(backend, publisher.clone(), config).unwrap();
    (kernel, publisher)
}
