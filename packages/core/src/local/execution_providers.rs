//! Execution Provider Configuration for ONNX Runtime
//!
//! Registers the best available hardware backend once per process. Phones
//! get CoreML (Apple) or XNNPACK (ARM), desktop builds may get CUDA. CPU is
//! always the final fallback.
//!
//! Call [`initialize_ort`] at app startup, before the first model load.
//! Calling it again is a no-op that returns the cached info.

use std::sync::OnceLock;

/// Information about the active execution providers after initialization
#[derive(Debug, Clone, Default)]
pub struct ExecutionProviderInfo {
    /// Active execution providers in priority order
    pub active_providers: Vec<String>,
    /// Whether any GPU/NPU acceleration is active
    pub accelerated: bool,
    pub warnings: Vec<String>,
}

static EP_INFO: OnceLock<ExecutionProviderInfo> = OnceLock::new();

pub fn initialize_ort() -> ExecutionProviderInfo {
    EP_INFO.get_or_init(do_initialize_ort).clone()
}

pub fn is_initialized() -> bool {
    EP_INFO.get().is_some()
}

pub fn get_ep_info() -> Option<ExecutionProviderInfo> {
    EP_INFO.get().cloned()
}

/// Collects the accelerated providers that are actually usable, in the
/// order they are offered.
#[cfg_attr(not(feature = "local-ml"), allow(dead_code))]
struct ProviderRegistry<D> {
    eps: Vec<D>,
    active_providers: Vec<String>,
    warnings: Vec<String>,
}

#[cfg_attr(not(feature = "local-ml"), allow(dead_code))]
impl<D> ProviderRegistry<D> {
    fn new() -> Self {
        Self {
            eps: Vec::new(),
            active_providers: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn offer(&mut self, name: &str, available: bool, missing: &str, build: impl FnOnce() -> D) {
        if available {
            tracing::info!(provider = name, "Execution provider available");
            self.eps.push(build());
            self.active_providers.push(name.to_string());
        } else {
            tracing::warn!(provider = name, "{}", missing);
            self.warnings.push(missing.to_string());
        }
    }

    /// CPU always closes the list.
    fn finish(mut self) -> (Vec<D>, ExecutionProviderInfo) {
        self.active_providers.push("CPU".to_string());
        let accelerated = self.active_providers.iter().any(|p| p != "CPU");
        let info = ExecutionProviderInfo {
            active_providers: self.active_providers,
            accelerated,
            warnings: self.warnings,
        };
        (self.eps, info)
    }
}

#[cfg(feature = "local-ml")]
fn do_initialize_ort() -> ExecutionProviderInfo {
    #[allow(unused_imports)]
    use ort::execution_providers::{ExecutionProvider, ExecutionProviderDispatch};
    use tracing::info;

    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::<ExecutionProviderDispatch>::new();

    // CUDA > CoreML > XNNPACK > CPU
    #[cfg(feature = "cuda")]
    {
        let ep = ort::execution_providers::CUDAExecutionProvider::default();
        let available = matches!(ep.is_available(), Ok(true));
        registry.offer(
            "CUDA",
            available,
            "CUDA feature enabled but runtime not available",
            || ep.build(),
        );
    }

    #[cfg(feature = "coreml")]
    {
        let ep = ort::execution_providers::CoreMLExecutionProvider::default();
        let available = matches!(ep.is_available(), Ok(true));
        registry.offer(
            "CoreML",
            available,
            "CoreML feature enabled but not on Apple platform",
            || ep.build(),
        );
    }

    #[cfg(feature = "xnnpack")]
    {
        let ep = ort::execution_providers::XNNPACKExecutionProvider::default();
        let available = matches!(ep.is_available(), Ok(true));
        registry.offer(
            "XNNPACK",
            available,
            "XNNPACK feature enabled but not available",
            || ep.build(),
        );
    }

    let (eps, info) = registry.finish();
    if eps.is_empty() {
        info!("No GPU/NPU acceleration available, using CPU");
        let _ = ort::init().commit();
    } else {
        info!(
            "Initializing ORT with execution providers: {:?}",
            info.active_providers
        );
        let _ = ort::init().with_execution_providers(eps).commit();
    }

    info
}

#[cfg(not(feature = "local-ml"))]
fn do_initialize_ort() -> ExecutionProviderInfo {
    ExecutionProviderInfo {
        active_providers: vec!["none (local-ml feature disabled)".to_string()],
        accelerated: false,
        warnings: vec!["local-ml feature not enabled".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let first = initialize_ort();
        assert!(is_initialized());
        let second = initialize_ort();
        assert_eq!(first.active_providers, second.active_providers);
        assert_eq!(get_ep_info().map(|i| i.accelerated), Some(first.accelerated));
    }

    #[test]
    fn test_registry_keeps_available_providers_in_order() {
        let mut registry = ProviderRegistry::new();
        registry.offer("CUDA", false, "CUDA runtime missing", || "cuda");
        registry.offer("CoreML", true, "unused", || "coreml");
        registry.offer("XNNPACK", true, "unused", || "xnnpack");

        let (eps, info) = registry.finish();
        assert_eq!(eps, vec!["coreml", "xnnpack"]);
        assert_eq!(info.active_providers, vec!["CoreML", "XNNPACK", "CPU"]);
        assert!(info.accelerated);
        assert_eq!(info.warnings, vec!["CUDA runtime missing"]);

        let (eps, info) = ProviderRegistry::<&str>::new().finish();
        assert!(eps.is_empty());
        assert_eq!(info.active_providers, vec!["CPU"]);
        assert!(!info.accelerated);
    }
}
