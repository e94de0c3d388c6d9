//! Selects the native-tool-use or ReAct adapter for a given [`RawBackend`].

use std::sync::Arc;

use super::native::NativeToolUseProvider;
use super::provider::{LLMProvider, RawBackend};
use super::react_fallback::ReactProvider;

/// Wrap `backend` in whichever adapter matches its declared tool-calling
/// support. Vendor SDKs report this via [`RawBackend::supports_native_tools`];
/// the factory itself carries no vendor-specific knowledge.
pub fn build_provider(backend: Arc<dyn RawBackend>) -> Arc<dyn LLMProvider> {
    if backend.supports_native_tools() {
        Arc::new(NativeToolUseProvider::new(backend))
    } else {
        Arc::new(ReactProvider::new(backend))
    }
}
