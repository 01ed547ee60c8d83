pub mod registry;

pub use registry::{Credentials, LlmHandle, ProviderError, ProviderRegistry, SttHandle};
