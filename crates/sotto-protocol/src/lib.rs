pub mod context;
pub mod messages;
pub mod providers;

pub use context::{
    ActiveAppContextSnapshot, FocusConfidenceLevel, FocusEventSource, FocusedApplication,
    FocusedBrowserTab, FocusedWindow,
};
pub use messages::{
    parse_client_message, ClientMessage, KnownClientMessage, PromptSectionsData, ServerMessage,
    SettingName, StartRecordingData,
};
pub use providers::{LlmProviderId, SttProviderId};
