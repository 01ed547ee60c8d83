pub mod error;
pub mod settings;

pub use error::SettingsError;
pub use settings::Settings;
