pub mod state;

pub use state::{
    API_KEY_ENV_VAR, SETTINGS_DIRECTORY_NAME, SETTINGS_FILE_NAME, Settings, SettingsError,
    SettingsStore,
};
