pub mod preferences;

pub use preferences::{
    EditorPreferences, Preferences, PreferencesError, PreferencesStore, PreviewPreferences,
    ProjectPreferences, SavePolicy,
};
