//! Configuration management for Kilns.

mod settings;

pub use settings::{
    ExpansionSettings, ExpansionStrategy, GeneralSettings, SearchSettings, Settings, StoreSettings,
};
