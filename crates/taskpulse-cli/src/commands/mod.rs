pub mod config;
pub mod decide;
pub mod prefs;
pub mod send;
