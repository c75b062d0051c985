pub mod command_tts;
pub mod config;
pub mod console;
pub mod question_loader;
pub mod report;
pub mod summary_store;
