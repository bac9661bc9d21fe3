pub mod history_repository;
pub mod settings_repository;
