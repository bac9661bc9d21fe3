use crate::db::history_repository::HistoryRepository;
use crate::db::settings_repository::SettingsRepository;
use crate::relay::RelayCoordinator;

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: RelayCoordinator,
    pub history: HistoryRepository,
    pub settings: SettingsRepository,
}
