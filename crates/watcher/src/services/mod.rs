// Path: crates/watcher/src/services/mod.rs
//! Production adapters for the collaborator traits in `telewatch-api`.

/// Activity REST client.
pub mod activity;
/// Alert delivery backends.
pub mod notifier;
/// Secret providers.
pub mod secrets;
/// Session catalog backends.
pub mod sessions;

pub use activity::HttpActivityService;
pub use notifier::{notifier_from_config, LogNotifier, WebhookNotifier};
pub use secrets::{secrets_from_config, EnvSecretProvider, FileSecretProvider};
pub use sessions::JsonFileSessionStore;

/// Keeps error bodies readable in logs.
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 256;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", trimmed.get(..cut).unwrap_or(trimmed)),
        None => trimmed.to_string(),
    }
}
