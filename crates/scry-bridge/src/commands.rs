//! Inbound overlay commands.

use scry_protocol::ClientMessage;

use crate::settings::SharedSettings;

/// Work a command leaves for the bridge after the settings were updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Followup {
    /// Nothing else to do.
    None,
    /// Hand the new watch list to the scan worker.
    WatchList(Vec<String>),
    /// Stop the feed; with `fully` it stays down until reset.
    Disable {
        /// Permanent until reset.
        fully: bool,
    },
}

/// Apply `message` to `settings`.
pub fn apply(settings: &SharedSettings, message: ClientMessage) -> Followup {
    match message {
        ClientMessage::ModuleStates(batch) => {
            tracing::debug!("Module states: {batch:?}");
            settings.modules.apply(batch);
            Followup::None
        }
        ClientMessage::WatchList(labels) => Followup::WatchList(labels),
        ClientMessage::EntityFilter {
            generic,
            all,
            names,
        } => {
            tracing::debug!(
                "Entity filter: generic={generic} all={all} names={}",
                names.len()
            );
            settings.filter.update(generic, all, names);
            Followup::None
        }
        ClientMessage::Hotkeys(keys) => {
            tracing::debug!("Watching hotkeys {keys:?}");
            settings.hotkeys.replace(keys);
            Followup::None
        }
        ClientMessage::Disable { fully } => Followup::Disable { fully },
    }
}
