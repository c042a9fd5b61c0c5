use crate::domain::customer::CustomerId;
use crate::domain::order::MediaRef;
use crate::error::{Result, ShopError};
use crate::interfaces::commands::Action;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// First contact; `data` is the display name.
    Start,
    /// A text message or slash command.
    Text,
    /// A button press; `data` is the callback payload.
    Callback,
    /// A photo; `data` is the media reference.
    Photo,
}

/// One recorded chat event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatEvent {
    pub event: EventKind,
    pub actor: i64,
    #[serde(default)]
    pub data: String,
}

impl ChatEvent {
    pub fn actor(&self) -> CustomerId {
        CustomerId(self.actor)
    }

    pub fn into_action(self) -> Result<Action> {
        match self.event {
            EventKind::Start => Ok(Action::Start {
                display_name: self.data,
            }),
            EventKind::Text => Action::parse_text(&self.data),
            EventKind::Callback => Action::parse_callback(&self.data),
            EventKind::Photo if self.data.trim().is_empty() => Err(ShopError::ValidationError(
                "photo event without a media reference".to_string(),
            )),
            EventKind::Photo => Ok(Action::Photo(MediaRef(self.data))),
        }
    }
}

/// Reads chat events from a CSV source with an `event,actor,data` header.
///
/// Fields are trimmed and records may omit `data`.
pub struct EventReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes events; a bad row yields an error and reading
    /// continues with the next one.
    pub fn events(self) -> impl Iterator<Item = Result<ChatEvent>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(ShopError::from))
    }
}
