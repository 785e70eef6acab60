//! Event catalog and structured event emission

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::error::EventLogError;

/// Destination for named events
pub trait EventSink: Send {
    /// Emits `name` with `{key}` placeholders replaced by `args`
    fn log_event(&self, name: &str, args: &[(&str, String)]) -> Result<(), EventLogError>;
}

/// Event identifier; catalogs carry either numbers or strings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventId::Number(n) => write!(f, "{}", n),
            EventId::Text(s) => f.write_str(s),
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventDefinition {
    #[serde(rename = "event_category")]
    pub category: String,
    #[serde(rename = "event_name")]
    pub name: String,
    #[serde(rename = "event_ID")]
    pub id: EventId,
    pub severity: String,
    #[serde(rename = "event_description_template")]
    pub description_template: String,
}

impl EventDefinition {
    /// Replaces every `{key}` occurrence with its value
    pub fn render(&self, args: &[(&str, String)]) -> String {
        args.iter()
            .fold(self.description_template.clone(), |desc, (key, value)| {
                desc.replace(&format!("{{{}}}", key), value)
            })
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    event_definitions: Vec<EventDefinition>,
}

/// Events of a single category
#[derive(Debug, Clone)]
pub struct EventCatalog {
    category: String,
    events: Vec<EventDefinition>,
}

impl EventCatalog {
    pub fn load(path: &Path, category: &str) -> Result<Self, EventLogError> {
        let content = fs::read_to_string(path).map_err(|source| EventLogError::CatalogIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content, category)
    }

    pub fn from_yaml(content: &str, category: &str) -> Result<Self, EventLogError> {
        let doc: CatalogDocument = serde_yaml::from_str(content)?;
        let events: Vec<_> = doc
            .event_definitions
            .into_iter()
            .filter(|def| def.category == category)
            .collect();

        if events.is_empty() {
            return Err(EventLogError::CategoryNotFound(category.to_string()));
        }

        debug!("Loaded {} events for category {}", events.len(), category);
        Ok(Self {
            category: category.to_string(),
            events,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&EventDefinition> {
        self.events.iter().find(|def| def.name == name)
    }
}

/// Emits catalog events through `tracing`
#[derive(Debug, Clone)]
pub struct EventLog {
    catalog: EventCatalog,
}

impl EventLog {
    pub fn new(catalog: EventCatalog) -> Self {
        Self { catalog }
    }

    pub fn init(path: &Path, category: &str) -> Result<Self, EventLogError> {
        EventCatalog::load(path, category).map(Self::new)
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }
}

impl EventSink for EventLog {
    fn log_event(&self, name: &str, args: &[(&str, String)]) -> Result<(), EventLogError> {
        let def = match self.catalog.get(name) {
            Some(def) => def,
            None => {
                error!("ops-evt|Unknown Event Name {}", name);
                return Err(EventLogError::EventNotFound(name.to_string()));
            }
        };

        let message = format!("ops-evt|{}|{}|{}", def.id, def.severity, def.render(args));
        let event_id = def.id.to_string();
        let category = def.category.as_str();

        match def.severity.trim_start_matches("LOG_") {
            "EMERG" | "ALERT" | "CRIT" | "ERR" => {
                error!(event_id = %event_id, category, "{}", message)
            }
            "WARN" | "WARNING" => warn!(event_id = %event_id, category, "{}", message),
            "DEBUG" => debug!(event_id = %event_id, category, "{}", message),
            _ => info!(event_id = %event_id, category, "{}", message),
        }

        Ok(())
    }
}
