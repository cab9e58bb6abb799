//! Progress events emitted by the orchestrator for the hosting UI.

use chrono::Local;
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Upload,
    Launch,
    Status,
    Completed,
    Error,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub msg: String,
    pub timestamp: String,
    pub event_type: EventType,
}

impl Event {
    pub fn new(msg: String, event_type: EventType) -> Self {
        Self {
            msg,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            event_type,
        }
    }

    pub fn upload(msg: String) -> Self {
        Self::new(msg, EventType::Upload)
    }

    pub fn launch(msg: String) -> Self {
        Self::new(msg, EventType::Launch)
    }

    pub fn status(msg: String) -> Self {
        Self::new(msg, EventType::Status)
    }

    pub fn completed(msg: String) -> Self {
        Self::new(msg, EventType::Completed)
    }

    pub fn error(msg: String) -> Self {
        Self::new(msg, EventType::Error)
    }

    pub fn shutdown(msg: String) -> Self {
        Self::new(msg, EventType::Shutdown)
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.event_type {
            EventType::Upload => "Upload",
            EventType::Launch => "Launch",
            EventType::Status => "Status",
            EventType::Completed => "Done",
            EventType::Error => "Error",
            EventType::Shutdown => "Shutdown",
        };
        write!(f, "{} [{}] {}", self.timestamp, tag, self.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_tag_and_message() {
        let event = Event::launch("Started gifdroid".to_string());
        let line = event.to_string();
        assert!(line.contains("[Launch] Started gifdroid"));
        assert!(line.starts_with(&event.timestamp));
    }
}
