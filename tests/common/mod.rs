//! Common test utilities

use std::sync::{Arc, Mutex};

use flashfeed::models::Event;
use flashfeed::sink::PresentationSink;
use serde_json::json;

/// Create an event with default display fields
pub fn event(id: &str, occurred_at: i64) -> Event {
    Event {
        id: id.to_string(),
        occurred_at,
        actor: format!("PLAYER_{id}"),
        location: "Paris".to_string(),
        payload_ref: format!("/media/{id}.jpg"),
        caption: format!("PA_{id}"),
    }
}

/// Batch JSON in the upstream wire format
pub fn batch_json(flash_count: &str, player_count: &str, events: &[Event]) -> String {
    json!({
        "flash_count": flash_count,
        "player_count": player_count,
        "with_paris": events,
    })
    .to_string()
}

/// HTML page embedding `json` the way the upstream page does
#[allow(dead_code)]
pub fn embedded_page(json: &str) -> String {
    let mut literal = String::with_capacity(json.len() * 2);
    for ch in json.chars() {
        match ch {
            '"' | '/' | '<' | '>' | '&' | '\'' | '=' | ':' | ',' | '{' | '}' | '[' | ']' => {
                literal.push_str(&format!("\\u{:04X}", ch as u32));
            }
            _ => literal.push(ch),
        }
    }

    format!(
        "<!DOCTYPE html>\n<html><head><script>\nvar flashData = JSON.parse('{literal}');\n</script></head>\n<body><div id=\"map\"></div></body></html>"
    )
}

/// Everything a [`RecordingSink`] has seen
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub initial: Vec<Vec<Event>>,
    pub delivered: Vec<Event>,
    pub stats: Vec<(u64, u64)>,
    pub endpoints: Vec<String>,
    pub depths: Vec<usize>,
    pub messages: Vec<String>,
}

impl Recorded {
    #[allow(dead_code)]
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered.iter().map(|e| e.id.clone()).collect()
    }
}

/// Sink that records every call; clones share the same record
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Recorded {
        self.inner.lock().unwrap().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn on_initial_batch(&mut self, events: &[Event]) {
        self.inner.lock().unwrap().initial.push(events.to_vec());
    }

    fn on_new_event_delivered(&mut self, event: &Event) {
        self.inner.lock().unwrap().delivered.push(event.clone());
    }

    fn on_stats_updated(&mut self, total_events: u64, total_actors: u64) {
        self.inner
            .lock()
            .unwrap()
            .stats
            .push((total_events, total_actors));
    }

    fn on_endpoint_changed(&mut self, name: &str) {
        self.inner.lock().unwrap().endpoints.push(name.to_string());
    }

    fn on_buffer_depth_changed(&mut self, count: usize) {
        self.inner.lock().unwrap().depths.push(count);
    }

    fn on_status_message(&mut self, message: &str) {
        self.inner.lock().unwrap().messages.push(message.to_string());
    }
}
