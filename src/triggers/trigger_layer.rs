// Trigger layer - push-delivered events from the outside world, dispatched
// into the core services.

#[path = "events.rs"]
pub mod events;

#[path = "http.rs"]
pub mod http;
