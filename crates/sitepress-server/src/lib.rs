//! Development server for sitepress.
//!
//! Serves the output directory, rebuilds the whole site whenever a watched
//! file changes and tells connected browsers to reload over a WebSocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError, SiteBuilder};
pub use watcher::{FileWatcher, WatchEvent};
pub use websocket::{ReloadHub, ReloadMessage};
