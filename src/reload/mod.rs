//! Live reload.
//!
//! ```text
//! executor workers --publish--> ChangeFeed --subscribe--> ReloadServer --ws--> clients
//! ```
//!
//! - `feed` - in-process publish/subscribe hub for build events
//! - `message` - JSON wire messages (update, error, connected, reload)
//! - `server` - websocket server broadcasting feed events

pub mod feed;
pub mod message;
pub mod server;

pub use feed::{BuildEvent, ChangeEvent, ChangeFeed};
pub use message::HotReloadMessage;
pub use server::ReloadServer;
