//! Unix Domain Socket transport for the bridge's call channel.
//!
//! ## Overview
//!
//! Every message is one JSON-encoded [`protocol::Envelope`] followed by a
//! newline. A client sends request envelopes; the bridge answers each with a
//! reply envelope carrying the same id. Replies may arrive out of request
//! order when calls overlap.
//!
//! ## Socket Path
//!
//! - Primary: `$XDG_RUNTIME_DIR/docbridge/bridge.sock`
//! - Fallback: `/tmp/docbridge-$UID/bridge.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use bridge::ipc::{get_socket_path, IpcClient};
//! use protocol::DocumentHandle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = IpcClient::connect(&get_socket_path()).await?;
//!     let metadata = client.get_metadata(&DocumentHandle::new("doc://1")).await?;
//!     println!("{} ({} bytes)", metadata.name, metadata.size_bytes);
//!     Ok(())
//! }
//! ```

mod client;
mod server;

pub use client::IpcClient;
pub use server::{IpcConnection, IpcError, IpcServer, MALFORMED_REQUEST_ID};

use std::path::PathBuf;

/// Get the socket path for IPC communication.
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/docbridge/bridge.sock`
/// 2. Otherwise: `/tmp/docbridge-$UID/bridge.sock`
#[cfg(unix)]
pub fn get_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir)
            .join("docbridge")
            .join("bridge.sock")
    } else {
        // Get UID by checking metadata of a file we own
        let uid = std::fs::metadata("/proc/self")
            .map(|m| m.uid())
            .unwrap_or(0);

        PathBuf::from(format!("/tmp/docbridge-{}", uid)).join("bridge.sock")
    }
}

/// Non-Unix platforms are not supported for Unix Domain Sockets.
#[cfg(not(unix))]
pub fn get_socket_path() -> PathBuf {
    PathBuf::from("/tmp/docbridge-unsupported/bridge.sock")
}
