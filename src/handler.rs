//! Application callbacks for an upgraded endpoint.

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::Session;

/// Callbacks invoked by a [`Session`] as its lifecycle progresses.
///
/// Callbacks run on dispatch workers, never on the read path, so they may
/// await freely. Every method has an empty default so implementors only
/// override what they need.
///
/// ```
/// use async_trait::async_trait;
/// use wiresocket::{handler::MessageHandler, session::Session};
///
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn on_text(&self, text: &str, session: &Session) {
///         session.send_text_data(text);
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// The session reached OPEN.
    async fn on_open(&self, _session: &Session) {}

    /// A complete text message arrived.
    async fn on_text(&self, _text: &str, _session: &Session) {}

    /// A complete binary message arrived.
    async fn on_binary(&self, _data: &Bytes, _session: &Session) {}

    /// The session closed. Called at most once per session.
    async fn on_close(&self, _session: &Session) {}
}
