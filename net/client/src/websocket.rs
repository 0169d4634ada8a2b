//! WebSocket client stack.
//!
//! The session drives RFC 6455 client framing over a plain or TLS stream,
//! with permessage-deflate (RFC 7692) negotiated per session, ping/pong,
//! fragmented messages, auto-reconnect and a keep-alive pool. The wire layer
//! lives in-crate because the session owns frame-level concerns: the RSV1
//! compression bit, per-message compression accounting and the close
//! handshake.

mod private {}

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
crate::mod_interface!
{
  /// Frame encoding and incremental decoding.
  layer frame;
  /// permessage-deflate configuration, codecs and statistics.
  layer compression;
  /// Reconnect policy with exponential backoff.
  layer reconnect;
  /// The session itself.
  layer session;
  /// Keep-alive connection pool.
  #[ cfg( feature = "websocket_pool" ) ]
  layer pool;
}
