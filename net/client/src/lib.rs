#![ doc( html_root_url = "https://docs.rs/net_client/latest/net_client/" ) ]

//! High-level HTTP(S) and WebSocket client runtime.
//!
//! The crate wraps an HTTP engine in an ergonomic, policy-driven API aimed at
//! service and GUI applications: an access manager hands out replies whose
//! lifecycle is safe across cancellation, retries, redirects and connection
//! reuse, a priority scheduler enforces concurrency and bandwidth budgets, an
//! HTTP cache (memory and disk) honors per-request cache policies, and a
//! WebSocket session covers handshake, framing, permessage-deflate and
//! auto-reconnect.
//!
//! # Architecture
//!
//! - [`AccessManager`] is the factory and policy container. It owns the
//!   multi-transfer driver, the engine client pool and the scheduler, and
//!   shares cache, logger, middlewares and cookie store with every reply.
//! - [`Reply`] is the per-request execution unit: a small state machine with
//!   typed callbacks, byte counters, retry and cache glue.
//! - [`RequestScheduler`] multiplexes replies through priority queues with
//!   global, per-host and bandwidth admission gates.
//! - [`WebSocketSession`] drives RFC 6455 client framing with RFC 7692
//!   compression, and [`WebSocketPool`] reuses connected sessions.
//!
//! # Example
//!
//! ```no_run
//! use net_client::{ AccessManager, Request };
//!
//! # async fn example() -> Result< (), net_client::NetworkError > {
//! let manager = AccessManager::new();
//! let reply = manager.send_get( Request::new( "https://example.com/data.json" ) )?;
//! reply.wait_finished().await;
//! assert_eq!( reply.status_code(), 200 );
//! let body = reply.read_all();
//! println!( "{} bytes", body.len() );
//! # Ok( () )
//! # }
//! ```

#[ cfg( feature = "enabled" ) ]
use mod_interface::mod_interface;

mod private {}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  layer error;
  layer ssl;
  layer proxy;
  layer timeout;
  layer http_version;
  layer priority;
  layer cache_policy;
  layer retry;
  layer request;
  layer builder;
  layer cookie;
  layer events;
  layer handle;
  layer engine;
  layer multi;
  layer cache;
  layer cache_memory;
  #[ cfg( feature = "disk_cache" ) ]
  layer cache_disk;
  layer middleware;
  layer logger;
  layer cancel_token;
  #[ cfg( feature = "mock_handler" ) ]
  layer mock;
  layer reply;
  layer pool;
  layer scheduler;
  layer manager;
  #[ cfg( feature = "sync_api" ) ]
  layer sync_api;
  #[ cfg( feature = "websocket" ) ]
  layer websocket;
}
