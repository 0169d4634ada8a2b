//! Tests for the WebSocket pool limits and statistics.

#![ cfg( feature = "websocket_pool" ) ]

use std::sync::atomic::{ AtomicU32, Ordering };
use std::sync::Arc;

use net_client::{ WebSocketPool, WsPoolConfig };

#[ tokio::test ]
async fn total_ceiling_rejects_and_signals()
{
  let pool = WebSocketPool::new( WsPoolConfig
  {
    max_total_connections : 0,
    ..WsPoolConfig::default()
  } );

  let rejections = Arc::new( AtomicU32::new( 0 ) );
  let counter = Arc::clone( &rejections );
  pool.on_pool_limit_reached( move | url |
  {
    assert_eq!( url, "wss://echo.example/" );
    counter.fetch_add( 1, Ordering::SeqCst );
  } );

  assert!( pool.acquire( "wss://echo.example/" ).await.is_err() );
  assert_eq!( rejections.load( Ordering::SeqCst ), 1 );

  let stats = pool.statistics();
  assert_eq!( stats.limit_rejections, 1 );
  assert_eq!( stats.misses, 1 );
  assert_eq!( stats.created, 0 );
}

#[ tokio::test ]
async fn per_url_ceiling_is_independent_of_the_total()
{
  let pool = WebSocketPool::new( WsPoolConfig
  {
    max_total_connections : 100,
    max_connections_per_url : 0,
    ..WsPoolConfig::default()
  } );

  assert!( pool.acquire( "wss://echo.example/" ).await.is_err() );
  assert_eq!( pool.statistics().limit_rejections, 1 );
}

#[ tokio::test ]
async fn failed_opens_do_not_leak_pool_entries()
{
  let pool = WebSocketPool::new( WsPoolConfig::default() );
  // Unresolvable host: creation is attempted and the open fails.
  assert!( pool.acquire( "ws://host.invalid./socket" ).await.is_err() );

  let stats = pool.statistics();
  assert_eq!( stats.misses, 1 );
  assert_eq!( stats.created, 0 );
  assert_eq!( pool.active_count(), 0 );
  assert_eq!( pool.idle_count(), 0 );
}

#[ tokio::test ]
async fn empty_pool_reports_zero_counts()
{
  let pool = WebSocketPool::default();
  assert_eq!( pool.active_count(), 0 );
  assert_eq!( pool.idle_count(), 0 );
  let stats = pool.statistics();
  assert_eq!( stats.hits, 0 );
  assert_eq!( stats.misses, 0 );
  pool.clear();
}

#[ test ]
fn default_config_matches_documented_values()
{
  let config = WsPoolConfig::default();
  assert_eq!( config.max_total_connections, 20 );
  assert_eq!( config.max_connections_per_url, 5 );
  assert_eq!( config.min_idle_connections, 1 );
  assert!( config.keepalive_interval.is_none() );
}
