//! Reply lifecycle tests driven through the mock handler: signal ordering,
//! terminal-state laws, retry loop and cache policies.

#![ cfg( feature = "mock_handler" ) ]

use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::atomic::{ AtomicU32, AtomicU64, Ordering };
use std::sync::Arc;

use net_client::
{
  AccessManager,
  CacheMetadata,
  CachePolicy,
  MemoryCache,
  MockHandler,
  NetworkCache,
  NetworkError,
  ReplyState,
  Request,
  RetryPolicy,
};

fn manager_with_mock() -> ( AccessManager, Arc< MockHandler > )
{
  let manager = AccessManager::new();
  let mock = Arc::new( MockHandler::new() );
  manager.set_mock_handler( Arc::clone( &mock ) );
  ( manager, mock )
}

#[ tokio::test ]
async fn mock_response_round_trips_status_headers_and_body()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response_with_headers
  (
    "https://mock/json",
    br#"{"ok":true}"#,
    200,
    vec![ ( "Content-Type".to_owned(), "application/json".to_owned() ) ],
  );

  let reply = manager.send_get( Request::new( "https://mock/json" ) ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Finished );
  assert_eq!( reply.status_code(), 200 );
  assert_eq!( reply.error(), NetworkError::NoError );
  assert_eq!( reply.header_value( "content-type" ).as_deref(), Some( "application/json" ) );
  assert!( String::from_utf8_lossy( &reply.raw_headers() ).starts_with( "HTTP/1.1 200" ) );
  assert_eq!( reply.read_all(), br#"{"ok":true}"#.to_vec() );
  assert_eq!( reply.bytes_available(), 0 );
}

#[ tokio::test ]
async fn finished_is_emitted_exactly_once()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response( "https://mock/once", b"payload" );

  let finished_count = Arc::new( AtomicU32::new( 0 ) );
  let reply = manager.send_get( Request::new( "https://mock/once" ) ).unwrap();
  let counter = Arc::clone( &finished_count );
  reply.on_finished( move || { counter.fetch_add( 1, Ordering::SeqCst ); } );

  reply.wait_finished().await;
  // A late cancel and a second wait must not re-emit.
  reply.cancel();
  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 20 ) ).await;

  assert_eq!( finished_count.load( Ordering::SeqCst ), 1 );
  assert_eq!( reply.state(), ReplyState::Finished );
}

#[ tokio::test ]
async fn cancel_on_terminal_reply_is_a_no_op()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_error( "https://mock/fail", NetworkError::HttpNotFound );

  let reply = manager.send_get( Request::new( "https://mock/fail" ) ).unwrap();
  reply.wait_finished().await;
  assert_eq!( reply.state(), ReplyState::Error );
  assert_eq!( reply.error(), NetworkError::HttpNotFound );

  reply.cancel();
  assert_eq!( reply.state(), ReplyState::Error );
  assert_eq!( reply.error(), NetworkError::HttpNotFound );
}

#[ tokio::test ]
async fn ready_read_and_progress_precede_finished()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response( "https://mock/order", b"0123456789" );

  // Event log: 1 = ready_read, 2 = progress, 3 = finished.
  let log = Arc::new( parking_lot::Mutex::new( Vec::< u8 >::new() ) );
  let reply = manager.send_get( Request::new( "https://mock/order" ) ).unwrap();
  let sink = Arc::clone( &log );
  reply.on_ready_read( move || sink.lock().push( 1 ) );
  let sink = Arc::clone( &log );
  reply.on_download_progress_signal( move | _received, _total | sink.lock().push( 2 ) );
  let sink = Arc::clone( &log );
  reply.on_finished( move || sink.lock().push( 3 ) );

  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 10 ) ).await;

  let events = log.lock().clone();
  let finished_at = events.iter().position( | event | *event == 3 ).unwrap();
  assert!( events.iter().take( finished_at ).any( | event | *event == 1 ) );
  assert!( events.iter().take( finished_at ).any( | event | *event == 2 ) );
  assert!( events.iter().skip( finished_at + 1 ).next().is_none() );
}

#[ tokio::test ]
async fn cancellation_emits_cancelled_then_finished()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response( "https://mock/slow", b"late" );
  mock.set_global_delay( Duration::from_millis( 300 ) );

  let log = Arc::new( parking_lot::Mutex::new( Vec::< &'static str >::new() ) );
  let reply = manager.send_get( Request::new( "https://mock/slow" ) ).unwrap();
  let sink = Arc::clone( &log );
  reply.on_cancelled( move || sink.lock().push( "cancelled" ) );
  let sink = Arc::clone( &log );
  reply.on_finished( move || sink.lock().push( "finished" ) );

  reply.cancel();
  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 350 ) ).await;

  assert_eq!( log.lock().clone(), vec![ "cancelled", "finished" ] );
  assert_eq!( reply.state(), ReplyState::Cancelled );
  assert_eq!( reply.error(), NetworkError::OperationCancelled );
}

#[ tokio::test ]
async fn http_error_statuses_map_to_error_kinds()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response_with_status( "https://mock/503", b"overloaded", 503 );

  let reply = manager.send_get( Request::new( "https://mock/503" ) ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Error );
  assert_eq!( reply.error(), NetworkError::HttpServiceUnavailable );
  assert_eq!( reply.status_code(), 503 );
  assert!( !reply.error_string().is_empty() );
}

#[ tokio::test ]
async fn retry_loop_runs_the_documented_number_of_attempts()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response_with_status( "https://mock/always-503", b"", 503 );

  let mut request = Request::new( "https://mock/always-503" );
  request.set_retry_policy
  (
    RetryPolicy::no_retry()
      .with_max_retries( 3 )
      .with_initial_delay( Duration::from_millis( 10 ) )
      .with_backoff_multiplier( 2.0 ),
  );

  let retries = Arc::new( AtomicU32::new( 0 ) );
  let reply = manager.send_get( request ).unwrap();
  let counter = Arc::clone( &retries );
  reply.on_retry_attempt( move | _attempt, _delay | { counter.fetch_add( 1, Ordering::SeqCst ); } );

  reply.wait_finished().await;

  assert_eq!( retries.load( Ordering::SeqCst ), 3 );
  assert_eq!( reply.attempt_count(), 3 );
  assert_eq!( reply.state(), ReplyState::Error );
  assert_eq!( reply.error(), NetworkError::HttpServiceUnavailable );
}

#[ tokio::test ]
async fn retry_delays_follow_the_backoff_schedule()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response_with_status( "https://mock/backoff", b"", 503 );

  let mut request = Request::new( "https://mock/backoff" );
  request.set_retry_policy
  (
    RetryPolicy::no_retry()
      .with_max_retries( 3 )
      .with_initial_delay( Duration::from_millis( 100 ) )
      .with_backoff_multiplier( 2.0 )
      .with_max_delay( Duration::from_millis( 1000 ) ),
  );

  let delays = Arc::new( parking_lot::Mutex::new( Vec::< Duration >::new() ) );
  let reply = manager.send_get( request ).unwrap();
  let sink = Arc::clone( &delays );
  reply.on_retry_attempt( move | _attempt, delay | sink.lock().push( delay ) );

  let started = std::time::Instant::now();
  reply.wait_finished().await;
  let elapsed = started.elapsed();

  assert_eq!
  (
    delays.lock().clone(),
    vec!
    [
      Duration::from_millis( 100 ),
      Duration::from_millis( 200 ),
      Duration::from_millis( 400 ),
    ],
  );
  // The sum of the scheduled delays bounds the wall clock from below.
  assert!( elapsed >= Duration::from_millis( 700 ) );
}

#[ tokio::test ]
async fn non_retryable_errors_fail_immediately()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response_with_status( "https://mock/404", b"", 404 );

  let mut request = Request::new( "https://mock/404" );
  request.set_retry_policy( RetryPolicy::standard() );

  let reply = manager.send_get( request ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.attempt_count(), 0 );
  assert_eq!( reply.error(), NetworkError::HttpNotFound );
}

#[ tokio::test ]
async fn prefer_cache_serves_fresh_entries_without_network()
{
  let manager = AccessManager::new();
  let cache : Arc< dyn NetworkCache > = Arc::new( MemoryCache::new( 1024 * 1024 ) );
  manager.set_cache( Arc::clone( &cache ) );

  let mut headers = BTreeMap::new();
  headers.insert( "Cache-Control".to_owned(), "max-age=60".to_owned() );
  let body = b"cached body bytes".to_vec();
  let metadata = CacheMetadata::from_response_headers( "https://x/y", body.len() as u64, headers );
  assert!( cache.insert( "https://x/y", &body, metadata ) );

  let finished_count = Arc::new( AtomicU64::new( 0 ) );
  let mut request = Request::new( "https://x/y" );
  request.set_cache_policy( CachePolicy::PreferCache );
  let reply = manager.send_get( request ).unwrap();
  let counter = Arc::clone( &finished_count );
  reply.on_finished( move || { counter.fetch_add( 1, Ordering::SeqCst ); } );

  // Serving from cache is synchronous; the reply is already terminal.
  assert!( reply.is_finished() );
  assert!( reply.served_from_cache() );
  assert_eq!( reply.status_code(), 200 );
  assert_eq!( reply.read_all(), body );
  // The handler connected after completion never fires; completion happened
  // exactly once before it was attached.
  assert_eq!( finished_count.load( Ordering::SeqCst ), 0 );
  assert_eq!( reply.state(), ReplyState::Finished );
}

#[ tokio::test ]
async fn only_cache_misses_finish_with_no_cache_entry()
{
  let manager = AccessManager::new();
  manager.set_cache( Arc::new( MemoryCache::new( 1024 ) ) );

  let mut request = Request::new( "https://x/absent" );
  request.set_cache_policy( CachePolicy::OnlyCache );
  let reply = manager.send_get( request ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Error );
  assert_eq!( reply.error(), NetworkError::NoCacheEntry );
}

#[ tokio::test ]
async fn only_cache_ignores_expired_entries_freshness()
{
  let manager = AccessManager::new();
  let cache : Arc< dyn NetworkCache > = Arc::new( MemoryCache::new( 1024 ) );
  manager.set_cache( Arc::clone( &cache ) );

  let mut headers = BTreeMap::new();
  headers.insert( "Cache-Control".to_owned(), "max-age=0".to_owned() );
  let metadata = CacheMetadata::from_response_headers( "https://x/stale", 5, headers );
  assert!( cache.insert( "https://x/stale", b"stale", metadata ) );
  tokio::time::sleep( Duration::from_millis( 1100 ) ).await;

  let mut request = Request::new( "https://x/stale" );
  request.set_cache_policy( CachePolicy::OnlyCache );
  let reply = manager.send_get( request ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Finished );
  assert_eq!( reply.read_all(), b"stale".to_vec() );
}

#[ tokio::test ]
async fn successful_mock_responses_are_written_to_the_cache()
{
  let ( manager, mock ) = manager_with_mock();
  let cache : Arc< dyn NetworkCache > = Arc::new( MemoryCache::new( 1024 * 1024 ) );
  manager.set_cache( Arc::clone( &cache ) );
  mock.mock_response_with_headers
  (
    "https://mock/cacheable",
    b"store me",
    200,
    vec![ ( "Cache-Control".to_owned(), "max-age=60".to_owned() ) ],
  );

  let mut request = Request::new( "https://mock/cacheable" );
  request.set_cache_policy( CachePolicy::PreferCache );
  let reply = manager.send_get( request ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Finished );
  assert_eq!( cache.data( "https://mock/cacheable" ), Some( b"store me".to_vec() ) );
  let stored = cache.metadata( "https://mock/cacheable" ).unwrap();
  assert!( stored.is_valid() );
}

#[ tokio::test ]
async fn no_store_responses_are_not_written_to_the_cache()
{
  let ( manager, mock ) = manager_with_mock();
  let cache : Arc< dyn NetworkCache > = Arc::new( MemoryCache::new( 1024 * 1024 ) );
  manager.set_cache( Arc::clone( &cache ) );
  mock.mock_response_with_headers
  (
    "https://mock/secret",
    b"do not store",
    200,
    vec![ ( "Cache-Control".to_owned(), "no-store".to_owned() ) ],
  );

  let mut request = Request::new( "https://mock/secret" );
  request.set_cache_policy( CachePolicy::PreferCache );
  let reply = manager.send_get( request ).unwrap();
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Finished );
  assert!( cache.data( "https://mock/secret" ).is_none() );
}

#[ tokio::test ]
async fn mock_global_delay_is_applied_before_completion()
{
  let ( manager, mock ) = manager_with_mock();
  mock.mock_response( "https://mock/delayed", b"late" );
  mock.set_global_delay( Duration::from_millis( 120 ) );

  let started = std::time::Instant::now();
  let reply = manager.send_get( Request::new( "https://mock/delayed" ) ).unwrap();
  reply.wait_finished().await;

  assert!( started.elapsed() >= Duration::from_millis( 100 ) );
  assert_eq!( reply.read_all(), b"late".to_vec() );
}

#[ tokio::test ]
async fn invalid_requests_are_rejected_at_submission()
{
  let manager = AccessManager::new();
  assert_eq!( manager.send_get( Request::new( "" ) ).unwrap_err(), NetworkError::InvalidRequest );

  let mut bad_range = Request::new( "https://x/y" );
  bad_range.set_range( 10, 10 );
  assert_eq!( manager.send_get( bad_range ).unwrap_err(), NetworkError::InvalidRequest );
}
