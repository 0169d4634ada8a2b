//! Scheduler tests: priority ordering, admission gates, critical bypass and
//! statistics, driven through the mock handler.

#![ cfg( feature = "mock_handler" ) ]

use core::time::Duration;
use std::sync::Arc;

use net_client::
{
  AccessManager,
  MockHandler,
  Reply,
  RequestPriority,
  Request,
  SchedulerConfig,
};

fn manager_with_slow_mock( delay : Duration ) -> ( AccessManager, Arc< MockHandler > )
{
  let manager = AccessManager::new();
  let mock = Arc::new( MockHandler::new() );
  mock.set_global_delay( delay );
  manager.set_mock_handler( Arc::clone( &mock ) );
  manager.enable_request_scheduler( true );
  ( manager, mock )
}

fn request_with_priority( url : &str, priority : RequestPriority ) -> Request
{
  let mut request = Request::new( url );
  request.set_priority( priority );
  request
}

async fn wait_all( replies : &[ Reply ] )
{
  for reply in replies
  {
    reply.wait_finished().await;
  }
}

#[ tokio::test ]
async fn critical_bypasses_the_queue_and_high_precedes_low()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 40 ) );
  let scheduler = manager.scheduler();
  scheduler.set_config( SchedulerConfig
  {
    max_concurrent_requests : 2,
    max_requests_per_host : 1,
    max_bandwidth_bytes_per_sec : 0,
    enable_throttling : true,
  } );

  for path in [ "low1", "low2", "critical", "low3", "high" ]
  {
    mock.mock_response( format!( "https://same-host/{path}" ), b"done" );
  }

  let started : Arc< parking_lot::Mutex< Vec< String > > > = Arc::default();
  let sink = Arc::clone( &started );
  scheduler.on_request_started( move | reply | sink.lock().push( reply.url() ) );

  let submissions = vec!
  [
    ( "low1", RequestPriority::Low ),
    ( "low2", RequestPriority::Low ),
    ( "critical", RequestPriority::Critical ),
    ( "low3", RequestPriority::Low ),
    ( "high", RequestPriority::High ),
  ];
  let mut replies = Vec::new();
  for ( path, priority ) in submissions
  {
    let url = format!( "https://same-host/{path}" );
    let request = request_with_priority( &url, priority );
    replies.push( manager.send_get( request ).unwrap() );
  }

  wait_all( &replies ).await;
  tokio::time::sleep( Duration::from_millis( 50 ) ).await;

  let order = started.lock().clone();
  assert_eq!( order.len(), 5 );

  let position = | path : &str | order.iter().position( | url | url.ends_with( path ) ).unwrap();
  // The critical request started the moment it was submitted, before any of
  // the queued requests that were waiting at that point.
  assert!( position( "critical" ) < position( "low2" ) );
  assert!( position( "critical" ) < position( "low3" ) );
  assert!( position( "critical" ) < position( "high" ) );
  // When a slot opened, the high request was admitted before the queued lows.
  assert!( position( "high" ) < position( "low2" ) );
  assert!( position( "high" ) < position( "low3" ) );
}

#[ tokio::test ]
async fn per_host_limit_gates_one_host_but_not_another()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 60 ) );
  let scheduler = manager.scheduler();
  scheduler.set_config( SchedulerConfig
  {
    max_concurrent_requests : 4,
    max_requests_per_host : 1,
    max_bandwidth_bytes_per_sec : 0,
    enable_throttling : true,
  } );

  mock.mock_response( "https://host-a/1", b"a" );
  mock.mock_response( "https://host-a/2", b"a" );
  mock.mock_response( "https://host-b/1", b"b" );

  let first_a = manager.send_get( Request::new( "https://host-a/1" ) ).unwrap();
  let second_a = manager.send_get( Request::new( "https://host-a/2" ) ).unwrap();
  let first_b = manager.send_get( Request::new( "https://host-b/1" ) ).unwrap();

  tokio::time::sleep( Duration::from_millis( 20 ) ).await;
  // host-a admits one of its two; host-b is unaffected by host-a's gate.
  let stats = scheduler.statistics();
  assert_eq!( stats.running_requests, 2 );
  assert_eq!( stats.pending_requests, 1 );

  wait_all( &[ first_a, second_a, first_b ] ).await;
  let stats = scheduler.statistics();
  assert_eq!( stats.pending_requests, 0 );
  assert_eq!( stats.completed_requests, 3 );
}

#[ tokio::test ]
async fn global_limit_is_never_exceeded_by_queued_admissions()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 30 ) );
  let scheduler = manager.scheduler();
  scheduler.set_config( SchedulerConfig
  {
    max_concurrent_requests : 2,
    max_requests_per_host : 2,
    max_bandwidth_bytes_per_sec : 0,
    enable_throttling : true,
  } );

  let mut replies = Vec::new();
  for index in 0..6
  {
    let url = format!( "https://host-{index}/item" );
    mock.mock_response( url.clone(), b"x" );
    replies.push( manager.send_get( Request::new( url ) ).unwrap() );
    let stats = scheduler.statistics();
    assert!( stats.running_requests <= 2, "after submission {index}" );
  }
  wait_all( &replies ).await;
  assert_eq!( scheduler.statistics().completed_requests, 6 );
}

#[ tokio::test ]
async fn cancelled_queued_requests_are_discarded_not_started()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 60 ) );
  let scheduler = manager.scheduler();
  scheduler.set_config( SchedulerConfig
  {
    max_concurrent_requests : 1,
    max_requests_per_host : 1,
    max_bandwidth_bytes_per_sec : 0,
    enable_throttling : true,
  } );

  mock.mock_response( "https://host/1", b"1" );
  mock.mock_response( "https://host/2", b"2" );

  let running = manager.send_get( Request::new( "https://host/1" ) ).unwrap();
  let queued = manager.send_get( Request::new( "https://host/2" ) ).unwrap();

  scheduler.cancel_request( &queued );
  queued.wait_finished().await;
  running.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 30 ) ).await;

  let stats = scheduler.statistics();
  assert_eq!( stats.cancelled_requests, 1 );
  assert_eq!( stats.completed_requests, 1 );
  assert_eq!( stats.pending_requests, 0 );
}

#[ tokio::test ]
async fn queue_empty_fires_after_the_last_completion()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 20 ) );
  let scheduler = manager.scheduler();

  mock.mock_response( "https://host/only", b"x" );
  let notified = Arc::new( std::sync::atomic::AtomicBool::new( false ) );
  let flag = Arc::clone( &notified );
  scheduler.on_queue_empty( move || flag.store( true, std::sync::atomic::Ordering::SeqCst ) );

  let reply = manager.send_get( Request::new( "https://host/only" ) ).unwrap();
  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 30 ) ).await;

  assert!( notified.load( std::sync::atomic::Ordering::SeqCst ) );
}

#[ tokio::test ]
async fn statistics_track_bytes_and_response_time()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 10 ) );
  let scheduler = manager.scheduler();

  mock.mock_response( "https://host/sized", &[ 7u8; 2048 ] );
  let reply = manager.send_get( Request::new( "https://host/sized" ) ).unwrap();
  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 30 ) ).await;

  let stats = scheduler.statistics();
  assert_eq!( stats.total_bytes_received, 2048 );
  assert!( stats.avg_response_time_ms > 0.0 );
}

#[ tokio::test ]
async fn deferred_requests_return_to_idle_and_can_be_readmitted()
{
  let ( manager, mock ) = manager_with_slow_mock( Duration::from_millis( 80 ) );
  let scheduler = manager.scheduler();

  mock.mock_response( "https://host/deferred", b"eventually" );
  let reply = manager.send_get( Request::new( "https://host/deferred" ) ).unwrap();
  tokio::time::sleep( Duration::from_millis( 20 ) ).await;

  scheduler.defer_request( &reply );
  assert!( !reply.is_finished() );

  scheduler.undefer_request( &reply );
  reply.wait_finished().await;
  assert_eq!( reply.read_all(), b"eventually".to_vec() );
}
