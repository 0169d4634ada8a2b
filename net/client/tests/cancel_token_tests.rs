//! Tests for the cancel token fan-out.

#![ cfg( feature = "mock_handler" ) ]

use core::time::Duration;
use std::sync::Arc;

use net_client::{ AccessManager, CancelToken, MockHandler, NetworkError, ReplyState, Request };

fn manager_with_slow_mock() -> ( AccessManager, Arc< MockHandler > )
{
  let manager = AccessManager::new();
  let mock = Arc::new( MockHandler::new() );
  mock.set_global_delay( Duration::from_millis( 250 ) );
  manager.set_mock_handler( Arc::clone( &mock ) );
  ( manager, mock )
}

#[ tokio::test ]
async fn cancel_fans_out_to_every_attached_reply()
{
  let ( manager, mock ) = manager_with_slow_mock();
  mock.mock_response( "https://mock/a", b"a" );
  mock.mock_response( "https://mock/b", b"b" );

  let token = CancelToken::new();
  let first = manager.send_get( Request::new( "https://mock/a" ) ).unwrap();
  let second = manager.send_get( Request::new( "https://mock/b" ) ).unwrap();
  token.attach( &first );
  token.attach( &second );
  assert_eq!( token.attached_count(), 2 );

  token.cancel();
  first.wait_finished().await;
  second.wait_finished().await;

  assert!( token.is_cancelled() );
  assert_eq!( first.state(), ReplyState::Cancelled );
  assert_eq!( second.state(), ReplyState::Cancelled );
  assert_eq!( first.error(), NetworkError::OperationCancelled );
  assert_eq!( token.attached_count(), 0 );
}

#[ tokio::test ]
async fn replies_detach_themselves_on_completion()
{
  let manager = AccessManager::new();
  let mock = Arc::new( MockHandler::new() );
  manager.set_mock_handler( Arc::clone( &mock ) );
  mock.mock_response( "https://mock/fast", b"done" );

  let token = CancelToken::new();
  let reply = manager.send_get( Request::new( "https://mock/fast" ) ).unwrap();
  token.attach( &reply );

  reply.wait_finished().await;
  tokio::time::sleep( Duration::from_millis( 10 ) ).await;

  assert_eq!( token.attached_count(), 0 );
  assert!( !token.is_cancelled() );
  assert_eq!( reply.state(), ReplyState::Finished );
}

#[ tokio::test ]
async fn attaching_to_a_cancelled_token_cancels_immediately()
{
  let ( manager, mock ) = manager_with_slow_mock();
  mock.mock_response( "https://mock/late", b"late" );

  let token = CancelToken::new();
  token.cancel();

  let reply = manager.send_get( Request::new( "https://mock/late" ) ).unwrap();
  token.attach( &reply );
  reply.wait_finished().await;

  assert_eq!( reply.state(), ReplyState::Cancelled );
  assert_eq!( token.attached_count(), 0 );
}

#[ tokio::test ]
async fn auto_timeout_cancels_after_the_delay()
{
  let ( manager, mock ) = manager_with_slow_mock();
  mock.mock_response( "https://mock/timeout", b"never" );

  let token = CancelToken::new();
  let reply = manager.send_get( Request::new( "https://mock/timeout" ) ).unwrap();
  token.attach( &reply );
  token.cancel_after( Duration::from_millis( 50 ) );

  reply.wait_finished().await;
  assert_eq!( reply.state(), ReplyState::Cancelled );
  assert!( token.is_cancelled() );
}

#[ tokio::test ]
async fn cancel_is_idempotent()
{
  let ( manager, mock ) = manager_with_slow_mock();
  mock.mock_response( "https://mock/twice", b"x" );

  let token = CancelToken::new();
  let reply = manager.send_get( Request::new( "https://mock/twice" ) ).unwrap();
  token.attach( &reply );

  token.cancel();
  token.cancel();
  reply.wait_finished().await;
  assert_eq!( reply.state(), ReplyState::Cancelled );
}
