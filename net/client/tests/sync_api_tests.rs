//! Tests for the blocking wrappers.

#![ cfg( all( feature = "sync_api", feature = "mock_handler" ) ) ]

use std::sync::Arc;

use net_client::{ MockHandler, NetworkError, Request, SyncClient };

fn client_with_mock() -> ( SyncClient, Arc< MockHandler > )
{
  let client = SyncClient::new().unwrap();
  let mock = Arc::new( MockHandler::new() );
  client.manager().set_mock_handler( Arc::clone( &mock ) );
  ( client, mock )
}

#[ test ]
fn blocking_get_returns_the_completed_response()
{
  let ( client, mock ) = client_with_mock();
  mock.mock_response( "https://mock/sync", b"blocking body" );

  let response = client.get( Request::new( "https://mock/sync" ) ).unwrap();
  assert!( response.is_success() );
  assert_eq!( response.status_code, 200 );
  assert_eq!( response.error, NetworkError::NoError );
  assert_eq!( response.body_string(), "blocking body" );
}

#[ test ]
fn blocking_post_round_trips()
{
  let ( client, mock ) = client_with_mock();
  mock.mock_response_with_status( "https://mock/created", b"created", 201 );

  let response = client.post( Request::new( "https://mock/created" ), b"payload" ).unwrap();
  assert!( response.is_success() );
  assert_eq!( response.status_code, 201 );
}

#[ test ]
fn blocking_errors_surface_the_error_kind()
{
  let ( client, mock ) = client_with_mock();
  mock.mock_error( "https://mock/refused", NetworkError::ConnectionRefused );

  let response = client.get( Request::new( "https://mock/refused" ) ).unwrap();
  assert!( !response.is_success() );
  assert_eq!( response.error, NetworkError::ConnectionRefused );
  assert_eq!( response.status_code, 0 );
}

#[ test ]
fn invalid_requests_fail_before_blocking()
{
  let ( client, _mock ) = client_with_mock();
  assert_eq!( client.get( Request::new( "" ) ).unwrap_err(), NetworkError::InvalidRequest );
}

#[ test ]
fn download_file_blocks_until_the_file_is_written()
{
  let ( client, mock ) = client_with_mock();
  mock.mock_response( "https://mock/file", b"file contents" );

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "out.bin" );
  let response = client.download_file( "https://mock/file", &path ).unwrap();

  assert!( response.is_success() );
  assert_eq!( std::fs::read( &path ).unwrap(), b"file contents".to_vec() );
}
