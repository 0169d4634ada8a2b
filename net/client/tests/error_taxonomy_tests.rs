//! Tests for the error taxonomy and its classification laws.

use net_client::{ NetworkError, TRANSPORT_ERROR_BASE };

#[ test ]
fn numeric_codes_are_stable()
{
  assert_eq!( NetworkError::NoError.code(), 0 );
  assert_eq!( NetworkError::InvalidRequest.code(), 3 );
  assert_eq!( NetworkError::HostNotFound.code(), 6 );
  assert_eq!( NetworkError::ConnectionRefused.code(), 7 );
  assert_eq!( NetworkError::ConnectionTimeout.code(), 28 );
  assert_eq!( NetworkError::OperationCancelled.code(), 42 );
  assert_eq!( NetworkError::TooManyRedirects.code(), 47 );
  assert_eq!( NetworkError::SslHandshakeFailed.code(), 60 );
  assert_eq!( NetworkError::Unknown.code(), 99 );
}

#[ test ]
fn http_error_codes_equal_status_values()
{
  assert_eq!( NetworkError::HttpBadRequest.code(), 400 );
  assert_eq!( NetworkError::HttpTimeout.code(), 408 );
  assert_eq!( NetworkError::HttpRangeNotSatisfiable.code(), 416 );
  assert_eq!( NetworkError::HttpInternalServerError.code(), 500 );
  assert_eq!( NetworkError::HttpServiceUnavailable.code(), 503 );
  assert_eq!( NetworkError::HttpError( 418 ).code(), 418 );
}

#[ test ]
fn transport_codes_are_offset_by_base()
{
  assert_eq!( NetworkError::TransportError( 1 ).code(), TRANSPORT_ERROR_BASE + 1 );
  assert_eq!( NetworkError::TransportError( 55 ).code(), TRANSPORT_ERROR_BASE + 55 );
}

#[ test ]
fn http_classification_holds_for_every_status()
{
  for status in 0u16..1000
  {
    let error = NetworkError::from_http_status( status );
    let expected = ( 400..600 ).contains( &status );
    assert_eq!( error.is_http_error(), expected, "status {status}" );
  }
}

#[ test ]
fn transport_classification_holds_for_every_code()
{
  assert_eq!( NetworkError::from_transport_code( 0 ), NetworkError::NoError );
  for code in 1u16..200
  {
    let error = NetworkError::from_transport_code( code );
    assert!( error.is_transport_error(), "code {code}" );
    assert!( error.is_error() );
  }
}

#[ test ]
fn mapped_statuses_use_dedicated_kinds()
{
  assert_eq!( NetworkError::from_http_status( 404 ), NetworkError::HttpNotFound );
  assert_eq!( NetworkError::from_http_status( 503 ), NetworkError::HttpServiceUnavailable );
  assert_eq!( NetworkError::from_http_status( 418 ), NetworkError::HttpError( 418 ) );
  assert_eq!( NetworkError::from_http_status( 200 ), NetworkError::NoError );
  assert_eq!( NetworkError::from_http_status( 301 ), NetworkError::NoError );
  assert_eq!( NetworkError::from_http_status( 700 ), NetworkError::Unknown );
}

#[ test ]
fn display_renders_a_human_description()
{
  assert_eq!( format!( "{}", NetworkError::ConnectionRefused ), "connection refused" );
  assert_eq!( format!( "{}", NetworkError::HttpServiceUnavailable ), "http 503 service unavailable" );
  assert_eq!( format!( "{}", NetworkError::TransportError( 7 ) ), "transport error 7" );
  assert_eq!( format!( "{}", NetworkError::NoCacheEntry ), "no cache entry" );
}
