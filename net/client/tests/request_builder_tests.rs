//! Tests for the request value and the two builder surfaces.

use core::time::Duration;

use net_client::
{
  AccessManager,
  CachePolicy,
  HttpVersion,
  NetworkError,
  ProxyConfig,
  ProxyKind,
  Request,
  RequestBuilder,
  RequestPriority,
  RetryPolicy,
  SslConfig,
  TimeoutConfig,
};

#[ test ]
fn request_defaults_are_sane()
{
  let request = Request::new( "https://example.com/a" );
  assert_eq!( request.url(), "https://example.com/a" );
  assert!( request.follow_redirects() );
  assert!( request.range().is_none() );
  assert!( request.proxy_config().is_none() );
  assert_eq!( request.priority(), RequestPriority::Normal );
  assert_eq!( request.cache_policy(), CachePolicy::OnlyNetwork );
  assert!( !request.retry_policy().is_enabled() );
  assert!( request.validate().is_ok() );
}

#[ test ]
fn header_lookup_is_case_insensitive_and_order_preserving()
{
  let mut request = Request::new( "https://example.com" );
  request.set_raw_header( "X-First", "1" );
  request.set_raw_header( "Accept", "application/json" );
  request.set_raw_header( "X-First", "2" );

  assert_eq!( request.raw_header( "x-first" ), Some( "1" ) );
  assert_eq!( request.raw_header( "ACCEPT" ), Some( "application/json" ) );
  assert_eq!( request.raw_header( "missing" ), None );
  let names : Vec< &str > = request
    .raw_header_list()
    .iter()
    .map( | ( name, _ ) | name.as_str() )
    .collect();
  assert_eq!( names, vec![ "X-First", "Accept", "X-First" ] );
}

#[ test ]
fn copies_share_until_mutation()
{
  let mut original = Request::new( "https://example.com" );
  original.set_raw_header( "A", "1" );
  let copy = original.clone();

  original.set_raw_header( "B", "2" );
  assert_eq!( original.raw_header_list().len(), 2 );
  assert_eq!( copy.raw_header_list().len(), 1 );
  assert_eq!( copy.raw_header( "B" ), None );
}

#[ test ]
fn validation_rejects_empty_urls_and_bad_ranges()
{
  assert_eq!( Request::new( "" ).validate().unwrap_err(), NetworkError::InvalidRequest );
  assert_eq!( Request::new( "   " ).validate().unwrap_err(), NetworkError::InvalidRequest );

  let mut inverted = Request::new( "https://x/y" );
  inverted.set_range( 100, 50 );
  assert_eq!( inverted.validate().unwrap_err(), NetworkError::InvalidRequest );

  let mut empty_end = Request::new( "https://x/y" );
  empty_end.set_range( 5, 5 );
  assert!( empty_end.validate().is_err() );

  let mut valid = Request::new( "https://x/y" );
  valid.set_range( 0, 1 );
  assert!( valid.validate().is_ok() );
}

#[ test ]
fn host_extraction_handles_bad_urls()
{
  assert_eq!( Request::new( "https://example.com:8443/path" ).host(), "example.com" );
  assert_eq!( Request::new( "not a url" ).host(), "" );
}

#[ test ]
fn flat_builder_produces_a_validated_request()
{
  let request = RequestBuilder::new( "https://example.com/data" )
    .header( "Accept", "text/plain" )
    .range( 0, 1023 )
    .follow_redirects( false )
    .priority( RequestPriority::High )
    .cache_policy( CachePolicy::PreferCache )
    .retry_policy( RetryPolicy::standard() )
    .http_version( HttpVersion::Http2 )
    .timeout( Duration::from_secs( 10 ) )
    .build()
    .unwrap();

  assert_eq!( request.url(), "https://example.com/data" );
  assert_eq!( request.raw_header( "accept" ), Some( "text/plain" ) );
  assert_eq!( request.range(), Some( ( 0, 1023 ) ) );
  assert!( !request.follow_redirects() );
  assert_eq!( request.priority(), RequestPriority::High );
  assert_eq!( request.cache_policy(), CachePolicy::PreferCache );
  assert_eq!( request.retry_policy().max_retries, 3 );
  assert_eq!( request.http_version().version, HttpVersion::Http2 );
  assert!( request.http_version().explicitly_set );
  assert_eq!( request.timeout_config().total_timeout, Duration::from_secs( 10 ) );
}

#[ test ]
fn flat_builder_rejects_invalid_input()
{
  assert!( RequestBuilder::new( "" ).build().is_err() );
  assert!( RequestBuilder::new( "https://x/y" ).range( 9, 3 ).build().is_err() );
}

fn assert_equivalent( left : &Request, right : &Request )
{
  assert_eq!( left.url(), right.url() );
  assert_eq!( left.raw_header_list(), right.raw_header_list() );
  assert_eq!( left.follow_redirects(), right.follow_redirects() );
  assert_eq!( left.range(), right.range() );
  assert_eq!( left.ssl_config(), right.ssl_config() );
  assert_eq!( left.proxy_config(), right.proxy_config() );
  assert_eq!( left.timeout_config(), right.timeout_config() );
  assert_eq!( left.http_version(), right.http_version() );
  assert_eq!( left.retry_policy(), right.retry_policy() );
  assert_eq!( left.priority(), right.priority() );
  assert_eq!( left.cache_policy(), right.cache_policy() );
}

#[ tokio::test ]
async fn flat_and_fluent_builders_produce_identical_requests()
{
  let manager = AccessManager::new();

  let ssl = SslConfig::new().with_verify_peer( false );
  let proxy = ProxyConfig::new( ProxyKind::Http, "proxy.local", 8080 ).with_credentials( "user", "pass" );
  let timeout = TimeoutConfig::new()
    .with_connect_timeout( Duration::from_secs( 5 ) )
    .with_total_timeout( Duration::from_secs( 60 ) );

  let flat = RequestBuilder::new( "https://example.com/api" )
    .header( "Accept", "application/json" )
    .header( "X-Trace", "abc" )
    .range( 128, 4096 )
    .follow_redirects( false )
    .ssl_config( ssl.clone() )
    .proxy_config( proxy.clone() )
    .timeout_config( timeout.clone() )
    .http_version( HttpVersion::Http2Tls )
    .retry_policy( RetryPolicy::aggressive() )
    .priority( RequestPriority::VeryHigh )
    .cache_policy( CachePolicy::PreferNetwork )
    .build()
    .unwrap();

  let fluent = manager
    .new_request( "https://example.com/api" )
    .header( "Accept", "application/json" )
    .header( "X-Trace", "abc" )
    .range( 128, 4096 )
    .follow_redirects( false )
    .ssl_config( ssl )
    .proxy_config( proxy )
    .timeout_config( timeout )
    .http_version( HttpVersion::Http2Tls )
    .retry_policy( RetryPolicy::aggressive() )
    .priority( RequestPriority::VeryHigh )
    .cache_policy( CachePolicy::PreferNetwork )
    .build()
    .unwrap();

  assert_equivalent( &flat, &fluent );
}

#[ test ]
fn proxy_validity_rules()
{
  assert!( !ProxyConfig::default().is_valid() );
  assert!( !ProxyConfig::new( ProxyKind::Http, "", 8080 ).is_valid() );
  assert!( !ProxyConfig::new( ProxyKind::Http, "proxy", 0 ).is_valid() );
  assert!( ProxyConfig::new( ProxyKind::Socks5, "proxy", 1080 ).is_valid() );
  assert_eq!( ProxyConfig::new( ProxyKind::Socks5, "proxy", 1080 ).to_url(), "socks5://proxy:1080" );
}

#[ test ]
fn ssl_config_tracks_customization()
{
  assert!( !SslConfig::new().is_customized() );
  assert!( SslConfig::insecure().is_customized() );
  assert!( SslConfig::new().with_ca_cert_path( "/tmp/ca.pem" ).is_customized() );
}
