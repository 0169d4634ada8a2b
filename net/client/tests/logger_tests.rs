//! Tests for the network logger.

use std::sync::atomic::{ AtomicU32, Ordering };
use std::sync::Arc;

use net_client::{ NetworkLogLevel, NetworkLogger };

#[ test ]
fn levels_are_ordered_and_parseable()
{
  assert!( NetworkLogLevel::Debug < NetworkLogLevel::Info );
  assert!( NetworkLogLevel::Info < NetworkLogLevel::Warning );
  assert!( NetworkLogLevel::Warning < NetworkLogLevel::Error );
  assert_eq!( NetworkLogLevel::parse( "warning" ), Some( NetworkLogLevel::Warning ) );
  assert_eq!( NetworkLogLevel::parse( "WARN" ), Some( NetworkLogLevel::Warning ) );
  assert_eq!( NetworkLogLevel::parse( "nope" ), None );
  assert_eq!( NetworkLogLevel::Error.as_str(), "ERROR" );
}

#[ test ]
fn min_level_filters_lower_entries()
{
  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.set_min_log_level( NetworkLogLevel::Warning );

  logger.debug( "Test", "dropped" );
  logger.info( "Test", "dropped" );
  logger.warning( "Test", "kept" );
  logger.error( "Test", "kept" );

  let entries = logger.entries();
  assert_eq!( entries.len(), 2 );
  assert!( entries.iter().all( | entry | entry.level >= NetworkLogLevel::Warning ) );
}

#[ test ]
fn custom_callback_receives_entries()
{
  let logger = NetworkLogger::new();
  logger.enable_console_output( false );

  let seen = Arc::new( AtomicU32::new( 0 ) );
  let counter = Arc::clone( &seen );
  logger.set_custom_callback( move | entry |
  {
    assert_eq!( entry.category, "Request" );
    counter.fetch_add( 1, Ordering::SeqCst );
  } );

  logger.info( "Request", "GET https://example.com" );
  logger.info( "Request", "GET https://example.com/2" );
  assert_eq!( seen.load( Ordering::SeqCst ), 2 );
}

#[ test ]
fn format_placeholders_are_substituted()
{
  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.set_log_format( "{level}|{category}|{message}" );
  logger.info( "Cache", "hit" );

  let entry = &logger.entries()[ 0 ];
  assert_eq!( entry.render( "{level}|{category}|{message}" ), "INFO|Cache|hit" );
  assert!( entry.render( "{timestamp}" ).contains( 'T' ) );
}

#[ test ]
fn file_sink_appends_lines()
{
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "net.log" );

  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.enable_file_output( &path, 0, 0 );
  logger.info( "Request", "first" );
  logger.info( "Request", "second" );

  let content = std::fs::read_to_string( &path ).unwrap();
  assert_eq!( content.lines().count(), 2 );
  assert!( content.contains( "first" ) );
  assert!( content.contains( "second" ) );
}

#[ test ]
fn file_sink_rotates_at_the_size_bound()
{
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "net.log" );

  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.set_log_format( "{message}" );
  logger.enable_file_output( &path, 64, 2 );

  for index in 0..20
  {
    logger.info( "Test", &format!( "line number {index} with padding" ) );
  }

  assert!( path.exists() );
  let backup = std::path::PathBuf::from( format!( "{}.1", path.display() ) );
  assert!( backup.exists() );
  assert!( std::fs::metadata( &path ).unwrap().len() <= 64 );
}

#[ test ]
fn entries_ring_is_clearable()
{
  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.info( "A", "x" );
  assert_eq!( logger.entries().len(), 1 );
  logger.clear();
  assert!( logger.entries().is_empty() );
}

#[ test ]
fn enable_file_output_accepts_path_types()
{
  let dir = tempfile::tempdir().unwrap();
  let logger = NetworkLogger::new();
  logger.enable_console_output( false );
  logger.enable_file_output( dir.path().join( "a.log" ), 0, 5 );
  logger.info( "T", "x" );
  logger.disable_file_output();
  logger.info( "T", "y" );
  let content = std::fs::read_to_string( dir.path().join( "a.log" ) ).unwrap();
  assert_eq!( content.lines().count(), 1 );
}
