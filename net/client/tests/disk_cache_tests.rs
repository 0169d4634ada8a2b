//! Tests for the persistent on-disk cache.

#![ cfg( feature = "disk_cache" ) ]

use std::collections::BTreeMap;

use net_client::{ CacheMetadata, DiskCache, NetworkCache };

fn metadata( url : &str, size : u64 ) -> CacheMetadata
{
  CacheMetadata::from_response_headers( url, size, BTreeMap::new() )
}

#[ test ]
fn stored_bytes_round_trip_exactly()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::new( dir.path() ).unwrap();
  let body : Vec< u8 > = ( 0u16..512 ).map( | value | ( value % 251 ) as u8 ).collect();
  assert!( cache.insert( "https://x/y?q=1", &body, metadata( "https://x/y?q=1", body.len() as u64 ) ) );
  assert_eq!( cache.data( "https://x/y?q=1" ), Some( body ) );
}

#[ test ]
fn layout_is_hash_data_plus_hash_meta()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::new( dir.path() ).unwrap();
  assert!( cache.insert( "https://example.com/a", b"abc", metadata( "https://example.com/a", 3 ) ) );

  let mut names : Vec< String > = std::fs::read_dir( dir.path() )
    .unwrap()
    .flatten()
    .map( | entry | entry.file_name().to_string_lossy().into_owned() )
    .collect();
  names.sort();
  assert_eq!( names.len(), 2 );

  let data_name = names.iter().find( | name | name.ends_with( ".data" ) ).unwrap();
  let meta_name = names.iter().find( | name | name.ends_with( ".meta" ) ).unwrap();
  let data_stem = data_name.trim_end_matches( ".data" );
  let meta_stem = meta_name.trim_end_matches( ".meta" );
  assert_eq!( data_stem, meta_stem );
  assert_eq!( data_stem.len(), 32 );
  assert!( data_stem.chars().all( | ch | ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase() ) );
}

#[ test ]
fn metadata_survives_a_reopen()
{
  let dir = tempfile::tempdir().unwrap();
  {
    let cache = DiskCache::new( dir.path() ).unwrap();
    let mut headers = BTreeMap::new();
    headers.insert( "Cache-Control".to_owned(), "max-age=3600".to_owned() );
    let metadata = CacheMetadata::from_response_headers( "https://x/persist", 4, headers );
    assert!( cache.insert( "https://x/persist", b"data", metadata ) );
  }
  let reopened = DiskCache::new( dir.path() ).unwrap();
  let stored = reopened.metadata( "https://x/persist" ).unwrap();
  assert_eq!( stored.url, "https://x/persist" );
  assert!( stored.expiration_date.is_some() );
  assert!( stored.is_valid() );
  assert_eq!( reopened.data( "https://x/persist" ), Some( b"data".to_vec() ) );
}

#[ test ]
fn size_stays_within_bound_after_every_insert()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::with_max_size( dir.path(), 4096 ).unwrap();
  for index in 0..12
  {
    let url = format!( "https://x/{index}" );
    assert!( cache.insert( &url, &[ index as u8; 1024 ], metadata( &url, 1024 ) ) );
    assert!( cache.cache_size() <= cache.max_cache_size(), "after insert {index}" );
    // Distinct mtimes keep the eviction order well defined.
    std::thread::sleep( core::time::Duration::from_millis( 20 ) );
  }
}

#[ test ]
fn eviction_removes_oldest_entries_first()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::with_max_size( dir.path(), 2600 ).unwrap();
  for index in 0..3
  {
    let url = format!( "https://x/{index}" );
    assert!( cache.insert( &url, &[ 0u8; 1024 ], metadata( &url, 1024 ) ) );
    std::thread::sleep( core::time::Duration::from_millis( 20 ) );
  }
  // The oldest entry had to go; the two newest remain.
  assert!( cache.data( "https://x/0" ).is_none() );
  assert!( cache.data( "https://x/1" ).is_some() );
  assert!( cache.data( "https://x/2" ).is_some() );
}

#[ test ]
fn oversized_entries_are_rejected()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::with_max_size( dir.path(), 100 ).unwrap();
  assert!( !cache.insert( "big", &[ 0u8; 200 ], metadata( "big", 200 ) ) );
  assert!( cache.data( "big" ).is_none() );
}

#[ test ]
fn remove_and_clear_delete_both_files()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::new( dir.path() ).unwrap();
  assert!( cache.insert( "a", b"1", metadata( "a", 1 ) ) );
  assert!( cache.insert( "b", b"2", metadata( "b", 1 ) ) );
  assert!( cache.remove( "a" ) );
  assert!( cache.data( "a" ).is_none() );
  assert!( cache.metadata( "a" ).is_none() );
  cache.clear();
  assert_eq!( cache.cache_size(), 0 );
  assert!( cache.data( "b" ).is_none() );
}

#[ test ]
fn distinct_urls_do_not_collide()
{
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::new( dir.path() ).unwrap();
  assert!( cache.insert( "https://x/a", b"first", metadata( "https://x/a", 5 ) ) );
  assert!( cache.insert( "https://x/b", b"second", metadata( "https://x/b", 6 ) ) );
  assert_eq!( cache.data( "https://x/a" ), Some( b"first".to_vec() ) );
  assert_eq!( cache.data( "https://x/b" ), Some( b"second".to_vec() ) );
}
