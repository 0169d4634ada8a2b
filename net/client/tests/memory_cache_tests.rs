//! Tests for the byte-bounded in-memory LRU cache.

use std::collections::BTreeMap;

use net_client::{ CacheMetadata, MemoryCache, NetworkCache };

fn metadata( url : &str, size : u64 ) -> CacheMetadata
{
  CacheMetadata::from_response_headers( url, size, BTreeMap::new() )
}

#[ test ]
fn stored_bytes_round_trip_exactly()
{
  let cache = MemoryCache::new( 1024 );
  let body : Vec< u8 > = ( 0u16..256 ).map( | value | value as u8 ).collect();
  assert!( cache.insert( "https://x/y", &body, metadata( "https://x/y", body.len() as u64 ) ) );
  assert_eq!( cache.data( "https://x/y" ), Some( body ) );
}

#[ test ]
fn size_accounting_tracks_inserts_and_removals()
{
  let cache = MemoryCache::new( 1024 );
  assert_eq!( cache.cache_size(), 0 );
  assert!( cache.insert( "a", &[ 0u8; 100 ], metadata( "a", 100 ) ) );
  assert!( cache.insert( "b", &[ 0u8; 200 ], metadata( "b", 200 ) ) );
  assert_eq!( cache.cache_size(), 300 );
  assert!( cache.remove( "a" ) );
  assert_eq!( cache.cache_size(), 200 );
  assert!( !cache.remove( "a" ) );
  cache.clear();
  assert_eq!( cache.cache_size(), 0 );
  assert!( cache.is_empty() );
}

#[ test ]
fn eviction_keeps_total_within_bound()
{
  let cache = MemoryCache::new( 250 );
  for index in 0..10
  {
    let url = format!( "https://x/{index}" );
    assert!( cache.insert( &url, &[ 0u8; 100 ], metadata( &url, 100 ) ) );
    assert!( cache.cache_size() <= cache.max_cache_size() );
  }
  assert_eq!( cache.len(), 2 );
}

#[ test ]
fn eviction_prefers_least_recently_used()
{
  let cache = MemoryCache::new( 300 );
  assert!( cache.insert( "a", &[ 0u8; 100 ], metadata( "a", 100 ) ) );
  assert!( cache.insert( "b", &[ 0u8; 100 ], metadata( "b", 100 ) ) );
  assert!( cache.insert( "c", &[ 0u8; 100 ], metadata( "c", 100 ) ) );

  // Touch "a" so "b" becomes the coldest entry.
  assert!( cache.data( "a" ).is_some() );
  assert!( cache.insert( "d", &[ 0u8; 100 ], metadata( "d", 100 ) ) );

  assert!( cache.data( "a" ).is_some() );
  assert!( cache.data( "b" ).is_none() );
  assert!( cache.data( "c" ).is_some() );
  assert!( cache.data( "d" ).is_some() );
}

#[ test ]
fn entries_larger_than_the_bound_are_rejected()
{
  let cache = MemoryCache::new( 100 );
  assert!( !cache.insert( "big", &[ 0u8; 101 ], metadata( "big", 101 ) ) );
  assert_eq!( cache.cache_size(), 0 );
  assert!( cache.data( "big" ).is_none() );
}

#[ test ]
fn reinserting_a_url_replaces_the_entry()
{
  let cache = MemoryCache::new( 1024 );
  assert!( cache.insert( "a", b"first", metadata( "a", 5 ) ) );
  assert!( cache.insert( "a", b"second", metadata( "a", 6 ) ) );
  assert_eq!( cache.data( "a" ), Some( b"second".to_vec() ) );
  assert_eq!( cache.cache_size(), 6 );
  assert_eq!( cache.len(), 1 );
}

#[ test ]
fn shrinking_the_bound_evicts_immediately()
{
  let cache = MemoryCache::new( 1024 );
  for index in 0..5
  {
    let url = format!( "u{index}" );
    assert!( cache.insert( &url, &[ 0u8; 100 ], metadata( &url, 100 ) ) );
  }
  cache.set_max_cache_size( 250 );
  assert!( cache.cache_size() <= 250 );
  assert_eq!( cache.max_cache_size(), 250 );
}

#[ test ]
fn metadata_is_stored_alongside_data()
{
  let cache = MemoryCache::new( 1024 );
  let mut headers = BTreeMap::new();
  headers.insert( "Content-Type".to_owned(), "text/plain".to_owned() );
  let metadata = CacheMetadata::from_response_headers( "a", 4, headers );
  assert!( cache.insert( "a", b"data", metadata ) );
  let stored = cache.metadata( "a" ).unwrap();
  assert_eq!( stored.headers.get( "Content-Type" ).map( String::as_str ), Some( "text/plain" ) );
  assert_eq!( stored.size, 4 );
}
