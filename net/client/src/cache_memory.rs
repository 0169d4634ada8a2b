//! In-memory LRU cache bounded by byte cost.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use lru::LruCache;
  use parking_lot::Mutex;

  use crate::cache::{ CacheMetadata, NetworkCache };

  const DEFAULT_MAX_BYTES : u64 = 10 * 1024 * 1024;

  #[ derive( Debug, Clone ) ]
  struct MemoryEntry
  {
    data : Vec< u8 >,
    metadata : CacheMetadata,
  }

  #[ derive( Debug ) ]
  struct MemoryState
  {
    entries : LruCache< String, MemoryEntry >,
    current_bytes : u64,
    max_bytes : u64,
  }

  impl MemoryState
  {
    fn evict_until_fits( &mut self, incoming : u64 )
    {
      while self.current_bytes + incoming > self.max_bytes
      {
        match self.entries.pop_lru()
        {
          Some( ( _url, evicted ) ) =>
          {
            self.current_bytes = self.current_bytes.saturating_sub( evicted.data.len() as u64 );
          },
          None => break,
        }
      }
    }
  }

  /// Byte-bounded in-memory cache with least-recently-used eviction.
  ///
  /// Reads refresh recency; inserts evict from the cold end until the new
  /// entry fits. An entry larger than the whole bound is rejected.
  #[ derive( Debug ) ]
  pub struct MemoryCache
  {
    state : Mutex< MemoryState >,
  }

  impl Default for MemoryCache
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::new( DEFAULT_MAX_BYTES )
    }
  }

  impl MemoryCache
  {
    /// Create a cache bounded to `max_bytes` of stored body data.
    #[ must_use ]
    pub fn new( max_bytes : u64 ) -> Self
    {
      Self
      {
        state : Mutex::new( MemoryState
        {
          entries : LruCache::unbounded(),
          current_bytes : 0,
          max_bytes,
        } ),
      }
    }

    /// Number of stored entries.
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.state.lock().entries.len()
    }

    /// True when nothing is stored.
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.state.lock().entries.is_empty()
    }
  }

  impl NetworkCache for MemoryCache
  {
    fn data( &self, url : &str ) -> Option< Vec< u8 > >
    {
      self.state.lock().entries.get( url ).map( | entry | entry.data.clone() )
    }

    fn metadata( &self, url : &str ) -> Option< CacheMetadata >
    {
      self.state.lock().entries.get( url ).map( | entry | entry.metadata.clone() )
    }

    fn insert( &self, url : &str, data : &[ u8 ], metadata : CacheMetadata ) -> bool
    {
      let incoming = data.len() as u64;
      let mut state = self.state.lock();
      if incoming > state.max_bytes
      {
        return false;
      }
      if let Some( previous ) = state.entries.pop( url )
      {
        state.current_bytes = state.current_bytes.saturating_sub( previous.data.len() as u64 );
      }
      state.evict_until_fits( incoming );
      state.entries.put( url.to_owned(), MemoryEntry { data : data.to_vec(), metadata } );
      state.current_bytes += incoming;
      true
    }

    fn remove( &self, url : &str ) -> bool
    {
      let mut state = self.state.lock();
      match state.entries.pop( url )
      {
        Some( entry ) =>
        {
          state.current_bytes = state.current_bytes.saturating_sub( entry.data.len() as u64 );
          true
        },
        None => false,
      }
    }

    fn clear( &self )
    {
      let mut state = self.state.lock();
      state.entries.clear();
      state.current_bytes = 0;
    }

    fn cache_size( &self ) -> u64
    {
      self.state.lock().current_bytes
    }

    fn max_cache_size( &self ) -> u64
    {
      self.state.lock().max_bytes
    }

    fn set_max_cache_size( &self, max : u64 )
    {
      let mut state = self.state.lock();
      state.max_bytes = max;
      state.evict_until_fits( 0 );
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use MemoryCache;
}
