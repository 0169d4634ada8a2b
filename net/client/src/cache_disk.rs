//! Persistent on-disk cache.
//!
//! Layout: `<dir>/<md5(url)>.data` holds the body, `<dir>/<md5(url)>.meta`
//! holds UTF-8 JSON metadata. The hash is the lowercase hex MD5 of the URL
//! string. Size maintenance is lazy: inserts walk the directory and delete
//! the pairs with the oldest data-file mtime until the bound holds. Reads do
//! not touch mtime, so eviction is oldest-write-first.

#[ cfg( all( feature = "enabled", feature = "disk_cache" ) ) ]
mod private
{
  use std::path::{ Path, PathBuf };
  use std::time::SystemTime;

  use md5::{ Digest, Md5 };
  use parking_lot::Mutex;

  use crate::cache::{ CacheMetadata, NetworkCache };
  use crate::error::{ NetworkError, NetworkResult };

  const DEFAULT_MAX_BYTES : u64 = 50 * 1024 * 1024;
  const DATA_SUFFIX : &str = "data";
  const META_SUFFIX : &str = "meta";

  fn url_hash( url : &str ) -> String
  {
    let digest = Md5::digest( url.as_bytes() );
    let mut hex = String::with_capacity( digest.len() * 2 );
    for byte in digest
    {
      hex.push_str( &format!( "{byte:02x}" ) );
    }
    hex
  }

  #[ derive( Debug ) ]
  struct DiskState
  {
    max_bytes : u64,
  }

  /// Directory-backed cache surviving process restarts.
  ///
  /// All file I/O happens under the cache lock.
  #[ derive( Debug ) ]
  pub struct DiskCache
  {
    directory : PathBuf,
    state : Mutex< DiskState >,
  }

  impl DiskCache
  {
    /// Open (and create if needed) a cache directory with the default bound.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the directory cannot be created.
    pub fn new< P : AsRef< Path > >( directory : P ) -> NetworkResult< Self >
    {
      Self::with_max_size( directory, DEFAULT_MAX_BYTES )
    }

    /// Open a cache directory with an explicit size bound.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the directory cannot be created.
    pub fn with_max_size< P : AsRef< Path > >( directory : P, max_bytes : u64 ) -> NetworkResult< Self >
    {
      let directory = directory.as_ref().to_path_buf();
      std::fs::create_dir_all( &directory ).map_err( | _err | NetworkError::Unknown )?;
      Ok( Self
      {
        directory,
        state : Mutex::new( DiskState { max_bytes } ),
      } )
    }

    /// Directory the cache lives in.
    #[ inline ]
    #[ must_use ]
    pub fn directory( &self ) -> &Path
    {
      &self.directory
    }

    fn entry_path( &self, url : &str, suffix : &str ) -> PathBuf
    {
      self.directory.join( format!( "{}.{suffix}", url_hash( url ) ) )
    }

    fn walk_size( &self ) -> u64
    {
      let Ok( entries ) = std::fs::read_dir( &self.directory ) else { return 0 };
      entries
        .flatten()
        .filter_map( | entry | entry.metadata().ok() )
        .filter( std::fs::Metadata::is_file )
        .map( | meta | meta.len() )
        .sum()
    }

    fn data_files_oldest_first( &self ) -> Vec< ( PathBuf, SystemTime ) >
    {
      let Ok( entries ) = std::fs::read_dir( &self.directory ) else { return Vec::new() };
      let mut files : Vec< ( PathBuf, SystemTime ) > = entries
        .flatten()
        .filter( | entry | entry.path().extension().is_some_and( | ext | ext == DATA_SUFFIX ) )
        .filter_map( | entry |
        {
          let mtime = entry.metadata().ok()?.modified().ok()?;
          Some( ( entry.path(), mtime ) )
        } )
        .collect();
      files.sort_by_key( | ( _path, mtime ) | *mtime );
      files
    }

    fn evict_for( &self, incoming : u64, max_bytes : u64 )
    {
      let mut current = self.walk_size();
      if current + incoming <= max_bytes
      {
        return;
      }
      for ( data_path, _mtime ) in self.data_files_oldest_first()
      {
        let meta_path = data_path.with_extension( META_SUFFIX );
        let pair_size = file_len( &data_path ) + file_len( &meta_path );
        let _ = std::fs::remove_file( &data_path );
        let _ = std::fs::remove_file( &meta_path );
        current = current.saturating_sub( pair_size );
        if current + incoming <= max_bytes
        {
          break;
        }
      }
    }
  }

  fn file_len( path : &Path ) -> u64
  {
    std::fs::metadata( path ).map_or( 0, | meta | meta.len() )
  }

  impl NetworkCache for DiskCache
  {
    fn data( &self, url : &str ) -> Option< Vec< u8 > >
    {
      let _guard = self.state.lock();
      std::fs::read( self.entry_path( url, DATA_SUFFIX ) ).ok()
    }

    fn metadata( &self, url : &str ) -> Option< CacheMetadata >
    {
      let _guard = self.state.lock();
      let text = std::fs::read_to_string( self.entry_path( url, META_SUFFIX ) ).ok()?;
      CacheMetadata::from_json( &text ).ok()
    }

    fn insert( &self, url : &str, data : &[ u8 ], metadata : CacheMetadata ) -> bool
    {
      let state = self.state.lock();
      let meta_json = metadata.to_json();
      // Both files count towards the bound.
      let incoming = ( data.len() + meta_json.len() ) as u64;
      if incoming > state.max_bytes
      {
        return false;
      }
      self.evict_for( incoming, state.max_bytes );
      let data_ok = std::fs::write( self.entry_path( url, DATA_SUFFIX ), data ).is_ok();
      let meta_ok = std::fs::write( self.entry_path( url, META_SUFFIX ), meta_json ).is_ok();
      if !( data_ok && meta_ok )
      {
        let _ = std::fs::remove_file( self.entry_path( url, DATA_SUFFIX ) );
        let _ = std::fs::remove_file( self.entry_path( url, META_SUFFIX ) );
        return false;
      }
      true
    }

    fn remove( &self, url : &str ) -> bool
    {
      let _guard = self.state.lock();
      let removed = std::fs::remove_file( self.entry_path( url, DATA_SUFFIX ) ).is_ok();
      let _ = std::fs::remove_file( self.entry_path( url, META_SUFFIX ) );
      removed
    }

    fn clear( &self )
    {
      let _guard = self.state.lock();
      let Ok( entries ) = std::fs::read_dir( &self.directory ) else { return };
      for entry in entries.flatten()
      {
        let path = entry.path();
        let is_cache_file = path
          .extension()
          .is_some_and( | ext | ext == DATA_SUFFIX || ext == META_SUFFIX );
        if is_cache_file
        {
          let _ = std::fs::remove_file( path );
        }
      }
    }

    fn cache_size( &self ) -> u64
    {
      let _guard = self.state.lock();
      self.walk_size()
    }

    fn max_cache_size( &self ) -> u64
    {
      self.state.lock().max_bytes
    }

    fn set_max_cache_size( &self, max : u64 )
    {
      let mut state = self.state.lock();
      state.max_bytes = max;
      self.evict_for( 0, state.max_bytes );
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "disk_cache" ) ) ]
crate::mod_interface!
{
  exposed use DiskCache;
}
