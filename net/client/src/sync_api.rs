//! Synchronous blocking wrappers.
//!
//! The sync client owns a private runtime and blocks the calling thread until
//! completion. It exists for scripts, tools and worker threads; it must not
//! be driven from a UI event loop or from inside another async runtime.

#[ cfg( all( feature = "enabled", feature = "sync_api" ) ) ]
mod private
{
  use std::path::Path;
  use std::sync::Arc;

  use crate::error::{ NetworkError, NetworkResult };
  use crate::manager::AccessManager;
  use crate::reply::Reply;
  use crate::request::Request;

  /// Completed response returned by the blocking calls.
  #[ derive( Debug, Clone ) ]
  pub struct SyncResponse
  {
    /// HTTP status code, 0 when no status line was received.
    pub status_code : u16,
    /// Accumulated response body.
    pub body : Vec< u8 >,
    /// Terminal error kind; `NoError` on success.
    pub error : NetworkError,
  }

  impl SyncResponse
  {
    /// True for a 2xx outcome without a terminal error.
    #[ inline ]
    #[ must_use ]
    pub fn is_success( &self ) -> bool
    {
      !self.error.is_error() && ( 200..300 ).contains( &self.status_code )
    }

    /// Body interpreted as UTF-8, lossily.
    #[ must_use ]
    pub fn body_string( &self ) -> String
    {
      String::from_utf8_lossy( &self.body ).into_owned()
    }
  }

  /// Blocking client wrapping an [`AccessManager`] and a private runtime.
  #[ derive( Debug, Clone ) ]
  pub struct SyncClient
  {
    runtime : Arc< tokio::runtime::Runtime >,
    manager : AccessManager,
  }

  impl SyncClient
  {
    /// Create a client with its own single-worker runtime.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the runtime cannot be built.
    pub fn new() -> NetworkResult< Self >
    {
      let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads( 1 )
        .enable_all()
        .build()
        .map_err( | _err | NetworkError::Unknown )?;
      let manager = runtime.block_on( async { AccessManager::new() } );
      Ok( Self
      {
        runtime : Arc::new( runtime ),
        manager,
      } )
    }

    /// The wrapped manager, for policy configuration.
    #[ must_use ]
    pub fn manager( &self ) -> AccessManager
    {
      self.manager.clone()
    }

    fn wait( &self, reply : NetworkResult< Reply > ) -> NetworkResult< SyncResponse >
    {
      let reply = reply?;
      self.runtime.block_on( reply.wait_finished() );
      Ok( SyncResponse
      {
        status_code : reply.status_code(),
        body : reply.read_all(),
        error : reply.error(),
      } )
    }

    /// Blocking GET.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn get( &self, request : Request ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_get( request ) } );
      self.wait( issued )
    }

    /// Blocking HEAD.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn head( &self, request : Request ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_head( request ) } );
      self.wait( issued )
    }

    /// Blocking POST.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn post( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_post( request, body ) } );
      self.wait( issued )
    }

    /// Blocking PUT.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn put( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_put( request, body ) } );
      self.wait( issued )
    }

    /// Blocking DELETE.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn delete( &self, request : Request ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_delete( request ) } );
      self.wait( issued )
    }

    /// Blocking PATCH.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn patch( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.send_patch( request, body ) } );
      self.wait( issued )
    }

    /// Blocking file download.
    ///
    /// # Errors
    /// Propagates the errors of `AccessManager::download_file`.
    pub fn download_file( &self, url : &str, path : &Path ) -> NetworkResult< SyncResponse >
    {
      let issued = self.runtime.block_on( async { self.manager.download_file( url, path ) } );
      self.wait( issued )
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "sync_api" ) ) ]
crate::mod_interface!
{
  exposed use SyncClient;
  exposed use SyncResponse;
}
