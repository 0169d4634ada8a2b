//! Access manager: factory and policy container.
//!
//! The manager owns the engine, the driver task and the scheduler, and holds
//! the shared policy objects (cache, logger, middlewares, cookie store, mock
//! handler). Verb factories return started replies; convenience wrappers
//! cover JSON and form posts, streaming downloads and uploads, and resumable
//! downloads.
//!
//! Must be created inside a tokio runtime; the driver task is spawned on it.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::path::{ Path, PathBuf };
  use std::sync::Arc;

  use parking_lot::Mutex;

  use crate::builder::RequestBuilder;
  use crate::cache::NetworkCache;
  use crate::cache_policy::CachePolicy;
  use crate::cookie::{ CookieFileMode, CookieStore };
  use crate::engine::TransportEngine;
  use crate::error::{ NetworkError, NetworkResult };
  use crate::handle::{ BodySource, HttpMethod };
  use crate::http_version::HttpVersion;
  use crate::logger::NetworkLogger;
  use crate::middleware::Middleware;
  #[ cfg( feature = "mock_handler" ) ]
  use crate::mock::MockHandler;
  use crate::multi::{ spawn_multi_driver, MultiDriverHandle };
  use crate::pool::{ ConnectionPoolConfig, ConnectionPoolManager };
  use crate::priority::RequestPriority;
  use crate::proxy::ProxyConfig;
  use crate::reply::{ ExecutionMode, Reply, ReplyContext, ResponseDevice };
  use crate::request::Request;
  use crate::retry::RetryPolicy;
  use crate::scheduler::RequestScheduler;
  use crate::ssl::SslConfig;
  use crate::timeout::TimeoutConfig;

  struct ManagerShared
  {
    driver : MultiDriverHandle,
    engine : Arc< TransportEngine >,
    pool : Arc< ConnectionPoolManager >,
    scheduler : RequestScheduler,
    scheduler_enabled : Mutex< bool >,
    cache : Mutex< Option< Arc< dyn NetworkCache > > >,
    middlewares : Mutex< Vec< Arc< dyn Middleware > > >,
    logger : Mutex< Option< Arc< NetworkLogger > > >,
    cookies : Mutex< Option< Arc< Mutex< CookieStore > > > >,
    #[ cfg( feature = "mock_handler" ) ]
    mock : Mutex< Option< Arc< MockHandler > > >,
  }

  impl Drop for ManagerShared
  {
    fn drop( &mut self )
    {
      self.driver.shutdown();
    }
  }

  /// Factory and policy container for HTTP requests.
  ///
  /// Cloneable; clones share the driver, scheduler and policy objects.
  #[ derive( Clone ) ]
  pub struct AccessManager
  {
    shared : Arc< ManagerShared >,
  }

  impl core::fmt::Debug for AccessManager
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "AccessManager" )
        .field( "scheduler_enabled", &*self.shared.scheduler_enabled.lock() )
        .field( "driver", &self.shared.driver )
        .finish_non_exhaustive()
    }
  }

  impl Default for AccessManager
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl AccessManager
  {
    /// Create a manager with the default pool configuration.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::with_pool_config( ConnectionPoolConfig::default() )
    }

    /// Create a manager with an explicit pool configuration.
    #[ must_use ]
    pub fn with_pool_config( config : ConnectionPoolConfig ) -> Self
    {
      let pool = Arc::new( ConnectionPoolManager::with_config( config ) );
      let engine = Arc::new( TransportEngine::new( Arc::clone( &pool ) ) );
      let driver = spawn_multi_driver( Arc::clone( &engine ) );
      Self
      {
        shared : Arc::new( ManagerShared
        {
          driver,
          engine,
          pool,
          scheduler : RequestScheduler::default(),
          scheduler_enabled : Mutex::new( false ),
          cache : Mutex::new( None ),
          middlewares : Mutex::new( Vec::new() ),
          logger : Mutex::new( None ),
          cookies : Mutex::new( None ),
          #[ cfg( feature = "mock_handler" ) ]
          mock : Mutex::new( None ),
        } ),
      }
    }

    // ------------------------------------------------------------------
    // policy configuration
    // ------------------------------------------------------------------

    /// Attach a cache. The application owns it; the manager only shares it
    /// with replies.
    pub fn set_cache( &self, cache : Arc< dyn NetworkCache > )
    {
      *self.shared.cache.lock() = Some( cache );
    }

    /// Currently attached cache, if any.
    #[ must_use ]
    pub fn cache( &self ) -> Option< Arc< dyn NetworkCache > >
    {
      self.shared.cache.lock().clone()
    }

    /// Append a middleware; hooks run in registration order.
    pub fn add_middleware( &self, middleware : Arc< dyn Middleware > )
    {
      self.shared.middlewares.lock().push( middleware );
    }

    /// Remove a previously added middleware.
    pub fn remove_middleware( &self, middleware : &Arc< dyn Middleware > )
    {
      self
        .shared
        .middlewares
        .lock()
        .retain( | existing | !Arc::ptr_eq( existing, middleware ) );
    }

    /// Drop every middleware.
    pub fn clear_middlewares( &self )
    {
      self.shared.middlewares.lock().clear();
    }

    /// Middlewares in registration order.
    #[ must_use ]
    pub fn middlewares( &self ) -> Vec< Arc< dyn Middleware > >
    {
      self.shared.middlewares.lock().clone()
    }

    /// Attach a logger shared with every reply.
    pub fn set_logger( &self, logger : Arc< NetworkLogger > )
    {
      *self.shared.logger.lock() = Some( logger );
    }

    /// Currently attached logger, if any.
    #[ must_use ]
    pub fn logger( &self ) -> Option< Arc< NetworkLogger > >
    {
      self.shared.logger.lock().clone()
    }

    /// Attach a mock handler consulted before cache and network.
    #[ cfg( feature = "mock_handler" ) ]
    pub fn set_mock_handler( &self, handler : Arc< MockHandler > )
    {
      *self.shared.mock.lock() = Some( handler );
    }

    /// Currently attached mock handler, if any.
    #[ cfg( feature = "mock_handler" ) ]
    #[ must_use ]
    pub fn mock_handler( &self ) -> Option< Arc< MockHandler > >
    {
      self.shared.mock.lock().clone()
    }

    /// Configure the cookie file and its access mode.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when an existing cookie file cannot
    /// be read.
    pub fn set_cookie_file< P : Into< PathBuf > >( &self, path : P, mode : CookieFileMode ) -> NetworkResult< () >
    {
      let store = CookieStore::open( path, mode )?;
      *self.shared.cookies.lock() = Some( Arc::new( Mutex::new( store ) ) );
      Ok( () )
    }

    /// Path of the configured cookie file, empty when none is set.
    #[ must_use ]
    pub fn cookie_file_path( &self ) -> PathBuf
    {
      self
        .shared
        .cookies
        .lock()
        .as_ref()
        .map( | store | store.lock().path().to_path_buf() )
        .unwrap_or_default()
    }

    /// Access mode of the configured cookie file.
    #[ must_use ]
    pub fn cookie_file_mode( &self ) -> CookieFileMode
    {
      self
        .shared
        .cookies
        .lock()
        .as_ref()
        .map_or( CookieFileMode::NotOpen, | store | store.lock().mode() )
    }

    /// Route submissions through the priority scheduler.
    pub fn enable_request_scheduler( &self, enable : bool )
    {
      *self.shared.scheduler_enabled.lock() = enable;
    }

    /// True when submissions go through the scheduler.
    #[ must_use ]
    pub fn is_scheduler_enabled( &self ) -> bool
    {
      *self.shared.scheduler_enabled.lock()
    }

    /// The embedded scheduler.
    #[ must_use ]
    pub fn scheduler( &self ) -> RequestScheduler
    {
      self.shared.scheduler.clone()
    }

    /// The pool manager feeding reuse statistics.
    #[ must_use ]
    pub fn pool_manager( &self ) -> Arc< ConnectionPoolManager >
    {
      Arc::clone( &self.shared.pool )
    }

    /// Replace the pool configuration; cached engine clients are rebuilt.
    pub fn set_pool_config( &self, config : ConnectionPoolConfig ) -> bool
    {
      let accepted = self.shared.pool.set_config( config );
      if accepted
      {
        self.shared.engine.flush_clients();
      }
      accepted
    }

    /// Flush pooled idle connections by dropping the cached engine clients.
    pub fn close_idle_connections( &self )
    {
      self.shared.engine.flush_clients();
    }

    // ------------------------------------------------------------------
    // request factories
    // ------------------------------------------------------------------

    /// Start a fluent per-call builder bound to this manager.
    pub fn new_request< S : Into< String > >( &self, url : S ) -> FluentRequest< '_ >
    {
      FluentRequest
      {
        manager : self,
        builder : RequestBuilder::new( url ),
      }
    }

    /// Issue a HEAD request.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_head( &self, request : Request ) -> NetworkResult< Reply >
    {
      self.issue( HttpMethod::Head, request, BodySource::Empty, | _reply | {} )
    }

    /// Issue a GET request.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_get( &self, request : Request ) -> NetworkResult< Reply >
    {
      self.issue( HttpMethod::Get, request, BodySource::Empty, | _reply | {} )
    }

    /// Issue a POST request with an in-memory body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_post( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.issue
      (
        HttpMethod::Post,
        request,
        BodySource::Bytes( bytes::Bytes::copy_from_slice( body ) ),
        | _reply | {},
      )
    }

    /// Issue a PUT request with an in-memory body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_put( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.issue
      (
        HttpMethod::Put,
        request,
        BodySource::Bytes( bytes::Bytes::copy_from_slice( body ) ),
        | _reply | {},
      )
    }

    /// Issue a DELETE request.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_delete( &self, request : Request ) -> NetworkResult< Reply >
    {
      self.issue( HttpMethod::Delete, request, BodySource::Empty, | _reply | {} )
    }

    /// Issue a PATCH request with an in-memory body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_patch( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.issue
      (
        HttpMethod::Patch,
        request,
        BodySource::Bytes( bytes::Bytes::copy_from_slice( body ) ),
        | _reply | {},
      )
    }

    /// Issue a GET through the scheduler regardless of the manager flag.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn schedule_get( &self, request : Request ) -> NetworkResult< Reply >
    {
      self.issue_scheduled( HttpMethod::Get, request, BodySource::Empty )
    }

    /// Issue a POST through the scheduler regardless of the manager flag.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn schedule_post( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.issue_scheduled
      (
        HttpMethod::Post,
        request,
        BodySource::Bytes( bytes::Bytes::copy_from_slice( body ) ),
      )
    }

    /// Issue a PUT through the scheduler regardless of the manager flag.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn schedule_put( &self, request : Request, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.issue_scheduled
      (
        HttpMethod::Put,
        request,
        BodySource::Bytes( bytes::Bytes::copy_from_slice( body ) ),
      )
    }

    // ------------------------------------------------------------------
    // convenience wrappers
    // ------------------------------------------------------------------

    /// POST a JSON document.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] when the value cannot be
    /// serialized or the URL is malformed.
    pub fn post_json( &self, url : &str, json : &serde_json::Value ) -> NetworkResult< Reply >
    {
      let body = serde_json::to_vec( json ).map_err( | _err | NetworkError::InvalidRequest )?;
      let mut request = Request::new( url );
      request.set_raw_header( "Content-Type", "application/json" );
      self.send_post( request, &body )
    }

    /// POST URL-encoded form fields.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn post_form( &self, url : &str, form : &[ ( &str, &str ) ] ) -> NetworkResult< Reply >
    {
      let body : String = form
        .iter()
        .map( | ( name, value ) | format!( "{}={}", urlencoding::encode( name ), urlencoding::encode( value ) ) )
        .collect::< Vec< _ > >()
        .join( "&" );
      let mut request = Request::new( url );
      request.set_raw_header( "Content-Type", "application/x-www-form-urlencoded" );
      self.send_post( request, body.as_bytes() )
    }

    /// POST a pre-encoded multipart payload. The body and its boundary come
    /// from an external `multipart/form-data` encoder.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn post_multipart( &self, mut request : Request, body : &[ u8 ], content_type : &str ) -> NetworkResult< Reply >
    {
      request.set_raw_header( "Content-Type", content_type );
      self.send_post( request, body )
    }

    /// Stream a GET response into a caller-owned device. The caller keeps
    /// ownership; cancellation only stops writing.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn download_to_device( &self, request : Request, device : ResponseDevice ) -> NetworkResult< Reply >
    {
      self.issue( HttpMethod::Get, request, BodySource::Empty, | reply |
      {
        reply.set_device( device );
      } )
    }

    /// Download a URL into a file, truncating any existing content.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the file cannot be created and
    /// [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn download_file( &self, url : &str, path : &Path ) -> NetworkResult< Reply >
    {
      let file = std::fs::File::create( path ).map_err( | _err | NetworkError::Unknown )?;
      self.download_to_device( Request::new( url ), Box::new( file ) )
    }

    /// Download with resume support.
    ///
    /// With `overwrite` false and an existing target file, its length becomes
    /// the resume offset: the file is opened in append mode and the request
    /// carries `Range: bytes=<offset>-`. A server that ignores the range (no
    /// `Content-Range` in the response) fails the reply with the
    /// range-not-satisfiable error instead of silently overwriting; the
    /// caller decides whether to delete the file and retry.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the file cannot be opened and
    /// [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn download_resumable( &self, url : &str, path : &Path, overwrite : bool ) -> NetworkResult< Reply >
    {
      let offset = if !overwrite && path.exists()
      {
        std::fs::metadata( path ).map( | meta | meta.len() ).unwrap_or( 0 )
      }
      else
      {
        0
      };
      let file = if offset > 0
      {
        std::fs::OpenOptions::new().append( true ).open( path )
      }
      else
      {
        std::fs::File::create( path )
      }
      .map_err( | _err | NetworkError::Unknown )?;

      self.issue( HttpMethod::Get, Request::new( url ), BodySource::Empty, | reply |
      {
        reply.set_device( Box::new( file ) );
        if offset > 0
        {
          reply.set_resume_offset( offset, true );
        }
      } )
    }

    /// Upload a file as a streamed PUT body. Retries reopen the file from the
    /// beginning.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn upload_file( &self, url : &str, path : &Path ) -> NetworkResult< Reply >
    {
      self.issue
      (
        HttpMethod::Put,
        Request::new( url ),
        BodySource::File( path.to_path_buf() ),
        | _reply | {},
      )
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn reply_context( &self ) -> ReplyContext
    {
      ReplyContext
      {
        driver : self.shared.driver.clone(),
        cache : self.shared.cache.lock().clone(),
        middlewares : self.shared.middlewares.lock().clone(),
        logger : self.shared.logger.lock().clone(),
        cookies : self.shared.cookies.lock().clone(),
        pool : Arc::clone( &self.shared.pool ),
      }
    }

    fn issue< F >( &self, method : HttpMethod, request : Request, body : BodySource, configure : F ) -> NetworkResult< Reply >
    where
      F : FnOnce( &Reply ),
    {
      request.validate()?;
      let reply = Reply::new( method, request, body, ExecutionMode::Asynchronous, self.reply_context() );
      configure( &reply );

      #[ cfg( feature = "mock_handler" ) ]
      if self.install_mock( &reply )
      {
        reply.execute();
        return Ok( reply );
      }

      if self.is_scheduler_enabled()
      {
        self.shared.scheduler.enqueue( &reply );
      }
      else
      {
        reply.execute();
      }
      Ok( reply )
    }

    fn issue_scheduled( &self, method : HttpMethod, request : Request, body : BodySource ) -> NetworkResult< Reply >
    {
      request.validate()?;
      let reply = Reply::new( method, request, body, ExecutionMode::Asynchronous, self.reply_context() );

      #[ cfg( feature = "mock_handler" ) ]
      if self.install_mock( &reply )
      {
        reply.execute();
        return Ok( reply );
      }

      self.shared.scheduler.enqueue( &reply );
      Ok( reply )
    }

    #[ cfg( feature = "mock_handler" ) ]
    fn install_mock( &self, reply : &Reply ) -> bool
    {
      let handler = self.shared.mock.lock().clone();
      let Some( handler ) = handler else { return false };
      let Some( outcome ) = handler.mock_for( &reply.url() ) else { return false };
      reply.set_mock( outcome, handler.global_delay() );
      true
    }
  }

  /// Fluent per-call builder bound to a manager, finalized by a send method.
  #[ derive( Debug ) ]
  #[ must_use ]
  pub struct FluentRequest< 'manager >
  {
    manager : &'manager AccessManager,
    builder : RequestBuilder,
  }

  impl FluentRequest< '_ >
  {
    /// Append a raw header.
    pub fn header< N : Into< String >, V : Into< String > >( mut self, name : N, value : V ) -> Self
    {
      self.builder = self.builder.header( name, value );
      self
    }

    /// Request a byte range `[start, end]`.
    pub fn range( mut self, start : u64, end : u64 ) -> Self
    {
      self.builder = self.builder.range( start, end );
      self
    }

    /// Toggle automatic redirect following.
    pub fn follow_redirects( mut self, follow : bool ) -> Self
    {
      self.builder = self.builder.follow_redirects( follow );
      self
    }

    /// Replace the TLS settings.
    pub fn ssl_config( mut self, ssl : SslConfig ) -> Self
    {
      self.builder = self.builder.ssl_config( ssl );
      self
    }

    /// Replace the proxy settings.
    pub fn proxy_config( mut self, proxy : ProxyConfig ) -> Self
    {
      self.builder = self.builder.proxy_config( proxy );
      self
    }

    /// Replace the timeout settings.
    pub fn timeout_config( mut self, timeout : TimeoutConfig ) -> Self
    {
      self.builder = self.builder.timeout_config( timeout );
      self
    }

    /// Set an explicit HTTP version preference.
    pub fn http_version( mut self, version : HttpVersion ) -> Self
    {
      self.builder = self.builder.http_version( version );
      self
    }

    /// Replace the retry policy.
    pub fn retry_policy( mut self, policy : RetryPolicy ) -> Self
    {
      self.builder = self.builder.retry_policy( policy );
      self
    }

    /// Set the scheduling priority.
    pub fn priority( mut self, priority : RequestPriority ) -> Self
    {
      self.builder = self.builder.priority( priority );
      self
    }

    /// Set the cache policy.
    pub fn cache_policy( mut self, policy : CachePolicy ) -> Self
    {
      self.builder = self.builder.cache_policy( policy );
      self
    }

    /// Finalize as GET.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_get( self ) -> NetworkResult< Reply >
    {
      self.manager.send_get( self.builder.build()? )
    }

    /// Finalize as HEAD.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_head( self ) -> NetworkResult< Reply >
    {
      self.manager.send_head( self.builder.build()? )
    }

    /// Finalize as DELETE.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_delete( self ) -> NetworkResult< Reply >
    {
      self.manager.send_delete( self.builder.build()? )
    }

    /// Finalize as POST with a body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_post( self, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.manager.send_post( self.builder.build()?, body )
    }

    /// Finalize as PUT with a body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_put( self, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.manager.send_put( self.builder.build()?, body )
    }

    /// Finalize as PATCH with a body.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn send_patch( self, body : &[ u8 ] ) -> NetworkResult< Reply >
    {
      self.manager.send_patch( self.builder.build()?, body )
    }

    /// Finalize as GET through the scheduler.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn schedule_get( self ) -> NetworkResult< Reply >
    {
      self.manager.schedule_get( self.builder.build()? )
    }

    /// Finalize into a plain request without sending it.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for a malformed request.
    pub fn build( self ) -> NetworkResult< Request >
    {
      self.builder.build()
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use AccessManager;
  exposed use FluentRequest;
}
