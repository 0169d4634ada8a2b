//! Reply execution unit.
//!
//! A reply owns one transfer at a time and walks the state machine
//! `Idle -> Running -> ( Paused | Cancelled | Error | Finished )`, with
//! `Paused -> Running` allowed and the last three states terminal. The handle
//! is cloneable; the driver keeps a clone while a transfer is active, so
//! completion dispatch is always safe regardless of when the application
//! drops its own handle.
//!
//! Completion runs the canonical pipeline: classification, retry consult,
//! cache fallback, post-response middlewares, cache write, terminal signals.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::collections::BTreeMap;
  use std::io::Write;
  use std::sync::atomic::{ AtomicU64, Ordering };
  use std::sync::Arc;

  use parking_lot::Mutex;
  use tokio::sync::watch;

  use crate::cache::{ is_cacheable, CacheMetadata, NetworkCache };
  use crate::cache_policy::CachePolicy;
  use crate::cookie::CookieStore;
  use crate::error::NetworkError;
  use crate::events::Signal;
  use crate::handle::{ transfer_control_pair, BodySource, HttpMethod, TransferHandle, TransferSpec };
  use crate::logger::{ NetworkLogLevel, NetworkLogger };
  use crate::middleware::Middleware;
  use crate::multi::MultiDriverHandle;
  #[ cfg( feature = "mock_handler" ) ]
  use crate::mock::MockOutcome;
  use crate::pool::ConnectionPoolManager;
  use crate::request::Request;

  static NEXT_REPLY_ID : AtomicU64 = AtomicU64::new( 1 );

  /// Lifecycle state of a reply.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum ReplyState
  {
    /// Created, not yet executed.
    Idle,
    /// A transfer is active.
    Running,
    /// The transfer is suspended.
    Paused,
    /// Terminal: aborted by the caller.
    Cancelled,
    /// Terminal: failed.
    Error,
    /// Terminal: completed.
    Finished,
  }

  impl ReplyState
  {
    /// True for `Cancelled`, `Error` and `Finished`.
    #[ inline ]
    #[ must_use ]
    pub fn is_terminal( self ) -> bool
    {
      matches!( self, Self::Cancelled | Self::Error | Self::Finished )
    }
  }

  /// Whether the reply was issued through the async surface or a blocking
  /// wrapper.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Default ) ]
  pub enum ExecutionMode
  {
    /// Signals fire on the runtime; completion is awaited.
    #[ default ]
    Asynchronous,
    /// Completion is blocked on by a wrapper runtime. Not for UI threads.
    Synchronous,
  }

  /// Writable sink a streaming download is delivered to.
  pub type ResponseDevice = Box< dyn Write + Send >;

  /// Shared policy objects a reply needs from its manager.
  pub struct ReplyContext
  {
    /// Driver accepting configured attempts.
    pub driver : MultiDriverHandle,
    /// Cache consulted and filled per the request's cache policy.
    pub cache : Option< Arc< dyn NetworkCache > >,
    /// Middlewares in registration order.
    pub middlewares : Vec< Arc< dyn Middleware > >,
    /// Optional user-facing logger.
    pub logger : Option< Arc< NetworkLogger > >,
    /// Shared cookie store, when a cookie file is configured.
    pub cookies : Option< Arc< Mutex< CookieStore > > >,
    /// Pool manager fed with completion accounting.
    pub pool : Arc< ConnectionPoolManager >,
  }

  impl core::fmt::Debug for ReplyContext
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "ReplyContext" )
        .field( "middlewares", &self.middlewares.len() )
        .field( "has_cache", &self.cache.is_some() )
        .field( "has_logger", &self.logger.is_some() )
        .finish_non_exhaustive()
    }
  }

  #[ derive( Default ) ]
  struct ReplySignals
  {
    ready_read : Signal< () >,
    download_progress : Signal< ( u64, i64 ) >,
    upload_progress : Signal< ( u64, i64 ) >,
    finished : Signal< () >,
    error : Signal< NetworkError >,
    state_changed : Signal< ReplyState >,
    cancelled : Signal< () >,
    retry_attempt : Signal< ( u32, Duration ) >,
  }

  struct ReplyStateData
  {
    request : Request,
    state : ReplyState,
    error : NetworkError,
    error_string : String,
    status_code : u16,
    raw_headers : Vec< u8 >,
    header_pairs : Vec< ( String, String ) >,
    body : Vec< u8 >,
    device : Option< ResponseDevice >,
    device_used : bool,
    bytes_received : u64,
    bytes_total : i64,
    bytes_sent : u64,
    attempt_count : u32,
    executed : bool,
    attempted_network : bool,
    fallback_to_cache : bool,
    from_cache : bool,
    resume_offset : u64,
    require_content_range : bool,
    http_error_body : bool,
    pending_error : Option< NetworkError >,
    discard_done : u32,
    attempt_epoch : u64,
    transfer : Option< TransferHandle >,
    finish_emitted : bool,
  }

  struct ReplyInner
  {
    id : u64,
    method : HttpMethod,
    mode : ExecutionMode,
    body : BodySource,
    ctx : ReplyContext,
    state : Mutex< ReplyStateData >,
    signals : ReplySignals,
    finished_tx : watch::Sender< bool >,
    finished_rx : watch::Receiver< bool >,
    #[ cfg( feature = "mock_handler" ) ]
    mock : Mutex< Option< ( MockOutcome, Duration ) > >,
  }

  enum CompletionNext
  {
    Finalize( NetworkError, u16 ),
    Retry( u32, Duration ),
    Fallback( NetworkError, u16 ),
    Ignore,
  }

  /// Handle to one executing request.
  #[ derive( Clone ) ]
  pub struct Reply
  {
    inner : Arc< ReplyInner >,
  }

  impl core::fmt::Debug for Reply
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      let state = self.inner.state.lock();
      f.debug_struct( "Reply" )
        .field( "id", &self.inner.id )
        .field( "method", &self.inner.method )
        .field( "url", &state.request.url() )
        .field( "state", &state.state )
        .finish_non_exhaustive()
    }
  }

  impl Reply
  {
    pub( crate ) fn new
    (
      method : HttpMethod,
      request : Request,
      body : BodySource,
      mode : ExecutionMode,
      ctx : ReplyContext,
    ) -> Self
    {
      let ( finished_tx, finished_rx ) = watch::channel( false );
      Self
      {
        inner : Arc::new( ReplyInner
        {
          id : NEXT_REPLY_ID.fetch_add( 1, Ordering::Relaxed ),
          method,
          mode,
          body,
          ctx,
          state : Mutex::new( ReplyStateData
          {
            request,
            state : ReplyState::Idle,
            error : NetworkError::NoError,
            error_string : String::new(),
            status_code : 0,
            raw_headers : Vec::new(),
            header_pairs : Vec::new(),
            body : Vec::new(),
            device : None,
            device_used : false,
            bytes_received : 0,
            bytes_total : -1,
            bytes_sent : 0,
            attempt_count : 0,
            executed : false,
            attempted_network : false,
            fallback_to_cache : false,
            from_cache : false,
            resume_offset : 0,
            require_content_range : false,
            http_error_body : false,
            pending_error : None,
            discard_done : 0,
            attempt_epoch : 0,
            transfer : None,
            finish_emitted : false,
          } ),
          signals : ReplySignals::default(),
          finished_tx,
          finished_rx,
          #[ cfg( feature = "mock_handler" ) ]
          mock : Mutex::new( None ),
        } ),
      }
    }

    /// Stable identifier of this reply.
    #[ inline ]
    #[ must_use ]
    pub fn id( &self ) -> u64
    {
      self.inner.id
    }

    /// HTTP method of the request.
    #[ inline ]
    #[ must_use ]
    pub fn method( &self ) -> HttpMethod
    {
      self.inner.method
    }

    /// Execution mode the reply was issued in.
    #[ inline ]
    #[ must_use ]
    pub fn execution_mode( &self ) -> ExecutionMode
    {
      self.inner.mode
    }

    /// Current state.
    #[ must_use ]
    pub fn state( &self ) -> ReplyState
    {
      self.inner.state.lock().state
    }

    /// Request URL.
    #[ must_use ]
    pub fn url( &self ) -> String
    {
      self.inner.state.lock().request.url().to_owned()
    }

    /// Scheduling priority of the owning request.
    #[ must_use ]
    pub fn priority( &self ) -> crate::priority::RequestPriority
    {
      self.inner.state.lock().request.priority()
    }

    /// Host portion of the request URL.
    #[ must_use ]
    pub fn host( &self ) -> String
    {
      self.inner.state.lock().request.host()
    }

    /// Error kind of the terminal outcome, `NoError` before completion or on
    /// success.
    #[ must_use ]
    pub fn error( &self ) -> NetworkError
    {
      self.inner.state.lock().error
    }

    /// Human-readable description of the terminal error, empty on success.
    #[ must_use ]
    pub fn error_string( &self ) -> String
    {
      self.inner.state.lock().error_string.clone()
    }

    /// HTTP status code, 0 when no status line was received.
    #[ must_use ]
    pub fn status_code( &self ) -> u16
    {
      self.inner.state.lock().status_code
    }

    /// Raw response header bytes, status line included.
    #[ must_use ]
    pub fn raw_headers( &self ) -> Vec< u8 >
    {
      self.inner.state.lock().raw_headers.clone()
    }

    /// First response header matching `name` case-insensitively, trimmed.
    #[ must_use ]
    pub fn header_value( &self, name : &str ) -> Option< String >
    {
      self
        .inner
        .state
        .lock()
        .header_pairs
        .iter()
        .find( | ( header_name, _ ) | header_name.eq_ignore_ascii_case( name ) )
        .map( | ( _, value ) | value.trim().to_owned() )
    }

    /// Bytes currently buffered and not yet consumed by `read_all`.
    #[ must_use ]
    pub fn bytes_available( &self ) -> u64
    {
      self.inner.state.lock().body.len() as u64
    }

    /// Take the accumulated body, leaving the buffer empty.
    #[ must_use ]
    pub fn read_all( &self ) -> Vec< u8 >
    {
      core::mem::take( &mut self.inner.state.lock().body )
    }

    /// Bytes received so far.
    #[ must_use ]
    pub fn bytes_received( &self ) -> u64
    {
      self.inner.state.lock().bytes_received
    }

    /// Expected total bytes, -1 when unknown.
    #[ must_use ]
    pub fn bytes_total( &self ) -> i64
    {
      self.inner.state.lock().bytes_total
    }

    /// Bytes of request body sent so far.
    #[ must_use ]
    pub fn bytes_sent( &self ) -> u64
    {
      self.inner.state.lock().bytes_sent
    }

    /// Attempt counter; zero until the first retry is scheduled.
    #[ must_use ]
    pub fn attempt_count( &self ) -> u32
    {
      self.inner.state.lock().attempt_count
    }

    /// True once a terminal state was reached and `finished` emitted.
    #[ must_use ]
    pub fn is_finished( &self ) -> bool
    {
      *self.inner.finished_rx.borrow()
    }

    /// True when the body was served from the cache rather than the network.
    #[ must_use ]
    pub fn served_from_cache( &self ) -> bool
    {
      self.inner.state.lock().from_cache
    }

    /// Wait until `finished` has been emitted.
    pub async fn wait_finished( &self )
    {
      let mut receiver = self.inner.finished_rx.clone();
      if *receiver.borrow()
      {
        return;
      }
      while receiver.changed().await.is_ok()
      {
        if *receiver.borrow()
        {
          return;
        }
      }
    }

    // ------------------------------------------------------------------
    // signal subscriptions
    // ------------------------------------------------------------------

    /// Body bytes became available.
    pub fn on_ready_read< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.ready_read.connect( move | () | handler() );
    }

    /// Download progressed: `( received, total )`, total -1 when unknown.
    pub fn on_download_progress_signal< F : Fn( u64, i64 ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.download_progress.connect( move | ( received, total ) | handler( *received, *total ) );
    }

    /// Upload progressed: `( sent, total )`, total -1 when unknown.
    pub fn on_upload_progress_signal< F : Fn( u64, i64 ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.upload_progress.connect( move | ( sent, total ) | handler( *sent, *total ) );
    }

    /// The reply reached a terminal state. Emitted exactly once.
    pub fn on_finished< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.finished.connect( move | () | handler() );
    }

    /// A terminal failure occurred; emitted before `finished`.
    pub fn on_error< F : Fn( NetworkError ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.error.connect( move | error | handler( *error ) );
    }

    /// The state changed.
    pub fn on_state_changed< F : Fn( ReplyState ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.state_changed.connect( move | state | handler( *state ) );
    }

    /// The reply was cancelled; emitted before `finished`.
    pub fn on_cancelled< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.cancelled.connect( move | () | handler() );
    }

    /// A retry was scheduled: `( attempt, delay )`.
    pub fn on_retry_attempt< F : Fn( u32, Duration ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.retry_attempt.connect( move | ( attempt, delay ) | handler( *attempt, *delay ) );
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Start the request. Idempotent while running and after completion.
    pub fn execute( &self )
    {
      {
        let mut state = self.inner.state.lock();
        if state.executed || state.state.is_terminal()
        {
          return;
        }
        state.executed = true;
      }

      #[ cfg( feature = "mock_handler" ) ]
      if self.inner.mock.lock().is_some()
      {
        self.mark_running();
        self.spawn_mock_task();
        return;
      }

      if self.pre_execute_cache_check()
      {
        return;
      }

      if !self.inner.ctx.middlewares.is_empty()
      {
        let mut request = self.inner.state.lock().request.clone();
        for middleware in &self.inner.ctx.middlewares
        {
          middleware.on_request_pre_send( &mut request );
        }
        self.inner.state.lock().request = request;
      }

      self.submit_attempt();
    }

    /// Abort the request. Synchronous and safe at any time; a terminal reply
    /// swallows the call.
    pub fn cancel( &self )
    {
      let transfer =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          return;
        }
        state.pending_error = Some( NetworkError::OperationCancelled );
        state.transfer.take()
      };
      if let Some( transfer ) = transfer
      {
        transfer.cancel();
      }
      self.inner.signals.cancelled.emit( &() );
      self.finalize( NetworkError::OperationCancelled, 0 );
    }

    /// Suspend the transfer at the transport level.
    pub fn pause( &self )
    {
      let transfer =
      {
        let mut state = self.inner.state.lock();
        if state.state != ReplyState::Running
        {
          return;
        }
        state.state = ReplyState::Paused;
        state.transfer.clone()
      };
      if let Some( transfer ) = transfer
      {
        transfer.set_paused( true );
      }
      self.inner.signals.state_changed.emit( &ReplyState::Paused );
    }

    /// Resume a paused transfer, nudging the engine task awake.
    pub fn resume( &self )
    {
      let transfer =
      {
        let mut state = self.inner.state.lock();
        if state.state != ReplyState::Paused
        {
          return;
        }
        state.state = ReplyState::Running;
        state.transfer.clone()
      };
      if let Some( transfer ) = transfer
      {
        transfer.set_paused( false );
      }
      self.inner.signals.state_changed.emit( &ReplyState::Running );
    }

    // ------------------------------------------------------------------
    // manager-side configuration
    // ------------------------------------------------------------------

    pub( crate ) fn set_device( &self, device : ResponseDevice )
    {
      let mut state = self.inner.state.lock();
      state.device = Some( device );
      state.device_used = true;
    }

    pub( crate ) fn set_resume_offset( &self, offset : u64, require_content_range : bool )
    {
      let mut state = self.inner.state.lock();
      state.resume_offset = offset;
      state.require_content_range = require_content_range;
    }

    #[ cfg( feature = "mock_handler" ) ]
    pub( crate ) fn set_mock( &self, outcome : MockOutcome, delay : Duration )
    {
      *self.inner.mock.lock() = Some( ( outcome, delay ) );
    }

    pub( crate ) fn defer_abort( &self )
    {
      let transfer =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          return;
        }
        state.executed = false;
        state.state = ReplyState::Idle;
        state.attempted_network = false;
        state.pending_error = None;
        state.http_error_body = false;
        state.body.clear();
        state.raw_headers.clear();
        state.header_pairs.clear();
        state.status_code = 0;
        state.bytes_received = 0;
        state.bytes_total = -1;
        // Exactly one completion for the aborted attempt is still in flight;
        // it must not finalize the parked reply. The epoch bump additionally
        // drops the aborted attempt's body events.
        state.discard_done += 1;
        state.attempt_epoch += 1;
        state.transfer.take()
      };
      if let Some( transfer ) = transfer
      {
        transfer.cancel();
      }
      self.inner.signals.state_changed.emit( &ReplyState::Idle );
    }

    // ------------------------------------------------------------------
    // execution internals
    // ------------------------------------------------------------------

    /// Returns true when the cache check fully resolved the reply.
    fn pre_execute_cache_check( &self ) -> bool
    {
      let ( policy, url ) =
      {
        let state = self.inner.state.lock();
        ( state.request.cache_policy(), state.request.url().to_owned() )
      };
      if !policy.reads_cache() || self.inner.method != HttpMethod::Get
      {
        return false;
      }
      let Some( cache ) = &self.inner.ctx.cache else
      {
        if policy == CachePolicy::OnlyCache
        {
          self.finalize( NetworkError::NoCacheEntry, 0 );
          return true;
        }
        return false;
      };

      let entry = cache.data( &url ).zip( cache.metadata( &url ) );
      match policy
      {
        CachePolicy::OnlyCache => match entry
        {
          Some( ( data, metadata ) ) =>
          {
            self.serve_from_cache( data, &metadata );
          },
          None =>
          {
            self.finalize( NetworkError::NoCacheEntry, 0 );
          },
        },
        CachePolicy::AlwaysCache =>
        {
          match entry
          {
            Some( ( data, metadata ) ) => self.serve_from_cache( data, &metadata ),
            None => return false,
          }
        },
        CachePolicy::PreferCache =>
        {
          match entry
          {
            Some( ( data, metadata ) ) if metadata.is_valid() => self.serve_from_cache( data, &metadata ),
            _ => return false,
          }
        },
        CachePolicy::PreferNetwork =>
        {
          self.inner.state.lock().fallback_to_cache = true;
          return false;
        },
        CachePolicy::OnlyNetwork => return false,
      }
      true
    }

    fn serve_from_cache( &self, data : Vec< u8 >, metadata : &CacheMetadata )
    {
      {
        let mut state = self.inner.state.lock();
        state.from_cache = true;
        state.status_code = 200;
        state.header_pairs = metadata
          .headers
          .iter()
          .map( | ( name, value ) | ( name.clone(), value.clone() ) )
          .collect();
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        for ( name, value ) in &state.header_pairs
        {
          raw.extend_from_slice( format!( "{name}: {value}\r\n" ).as_bytes() );
        }
        raw.extend_from_slice( b"\r\n" );
        state.raw_headers = raw;
        state.bytes_received = data.len() as u64;
        state.bytes_total = data.len() as i64;
        state.body = data;
      }
      self.inner.signals.ready_read.emit( &() );
      self.finalize( NetworkError::NoError, 200 );
    }

    fn mark_running( &self )
    {
      let changed =
      {
        let mut state = self.inner.state.lock();
        if state.state == ReplyState::Running
        {
          false
        }
        else
        {
          state.state = ReplyState::Running;
          true
        }
      };
      if changed
      {
        self.inner.signals.state_changed.emit( &ReplyState::Running );
      }
    }

    fn build_spec( &self ) -> TransferSpec
    {
      let ( request, resume_offset ) =
      {
        let state = self.inner.state.lock();
        ( state.request.clone(), state.resume_offset )
      };

      let mut headers : Vec< ( String, String ) > = Vec::new();
      if let Some( ( start, end ) ) = request.range()
      {
        headers.push( ( "Range".to_owned(), format!( "bytes={start}-{end}" ) ) );
      }
      else if resume_offset > 0
      {
        headers.push( ( "Range".to_owned(), format!( "bytes={resume_offset}-" ) ) );
      }
      for ( name, value ) in request.raw_header_list()
      {
        headers.push( ( name.clone(), value.clone() ) );
      }
      if let Some( store ) = &self.inner.ctx.cookies
      {
        if let Some( cookie ) = store.lock().header_for_url( request.url() )
        {
          headers.push( ( "Cookie".to_owned(), cookie ) );
        }
      }

      TransferSpec
      {
        method : self.inner.method,
        url : request.url().to_owned(),
        headers,
        body : self.inner.body.clone(),
        timeout : request.timeout_config().clone(),
        ssl : request.ssl_config().clone(),
        proxy : request.proxy_config().filter( | proxy | proxy.is_valid() ).cloned(),
        version : request.http_version(),
        follow_redirects : request.follow_redirects(),
      }
    }

    fn submit_attempt( &self )
    {
      let spec = self.build_spec();
      let ( handle, control ) = transfer_control_pair();
      {
        let mut state = self.inner.state.lock();
        state.transfer = Some( handle );
        state.attempted_network = true;
      }
      self.mark_running();
      if let Some( logger ) = &self.inner.ctx.logger
      {
        logger.info( "Request", &format!( "{} {}", self.inner.method.as_str(), spec.url ) );
      }
      if !self.inner.ctx.driver.submit( self.clone(), spec, control )
      {
        tracing::warn!( "driver rejected transfer submission during shutdown" );
        self.finalize( NetworkError::OperationCancelled, 0 );
      }
    }

    fn resubmit( &self )
    {
      #[ cfg( feature = "mock_handler" ) ]
      if self.inner.mock.lock().is_some()
      {
        self.spawn_mock_task();
        return;
      }
      self.submit_attempt();
    }

    #[ cfg( feature = "mock_handler" ) ]
    fn spawn_mock_task( &self )
    {
      let reply = self.clone();
      let epoch = self.inner.state.lock().attempt_epoch;
      tokio::spawn( async move
      {
        let Some( ( outcome, delay ) ) = reply.inner.mock.lock().clone() else { return };
        if !delay.is_zero()
        {
          tokio::time::sleep( delay ).await;
        }
        if reply.is_finished()
        {
          return;
        }
        // A deferred reply bumped the epoch: skip the body events but still
        // deliver the completion so the discard accounting balances.
        let fresh = reply.inner.state.lock().attempt_epoch == epoch;
        match outcome
        {
          MockOutcome::Response { status_code, body, headers } =>
          {
            if fresh
            {
              let mut raw = format!( "HTTP/1.1 {status_code}\r\n" ).into_bytes();
              for ( name, value ) in &headers
              {
                raw.extend_from_slice( format!( "{name}: {value}\r\n" ).as_bytes() );
              }
              raw.extend_from_slice( b"\r\n" );
              reply.on_transfer_status( status_code, headers, raw );
              if !body.is_empty()
              {
                reply.on_transfer_chunk( &body );
                reply.on_download_progress( body.len() as u64, body.len() as i64 );
              }
            }
            reply.on_transfer_done( NetworkError::NoError, status_code );
          },
          MockOutcome::Error( error ) =>
          {
            reply.on_transfer_done( error, 0 );
          },
        }
      } );
    }

    // ------------------------------------------------------------------
    // driver dispatch targets
    // ------------------------------------------------------------------

    pub( crate ) fn on_transfer_status
    (
      &self,
      status_code : u16,
      header_pairs : Vec< ( String, String ) >,
      raw_headers : Vec< u8 >,
    )
    {
      let ( url, set_cookies, abort ) =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted || !state.executed
        {
          return;
        }
        state.status_code = status_code;
        state.header_pairs = header_pairs;
        state.raw_headers = raw_headers;
        state.http_error_body = status_code >= 400;

        let mut abort = None;
        if state.require_content_range && state.resume_offset > 0 && status_code < 400
        {
          let has_content_range = state
            .header_pairs
            .iter()
            .any( | ( name, _ ) | name.eq_ignore_ascii_case( "content-range" ) );
          if !has_content_range
          {
            state.pending_error = Some( NetworkError::HttpRangeNotSatisfiable );
            abort = state.transfer.clone();
          }
        }

        let set_cookies : Vec< String > = state
          .header_pairs
          .iter()
          .filter( | ( name, _ ) | name.eq_ignore_ascii_case( "set-cookie" ) )
          .map( | ( _, value ) | value.clone() )
          .collect();
        ( state.request.url().to_owned(), set_cookies, abort )
      };

      if !set_cookies.is_empty()
      {
        if let Some( store ) = &self.inner.ctx.cookies
        {
          let mut store = store.lock();
          for header in &set_cookies
          {
            store.capture_set_cookie( &url, header );
          }
        }
      }
      if let Some( transfer ) = abort
      {
        transfer.cancel();
      }
    }

    pub( crate ) fn on_transfer_chunk( &self, data : &[ u8 ] )
    {
      let ( emit, abort ) =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted || !state.executed || state.pending_error.is_some()
        {
          ( false, None )
        }
        else
        {
          state.bytes_received += data.len() as u64;
          if state.device.is_some() && !state.http_error_body
          {
            let write_ok = state
              .device
              .as_mut()
              .is_some_and( | device | device.write_all( data ).is_ok() );
            if write_ok
            {
              ( true, None )
            }
            else
            {
              // A short write from the device aborts the transfer as a
              // caller-initiated cancellation.
              state.pending_error = Some( NetworkError::OperationCancelled );
              ( false, state.transfer.clone() )
            }
          }
          else
          {
            state.body.extend_from_slice( data );
            ( true, None )
          }
        }
      };
      if let Some( transfer ) = abort
      {
        transfer.cancel();
      }
      if emit
      {
        self.inner.signals.ready_read.emit( &() );
      }
    }

    pub( crate ) fn on_download_progress( &self, received : u64, total : i64 )
    {
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          return;
        }
        state.bytes_total = total;
      }
      self.inner.signals.download_progress.emit( &( received, total ) );
    }

    pub( crate ) fn on_upload_progress( &self, sent : u64, total : i64 )
    {
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          return;
        }
        state.bytes_sent = sent;
      }
      self.inner.signals.upload_progress.emit( &( sent, total ) );
    }

    pub( crate ) fn on_transfer_done( &self, error : NetworkError, status_code : u16 )
    {
      let next =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          CompletionNext::Ignore
        }
        else if state.discard_done > 0
        {
          state.discard_done -= 1;
          CompletionNext::Ignore
        }
        else
        {
          state.transfer = None;
          let effective = state.pending_error.take().unwrap_or( if error.is_error()
          {
            error
          }
          else
          {
            NetworkError::from_http_status( status_code )
          } );

          if effective.is_error() && effective != NetworkError::OperationCancelled
          {
            let policy = state.request.retry_policy().clone();
            // attempt_count holds the retries so far; the attempt that just
            // failed is one past it.
            let failed_attempt = state.attempt_count + 1;
            if policy.should_retry( effective, failed_attempt )
            {
              let delay = policy.delay_for_attempt( state.attempt_count );
              state.attempt_count += 1;
              state.body.clear();
              state.raw_headers.clear();
              state.header_pairs.clear();
              state.status_code = 0;
              state.bytes_received = 0;
              state.bytes_total = -1;
              state.http_error_body = false;
              CompletionNext::Retry( state.attempt_count, delay )
            }
            else if state.fallback_to_cache
            {
              CompletionNext::Fallback( effective, status_code )
            }
            else
            {
              CompletionNext::Finalize( effective, status_code )
            }
          }
          else
          {
            CompletionNext::Finalize( effective, status_code )
          }
        }
      };

      match next
      {
        CompletionNext::Ignore => {},
        CompletionNext::Finalize( effective, status ) => self.finalize( effective, status ),
        CompletionNext::Retry( attempt, delay ) =>
        {
          self.inner.signals.retry_attempt.emit( &( attempt, delay ) );
          if let Some( logger ) = &self.inner.ctx.logger
          {
            logger.warning
            (
              "Retry",
              &format!( "attempt {attempt} in {} ms for {}", delay.as_millis(), self.url() ),
            );
          }
          let reply = self.clone();
          tokio::spawn( async move
          {
            tokio::time::sleep( delay ).await;
            if !reply.is_finished()
            {
              reply.resubmit();
            }
          } );
        },
        CompletionNext::Fallback( effective, status ) =>
        {
          let url = self.url();
          let stale = self
            .inner
            .ctx
            .cache
            .as_ref()
            .and_then( | cache | cache.data( &url ).zip( cache.metadata( &url ) ) );
          match stale
          {
            Some( ( data, metadata ) ) => self.serve_from_cache( data, &metadata ),
            None => self.finalize( effective, status ),
          }
        },
      }
    }

    // ------------------------------------------------------------------
    // completion
    // ------------------------------------------------------------------

    fn finalize( &self, error : NetworkError, status_code : u16 )
    {
      struct FinalizeInfo
      {
        state : ReplyState,
        url : String,
        host : String,
        attempted_network : bool,
        cache_payload : Option< ( Vec< u8 >, BTreeMap< String, String > ) >,
      }

      let info =
      {
        let mut state = self.inner.state.lock();
        if state.finish_emitted
        {
          return;
        }
        state.finish_emitted = true;
        if status_code != 0
        {
          state.status_code = status_code;
        }
        state.error = error;
        state.error_string = if error.is_error() { error.to_string() } else { String::new() };
        state.state = match error
        {
          NetworkError::NoError => ReplyState::Finished,
          NetworkError::OperationCancelled => ReplyState::Cancelled,
          _ => ReplyState::Error,
        };
        state.transfer = None;
        state.device = None;

        let cache_eligible = state.state == ReplyState::Finished
          && !state.from_cache
          && !state.device_used
          && self.inner.method == HttpMethod::Get
          && state.request.cache_policy().writes_cache()
          && self.inner.ctx.cache.is_some();
        let cache_payload = cache_eligible.then( ||
        {
          let headers : BTreeMap< String, String > = state
            .header_pairs
            .iter()
            .map( | ( name, value ) | ( name.clone(), value.clone() ) )
            .collect();
          ( state.body.clone(), headers )
        } );

        FinalizeInfo
        {
          state : state.state,
          url : state.request.url().to_owned(),
          host : state.request.host(),
          attempted_network : state.attempted_network,
          cache_payload,
        }
      };

      if info.state != ReplyState::Cancelled
      {
        for middleware in &self.inner.ctx.middlewares
        {
          middleware.on_response_received( self );
        }
      }

      if let Some( ( body, headers ) ) = info.cache_payload
      {
        if is_cacheable( &headers )
        {
          if let Some( cache ) = &self.inner.ctx.cache
          {
            let metadata = CacheMetadata::from_response_headers( &info.url, body.len() as u64, headers );
            let _ = cache.insert( &info.url, &body, metadata );
          }
        }
      }

      if info.attempted_network && !info.host.is_empty()
      {
        self.inner.ctx.pool.record_request_completed( &info.host );
      }

      if let Some( logger ) = &self.inner.ctx.logger
      {
        let level = if error.is_error() { NetworkLogLevel::Warning } else { NetworkLogLevel::Info };
        logger.log
        (
          level,
          "Response",
          &format!( "{} {} -> status {} error {}", self.inner.method.as_str(), info.url, self.status_code(), error.code() ),
        );
      }

      if error.is_error() && error != NetworkError::OperationCancelled
      {
        self.inner.signals.error.emit( &error );
      }
      self.inner.signals.state_changed.emit( &info.state );
      self.inner.signals.finished.emit( &() );
      let _ = self.inner.finished_tx.send( true );
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use Reply;
  exposed use ReplyState;
  exposed use ExecutionMode;
  exposed use ReplyContext;
  exposed use ResponseDevice;
}
