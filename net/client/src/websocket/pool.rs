//! Keep-alive WebSocket connection pool.

#[ cfg( all( feature = "enabled", feature = "websocket_pool" ) ) ]
mod private
{
  use core::time::Duration;
  use std::collections::HashMap;
  use std::sync::Arc;
  use std::time::Instant;

  use parking_lot::Mutex;

  use crate::error::{ NetworkError, NetworkResult };
  use crate::events::Signal;
  use crate::ssl::SslConfig;
  use crate::websocket::compression::WsCompressionConfig;
  use crate::websocket::session::{ WebSocketSession, WsState };

  /// Pool limits and maintenance intervals.
  #[ derive( Debug, Clone ) ]
  #[ must_use ]
  pub struct WsPoolConfig
  {
    /// Ceiling on pooled sessions overall.
    pub max_total_connections : usize,
    /// Ceiling on pooled sessions per URL.
    pub max_connections_per_url : usize,
    /// Idle time after which a session is closed by cleanup.
    pub max_idle_time : Duration,
    /// Idle sessions kept alive per URL regardless of idle time.
    pub min_idle_connections : usize,
    /// Interval of the cleanup sweep.
    pub cleanup_interval : Duration,
    /// Keep-alive ping interval for idle sessions; `None` disables pings.
    pub keepalive_interval : Option< Duration >,
    /// TLS settings applied to sessions the pool creates.
    pub ssl : SslConfig,
    /// Compression offer applied to sessions the pool creates.
    pub compression : WsCompressionConfig,
  }

  impl Default for WsPoolConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        max_total_connections : 20,
        max_connections_per_url : 5,
        max_idle_time : Duration::from_secs( 60 ),
        min_idle_connections : 1,
        cleanup_interval : Duration::from_secs( 30 ),
        keepalive_interval : None,
        ssl : SslConfig::new(),
        compression : WsCompressionConfig::default(),
      }
    }
  }

  /// Point-in-time pool counters.
  #[ derive( Debug, Clone, Copy, Default, PartialEq, Eq ) ]
  pub struct WsPoolStatistics
  {
    /// Acquisitions served by an idle pooled session.
    pub hits : u64,
    /// Acquisitions that had to create a session.
    pub misses : u64,
    /// Sessions created by the pool.
    pub created : u64,
    /// Sessions closed by cleanup.
    pub closed : u64,
    /// Acquisitions rejected by a ceiling.
    pub limit_rejections : u64,
  }

  struct PooledEntry
  {
    session : WebSocketSession,
    in_use : bool,
    created_at : Instant,
    last_used_at : Instant,
    reuse_count : u32,
  }

  struct PoolState
  {
    config : WsPoolConfig,
    per_url : HashMap< String, Vec< PooledEntry > >,
    stats : WsPoolStatistics,
    tasks_started : bool,
  }

  impl PoolState
  {
    fn total_count( &self ) -> usize
    {
      self.per_url.values().map( Vec::len ).sum()
    }
  }

  #[ derive( Default ) ]
  struct PoolSignals
  {
    pool_limit_reached : Signal< String >,
  }

  /// Pool reusing connected sessions per URL.
  ///
  /// Cloneable; clones share one pool. Cleanup and keep-alive tasks start
  /// lazily with the first acquisition and stop when the last handle drops.
  #[ derive( Clone ) ]
  pub struct WebSocketPool
  {
    state : Arc< Mutex< PoolState > >,
    signals : Arc< PoolSignals >,
  }

  impl core::fmt::Debug for WebSocketPool
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      let state = self.state.lock();
      f.debug_struct( "WebSocketPool" )
        .field( "urls", &state.per_url.len() )
        .field( "sessions", &state.total_count() )
        .finish_non_exhaustive()
    }
  }

  impl Default for WebSocketPool
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::new( WsPoolConfig::default() )
    }
  }

  impl WebSocketPool
  {
    /// Create a pool with the given configuration.
    #[ must_use ]
    pub fn new( config : WsPoolConfig ) -> Self
    {
      Self
      {
        state : Arc::new( Mutex::new( PoolState
        {
          config,
          per_url : HashMap::new(),
          stats : WsPoolStatistics::default(),
          tasks_started : false,
        } ) ),
        signals : Arc::new( PoolSignals::default() ),
      }
    }

    /// Current counters.
    #[ must_use ]
    pub fn statistics( &self ) -> WsPoolStatistics
    {
      self.state.lock().stats
    }

    /// Sessions currently handed out.
    #[ must_use ]
    pub fn active_count( &self ) -> usize
    {
      self
        .state
        .lock()
        .per_url
        .values()
        .flatten()
        .filter( | entry | entry.in_use )
        .count()
    }

    /// Sessions currently idle in the pool.
    #[ must_use ]
    pub fn idle_count( &self ) -> usize
    {
      self
        .state
        .lock()
        .per_url
        .values()
        .flatten()
        .filter( | entry | !entry.in_use )
        .count()
    }

    /// Subscribe to acquisitions rejected by a ceiling; payload is the URL.
    pub fn on_pool_limit_reached< F : Fn( &str ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.pool_limit_reached.connect( move | url | handler( url ) );
    }

    /// Get a connected session for `url`: an idle pooled one when available,
    /// a freshly opened one otherwise.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when a ceiling rejects the
    /// acquisition, and propagates open errors for fresh sessions.
    pub async fn acquire( &self, url : &str ) -> NetworkResult< WebSocketSession >
    {
      self.ensure_tasks();

      let ( reuse, limit_hit ) =
      {
        let mut state = self.state.lock();
        let config_total = state.config.max_total_connections;
        let config_per_url = state.config.max_connections_per_url;
        let total = state.total_count();
        let mut reuse = None;

        if let Some( entries ) = state.per_url.get_mut( url )
        {
          for entry in entries.iter_mut()
          {
            if !entry.in_use && entry.session.state() == WsState::Connected
            {
              entry.in_use = true;
              entry.last_used_at = Instant::now();
              entry.reuse_count += 1;
              reuse = Some( entry.session.clone() );
              break;
            }
          }
        }

        match reuse
        {
          Some( session ) =>
          {
            state.stats.hits += 1;
            ( Some( session ), false )
          },
          None =>
          {
            state.stats.misses += 1;
            let url_count = state.per_url.get( url ).map_or( 0, Vec::len );
            let limit_hit = total >= config_total || url_count >= config_per_url;
            if limit_hit
            {
              state.stats.limit_rejections += 1;
            }
            ( None, limit_hit )
          },
        }
      };

      if let Some( session ) = reuse
      {
        return Ok( session );
      }
      if limit_hit
      {
        self.signals.pool_limit_reached.emit( &url.to_owned() );
        tracing::warn!( url, "websocket pool ceiling reached" );
        return Err( NetworkError::Unknown );
      }

      let session = WebSocketSession::new( url );
      {
        let state = self.state.lock();
        session.set_ssl_config( state.config.ssl.clone() );
        session.set_compression_config( state.config.compression );
      }
      session.open().await?;

      {
        let mut state = self.state.lock();
        state.stats.created += 1;
        let now = Instant::now();
        state.per_url.entry( url.to_owned() ).or_default().push( PooledEntry
        {
          session : session.clone(),
          in_use : true,
          created_at : now,
          last_used_at : now,
          reuse_count : 0,
        } );
      }
      Ok( session )
    }

    /// Return a session to the pool, marking it idle.
    pub fn release( &self, session : &WebSocketSession )
    {
      let mut state = self.state.lock();
      for entries in state.per_url.values_mut()
      {
        for entry in entries.iter_mut()
        {
          if entry.session.id() == session.id()
          {
            entry.in_use = false;
            entry.last_used_at = Instant::now();
            return;
          }
        }
      }
    }

    /// Close and drop every pooled session.
    pub fn clear( &self )
    {
      let entries : Vec< PooledEntry > =
      {
        let mut state = self.state.lock();
        state.per_url.drain().flat_map( | ( _url, entries ) | entries ).collect()
      };
      for entry in &entries
      {
        entry.session.abort();
      }
    }

    fn ensure_tasks( &self )
    {
      let ( cleanup_interval, keepalive_interval ) =
      {
        let mut state = self.state.lock();
        if state.tasks_started
        {
          return;
        }
        state.tasks_started = true;
        ( state.config.cleanup_interval, state.config.keepalive_interval )
      };

      let state_weak = Arc::downgrade( &self.state );
      let signals_weak = Arc::downgrade( &self.signals );
      tokio::spawn( async move
      {
        let mut ticker = tokio::time::interval( cleanup_interval );
        ticker.set_missed_tick_behavior( tokio::time::MissedTickBehavior::Delay );
        loop
        {
          ticker.tick().await;
          let Some( state ) = state_weak.upgrade() else { break };
          let Some( signals ) = signals_weak.upgrade() else { break };
          let pool = WebSocketPool { state, signals };
          pool.cleanup_pass();
        }
      } );

      if let Some( keepalive ) = keepalive_interval
      {
        let state_weak = Arc::downgrade( &self.state );
        tokio::spawn( async move
        {
          let mut ticker = tokio::time::interval( keepalive );
          ticker.set_missed_tick_behavior( tokio::time::MissedTickBehavior::Delay );
          loop
          {
            ticker.tick().await;
            let Some( state ) = state_weak.upgrade() else { break };
            let idle_sessions : Vec< WebSocketSession > =
            {
              let state = state.lock();
              state
                .per_url
                .values()
                .flatten()
                .filter( | entry | !entry.in_use && entry.session.state() == WsState::Connected )
                .map( | entry | entry.session.clone() )
                .collect()
            };
            for session in idle_sessions
            {
              let _ = session.ping( b"" ).await;
            }
          }
        } );
      }
    }

    /// Close sessions idle past the bound, keeping the configured minimum
    /// per URL, and drop entries whose session already disconnected.
    fn cleanup_pass( &self )
    {
      let victims : Vec< WebSocketSession > =
      {
        let mut state = self.state.lock();
        let max_idle = state.config.max_idle_time;
        let min_idle = state.config.min_idle_connections;
        let mut victims = Vec::new();

        for entries in state.per_url.values_mut()
        {
          entries.retain( | entry |
          {
            entry.in_use || entry.session.state() == WsState::Connected
          } );

          let mut idle_kept = entries.iter().filter( | entry | !entry.in_use ).count();
          entries.retain( | entry |
          {
            let expired = !entry.in_use
              && idle_kept > min_idle
              && entry.last_used_at.elapsed() > max_idle;
            if expired
            {
              idle_kept -= 1;
              victims.push( entry.session.clone() );
            }
            !expired
          } );

          for entry in entries.iter()
          {
            tracing::trace!
            (
              session = entry.session.id(),
              age_secs = entry.created_at.elapsed().as_secs(),
              reuse_count = entry.reuse_count,
              "pooled websocket retained"
            );
          }
        }
        state.per_url.retain( | _url, entries | !entries.is_empty() );
        state.stats.closed += victims.len() as u64;
        victims
      };

      for session in victims
      {
        session.abort();
      }
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "websocket_pool" ) ) ]
crate::mod_interface!
{
  exposed use WsPoolConfig;
  exposed use WsPoolStatistics;
  exposed use WebSocketPool;
}
