//! Connection pool configuration and reuse accounting.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::collections::HashMap;
  use std::time::Instant;

  use parking_lot::Mutex;

  /// Connection pooling knobs applied to every transfer of a manager.
  ///
  /// The engine honors what its pool exposes; per-host idle limits and idle
  /// timeout map directly, the remaining knobs bound what the engine may do.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  #[ must_use ]
  pub struct ConnectionPoolConfig
  {
    /// Maximum simultaneous connections to a single host.
    pub max_connections_per_host : u32,
    /// Maximum simultaneous connections overall.
    pub max_total_connections : u32,
    /// Seconds an idle connection may stay pooled.
    pub max_idle_time : u32,
    /// Seconds a connection may live regardless of activity.
    pub max_connection_lifetime : u32,
    /// HTTP/1.1 pipelining. Discouraged and off by default.
    pub enable_pipelining : bool,
    /// HTTP/2 multiplexing over one connection.
    pub enable_multiplexing : bool,
    /// Cache DNS lookups inside the engine.
    pub enable_dns_cache : bool,
    /// DNS cache entry lifetime in seconds.
    pub dns_cache_timeout : i32,
    /// Open connections ahead of the first request.
    pub enable_connection_warming : bool,
  }

  impl Default for ConnectionPoolConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        max_connections_per_host : 6,
        max_total_connections : 30,
        max_idle_time : 60,
        max_connection_lifetime : 120,
        enable_pipelining : false,
        enable_multiplexing : true,
        enable_dns_cache : true,
        dns_cache_timeout : 60,
        enable_connection_warming : false,
      }
    }
  }

  impl ConnectionPoolConfig
  {
    /// Default configuration.
    #[ inline ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Configuration sanity check.
    #[ must_use ]
    pub fn is_valid( &self ) -> bool
    {
      self.max_connections_per_host > 0
        && self.max_total_connections > 0
        && self.max_connections_per_host <= self.max_total_connections
        && self.dns_cache_timeout >= -1
    }

    /// Conservative preset: few connections, no multiplexing. For constrained
    /// or legacy peers.
    pub fn conservative() -> Self
    {
      Self
      {
        max_connections_per_host : 2,
        max_total_connections : 10,
        max_idle_time : 30,
        max_connection_lifetime : 60,
        enable_multiplexing : false,
        ..Self::default()
      }
    }

    /// Aggressive preset: wide pool, multiplexing and warmup. For high
    /// throughput against capable servers.
    pub fn aggressive() -> Self
    {
      Self
      {
        max_connections_per_host : 10,
        max_total_connections : 100,
        max_idle_time : 120,
        max_connection_lifetime : 300,
        enable_multiplexing : true,
        enable_connection_warming : true,
        ..Self::default()
      }
    }

    /// Preset tuned for HTTP/2: few connections, many multiplexed streams.
    pub fn http2_optimized() -> Self
    {
      Self
      {
        max_connections_per_host : 2,
        max_total_connections : 20,
        enable_multiplexing : true,
        ..Self::default()
      }
    }
  }

  /// Point-in-time reuse statistics.
  #[ derive( Debug, Clone, Copy, Default, PartialEq, Eq ) ]
  pub struct PoolStatistics
  {
    /// Requests completed through this manager.
    pub total_requests : u64,
    /// Requests that reused a pooled connection.
    pub reused_connections : u64,
  }

  impl PoolStatistics
  {
    /// Fraction of requests that reused a connection, in `[0, 1]`.
    #[ inline ]
    #[ must_use ]
    pub fn reuse_rate( &self ) -> f64
    {
      if self.total_requests == 0
      {
        0.0
      }
      else
      {
        self.reused_connections as f64 / self.total_requests as f64
      }
    }
  }

  #[ derive( Debug, Default ) ]
  struct PoolState
  {
    config : ConnectionPoolConfig,
    stats : PoolStatistics,
    last_completion_per_host : HashMap< String, Instant >,
  }

  /// Mutex-guarded carrier of the pool configuration and reuse statistics.
  ///
  /// The engine does not report connection reuse directly, so reuse is
  /// inferred: a completion on a host that saw another completion within the
  /// idle window counts as reused.
  #[ derive( Debug, Default ) ]
  pub struct ConnectionPoolManager
  {
    state : Mutex< PoolState >,
  }

  impl ConnectionPoolManager
  {
    /// Create a manager with the default configuration.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Create a manager with an explicit configuration.
    #[ must_use ]
    pub fn with_config( config : ConnectionPoolConfig ) -> Self
    {
      Self
      {
        state : Mutex::new( PoolState { config, ..PoolState::default() } ),
      }
    }

    /// Current configuration.
    #[ must_use ]
    pub fn config( &self ) -> ConnectionPoolConfig
    {
      self.state.lock().config.clone()
    }

    /// Replace the configuration. Invalid configurations are rejected.
    pub fn set_config( &self, config : ConnectionPoolConfig ) -> bool
    {
      if !config.is_valid()
      {
        return false;
      }
      self.state.lock().config = config;
      true
    }

    /// Apply the pool options to an engine client builder.
    #[ must_use ]
    pub fn apply_to_builder( &self, builder : reqwest::ClientBuilder ) -> reqwest::ClientBuilder
    {
      let config = self.config();
      let builder = builder
        .pool_max_idle_per_host( config.max_connections_per_host as usize )
        .pool_idle_timeout( Some( Duration::from_secs( u64::from( config.max_idle_time ) ) ) );
      if config.enable_multiplexing
      {
        builder
      }
      else
      {
        builder.http1_only()
      }
    }

    /// Record a finished request for reuse accounting.
    pub fn record_request_completed( &self, host : &str )
    {
      let mut state = self.state.lock();
      let idle_window = Duration::from_secs( u64::from( state.config.max_idle_time ) );
      let now = Instant::now();
      let reused = state
        .last_completion_per_host
        .get( host )
        .is_some_and( | last | now.duration_since( *last ) <= idle_window );
      state.stats.total_requests += 1;
      if reused
      {
        state.stats.reused_connections += 1;
      }
      state.last_completion_per_host.insert( host.to_owned(), now );
    }

    /// Current statistics snapshot.
    #[ must_use ]
    pub fn statistics( &self ) -> PoolStatistics
    {
      self.state.lock().stats
    }

    /// Forget the reuse history (the engine clients are flushed by the owner).
    pub fn reset_reuse_history( &self )
    {
      self.state.lock().last_completion_per_host.clear();
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use ConnectionPoolConfig;
  exposed use ConnectionPoolManager;
  exposed use PoolStatistics;
}
