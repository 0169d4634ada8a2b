//! Timeout configuration for HTTP transfers.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;

  /// Timeout settings for a single request.
  ///
  /// `total_timeout` of zero means unlimited. The low-speed pair describes a
  /// stall window: a transfer moving slower than `low_speed_limit` bytes/s
  /// for longer than `low_speed_time` is aborted as timed out. Either value
  /// at zero disables the stall check.
  #[ derive( Debug, Clone, PartialEq, Eq, Hash ) ]
  #[ must_use ]
  pub struct TimeoutConfig
  {
    /// Maximum time to establish the connection.
    pub connect_timeout : Duration,
    /// Maximum time for the whole transfer. Zero means unlimited.
    pub total_timeout : Duration,
    /// Minimum transfer speed in bytes per second.
    pub low_speed_limit : u64,
    /// How long the transfer may stay below the minimum speed.
    pub low_speed_time : Duration,
  }

  impl Default for TimeoutConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        connect_timeout : Duration::from_secs( 30 ),
        total_timeout : Duration::ZERO,
        low_speed_limit : 0,
        low_speed_time : Duration::ZERO,
      }
    }
  }

  impl TimeoutConfig
  {
    /// Create the default configuration (30 s connect, unlimited total).
    #[ inline ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Set the connect timeout.
    #[ inline ]
    pub fn with_connect_timeout( mut self, timeout : Duration ) -> Self
    {
      self.connect_timeout = timeout;
      self
    }

    /// Set the total transfer timeout. Zero disables it.
    #[ inline ]
    pub fn with_total_timeout( mut self, timeout : Duration ) -> Self
    {
      self.total_timeout = timeout;
      self
    }

    /// Configure the stall window.
    #[ inline ]
    pub fn with_low_speed( mut self, limit_bytes_per_sec : u64, window : Duration ) -> Self
    {
      self.low_speed_limit = limit_bytes_per_sec;
      self.low_speed_time = window;
      self
    }

    /// True when the stall check is active.
    #[ inline ]
    #[ must_use ]
    pub fn stall_check_enabled( &self ) -> bool
    {
      self.low_speed_limit > 0 && !self.low_speed_time.is_zero()
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use TimeoutConfig;
}
