//! WebSocket auto-reconnect policy.

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
mod private
{
  use core::time::Duration;
  use std::collections::HashSet;

  /// Reconnect behavior after a disconnect.
  ///
  /// Mirrors the HTTP retry policy: exponential backoff capped at
  /// `max_delay`, gated on a set of retriable close codes. The default
  /// policy never reconnects.
  #[ derive( Debug, Clone, PartialEq ) ]
  #[ must_use ]
  pub struct WsReconnectPolicy
  {
    /// Maximum reconnect attempts. Zero disables reconnecting.
    pub max_retries : u32,
    /// Delay before the first attempt.
    pub initial_delay : Duration,
    /// Multiplier applied per attempt.
    pub backoff_multiplier : f64,
    /// Upper bound on any single delay.
    pub max_delay : Duration,
    /// Close codes that may trigger a reconnect.
    pub retriable_close_codes : HashSet< u16 >,
  }

  impl Default for WsReconnectPolicy
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::no_reconnect()
    }
  }

  impl WsReconnectPolicy
  {
    fn default_close_codes() -> HashSet< u16 >
    {
      // GoingAway, AbnormalClosure, InternalError.
      [ 1001, 1006, 1011 ].into_iter().collect()
    }

    /// Reconnecting disabled. This is the default.
    pub fn no_reconnect() -> Self
    {
      Self
      {
        max_retries : 0,
        initial_delay : Duration::from_millis( 1000 ),
        backoff_multiplier : 2.0,
        max_delay : Duration::from_millis( 30_000 ),
        retriable_close_codes : Self::default_close_codes(),
      }
    }

    /// Standard preset: 3 attempts, 1 s base delay, doubling, capped at 30 s.
    pub fn standard() -> Self
    {
      Self { max_retries : 3, ..Self::no_reconnect() }
    }

    /// Aggressive preset: 5 attempts, 500 ms base delay, 1.5x backoff,
    /// capped at 20 s.
    pub fn aggressive() -> Self
    {
      Self
      {
        max_retries : 5,
        initial_delay : Duration::from_millis( 500 ),
        backoff_multiplier : 1.5,
        max_delay : Duration::from_millis( 20_000 ),
        ..Self::no_reconnect()
      }
    }

    /// True when reconnecting is enabled at all.
    #[ inline ]
    #[ must_use ]
    pub fn is_enabled( &self ) -> bool
    {
      self.max_retries > 0
    }

    /// Decide whether a disconnect with `close_code` should be retried.
    #[ must_use ]
    pub fn should_retry( &self, close_code : u16, attempt : u32 ) -> bool
    {
      self.max_retries > 0 && attempt < self.max_retries && self.retriable_close_codes.contains( &close_code )
    }

    /// Backoff delay before reconnect attempt `attempt`.
    #[ must_use ]
    pub fn delay_for_attempt( &self, attempt : u32 ) -> Duration
    {
      let factor = self.backoff_multiplier.powi( attempt.min( 64 ) as i32 );
      let delay_ms = ( self.initial_delay.as_millis() as f64 * factor ).round();
      let capped_ms = delay_ms.min( self.max_delay.as_millis() as f64 ).max( 0.0 );
      Duration::from_millis( capped_ms as u64 )
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
crate::mod_interface!
{
  exposed use WsReconnectPolicy;
}
