//! Retry policy with exponential backoff.
//!
//! Delay formula: `delay = min( initial_delay * multiplier ^ attempt, max_delay )`.
//! Only errors in the retryable set trigger a retry, and the total number of
//! requests is `1 + max_retries`.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::collections::HashSet;

  use crate::error::NetworkError;

  /// Retry behavior attached to a request.
  ///
  /// The default policy disables retries (`max_retries == 0`). Use the
  /// [`RetryPolicy::standard`] or [`RetryPolicy::aggressive`] presets, or
  /// build a custom one.
  #[ derive( Debug, Clone, PartialEq ) ]
  #[ must_use ]
  pub struct RetryPolicy
  {
    /// Maximum retry count. Zero disables retries.
    pub max_retries : u32,
    /// Delay before the first retry.
    pub initial_delay : Duration,
    /// Multiplier applied per attempt. 1.0 keeps the delay constant.
    pub backoff_multiplier : f64,
    /// Upper bound on any single delay.
    pub max_delay : Duration,
    /// Error kinds that may trigger a retry.
    pub retryable_errors : HashSet< NetworkError >,
  }

  impl Default for RetryPolicy
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::no_retry()
    }
  }

  impl RetryPolicy
  {
    fn default_retryable_errors() -> HashSet< NetworkError >
    {
      [
        NetworkError::ConnectionRefused,
        NetworkError::ConnectionTimeout,
        NetworkError::HostNotFound,
        NetworkError::HttpTimeout,
        NetworkError::HttpInternalServerError,
        NetworkError::HttpBadGateway,
        NetworkError::HttpServiceUnavailable,
        NetworkError::HttpGatewayTimeout,
      ]
      .into_iter()
      .collect()
    }

    /// Retries disabled. This is the default policy.
    pub fn no_retry() -> Self
    {
      Self
      {
        max_retries : 0,
        initial_delay : Duration::from_millis( 1000 ),
        backoff_multiplier : 2.0,
        max_delay : Duration::from_millis( 30_000 ),
        retryable_errors : Self::default_retryable_errors(),
      }
    }

    /// Standard preset: 3 retries, 1 s base delay, doubling, capped at 30 s.
    pub fn standard() -> Self
    {
      Self { max_retries : 3, ..Self::no_retry() }
    }

    /// Aggressive preset for critical requests: 5 retries, 500 ms base delay,
    /// 1.5x backoff, capped at 20 s.
    pub fn aggressive() -> Self
    {
      Self
      {
        max_retries : 5,
        initial_delay : Duration::from_millis( 500 ),
        backoff_multiplier : 1.5,
        max_delay : Duration::from_millis( 20_000 ),
        ..Self::no_retry()
      }
    }

    /// Set the maximum retry count.
    #[ inline ]
    pub fn with_max_retries( mut self, retries : u32 ) -> Self
    {
      self.max_retries = retries;
      self
    }

    /// Set the initial delay.
    #[ inline ]
    pub fn with_initial_delay( mut self, delay : Duration ) -> Self
    {
      self.initial_delay = delay;
      self
    }

    /// Set the backoff multiplier.
    #[ inline ]
    pub fn with_backoff_multiplier( mut self, multiplier : f64 ) -> Self
    {
      self.backoff_multiplier = multiplier;
      self
    }

    /// Set the delay cap.
    #[ inline ]
    pub fn with_max_delay( mut self, delay : Duration ) -> Self
    {
      self.max_delay = delay;
      self
    }

    /// Replace the retryable error set.
    #[ inline ]
    pub fn with_retryable_errors< I >( mut self, errors : I ) -> Self
    where
      I : IntoIterator< Item = NetworkError >,
    {
      self.retryable_errors = errors.into_iter().collect();
      self
    }

    /// True when retries are enabled at all.
    #[ inline ]
    #[ must_use ]
    pub fn is_enabled( &self ) -> bool
    {
      self.max_retries > 0
    }

    /// Decide whether a failed attempt should be retried.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed, so a
    /// policy with `max_retries` of 3 allows 4 attempts in total.
    #[ must_use ]
    pub fn should_retry( &self, error : NetworkError, attempt : u32 ) -> bool
    {
      self.max_retries > 0 && attempt <= self.max_retries && self.retryable_errors.contains( &error )
    }

    /// Backoff delay before retry number `attempt`.
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

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use RetryPolicy;
}
