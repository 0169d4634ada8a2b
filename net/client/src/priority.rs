//! Request priority levels used by the scheduler.

#[ cfg( feature = "enabled" ) ]
mod private
{
  /// Scheduling priority of a request.
  ///
  /// Ordered from least to most urgent. [`RequestPriority::Critical`] bypasses
  /// the scheduler queues and its admission limits entirely; it is reserved
  /// for emergency user-visible actions.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default ) ]
  pub enum RequestPriority
  {
    /// Background work nobody is waiting on.
    VeryLow,
    /// Prefetching and other deferrable work.
    Low,
    /// Regular application traffic.
    #[ default ]
    Normal,
    /// User-initiated actions.
    High,
    /// Latency-sensitive user-visible actions.
    VeryHigh,
    /// Bypasses queueing and admission limits.
    Critical,
  }

  impl RequestPriority
  {
    /// All queueable levels, most urgent first. `Critical` is absent because
    /// it never enters a queue.
    #[ must_use ]
    pub fn queued_levels_descending() -> [ Self; 5 ]
    {
      [ Self::VeryHigh, Self::High, Self::Normal, Self::Low, Self::VeryLow ]
    }

    /// Index into per-level storage.
    #[ inline ]
    #[ must_use ]
    pub fn index( self ) -> usize
    {
      match self
      {
        Self::VeryLow => 0,
        Self::Low => 1,
        Self::Normal => 2,
        Self::High => 3,
        Self::VeryHigh => 4,
        Self::Critical => 5,
      }
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use RequestPriority;
}
