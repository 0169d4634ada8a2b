//! Cache usage policy for individual requests.

#[ cfg( feature = "enabled" ) ]
mod private
{
  /// How a request interacts with the HTTP cache.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Default ) ]
  pub enum CachePolicy
  {
    /// Return any stored entry regardless of freshness; fetch and store on miss.
    AlwaysCache,
    /// Return a stored entry while it is fresh; fetch and refresh otherwise.
    PreferCache,
    /// Always fetch; fall back to a stored entry (even stale) when the fetch fails.
    PreferNetwork,
    /// Always fetch; never read or write the cache.
    #[ default ]
    OnlyNetwork,
    /// Never fetch; error when no entry is stored (freshness is ignored).
    OnlyCache,
  }

  impl CachePolicy
  {
    /// True when the policy permits reading from the cache.
    #[ inline ]
    #[ must_use ]
    pub fn reads_cache( self ) -> bool
    {
      self != Self::OnlyNetwork
    }

    /// True when the policy permits storing responses.
    #[ inline ]
    #[ must_use ]
    pub fn writes_cache( self ) -> bool
    {
      !matches!( self, Self::OnlyNetwork | Self::OnlyCache )
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use CachePolicy;
}
