//! Request builders.
//!
//! Two surfaces normalize into the same [`Request`] value: the flat
//! [`RequestBuilder`] finalized by `build()`, and the fluent per-call builder
//! obtained from `AccessManager::new_request` and finalized by a send method.
//! Given the same inputs both produce identical requests.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;

  use crate::cache_policy::CachePolicy;
  use crate::error::NetworkResult;
  use crate::http_version::HttpVersion;
  use crate::priority::RequestPriority;
  use crate::proxy::ProxyConfig;
  use crate::request::Request;
  use crate::retry::RetryPolicy;
  use crate::ssl::SslConfig;
  use crate::timeout::TimeoutConfig;

  /// Flat builder producing a [`Request`].
  #[ derive( Debug, Clone ) ]
  #[ must_use ]
  pub struct RequestBuilder
  {
    request : Request,
    timeout : TimeoutConfig,
  }

  impl RequestBuilder
  {
    /// Start building a request for `url`.
    pub fn new< S : Into< String > >( url : S ) -> Self
    {
      Self
      {
        request : Request::new( url ),
        timeout : TimeoutConfig::new(),
      }
    }

    /// Append a raw header.
    pub fn header< N : Into< String >, V : Into< String > >( mut self, name : N, value : V ) -> Self
    {
      self.request.set_raw_header( name, value );
      self
    }

    /// Request a byte range `[start, end]`.
    pub fn range( mut self, start : u64, end : u64 ) -> Self
    {
      self.request.set_range( start, end );
      self
    }

    /// Toggle automatic redirect following.
    pub fn follow_redirects( mut self, follow : bool ) -> Self
    {
      self.request.set_follow_redirects( follow );
      self
    }

    /// Replace the TLS settings.
    pub fn ssl_config( mut self, ssl : SslConfig ) -> Self
    {
      self.request.set_ssl_config( ssl );
      self
    }

    /// Replace the proxy settings.
    pub fn proxy_config( mut self, proxy : ProxyConfig ) -> Self
    {
      self.request.set_proxy_config( proxy );
      self
    }

    /// Replace the timeout settings wholesale.
    pub fn timeout_config( mut self, timeout : TimeoutConfig ) -> Self
    {
      self.timeout = timeout;
      self
    }

    /// Shorthand for a total-transfer timeout.
    pub fn timeout( mut self, total : Duration ) -> Self
    {
      self.timeout.total_timeout = total;
      self
    }

    /// Set an explicit HTTP version preference.
    pub fn http_version( mut self, version : HttpVersion ) -> Self
    {
      self.request.set_http_version( version );
      self
    }

    /// Replace the retry policy.
    pub fn retry_policy( mut self, policy : RetryPolicy ) -> Self
    {
      self.request.set_retry_policy( policy );
      self
    }

    /// Set the scheduling priority.
    pub fn priority( mut self, priority : RequestPriority ) -> Self
    {
      self.request.set_priority( priority );
      self
    }

    /// Set the cache policy.
    pub fn cache_policy( mut self, policy : CachePolicy ) -> Self
    {
      self.request.set_cache_policy( policy );
      self
    }

    /// Validate and produce the request.
    ///
    /// # Errors
    /// Returns [`crate::error::NetworkError::InvalidRequest`] when an
    /// invariant of [`Request::validate`] is violated.
    pub fn build( mut self ) -> NetworkResult< Request >
    {
      self.request.set_timeout_config( self.timeout );
      self.request.validate()?;
      Ok( self.request )
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use RequestBuilder;
}
