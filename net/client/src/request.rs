//! Immutable request configuration value.
//!
//! A [`Request`] is a copy-on-write value: clones share one payload until a
//! mutating accessor is called. The payload is copied into the reply at
//! submission and never mutated afterwards.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::sync::Arc;

  use crate::cache_policy::CachePolicy;
  use crate::error::{ NetworkError, NetworkResult };
  use crate::http_version::{ HttpVersion, HttpVersionPreference };
  use crate::priority::RequestPriority;
  use crate::proxy::ProxyConfig;
  use crate::retry::RetryPolicy;
  use crate::ssl::SslConfig;
  use crate::timeout::TimeoutConfig;

  #[ derive( Debug, Clone, Default ) ]
  struct RequestData
  {
    url : String,
    headers : Vec< ( String, String ) >,
    follow_redirects : bool,
    range : Option< ( u64, u64 ) >,
    ssl : SslConfig,
    proxy : Option< ProxyConfig >,
    timeout : TimeoutConfig,
    http_version : HttpVersionPreference,
    retry_policy : RetryPolicy,
    priority : RequestPriority,
    cache_policy : CachePolicy,
  }

  /// Request configuration handed to the access manager.
  ///
  /// Header names are matched case-insensitively on lookup but stored with
  /// their original casing and order.
  #[ derive( Debug, Clone, Default ) ]
  #[ must_use ]
  pub struct Request
  {
    data : Arc< RequestData >,
  }

  impl Request
  {
    /// Create a request for the given URL with default policies.
    pub fn new< S : Into< String > >( url : S ) -> Self
    {
      let data = RequestData
      {
        url : url.into(),
        follow_redirects : true,
        ssl : SslConfig::new(),
        timeout : TimeoutConfig::new(),
        ..RequestData::default()
      };
      Self { data : Arc::new( data ) }
    }

    /// Target URL.
    #[ inline ]
    #[ must_use ]
    pub fn url( &self ) -> &str
    {
      &self.data.url
    }

    /// Host portion of the URL, empty when the URL does not parse.
    #[ must_use ]
    pub fn host( &self ) -> String
    {
      url::Url::parse( &self.data.url )
        .ok()
        .and_then( | parsed | parsed.host_str().map( str::to_owned ) )
        .unwrap_or_default()
    }

    /// Replace the target URL.
    pub fn set_url< S : Into< String > >( &mut self, url : S )
    {
      Arc::make_mut( &mut self.data ).url = url.into();
    }

    /// Append a raw header. Existing headers with the same name are kept;
    /// the transport sends them in insertion order.
    pub fn set_raw_header< N, V >( &mut self, name : N, value : V )
    where
      N : Into< String >,
      V : Into< String >,
    {
      Arc::make_mut( &mut self.data ).headers.push( ( name.into(), value.into() ) );
    }

    /// First header value whose name matches case-insensitively.
    #[ must_use ]
    pub fn raw_header( &self, name : &str ) -> Option< &str >
    {
      self
        .data
        .headers
        .iter()
        .find( | ( header_name, _ ) | header_name.eq_ignore_ascii_case( name ) )
        .map( | ( _, value ) | value.as_str() )
    }

    /// All headers in insertion order.
    #[ inline ]
    #[ must_use ]
    pub fn raw_header_list( &self ) -> &[ ( String, String ) ]
    {
      &self.data.headers
    }

    /// Whether redirects are followed automatically. Defaults to true.
    #[ inline ]
    #[ must_use ]
    pub fn follow_redirects( &self ) -> bool
    {
      self.data.follow_redirects
    }

    /// Toggle automatic redirect following.
    pub fn set_follow_redirects( &mut self, follow : bool )
    {
      Arc::make_mut( &mut self.data ).follow_redirects = follow;
    }

    /// Requested byte range, if any.
    #[ inline ]
    #[ must_use ]
    pub fn range( &self ) -> Option< ( u64, u64 ) >
    {
      self.data.range
    }

    /// Request a byte range `[start, end]`. Ignored by `validate` unless
    /// `end > start`.
    pub fn set_range( &mut self, start : u64, end : u64 )
    {
      Arc::make_mut( &mut self.data ).range = Some( ( start, end ) );
    }

    /// TLS settings.
    #[ inline ]
    #[ must_use ]
    pub fn ssl_config( &self ) -> &SslConfig
    {
      &self.data.ssl
    }

    /// Replace the TLS settings.
    pub fn set_ssl_config( &mut self, ssl : SslConfig )
    {
      Arc::make_mut( &mut self.data ).ssl = ssl;
    }

    /// Proxy settings, if configured.
    #[ inline ]
    #[ must_use ]
    pub fn proxy_config( &self ) -> Option< &ProxyConfig >
    {
      self.data.proxy.as_ref()
    }

    /// Replace the proxy settings.
    pub fn set_proxy_config( &mut self, proxy : ProxyConfig )
    {
      Arc::make_mut( &mut self.data ).proxy = Some( proxy );
    }

    /// Timeout settings.
    #[ inline ]
    #[ must_use ]
    pub fn timeout_config( &self ) -> &TimeoutConfig
    {
      &self.data.timeout
    }

    /// Replace the timeout settings.
    pub fn set_timeout_config( &mut self, timeout : TimeoutConfig )
    {
      Arc::make_mut( &mut self.data ).timeout = timeout;
    }

    /// HTTP version preference.
    #[ inline ]
    #[ must_use ]
    pub fn http_version( &self ) -> HttpVersionPreference
    {
      self.data.http_version
    }

    /// Set an explicit HTTP version preference.
    pub fn set_http_version( &mut self, version : HttpVersion )
    {
      Arc::make_mut( &mut self.data ).http_version = HttpVersionPreference::explicit( version );
    }

    /// Retry policy.
    #[ inline ]
    #[ must_use ]
    pub fn retry_policy( &self ) -> &RetryPolicy
    {
      &self.data.retry_policy
    }

    /// Replace the retry policy.
    pub fn set_retry_policy( &mut self, policy : RetryPolicy )
    {
      Arc::make_mut( &mut self.data ).retry_policy = policy;
    }

    /// Scheduling priority.
    #[ inline ]
    #[ must_use ]
    pub fn priority( &self ) -> RequestPriority
    {
      self.data.priority
    }

    /// Set the scheduling priority.
    pub fn set_priority( &mut self, priority : RequestPriority )
    {
      Arc::make_mut( &mut self.data ).priority = priority;
    }

    /// Cache policy.
    #[ inline ]
    #[ must_use ]
    pub fn cache_policy( &self ) -> CachePolicy
    {
      self.data.cache_policy
    }

    /// Set the cache policy.
    pub fn set_cache_policy( &mut self, policy : CachePolicy )
    {
      Arc::make_mut( &mut self.data ).cache_policy = policy;
    }

    /// Check the request invariants: non-empty URL, non-empty header names,
    /// and a well-formed range when one is set.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] when an invariant is violated.
    pub fn validate( &self ) -> NetworkResult< () >
    {
      if self.data.url.trim().is_empty()
      {
        return Err( NetworkError::InvalidRequest );
      }
      if self.data.headers.iter().any( | ( name, _ ) | name.is_empty() )
      {
        return Err( NetworkError::InvalidRequest );
      }
      if let Some( ( start, end ) ) = self.data.range
      {
        if end <= start
        {
          return Err( NetworkError::InvalidRequest );
        }
      }
      Ok( () )
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use Request;
}
