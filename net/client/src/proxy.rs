//! Proxy configuration for HTTP transfers.

#[ cfg( feature = "enabled" ) ]
mod private
{
  /// Supported proxy protocols.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Default ) ]
  pub enum ProxyKind
  {
    /// No proxy.
    #[ default ]
    None,
    /// Plain HTTP proxy.
    Http,
    /// HTTP proxy reached over TLS.
    Https,
    /// SOCKS5 proxy.
    Socks5,
  }

  /// Proxy settings for a single request.
  ///
  /// A configuration is applied only when [`ProxyConfig::is_valid`] holds;
  /// invalid configurations are silently dropped at configure time.
  #[ derive( Debug, Clone, PartialEq, Eq, Hash, Default ) ]
  #[ must_use ]
  pub struct ProxyConfig
  {
    /// Proxy protocol.
    pub kind : ProxyKind,
    /// Proxy host name or address.
    pub host : String,
    /// Proxy port.
    pub port : u16,
    /// Optional user name for proxy authentication.
    pub username : String,
    /// Optional password for proxy authentication.
    pub password : String,
  }

  impl ProxyConfig
  {
    /// Create a proxy configuration for the given protocol and endpoint.
    #[ inline ]
    pub fn new< S : Into< String > >( kind : ProxyKind, host : S, port : u16 ) -> Self
    {
      Self
      {
        kind,
        host : host.into(),
        port,
        username : String::new(),
        password : String::new(),
      }
    }

    /// Attach proxy credentials.
    #[ inline ]
    pub fn with_credentials< S : Into< String > >( mut self, username : S, password : S ) -> Self
    {
      self.username = username.into();
      self.password = password.into();
      self
    }

    /// A configuration is valid when a protocol is selected and the endpoint is complete.
    #[ inline ]
    #[ must_use ]
    pub fn is_valid( &self ) -> bool
    {
      self.kind != ProxyKind::None && !self.host.is_empty() && self.port != 0
    }

    /// Render the proxy endpoint as a URL understood by the engine.
    #[ must_use ]
    pub fn to_url( &self ) -> String
    {
      let scheme = match self.kind
      {
        ProxyKind::None | ProxyKind::Http => "http",
        ProxyKind::Https => "https",
        ProxyKind::Socks5 => "socks5",
      };
      format!( "{scheme}://{}:{}", self.host, self.port )
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use ProxyKind;
  exposed use ProxyConfig;
}
