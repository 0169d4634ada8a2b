//! TLS configuration applied to HTTP transfers and WebSocket handshakes.

#[ cfg( feature = "enabled" ) ]
mod private
{
  /// TLS settings for a single request or WebSocket session.
  ///
  /// Empty path strings mean "use the system default" for that item.
  /// Disabling peer or host verification is intended for development
  /// environments only.
  #[ derive( Debug, Clone, PartialEq, Eq, Hash ) ]
  #[ must_use ]
  pub struct SslConfig
  {
    /// Verify the peer certificate chain against the trust store.
    pub verify_peer : bool,
    /// Verify that the certificate matches the requested host name.
    pub verify_host : bool,
    /// Path to an additional CA certificate bundle in PEM format.
    pub ca_cert_path : String,
    /// Path to a client certificate in PEM format.
    pub client_cert_path : String,
    /// Path to the client certificate's private key in PEM format.
    pub client_key_path : String,
    /// Password protecting the private key, if any.
    pub key_password : String,
  }

  impl Default for SslConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        verify_peer : true,
        verify_host : true,
        ca_cert_path : String::new(),
        client_cert_path : String::new(),
        client_key_path : String::new(),
        key_password : String::new(),
      }
    }
  }

  impl SslConfig
  {
    /// Create a configuration with full verification enabled.
    #[ inline ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Disable peer and host verification. Development use only.
    #[ inline ]
    pub fn insecure() -> Self
    {
      Self
      {
        verify_peer : false,
        verify_host : false,
        ..Self::default()
      }
    }

    /// Toggle peer certificate verification.
    #[ inline ]
    pub fn with_verify_peer( mut self, verify : bool ) -> Self
    {
      self.verify_peer = verify;
      self
    }

    /// Toggle host name verification.
    #[ inline ]
    pub fn with_verify_host( mut self, verify : bool ) -> Self
    {
      self.verify_host = verify;
      self
    }

    /// Set an additional CA certificate bundle path.
    #[ inline ]
    pub fn with_ca_cert_path< S : Into< String > >( mut self, path : S ) -> Self
    {
      self.ca_cert_path = path.into();
      self
    }

    /// Set the client certificate and private key paths.
    #[ inline ]
    pub fn with_client_cert< S : Into< String > >( mut self, cert_path : S, key_path : S ) -> Self
    {
      self.client_cert_path = cert_path.into();
      self.client_key_path = key_path.into();
      self
    }

    /// Set the private key password.
    #[ inline ]
    pub fn with_key_password< S : Into< String > >( mut self, password : S ) -> Self
    {
      self.key_password = password.into();
      self
    }

    /// True when any setting differs from the verified system defaults.
    #[ must_use ]
    pub fn is_customized( &self ) -> bool
    {
      !self.verify_peer
        || !self.verify_host
        || !self.ca_cert_path.is_empty()
        || !self.client_cert_path.is_empty()
        || !self.client_key_path.is_empty()
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use SslConfig;
}
