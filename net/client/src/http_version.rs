//! HTTP protocol version preference.

#[ cfg( feature = "enabled" ) ]
mod private
{
  /// Preferred HTTP protocol version for a request.
  ///
  /// The engine honors what it can: QUIC variants are carried through so an
  /// engine with HTTP/3 support can pin them, and engines without it downgrade
  /// with a logged warning rather than failing the request (except for
  /// [`HttpVersion::Http3Only`], which an incapable engine rejects).
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Default ) ]
  pub enum HttpVersion
  {
    /// Let the engine negotiate freely.
    #[ default ]
    HttpAny,
    /// Restrict to HTTP/1.1.
    Http1Only,
    /// Prefer HTTP/2, allowing fallback.
    Http2,
    /// Pin HTTP/2 over TLS.
    Http2Tls,
    /// Attempt HTTP/3 with automatic downgrade.
    Http3,
    /// Require HTTP/3; fail when QUIC cannot be used.
    Http3Only,
  }

  /// Version preference together with whether the application set it explicitly.
  ///
  /// An unset preference lets manager-level defaults apply; an explicit one
  /// always wins.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Default ) ]
  #[ must_use ]
  pub struct HttpVersionPreference
  {
    /// The preferred version.
    pub version : HttpVersion,
    /// True when the application chose the version itself.
    pub explicitly_set : bool,
  }

  impl HttpVersionPreference
  {
    /// An unset preference (engine negotiates freely).
    #[ inline ]
    pub fn unset() -> Self
    {
      Self::default()
    }

    /// An explicit preference.
    #[ inline ]
    pub fn explicit( version : HttpVersion ) -> Self
    {
      Self { version, explicitly_set : true }
    }

    /// True when the preference asks for QUIC.
    #[ inline ]
    #[ must_use ]
    pub fn wants_quic( &self ) -> bool
    {
      matches!( self.version, HttpVersion::Http3 | HttpVersion::Http3Only )
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use HttpVersion;
  exposed use HttpVersionPreference;
}
