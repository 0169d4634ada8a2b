//! Error taxonomy for the networking runtime.
//!
//! High-level error kinds with stable numeric codes, kept easier to reason
//! about than raw transport-engine codes while preserving a mapping to them.
//!
//! Code ranges:
//! - 0-99: no error, connection errors, application errors
//! - 400-599: HTTP status errors (value equals the status code)
//! - 1000+: transport-engine errors (`TRANSPORT_ERROR_BASE` + engine code)

#[ cfg( feature = "enabled" ) ]
mod private
{
  use error_tools::dependency::thiserror;

  /// Base value for transport-engine error codes.
  pub const TRANSPORT_ERROR_BASE : i32 = 1000;

  /// Network error kinds surfaced by replies and WebSocket sessions.
  ///
  /// Each kind carries a stable numeric code ( `code()` ) so applications can
  /// persist or compare errors across versions.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error ) ]
  #[ non_exhaustive ]
  pub enum NetworkError
  {
    /// No error occurred.
    #[ error( "no error" ) ]
    NoError,

    /// The remote host actively refused the connection.
    #[ error( "connection refused" ) ]
    ConnectionRefused,

    /// The connection or transfer timed out.
    #[ error( "connection timed out" ) ]
    ConnectionTimeout,

    /// Host name resolution failed.
    #[ error( "host not found" ) ]
    HostNotFound,

    /// The TLS handshake failed (certificate, protocol or trust problem).
    #[ error( "ssl handshake failed" ) ]
    SslHandshakeFailed,

    /// The redirect limit was exceeded.
    #[ error( "too many redirects" ) ]
    TooManyRedirects,

    /// HTTP 400 Bad Request.
    #[ error( "http 400 bad request" ) ]
    HttpBadRequest,

    /// HTTP 401 Unauthorized.
    #[ error( "http 401 unauthorized" ) ]
    HttpUnauthorized,

    /// HTTP 403 Forbidden.
    #[ error( "http 403 forbidden" ) ]
    HttpForbidden,

    /// HTTP 404 Not Found.
    #[ error( "http 404 not found" ) ]
    HttpNotFound,

    /// HTTP 405 Method Not Allowed.
    #[ error( "http 405 method not allowed" ) ]
    HttpMethodNotAllowed,

    /// HTTP 408 Request Timeout.
    #[ error( "http 408 request timeout" ) ]
    HttpTimeout,

    /// HTTP 416 Range Not Satisfiable.
    #[ error( "http 416 range not satisfiable" ) ]
    HttpRangeNotSatisfiable,

    /// HTTP 429 Too Many Requests.
    #[ error( "http 429 too many requests" ) ]
    HttpTooManyRequests,

    /// HTTP 500 Internal Server Error.
    #[ error( "http 500 internal server error" ) ]
    HttpInternalServerError,

    /// HTTP 502 Bad Gateway.
    #[ error( "http 502 bad gateway" ) ]
    HttpBadGateway,

    /// HTTP 503 Service Unavailable.
    #[ error( "http 503 service unavailable" ) ]
    HttpServiceUnavailable,

    /// HTTP 504 Gateway Timeout.
    #[ error( "http 504 gateway timeout" ) ]
    HttpGatewayTimeout,

    /// Any other HTTP 4xx/5xx status.
    #[ error( "http error {0}" ) ]
    HttpError( u16 ),

    /// The operation was cancelled by the caller.
    #[ error( "operation cancelled" ) ]
    OperationCancelled,

    /// The request was malformed (empty URL, bad header, invalid range).
    #[ error( "invalid request" ) ]
    InvalidRequest,

    /// Cache-only policy was requested but no cache entry exists for the URL.
    #[ error( "no cache entry" ) ]
    NoCacheEntry,

    /// An error that does not fit any other kind.
    #[ error( "unknown error" ) ]
    Unknown,

    /// A transport-engine error, carried verbatim as `TRANSPORT_ERROR_BASE + code`.
    #[ error( "transport error {0}" ) ]
    TransportError( u16 ),
  }

  impl NetworkError
  {
    /// Stable numeric code for this error kind.
    #[ inline ]
    #[ must_use ]
    pub fn code( self ) -> i32
    {
      match self
      {
        Self::NoError => 0,
        Self::InvalidRequest => 3,
        Self::HostNotFound => 6,
        Self::ConnectionRefused => 7,
        Self::ConnectionTimeout => 28,
        Self::OperationCancelled => 42,
        Self::NoCacheEntry => 44,
        Self::TooManyRedirects => 47,
        Self::SslHandshakeFailed => 60,
        Self::Unknown => 99,
        Self::HttpBadRequest => 400,
        Self::HttpUnauthorized => 401,
        Self::HttpForbidden => 403,
        Self::HttpNotFound => 404,
        Self::HttpMethodNotAllowed => 405,
        Self::HttpTimeout => 408,
        Self::HttpRangeNotSatisfiable => 416,
        Self::HttpTooManyRequests => 429,
        Self::HttpInternalServerError => 500,
        Self::HttpBadGateway => 502,
        Self::HttpServiceUnavailable => 503,
        Self::HttpGatewayTimeout => 504,
        Self::HttpError( status ) => i32::from( status ),
        Self::TransportError( code ) => TRANSPORT_ERROR_BASE + i32::from( code ),
      }
    }

    /// Map an HTTP status code into the taxonomy.
    ///
    /// Statuses below 400 are not errors; statuses at or above 600 are out of
    /// range and map to [`NetworkError::Unknown`].
    #[ must_use ]
    pub fn from_http_status( status : u16 ) -> Self
    {
      match status
      {
        0..=399 => Self::NoError,
        400 => Self::HttpBadRequest,
        401 => Self::HttpUnauthorized,
        403 => Self::HttpForbidden,
        404 => Self::HttpNotFound,
        405 => Self::HttpMethodNotAllowed,
        408 => Self::HttpTimeout,
        416 => Self::HttpRangeNotSatisfiable,
        429 => Self::HttpTooManyRequests,
        500 => Self::HttpInternalServerError,
        502 => Self::HttpBadGateway,
        503 => Self::HttpServiceUnavailable,
        504 => Self::HttpGatewayTimeout,
        400..=599 => Self::HttpError( status ),
        _ => Self::Unknown,
      }
    }

    /// Map a raw transport-engine code into the taxonomy. Code 0 means success.
    #[ inline ]
    #[ must_use ]
    pub fn from_transport_code( code : u16 ) -> Self
    {
      if code == 0
      {
        Self::NoError
      }
      else
      {
        Self::TransportError( code )
      }
    }

    /// True for HTTP 4xx/5xx kinds.
    #[ inline ]
    #[ must_use ]
    pub fn is_http_error( self ) -> bool
    {
      ( 400..600 ).contains( &self.code() )
    }

    /// True for transport-engine kinds (`TRANSPORT_ERROR_BASE` range).
    #[ inline ]
    #[ must_use ]
    pub fn is_transport_error( self ) -> bool
    {
      matches!( self, Self::TransportError( _ ) )
    }

    /// True when this value represents an actual failure.
    #[ inline ]
    #[ must_use ]
    pub fn is_error( self ) -> bool
    {
      self != Self::NoError
    }
  }

  /// Classify an engine (`reqwest`) error into the taxonomy.
  ///
  /// The engine does not expose structured causes for every failure, so the
  /// classification falls back on the rendered error chain for DNS and TLS
  /// cases before settling on [`NetworkError::Unknown`].
  #[ must_use ]
  pub fn classify_engine_error( error : &reqwest::Error ) -> NetworkError
  {
    if error.is_timeout()
    {
      return NetworkError::ConnectionTimeout;
    }
    if error.is_redirect()
    {
      return NetworkError::TooManyRedirects;
    }

    let rendered = render_error_chain( error );
    if rendered.contains( "dns" ) || rendered.contains( "name or service not known" ) || rendered.contains( "failed to lookup" )
    {
      return NetworkError::HostNotFound;
    }
    if rendered.contains( "certificate" ) || rendered.contains( "ssl" ) || rendered.contains( "tls" ) || rendered.contains( "handshake" )
    {
      return NetworkError::SslHandshakeFailed;
    }
    if error.is_connect() || rendered.contains( "connection refused" )
    {
      return NetworkError::ConnectionRefused;
    }
    if error.is_builder() || error.is_request()
    {
      return NetworkError::InvalidRequest;
    }

    NetworkError::Unknown
  }

  fn render_error_chain( error : &reqwest::Error ) -> String
  {
    use std::error::Error as _;
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some( cause ) = source
    {
      rendered.push_str( " : " );
      rendered.push_str( &cause.to_string() );
      source = cause.source();
    }
    rendered.to_lowercase()
  }

  /// Convenience alias for fallible operations of this crate.
  pub type NetworkResult< T > = core::result::Result< T, NetworkError >;
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use NetworkError;
  exposed use NetworkResult;
  exposed use TRANSPORT_ERROR_BASE;
  own use classify_engine_error;
}
