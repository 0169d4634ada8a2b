//! Per-attempt transfer description and control handles.
//!
//! A [`TransferSpec`] is rebuilt from the request for every attempt, so no
//! header or body state leaks across retries. The control pair lets the reply
//! abort or pause the engine task from any thread.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::path::PathBuf;

  use tokio::sync::watch;
  use tokio_util::sync::CancellationToken;

  use crate::http_version::HttpVersionPreference;
  use crate::proxy::ProxyConfig;
  use crate::ssl::SslConfig;
  use crate::timeout::TimeoutConfig;

  /// Identifier of one active transfer inside the driver.
  pub type TransferId = u64;

  /// HTTP method of a reply.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Hash ) ]
  pub enum HttpMethod
  {
    /// HEAD: headers only, no response body.
    Head,
    /// GET.
    Get,
    /// POST with a request body.
    Post,
    /// PUT with a request body.
    Put,
    /// DELETE.
    Delete,
    /// PATCH with a request body.
    Patch,
  }

  impl HttpMethod
  {
    /// Canonical upper-case method name.
    #[ inline ]
    #[ must_use ]
    pub fn as_str( self ) -> &'static str
    {
      match self
      {
        Self::Head => "HEAD",
        Self::Get => "GET",
        Self::Post => "POST",
        Self::Put => "PUT",
        Self::Delete => "DELETE",
        Self::Patch => "PATCH",
      }
    }

    /// True for methods that carry a request body.
    #[ inline ]
    #[ must_use ]
    pub fn has_request_body( self ) -> bool
    {
      matches!( self, Self::Post | Self::Put | Self::Patch )
    }
  }

  /// Source of the request body for one transfer.
  #[ derive( Debug, Clone, Default ) ]
  pub enum BodySource
  {
    /// No body.
    #[ default ]
    Empty,
    /// In-memory body.
    Bytes( bytes::Bytes ),
    /// Body streamed from a file; reopened per attempt so retries restart
    /// from the beginning.
    File( PathBuf ),
  }

  impl BodySource
  {
    /// Known body length, when cheap to determine.
    #[ must_use ]
    pub fn known_len( &self ) -> Option< u64 >
    {
      match self
      {
        Self::Empty => Some( 0 ),
        Self::Bytes( data ) => Some( data.len() as u64 ),
        Self::File( path ) => std::fs::metadata( path ).ok().map( | meta | meta.len() ),
      }
    }
  }

  /// Everything the engine needs to run one attempt.
  #[ derive( Debug, Clone ) ]
  pub struct TransferSpec
  {
    /// HTTP method.
    pub method : HttpMethod,
    /// Absolute target URL.
    pub url : String,
    /// Fully assembled header list, in send order.
    pub headers : Vec< ( String, String ) >,
    /// Request body.
    pub body : BodySource,
    /// Timeout settings.
    pub timeout : TimeoutConfig,
    /// TLS settings.
    pub ssl : SslConfig,
    /// Validated proxy settings, if any.
    pub proxy : Option< ProxyConfig >,
    /// HTTP version preference.
    pub version : HttpVersionPreference,
    /// Whether redirects are followed.
    pub follow_redirects : bool,
  }

  /// Key identifying an engine client able to run a given spec.
  ///
  /// Specs with equal keys share one pooled engine client.
  #[ derive( Debug, Clone, PartialEq, Eq, Hash ) ]
  pub struct ClientKey
  {
    ssl : SslConfig,
    proxy : Option< ProxyConfig >,
    version : HttpVersionPreference,
    follow_redirects : bool,
    connect_timeout : Duration,
  }

  impl TransferSpec
  {
    /// Client selection key for this spec.
    #[ must_use ]
    pub fn client_key( &self ) -> ClientKey
    {
      ClientKey
      {
        ssl : self.ssl.clone(),
        proxy : self.proxy.clone(),
        version : self.version,
        follow_redirects : self.follow_redirects,
        connect_timeout : self.timeout.connect_timeout,
      }
    }
  }

  /// Reply-side handle controlling a running transfer.
  #[ derive( Debug, Clone ) ]
  pub struct TransferHandle
  {
    cancel : CancellationToken,
    pause_tx : watch::Sender< bool >,
  }

  impl TransferHandle
  {
    /// Abort the transfer. Idempotent.
    #[ inline ]
    pub fn cancel( &self )
    {
      self.cancel.cancel();
    }

    /// Suspend or resume the transfer. Resuming wakes the engine task even
    /// when the suspension happened outside a callback.
    #[ inline ]
    pub fn set_paused( &self, paused : bool )
    {
      let _ = self.pause_tx.send( paused );
    }

    /// True once `cancel` was called.
    #[ inline ]
    #[ must_use ]
    pub fn is_cancelled( &self ) -> bool
    {
      self.cancel.is_cancelled()
    }
  }

  /// Engine-side receiver of control decisions.
  #[ derive( Debug ) ]
  pub struct TransferControl
  {
    /// Cancellation token observed between reads.
    pub cancel : CancellationToken,
    /// Pause flag; `true` suspends reading.
    pub pause : watch::Receiver< bool >,
  }

  /// Create a connected control pair for one transfer.
  #[ must_use ]
  pub fn transfer_control_pair() -> ( TransferHandle, TransferControl )
  {
    let cancel = CancellationToken::new();
    let ( pause_tx, pause_rx ) = watch::channel( false );
    (
      TransferHandle { cancel : cancel.clone(), pause_tx },
      TransferControl { cancel, pause : pause_rx },
    )
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use TransferId;
  exposed use HttpMethod;
  exposed use BodySource;
  exposed use TransferSpec;
  exposed use ClientKey;
  exposed use TransferHandle;
  exposed use TransferControl;
  own use transfer_control_pair;
}
