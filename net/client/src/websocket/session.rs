//! WebSocket session: handshake, framing loop, compression, reconnect.

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
mod private
{
  use core::pin::Pin;
  use core::task::{ Context, Poll };
  use core::time::Duration;
  use std::sync::atomic::{ AtomicU64, Ordering };
  use std::sync::Arc;

  use base64::Engine as _;
  use parking_lot::Mutex;
  use sha1::{ Digest, Sha1 };
  use tokio::io::{ AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf };
  use tokio::net::TcpStream;

  use crate::error::{ NetworkError, NetworkResult };
  use crate::events::Signal;
  use crate::ssl::SslConfig;
  use crate::websocket::compression::{ MessageDeflater, MessageInflater, WsCompressionConfig, WsCompressionStats };
  use crate::websocket::frame::
  {
    encode_frame,
    WsFrame,
    WsFrameDecoder,
    WsOpcode,
    CLOSE_CODE_ABNORMAL,
    MAX_CONTROL_PAYLOAD,
  };
  use crate::websocket::reconnect::WsReconnectPolicy;

  const WS_ACCEPT_GUID : &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
  const HANDSHAKE_RESPONSE_LIMIT : usize = 16 * 1024;
  const POLL_INTERVAL : Duration = Duration::from_millis( 50 );
  const READ_BUFFER_SIZE : usize = 16 * 1024;

  static NEXT_SESSION_ID : AtomicU64 = AtomicU64::new( 1 );

  /// Session lifecycle state.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum WsState
  {
    /// Initial state, nothing attempted yet.
    Unconnected,
    /// Handshake in progress.
    Connecting,
    /// Messages can be sent and received.
    Connected,
    /// Close handshake initiated locally.
    Closing,
    /// Closed, also after handshake failure.
    Closed,
  }

  /// Standard close codes.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum WsCloseCode
  {
    /// 1000: normal closure.
    Normal,
    /// 1001: endpoint going away.
    GoingAway,
    /// 1002: protocol error.
    ProtocolError,
    /// 1003: unsupported data type.
    UnsupportedData,
    /// 1007: invalid payload data.
    InvalidPayload,
    /// 1008: policy violation.
    PolicyViolation,
    /// 1009: message too big.
    MessageTooBig,
    /// 1010: mandatory extension missing.
    MandatoryExtension,
    /// 1011: server internal error.
    InternalError,
    /// 1012: service restart.
    ServiceRestart,
    /// 1013: try again later.
    TryAgainLater,
  }

  impl WsCloseCode
  {
    /// Numeric wire code.
    #[ inline ]
    #[ must_use ]
    pub fn code( self ) -> u16
    {
      match self
      {
        Self::Normal => 1000,
        Self::GoingAway => 1001,
        Self::ProtocolError => 1002,
        Self::UnsupportedData => 1003,
        Self::InvalidPayload => 1007,
        Self::PolicyViolation => 1008,
        Self::MessageTooBig => 1009,
        Self::MandatoryExtension => 1010,
        Self::InternalError => 1011,
        Self::ServiceRestart => 1012,
        Self::TryAgainLater => 1013,
      }
    }
  }

  enum WsStream
  {
    Plain( TcpStream ),
    Tls( Box< tokio_native_tls::TlsStream< TcpStream > > ),
  }

  impl AsyncRead for WsStream
  {
    fn poll_read( mut self : Pin< &mut Self >, cx : &mut Context< '_ >, buf : &mut ReadBuf< '_ > ) -> Poll< std::io::Result< () > >
    {
      match &mut *self
      {
        Self::Plain( stream ) => Pin::new( stream ).poll_read( cx, buf ),
        Self::Tls( stream ) => Pin::new( stream.as_mut() ).poll_read( cx, buf ),
      }
    }
  }

  impl AsyncWrite for WsStream
  {
    fn poll_write( mut self : Pin< &mut Self >, cx : &mut Context< '_ >, data : &[ u8 ] ) -> Poll< std::io::Result< usize > >
    {
      match &mut *self
      {
        Self::Plain( stream ) => Pin::new( stream ).poll_write( cx, data ),
        Self::Tls( stream ) => Pin::new( stream.as_mut() ).poll_write( cx, data ),
      }
    }

    fn poll_flush( mut self : Pin< &mut Self >, cx : &mut Context< '_ > ) -> Poll< std::io::Result< () > >
    {
      match &mut *self
      {
        Self::Plain( stream ) => Pin::new( stream ).poll_flush( cx ),
        Self::Tls( stream ) => Pin::new( stream.as_mut() ).poll_flush( cx ),
      }
    }

    fn poll_shutdown( mut self : Pin< &mut Self >, cx : &mut Context< '_ > ) -> Poll< std::io::Result< () > >
    {
      match &mut *self
      {
        Self::Plain( stream ) => Pin::new( stream ).poll_shutdown( cx ),
        Self::Tls( stream ) => Pin::new( stream.as_mut() ).poll_shutdown( cx ),
      }
    }
  }

  struct SessionConfig
  {
    ssl : SslConfig,
    compression : WsCompressionConfig,
    reconnect : WsReconnectPolicy,
    auto_pong : bool,
    force_polling : bool,
  }

  struct SessionState
  {
    state : WsState,
    error_string : String,
    compression_negotiated : bool,
    last_close_code : u16,
    reconnect_attempts : u32,
    epoch : u64,
  }

  #[ derive( Default ) ]
  struct WsSignals
  {
    connected : Signal< () >,
    disconnected : Signal< () >,
    state_changed : Signal< WsState >,
    text_message_received : Signal< String >,
    binary_message_received : Signal< Vec< u8 > >,
    ping_received : Signal< Vec< u8 > >,
    pong_received : Signal< Vec< u8 > >,
    close_received : Signal< ( u16, String ) >,
    reconnect_attempt : Signal< ( u32, u16 ) >,
    error : Signal< NetworkError >,
  }

  struct WsInner
  {
    id : u64,
    url : String,
    config : Mutex< SessionConfig >,
    state : Mutex< SessionState >,
    signals : WsSignals,
    writer : tokio::sync::Mutex< Option< WriteHalf< WsStream > > >,
    deflater : Mutex< Option< MessageDeflater > >,
    inflater : Mutex< Option< MessageInflater > >,
    stats : Mutex< WsCompressionStats >,
  }

  /// WebSocket client session.
  ///
  /// Cloneable handle; clones share the connection. Create with
  /// [`WebSocketSession::new`], configure, then `open().await`.
  #[ derive( Clone ) ]
  pub struct WebSocketSession
  {
    inner : Arc< WsInner >,
  }

  impl core::fmt::Debug for WebSocketSession
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "WebSocketSession" )
        .field( "id", &self.inner.id )
        .field( "url", &self.inner.url )
        .field( "state", &self.state() )
        .finish_non_exhaustive()
    }
  }

  impl WebSocketSession
  {
    /// Create an unconnected session for `url` (`ws://` or `wss://`).
    #[ must_use ]
    pub fn new< S : Into< String > >( url : S ) -> Self
    {
      Self
      {
        inner : Arc::new( WsInner
        {
          id : NEXT_SESSION_ID.fetch_add( 1, Ordering::Relaxed ),
          url : url.into(),
          config : Mutex::new( SessionConfig
          {
            ssl : SslConfig::new(),
            compression : WsCompressionConfig::default(),
            reconnect : WsReconnectPolicy::no_reconnect(),
            auto_pong : true,
            force_polling : false,
          } ),
          state : Mutex::new( SessionState
          {
            state : WsState::Unconnected,
            error_string : String::new(),
            compression_negotiated : false,
            last_close_code : 0,
            reconnect_attempts : 0,
            epoch : 0,
          } ),
          signals : WsSignals::default(),
          writer : tokio::sync::Mutex::new( None ),
          deflater : Mutex::new( None ),
          inflater : Mutex::new( None ),
          stats : Mutex::new( WsCompressionStats::default() ),
        } ),
      }
    }

    /// Stable identifier of this session.
    #[ inline ]
    #[ must_use ]
    pub fn id( &self ) -> u64
    {
      self.inner.id
    }

    /// Target URL.
    #[ inline ]
    #[ must_use ]
    pub fn url( &self ) -> &str
    {
      &self.inner.url
    }

    /// Current state.
    #[ must_use ]
    pub fn state( &self ) -> WsState
    {
      self.inner.state.lock().state
    }

    /// True while messages can be sent.
    #[ must_use ]
    pub fn is_valid( &self ) -> bool
    {
      self.state() == WsState::Connected
    }

    /// Description of the last error, empty when none occurred.
    #[ must_use ]
    pub fn error_string( &self ) -> String
    {
      self.inner.state.lock().error_string.clone()
    }

    /// Close code of the last disconnect, 0 before any.
    #[ must_use ]
    pub fn last_close_code( &self ) -> u16
    {
      self.inner.state.lock().last_close_code
    }

    /// True when the server accepted permessage-deflate.
    #[ must_use ]
    pub fn is_compression_negotiated( &self ) -> bool
    {
      self.inner.state.lock().compression_negotiated
    }

    /// Raw compression counters.
    #[ must_use ]
    pub fn compression_statistics( &self ) -> WsCompressionStats
    {
      *self.inner.stats.lock()
    }

    /// Formatted compression summary.
    #[ must_use ]
    pub fn compression_stats( &self ) -> String
    {
      self.inner.stats.lock().summary()
    }

    /// Replace the TLS settings. Takes effect on the next `open`.
    pub fn set_ssl_config( &self, ssl : SslConfig )
    {
      self.inner.config.lock().ssl = ssl;
    }

    /// Replace the compression offer. Takes effect on the next `open`.
    pub fn set_compression_config( &self, compression : WsCompressionConfig )
    {
      self.inner.config.lock().compression = compression;
    }

    /// Current compression offer.
    #[ must_use ]
    pub fn compression_config( &self ) -> WsCompressionConfig
    {
      self.inner.config.lock().compression
    }

    /// Replace the reconnect policy.
    pub fn set_reconnect_policy( &self, policy : WsReconnectPolicy )
    {
      self.inner.config.lock().reconnect = policy;
    }

    /// Current reconnect policy.
    #[ must_use ]
    pub fn reconnect_policy( &self ) -> WsReconnectPolicy
    {
      self.inner.config.lock().reconnect.clone()
    }

    /// Answer pings automatically (the default). When disabled the
    /// application must call [`WebSocketSession::pong`] from its
    /// `ping_received` handler.
    pub fn set_auto_pong( &self, enabled : bool )
    {
      self.inner.config.lock().auto_pong = enabled;
    }

    /// True when pings are answered automatically.
    #[ must_use ]
    pub fn is_auto_pong_enabled( &self ) -> bool
    {
      self.inner.config.lock().auto_pong
    }

    /// Force the 50 ms polling receive mode instead of event-driven reads.
    /// The downgrade is logged once when the receive loop starts.
    pub fn set_force_polling( &self, force : bool )
    {
      self.inner.config.lock().force_polling = force;
    }

    // ------------------------------------------------------------------
    // signal subscriptions
    // ------------------------------------------------------------------

    /// The handshake completed.
    pub fn on_connected< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.connected.connect( move | () | handler() );
    }

    /// The connection closed.
    pub fn on_disconnected< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.disconnected.connect( move | () | handler() );
    }

    /// The state changed.
    pub fn on_state_changed< F : Fn( WsState ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.state_changed.connect( move | state | handler( *state ) );
    }

    /// A complete text message arrived.
    pub fn on_text_message< F : Fn( &str ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.text_message_received.connect( move | text | handler( text ) );
    }

    /// A complete binary message arrived.
    pub fn on_binary_message< F : Fn( &[ u8 ] ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.binary_message_received.connect( move | data | handler( data ) );
    }

    /// A ping arrived; payload attached.
    pub fn on_ping< F : Fn( &[ u8 ] ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.ping_received.connect( move | payload | handler( payload ) );
    }

    /// A pong arrived; payload attached.
    pub fn on_pong< F : Fn( &[ u8 ] ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.pong_received.connect( move | payload | handler( payload ) );
    }

    /// A close frame arrived: `( code, reason )`.
    pub fn on_close_received< F : Fn( u16, &str ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.close_received.connect( move | ( code, reason ) | handler( *code, reason ) );
    }

    /// A reconnect is about to be attempted: `( attempt, close_code )`.
    pub fn on_reconnect_attempt< F : Fn( u32, u16 ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.reconnect_attempt.connect( move | ( attempt, code ) | handler( *attempt, *code ) );
    }

    /// A session-level error occurred.
    pub fn on_error< F : Fn( NetworkError ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.inner.signals.error.connect( move | error | handler( *error ) );
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Connect and perform the upgrade handshake.
    ///
    /// # Errors
    /// Connection, TLS and handshake failures map into the error taxonomy;
    /// the session ends in `Closed` and the reconnect policy is consulted
    /// with the abnormal-closure code.
    pub async fn open( &self ) -> NetworkResult< () >
    {
      {
        let mut state = self.inner.state.lock();
        if matches!( state.state, WsState::Connecting | WsState::Connected )
        {
          return Ok( () );
        }
        state.state = WsState::Connecting;
        state.error_string.clear();
      }
      self.inner.signals.state_changed.emit( &WsState::Connecting );

      match self.connect_internal().await
      {
        Ok( ( reader, negotiated, leftover ) ) =>
        {
          let epoch =
          {
            let mut state = self.inner.state.lock();
            state.state = WsState::Connected;
            state.compression_negotiated = negotiated;
            state.reconnect_attempts = 0;
            state.epoch += 1;
            state.epoch
          };
          {
            let config = self.inner.config.lock();
            *self.inner.deflater.lock() = negotiated.then( || MessageDeflater::new( &config.compression ) );
            *self.inner.inflater.lock() = negotiated.then( || MessageInflater::new( &config.compression ) );
          }
          self.inner.signals.state_changed.emit( &WsState::Connected );
          self.inner.signals.connected.emit( &() );

          let session = self.clone();
          let polling = self.inner.config.lock().force_polling;
          tokio::spawn( async move
          {
            recv_loop( session, reader, epoch, leftover, polling ).await;
          } );
          Ok( () )
        },
        Err( error ) =>
        {
          {
            let mut state = self.inner.state.lock();
            state.state = WsState::Closed;
            state.error_string = error.to_string();
            state.last_close_code = CLOSE_CODE_ABNORMAL;
          }
          self.inner.signals.error.emit( &error );
          self.inner.signals.state_changed.emit( &WsState::Closed );
          self.consider_reconnect( CLOSE_CODE_ABNORMAL );
          Err( error )
        },
      }
    }

    /// Start the close handshake with a standard code.
    ///
    /// # Errors
    /// Returns an error when the session is not connected or the close frame
    /// cannot be written.
    pub async fn close( &self, code : WsCloseCode, reason : &str ) -> NetworkResult< () >
    {
      self.close_with_code( code.code(), reason ).await
    }

    /// Start the close handshake with a raw close code.
    ///
    /// # Errors
    /// Returns an error when the session is not connected or the close frame
    /// cannot be written.
    pub async fn close_with_code( &self, code : u16, reason : &str ) -> NetworkResult< () >
    {
      {
        let mut state = self.inner.state.lock();
        if state.state != WsState::Connected
        {
          return Err( NetworkError::InvalidRequest );
        }
        state.state = WsState::Closing;
      }
      self.inner.signals.state_changed.emit( &WsState::Closing );
      let frame = WsFrame::new( WsOpcode::Close, WsFrame::close_payload( code, reason ) );
      self.write_frame( &frame ).await
    }

    /// Drop the connection without a close handshake.
    pub fn abort( &self )
    {
      let changed =
      {
        let mut state = self.inner.state.lock();
        if state.state == WsState::Closed || state.state == WsState::Unconnected
        {
          false
        }
        else
        {
          state.state = WsState::Closed;
          state.last_close_code = CLOSE_CODE_ABNORMAL;
          state.epoch += 1;
          true
        }
      };
      if let Ok( mut writer ) = self.inner.writer.try_lock()
      {
        *writer = None;
      }
      if changed
      {
        self.inner.signals.state_changed.emit( &WsState::Closed );
        self.inner.signals.disconnected.emit( &() );
      }
    }

    // ------------------------------------------------------------------
    // sending
    // ------------------------------------------------------------------

    /// Send a text message, compressed when negotiated. Returns the payload
    /// length handed over.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] when not connected and
    /// [`NetworkError::Unknown`] for wire failures.
    pub async fn send_text_message( &self, message : &str ) -> NetworkResult< u64 >
    {
      self.send_data_message( WsOpcode::Text, message.as_bytes() ).await
    }

    /// Send a binary message, compressed when negotiated. Returns the payload
    /// length handed over.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] when not connected and
    /// [`NetworkError::Unknown`] for wire failures.
    pub async fn send_binary_message( &self, data : &[ u8 ] ) -> NetworkResult< u64 >
    {
      self.send_data_message( WsOpcode::Binary, data ).await
    }

    /// Send a ping control frame. Payload must be at most 125 bytes.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for oversized payloads or
    /// when not connected.
    pub async fn ping( &self, payload : &[ u8 ] ) -> NetworkResult< () >
    {
      self.send_control_frame( WsOpcode::Ping, payload.to_vec() ).await
    }

    /// Send a pong control frame. Payload must be at most 125 bytes.
    ///
    /// # Errors
    /// Returns [`NetworkError::InvalidRequest`] for oversized payloads or
    /// when not connected.
    pub async fn pong( &self, payload : &[ u8 ] ) -> NetworkResult< () >
    {
      self.send_control_frame( WsOpcode::Pong, payload.to_vec() ).await
    }

    async fn send_data_message( &self, opcode : WsOpcode, payload : &[ u8 ] ) -> NetworkResult< u64 >
    {
      if self.state() != WsState::Connected
      {
        return Err( NetworkError::InvalidRequest );
      }

      let compressed = if self.is_compression_negotiated()
      {
        let mut deflater = self.inner.deflater.lock();
        match deflater.as_mut()
        {
          Some( deflater ) => Some( deflater.compress( payload )? ),
          None => None,
        }
      }
      else
      {
        None
      };

      let ( wire_payload, rsv1 ) = match compressed
      {
        Some( compressed ) => ( compressed, true ),
        None => ( payload.to_vec(), false ),
      };

      {
        let mut stats = self.inner.stats.lock();
        stats.sent_bytes_raw += payload.len() as u64;
        stats.sent_bytes_compressed += wire_payload.len() as u64;
      }

      let frame = WsFrame
      {
        fin : true,
        rsv1,
        opcode,
        payload : wire_payload,
      };
      self.write_frame( &frame ).await?;
      Ok( payload.len() as u64 )
    }

    async fn send_control_frame( &self, opcode : WsOpcode, payload : Vec< u8 > ) -> NetworkResult< () >
    {
      if payload.len() > MAX_CONTROL_PAYLOAD
      {
        return Err( NetworkError::InvalidRequest );
      }
      if self.state() != WsState::Connected && self.state() != WsState::Closing
      {
        return Err( NetworkError::InvalidRequest );
      }
      let frame = WsFrame::new( opcode, payload );
      self.write_frame( &frame ).await
    }

    async fn write_frame( &self, frame : &WsFrame ) -> NetworkResult< () >
    {
      let encoded = encode_frame( frame, true );
      let mut writer = self.inner.writer.lock().await;
      let Some( writer ) = writer.as_mut() else
      {
        return Err( NetworkError::InvalidRequest );
      };
      writer
        .write_all( &encoded )
        .await
        .map_err( | _err | NetworkError::Unknown )?;
      writer.flush().await.map_err( | _err | NetworkError::Unknown )
    }

    // ------------------------------------------------------------------
    // connection internals
    // ------------------------------------------------------------------

    async fn connect_internal( &self ) -> NetworkResult< ( ReadHalf< WsStream >, bool, Vec< u8 > ) >
    {
      let parsed = url::Url::parse( &self.inner.url ).map_err( | _err | NetworkError::InvalidRequest )?;
      let secure = match parsed.scheme()
      {
        "ws" => false,
        "wss" => true,
        _ => return Err( NetworkError::InvalidRequest ),
      };
      let host = parsed.host_str().ok_or( NetworkError::InvalidRequest )?.to_owned();
      let port = parsed.port().unwrap_or( if secure { 443 } else { 80 } );
      let path = match parsed.query()
      {
        Some( query ) => format!( "{}?{query}", parsed.path() ),
        None => parsed.path().to_owned(),
      };

      let tcp = TcpStream::connect( ( host.as_str(), port ) )
        .await
        .map_err( | err | match err.kind()
        {
          std::io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused,
          std::io::ErrorKind::TimedOut => NetworkError::ConnectionTimeout,
          _ => NetworkError::HostNotFound,
        } )?;

      let mut stream = if secure
      {
        let connector = self.build_tls_connector()?;
        let connector = tokio_native_tls::TlsConnector::from( connector );
        let tls = connector
          .connect( &host, tcp )
          .await
          .map_err( | _err | NetworkError::SslHandshakeFailed )?;
        WsStream::Tls( Box::new( tls ) )
      }
      else
      {
        WsStream::Plain( tcp )
      };

      let ( negotiated, leftover ) = self.handshake( &mut stream, &host, port, secure, &path ).await?;
      let ( reader, writer ) = tokio::io::split( stream );
      *self.inner.writer.lock().await = Some( writer );
      Ok( ( reader, negotiated, leftover ) )
    }

    fn build_tls_connector( &self ) -> NetworkResult< native_tls::TlsConnector >
    {
      let ssl = self.inner.config.lock().ssl.clone();
      let mut builder = native_tls::TlsConnector::builder();
      if !ssl.verify_peer
      {
        builder.danger_accept_invalid_certs( true );
      }
      if !ssl.verify_host
      {
        builder.danger_accept_invalid_hostnames( true );
      }
      if !ssl.ca_cert_path.is_empty()
      {
        let pem = std::fs::read( &ssl.ca_cert_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        let certificate = native_tls::Certificate::from_pem( &pem ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        builder.add_root_certificate( certificate );
      }
      if !ssl.client_cert_path.is_empty() && !ssl.client_key_path.is_empty()
      {
        let cert_pem = std::fs::read( &ssl.client_cert_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        let key_pem = std::fs::read( &ssl.client_key_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        let identity = native_tls::Identity::from_pkcs8( &cert_pem, &key_pem )
          .map_err( | _err | NetworkError::SslHandshakeFailed )?;
        builder.identity( identity );
      }
      builder.build().map_err( | _err | NetworkError::SslHandshakeFailed )
    }

    async fn handshake
    (
      &self,
      stream : &mut WsStream,
      host : &str,
      port : u16,
      secure : bool,
      path : &str,
    ) -> NetworkResult< ( bool, Vec< u8 > ) >
    {
      let key_bytes : [ u8; 16 ] = rand::random();
      let key = base64::engine::general_purpose::STANDARD.encode( key_bytes );

      let host_header = if ( secure && port == 443 ) || ( !secure && port == 80 )
      {
        host.to_owned()
      }
      else
      {
        format!( "{host}:{port}" )
      };

      let compression = self.inner.config.lock().compression;
      let mut request = format!
      (
        "GET {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n"
      );
      if compression.enabled
      {
        request.push_str( &format!( "Sec-WebSocket-Extensions: {}\r\n", compression.to_extension_header() ) );
      }
      request.push_str( "\r\n" );

      stream
        .write_all( request.as_bytes() )
        .await
        .map_err( | _err | NetworkError::Unknown )?;

      // Read until the end of the response head; anything past it already
      // belongs to the frame stream.
      let mut response : Vec< u8 > = Vec::with_capacity( 1024 );
      let mut buffer = [ 0u8; 1024 ];
      let head_end = loop
      {
        if let Some( position ) = find_head_end( &response )
        {
          break position;
        }
        if response.len() > HANDSHAKE_RESPONSE_LIMIT
        {
          return Err( NetworkError::Unknown );
        }
        let read = stream.read( &mut buffer ).await.map_err( | _err | NetworkError::Unknown )?;
        if read == 0
        {
          return Err( NetworkError::ConnectionRefused );
        }
        response.extend_from_slice( &buffer[ ..read ] );
      };

      let head = String::from_utf8_lossy( &response[ ..head_end ] ).into_owned();
      let leftover = response[ head_end + 4.. ].to_vec();

      let mut lines = head.split( "\r\n" );
      let status_line = lines.next().unwrap_or( "" );
      let status : u16 = status_line
        .split_whitespace()
        .nth( 1 )
        .and_then( | code | code.parse().ok() )
        .unwrap_or( 0 );
      if status != 101
      {
        let error = if status == 0
        {
          NetworkError::Unknown
        }
        else
        {
          NetworkError::from_http_status( status )
        };
        let error = if error.is_error() { error } else { NetworkError::Unknown };
        return Err( error );
      }

      let mut accept_header = String::new();
      let mut extensions_header = String::new();
      for line in lines
      {
        let Some( ( name, value ) ) = line.split_once( ':' ) else { continue };
        let name = name.trim().to_ascii_lowercase();
        if name == "sec-websocket-accept"
        {
          accept_header = value.trim().to_owned();
        }
        else if name == "sec-websocket-extensions"
        {
          extensions_header = value.trim().to_owned();
        }
      }

      let mut hasher = Sha1::new();
      hasher.update( key.as_bytes() );
      hasher.update( WS_ACCEPT_GUID.as_bytes() );
      let expected = base64::engine::general_purpose::STANDARD.encode( hasher.finalize() );
      if accept_header != expected
      {
        return Err( NetworkError::Unknown );
      }

      let negotiated = if compression.enabled && !extensions_header.is_empty()
      {
        let echoed = WsCompressionConfig::from_extension_header( &extensions_header );
        if echoed.enabled && echoed.client_max_window_bits < 15
        {
          // The deflater runs at the default window; a smaller negotiated
          // client window would produce a non-conformant stream.
          tracing::warn!
          (
            bits = echoed.client_max_window_bits,
            "server demanded a smaller client window, disabling compression"
          );
          false
        }
        else
        {
          echoed.enabled
        }
      }
      else
      {
        false
      };

      Ok( ( negotiated, leftover ) )
    }

    // ------------------------------------------------------------------
    // receive path
    // ------------------------------------------------------------------

    fn epoch_current( &self, epoch : u64 ) -> bool
    {
      self.inner.state.lock().epoch == epoch
    }

    async fn process_frame
    (
      &self,
      frame : WsFrame,
      fragment_opcode : &mut Option< WsOpcode >,
      fragment_rsv1 : &mut bool,
      fragment_buffer : &mut Vec< u8 >,
    ) -> bool
    {
      match frame.opcode
      {
        WsOpcode::Ping =>
        {
          self.inner.signals.ping_received.emit( &frame.payload );
          let auto_pong = self.inner.config.lock().auto_pong;
          if auto_pong
          {
            let _ = self.send_control_frame( WsOpcode::Pong, frame.payload ).await;
          }
          true
        },
        WsOpcode::Pong =>
        {
          self.inner.signals.pong_received.emit( &frame.payload );
          true
        },
        WsOpcode::Close =>
        {
          let ( code, reason ) = WsFrame::parse_close_payload( &frame.payload );
          self.inner.signals.close_received.emit( &( code, reason ) );
          let locally_initiated =
          {
            let state = self.inner.state.lock();
            state.state == WsState::Closing
          };
          if !locally_initiated
          {
            let _ = self.send_control_frame( WsOpcode::Close, frame.payload ).await;
          }
          self.finish_disconnect( code );
          false
        },
        WsOpcode::Text | WsOpcode::Binary | WsOpcode::Continuation =>
        {
          if frame.opcode != WsOpcode::Continuation
          {
            *fragment_opcode = Some( frame.opcode );
            *fragment_rsv1 = frame.rsv1;
            fragment_buffer.clear();
          }
          fragment_buffer.extend_from_slice( &frame.payload );
          if frame.fin
          {
            let opcode = fragment_opcode.take().unwrap_or( WsOpcode::Binary );
            let payload = core::mem::take( fragment_buffer );
            self.deliver_message( opcode, payload, *fragment_rsv1 );
            *fragment_rsv1 = false;
          }
          true
        },
      }
    }

    fn deliver_message( &self, opcode : WsOpcode, payload : Vec< u8 >, compressed : bool )
    {
      let wire_len = payload.len() as u64;
      let payload = if compressed && self.is_compression_negotiated()
      {
        let inflated =
        {
          let mut inflater = self.inner.inflater.lock();
          inflater.as_mut().map( | inflater | inflater.decompress( &payload ) )
        };
        match inflated
        {
          Some( Ok( data ) ) => data,
          Some( Err( error ) ) =>
          {
            self.inner.signals.error.emit( &error );
            return;
          },
          None => payload,
        }
      }
      else
      {
        payload
      };

      {
        let mut stats = self.inner.stats.lock();
        stats.received_bytes_compressed += wire_len;
        stats.received_bytes_raw += payload.len() as u64;
      }

      match opcode
      {
        WsOpcode::Text =>
        {
          let text = String::from_utf8_lossy( &payload ).into_owned();
          self.inner.signals.text_message_received.emit( &text );
        },
        _ =>
        {
          self.inner.signals.binary_message_received.emit( &payload );
        },
      }
    }

    fn finish_disconnect( &self, close_code : u16 )
    {
      let changed =
      {
        let mut state = self.inner.state.lock();
        if state.state == WsState::Closed
        {
          false
        }
        else
        {
          state.state = WsState::Closed;
          state.last_close_code = close_code;
          state.epoch += 1;
          true
        }
      };
      if let Ok( mut writer ) = self.inner.writer.try_lock()
      {
        *writer = None;
      }
      if changed
      {
        self.inner.signals.state_changed.emit( &WsState::Closed );
        self.inner.signals.disconnected.emit( &() );
        self.consider_reconnect( close_code );
      }
    }

    fn consider_reconnect( &self, close_code : u16 )
    {
      let policy = self.inner.config.lock().reconnect.clone();
      let attempt =
      {
        let mut state = self.inner.state.lock();
        if !policy.should_retry( close_code, state.reconnect_attempts )
        {
          return;
        }
        state.reconnect_attempts += 1;
        state.reconnect_attempts
      };
      let delay = policy.delay_for_attempt( attempt - 1 );
      let session = self.clone();
      tokio::spawn( async move
      {
        tokio::time::sleep( delay ).await;
        if session.state() != WsState::Closed
        {
          return;
        }
        session.inner.signals.reconnect_attempt.emit( &( attempt, close_code ) );
        let _ = session.open().await;
      } );
    }
  }

  fn find_head_end( buffer : &[ u8 ] ) -> Option< usize >
  {
    buffer.windows( 4 ).position( | window | window == b"\r\n\r\n" )
  }

  async fn recv_loop
  (
    session : WebSocketSession,
    mut reader : ReadHalf< WsStream >,
    epoch : u64,
    leftover : Vec< u8 >,
    polling : bool,
  )
  {
    if polling
    {
      tracing::warn!( "event-driven receive unavailable, falling back to 50 ms polling" );
    }

    let mut decoder = WsFrameDecoder::new();
    decoder.feed( &leftover );
    let mut fragment_opcode : Option< WsOpcode > = None;
    let mut fragment_rsv1 = false;
    let mut fragment_buffer : Vec< u8 > = Vec::new();
    let mut buffer = vec![ 0u8; READ_BUFFER_SIZE ];

    loop
    {
      if !session.epoch_current( epoch )
      {
        return;
      }

      loop
      {
        match decoder.next_frame()
        {
          Ok( Some( frame ) ) =>
          {
            let keep_going = session
              .process_frame( frame, &mut fragment_opcode, &mut fragment_rsv1, &mut fragment_buffer )
              .await;
            if !keep_going
            {
              return;
            }
          },
          Ok( None ) => break,
          Err( error ) =>
          {
            session.inner.signals.error.emit( &error );
            session.finish_disconnect( 1002 );
            return;
          },
        }
      }

      let read = if polling
      {
        match tokio::time::timeout( POLL_INTERVAL, reader.read( &mut buffer ) ).await
        {
          Err( _elapsed ) => continue,
          Ok( result ) => result,
        }
      }
      else
      {
        reader.read( &mut buffer ).await
      };

      match read
      {
        Ok( 0 ) | Err( _ ) =>
        {
          session.finish_disconnect( CLOSE_CODE_ABNORMAL );
          return;
        },
        Ok( count ) => decoder.feed( &buffer[ ..count ] ),
      }
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
crate::mod_interface!
{
  exposed use WsState;
  exposed use WsCloseCode;
  exposed use WebSocketSession;
}
