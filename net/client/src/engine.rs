//! Engine seam over `reqwest`.
//!
//! The engine owns one pooled client per [`ClientKey`] and runs every attempt
//! as a spawned task that streams the response, forwarding [`TransferEvent`]s
//! to the driver. Cancellation, pause and the stall watchdog are observed
//! between reads.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::collections::HashMap;
  use std::sync::Arc;

  use bytes::Bytes;
  use parking_lot::Mutex;
  use tokio::sync::mpsc;

  use crate::error::{ classify_engine_error, NetworkError, NetworkResult };
  use crate::handle::{ BodySource, ClientKey, HttpMethod, TransferControl, TransferId, TransferSpec };
  use crate::http_version::HttpVersion;
  use crate::pool::ConnectionPoolManager;

  /// Event emitted by an engine task towards the driver.
  #[ derive( Debug ) ]
  pub enum TransferEvent
  {
    /// Response status line and headers arrived.
    Status
    {
      /// Transfer identifier.
      id : TransferId,
      /// HTTP status code.
      status_code : u16,
      /// Parsed header pairs in wire order.
      header_pairs : Vec< ( String, String ) >,
      /// Reconstructed raw header bytes, status line included.
      raw_headers : Vec< u8 >,
    },
    /// A chunk of the response body arrived.
    Chunk
    {
      /// Transfer identifier.
      id : TransferId,
      /// Body bytes.
      data : Bytes,
    },
    /// Download progress tick.
    DownloadProgress
    {
      /// Transfer identifier.
      id : TransferId,
      /// Bytes received so far.
      received : u64,
      /// Total expected bytes, -1 when unknown.
      total : i64,
    },
    /// Upload progress tick.
    UploadProgress
    {
      /// Transfer identifier.
      id : TransferId,
      /// Bytes sent so far.
      sent : u64,
      /// Total body bytes, -1 when unknown.
      total : i64,
    },
    /// The transfer completed, successfully or not.
    Done
    {
      /// Transfer identifier.
      id : TransferId,
      /// Transport-level outcome; `NoError` when the HTTP exchange completed.
      error : NetworkError,
      /// HTTP status code, 0 when no status line was received.
      status_code : u16,
    },
  }

  /// Sender half of the driver's event channel.
  pub type TransferEventSender = mpsc::UnboundedSender< TransferEvent >;

  /// Client cache plus transfer runner.
  ///
  /// Clients are cheap to clone and expensive to build, so one is kept per
  /// distinct transport fingerprint. `flush_clients` drops them all, which
  /// closes their pooled idle connections.
  pub struct TransportEngine
  {
    clients : Mutex< HashMap< ClientKey, reqwest::Client > >,
    pool : Arc< ConnectionPoolManager >,
  }

  impl core::fmt::Debug for TransportEngine
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "TransportEngine" )
        .field( "clients", &self.clients.lock().len() )
        .finish_non_exhaustive()
    }
  }

  impl TransportEngine
  {
    /// Create an engine configured by the given pool manager.
    #[ must_use ]
    pub fn new( pool : Arc< ConnectionPoolManager > ) -> Self
    {
      Self
      {
        clients : Mutex::new( HashMap::new() ),
        pool,
      }
    }

    /// Drop every cached client, flushing their pooled idle connections.
    pub fn flush_clients( &self )
    {
      self.clients.lock().clear();
      self.pool.reset_reuse_history();
    }

    fn client_for( &self, spec : &TransferSpec ) -> NetworkResult< reqwest::Client >
    {
      let key = spec.client_key();
      if let Some( client ) = self.clients.lock().get( &key )
      {
        return Ok( client.clone() );
      }
      let client = self.build_client( spec )?;
      self.clients.lock().insert( key, client.clone() );
      Ok( client )
    }

    fn build_client( &self, spec : &TransferSpec ) -> NetworkResult< reqwest::Client >
    {
      let mut builder = reqwest::Client::builder();
      builder = self.pool.apply_to_builder( builder );
      builder = builder.connect_timeout( spec.timeout.connect_timeout );

      builder = if spec.follow_redirects
      {
        builder.redirect( reqwest::redirect::Policy::limited( 30 ) )
      }
      else
      {
        builder.redirect( reqwest::redirect::Policy::none() )
      };

      match spec.version.version
      {
        HttpVersion::HttpAny => {},
        HttpVersion::Http1Only => builder = builder.http1_only(),
        HttpVersion::Http2 | HttpVersion::Http2Tls => builder = builder.http2_prior_knowledge(),
        HttpVersion::Http3 =>
        {
          tracing::warn!( "engine lacks QUIC support, downgrading HTTP/3 preference" );
        },
        HttpVersion::Http3Only =>
        {
          tracing::warn!( "engine lacks QUIC support, rejecting QUIC-only request" );
          return Err( NetworkError::InvalidRequest );
        },
      }

      let ssl = &spec.ssl;
      if !ssl.verify_peer || !ssl.verify_host
      {
        // The rustls backend has no separate host-only switch; relaxing
        // either check disables certificate verification as a whole.
        if ssl.verify_peer != ssl.verify_host
        {
          tracing::warn!( "engine cannot relax host verification alone, disabling certificate verification" );
        }
        builder = builder.danger_accept_invalid_certs( true );
      }
      if !ssl.ca_cert_path.is_empty()
      {
        let pem = std::fs::read( &ssl.ca_cert_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        let cert = reqwest::Certificate::from_pem( &pem ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        builder = builder.add_root_certificate( cert );
      }
      if !ssl.client_cert_path.is_empty() && !ssl.client_key_path.is_empty()
      {
        let mut identity_pem = std::fs::read( &ssl.client_cert_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        let key_pem = std::fs::read( &ssl.client_key_path ).map_err( | _err | NetworkError::SslHandshakeFailed )?;
        identity_pem.push( b'\n' );
        identity_pem.extend_from_slice( &key_pem );
        let identity = reqwest::Identity::from_pem( &identity_pem )
          .map_err( | _err | NetworkError::SslHandshakeFailed )?;
        builder = builder.identity( identity );
      }

      if let Some( proxy_config ) = &spec.proxy
      {
        let mut proxy = reqwest::Proxy::all( proxy_config.to_url() ).map_err( | _err | NetworkError::InvalidRequest )?;
        if !proxy_config.username.is_empty()
        {
          proxy = proxy.basic_auth( &proxy_config.username, &proxy_config.password );
        }
        builder = builder.proxy( proxy );
      }

      builder.build().map_err( | err | classify_engine_error( &err ) )
    }

    /// Spawn the engine task for one attempt. Events, including the final
    /// `Done`, arrive on `events`.
    pub fn spawn_transfer
    (
      &self,
      id : TransferId,
      spec : TransferSpec,
      events : TransferEventSender,
      control : TransferControl,
    )
    {
      let client = match self.client_for( &spec )
      {
        Ok( client ) => client,
        Err( error ) =>
        {
          let _ = events.send( TransferEvent::Done { id, error, status_code : 0 } );
          return;
        },
      };

      tokio::spawn( async move
      {
        let ( error, status_code ) = match run_transfer( client, id, spec, &events, control ).await
        {
          Ok( status_code ) => ( NetworkError::NoError, status_code ),
          Err( ( error, status_code ) ) => ( error, status_code ),
        };
        let _ = events.send( TransferEvent::Done { id, error, status_code } );
      } );
    }
  }

  fn method_of( method : HttpMethod ) -> reqwest::Method
  {
    match method
    {
      HttpMethod::Head => reqwest::Method::HEAD,
      HttpMethod::Get => reqwest::Method::GET,
      HttpMethod::Post => reqwest::Method::POST,
      HttpMethod::Put => reqwest::Method::PUT,
      HttpMethod::Delete => reqwest::Method::DELETE,
      HttpMethod::Patch => reqwest::Method::PATCH,
    }
  }

  type TransferFailure = ( NetworkError, u16 );

  async fn run_transfer
  (
    client : reqwest::Client,
    id : TransferId,
    spec : TransferSpec,
    events : &TransferEventSender,
    mut control : TransferControl,
  ) -> core::result::Result< u16, TransferFailure >
  {
    let mut request = client.request( method_of( spec.method ), &spec.url );
    for ( name, value ) in &spec.headers
    {
      request = request.header( name.as_str(), value.as_str() );
    }
    if !spec.timeout.total_timeout.is_zero()
    {
      request = request.timeout( spec.timeout.total_timeout );
    }

    let body_total = spec.body.known_len().map_or( -1, | len | len as i64 );
    match &spec.body
    {
      BodySource::Empty => {},
      BodySource::Bytes( data ) =>
      {
        request = request.body( data.clone() );
      },
      BodySource::File( path ) =>
      {
        let file = tokio::fs::File::open( path )
          .await
          .map_err( | _err | ( NetworkError::InvalidRequest, 0 ) )?;
        let stream = tokio_util::io::ReaderStream::new( file );
        let progress_events = events.clone();
        let mut sent : u64 = 0;
        let counted = futures_util::StreamExt::map( stream, move | item |
        {
          if let Ok( chunk ) = &item
          {
            sent += chunk.len() as u64;
            let _ = progress_events.send( TransferEvent::UploadProgress { id, sent, total : body_total } );
          }
          item
        } );
        request = request.body( reqwest::Body::wrap_stream( counted ) );
      },
    }

    let response = tokio::select!
    {
      () = control.cancel.cancelled() => return Err( ( NetworkError::OperationCancelled, 0 ) ),
      sent = request.send() => sent.map_err( | err | ( classify_engine_error( &err ), 0 ) )?,
    };

    let status_code = response.status().as_u16();
    let ( header_pairs, raw_headers ) = render_headers( &response );
    let _ = events.send( TransferEvent::Status { id, status_code, header_pairs, raw_headers } );
    if let BodySource::Bytes( data ) = &spec.body
    {
      let len = data.len() as u64;
      let _ = events.send( TransferEvent::UploadProgress { id, sent : len, total : len as i64 } );
    }

    let total = response.content_length().map_or( -1, | len | len as i64 );
    let mut received : u64 = 0;
    let mut body = response;
    loop
    {
      wait_while_paused( &mut control ).await.map_err( | error | ( error, status_code ) )?;

      let next = read_next_chunk( &mut body, &spec, &mut control ).await;
      match next
      {
        Ok( Some( data ) ) =>
        {
          received += data.len() as u64;
          let _ = events.send( TransferEvent::Chunk { id, data } );
          let _ = events.send( TransferEvent::DownloadProgress { id, received, total } );
        },
        Ok( None ) => break,
        Err( error ) => return Err( ( error, status_code ) ),
      }
    }

    Ok( status_code )
  }

  async fn wait_while_paused( control : &mut TransferControl ) -> NetworkResult< () >
  {
    while *control.pause.borrow()
    {
      let cancelled = control.cancel.clone();
      tokio::select!
      {
        () = cancelled.cancelled() => return Err( NetworkError::OperationCancelled ),
        changed = control.pause.changed() =>
        {
          if changed.is_err()
          {
            return Err( NetworkError::OperationCancelled );
          }
        },
      }
    }
    Ok( () )
  }

  async fn read_next_chunk
  (
    response : &mut reqwest::Response,
    spec : &TransferSpec,
    control : &mut TransferControl,
  ) -> NetworkResult< Option< Bytes > >
  {
    let cancelled = control.cancel.clone();
    if spec.timeout.stall_check_enabled()
    {
      tokio::select!
      {
        () = cancelled.cancelled() => Err( NetworkError::OperationCancelled ),
        result = tokio::time::timeout( spec.timeout.low_speed_time, response.chunk() ) => match result
        {
          Err( _elapsed ) => Err( NetworkError::ConnectionTimeout ),
          Ok( Ok( data ) ) => Ok( data ),
          Ok( Err( err ) ) if err.is_timeout() => Err( NetworkError::ConnectionTimeout ),
          Ok( Err( err ) ) => Err( classify_engine_error( &err ) ),
        },
      }
    }
    else
    {
      tokio::select!
      {
        () = cancelled.cancelled() => Err( NetworkError::OperationCancelled ),
        result = response.chunk() => match result
        {
          Ok( data ) => Ok( data ),
          Err( err ) if err.is_timeout() => Err( NetworkError::ConnectionTimeout ),
          Err( err ) => Err( classify_engine_error( &err ) ),
        },
      }
    }
  }

  fn render_headers( response : &reqwest::Response ) -> ( Vec< ( String, String ) >, Vec< u8 > )
  {
    let version = response.version();
    let version_text = if version == reqwest::Version::HTTP_2
    {
      "HTTP/2"
    }
    else if version == reqwest::Version::HTTP_3
    {
      "HTTP/3"
    }
    else if version == reqwest::Version::HTTP_10
    {
      "HTTP/1.0"
    }
    else
    {
      "HTTP/1.1"
    };

    let mut raw = format!( "{version_text} {}\r\n", response.status() ).into_bytes();
    let mut pairs = Vec::with_capacity( response.headers().len() );
    for ( name, value ) in response.headers()
    {
      let value_text = String::from_utf8_lossy( value.as_bytes() ).into_owned();
      raw.extend_from_slice( format!( "{name}: {value_text}\r\n" ).as_bytes() );
      pairs.push( ( name.as_str().to_owned(), value_text ) );
    }
    raw.extend_from_slice( b"\r\n" );
    ( pairs, raw )
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use TransferEvent;
  exposed use TransferEventSender;
  exposed use TransportEngine;
}
