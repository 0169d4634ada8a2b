//! permessage-deflate (RFC 7692) configuration, codecs and statistics.
//!
//! The codecs run raw deflate at the engine's default 15-bit window.
//! `server_max_window_bits` is offered so the server may shrink its outbound
//! window (a 15-bit inflater accepts any smaller window); an echo demanding a
//! smaller *client* window than the codec can produce fails negotiation
//! instead of producing a non-conformant stream.

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
mod private
{
  use flate2::{ Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status };

  use crate::error::{ NetworkError, NetworkResult };

  /// The flush trailer appended by a Sync flush and stripped from every
  /// compressed message per RFC 7692.
  const DEFLATE_TAIL : [ u8; 4 ] = [ 0x00, 0x00, 0xFF, 0xFF ];

  /// permessage-deflate offer and codec settings.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  #[ must_use ]
  pub struct WsCompressionConfig
  {
    /// Whether the extension is offered at all.
    pub enabled : bool,
    /// Window bits offered for the client-to-server direction.
    pub client_max_window_bits : u8,
    /// Window bits offered for the server-to-client direction.
    pub server_max_window_bits : u8,
    /// Reset the deflate context after every sent message.
    pub client_no_context_takeover : bool,
    /// Ask the server to reset its context after every message.
    pub server_no_context_takeover : bool,
    /// Deflate level, 0-9.
    pub compression_level : u32,
  }

  impl Default for WsCompressionConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        enabled : false,
        client_max_window_bits : 15,
        server_max_window_bits : 15,
        client_no_context_takeover : false,
        server_no_context_takeover : false,
        compression_level : 6,
      }
    }
  }

  impl WsCompressionConfig
  {
    /// Balanced preset: enabled, full windows, level 6.
    pub fn default_config() -> Self
    {
      Self { enabled : true, ..Self::default() }
    }

    /// Low-memory preset: small inbound window, no context takeover, level 1.
    pub fn low_memory() -> Self
    {
      Self
      {
        enabled : true,
        server_max_window_bits : 9,
        client_no_context_takeover : true,
        server_no_context_takeover : true,
        compression_level : 1,
        ..Self::default()
      }
    }

    /// Maximum-compression preset: full windows, level 9.
    pub fn max_compression() -> Self
    {
      Self
      {
        enabled : true,
        compression_level : 9,
        ..Self::default()
      }
    }

    /// Render the `Sec-WebSocket-Extensions` offer.
    #[ must_use ]
    pub fn to_extension_header( &self ) -> String
    {
      let mut header = format!
      (
        "permessage-deflate; client_max_window_bits={}; server_max_window_bits={}",
        self.client_max_window_bits, self.server_max_window_bits,
      );
      if self.client_no_context_takeover
      {
        header.push_str( "; client_no_context_takeover" );
      }
      if self.server_no_context_takeover
      {
        header.push_str( "; server_no_context_takeover" );
      }
      header
    }

    /// Parse a `Sec-WebSocket-Extensions` value (offer or echo). `enabled`
    /// reflects whether `permessage-deflate` is present at all.
    #[ must_use ]
    pub fn from_extension_header( header : &str ) -> Self
    {
      let mut config = Self::default();
      for extension in header.split( ',' )
      {
        let mut parts = extension.split( ';' ).map( str::trim );
        if parts.next() != Some( "permessage-deflate" )
        {
          continue;
        }
        config.enabled = true;
        for parameter in parts
        {
          let ( name, value ) = parameter
            .split_once( '=' )
            .map_or( ( parameter, "" ), | ( name, value ) | ( name.trim(), value.trim() ) );
          match name
          {
            "client_max_window_bits" if !value.is_empty() =>
            {
              if let Ok( bits ) = value.parse::< u8 >()
              {
                config.client_max_window_bits = bits.clamp( 8, 15 );
              }
            },
            "server_max_window_bits" if !value.is_empty() =>
            {
              if let Ok( bits ) = value.parse::< u8 >()
              {
                config.server_max_window_bits = bits.clamp( 8, 15 );
              }
            },
            "client_no_context_takeover" => config.client_no_context_takeover = true,
            "server_no_context_takeover" => config.server_no_context_takeover = true,
            _ => {},
          }
        }
        break;
      }
      config
    }
  }

  /// Compresses outgoing message payloads.
  pub struct MessageDeflater
  {
    compress : Compress,
    reset_each_message : bool,
  }

  impl core::fmt::Debug for MessageDeflater
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "MessageDeflater" )
        .field( "reset_each_message", &self.reset_each_message )
        .finish_non_exhaustive()
    }
  }

  impl MessageDeflater
  {
    /// Create a deflater for the negotiated configuration.
    #[ must_use ]
    pub fn new( config : &WsCompressionConfig ) -> Self
    {
      Self
      {
        compress : Compress::new( Compression::new( config.compression_level.min( 9 ) ), false ),
        reset_each_message : config.client_no_context_takeover,
      }
    }

    /// Deflate one message, stripping the Sync-flush trailer.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the deflate stream errors.
    pub fn compress( &mut self, payload : &[ u8 ] ) -> NetworkResult< Vec< u8 > >
    {
      let mut out : Vec< u8 > = Vec::with_capacity( payload.len() / 2 + 64 );
      let mut consumed : usize = 0;
      loop
      {
        if out.len() == out.capacity()
        {
          out.reserve( 4096 );
        }
        let before_in = self.compress.total_in();
        let before_out = self.compress.total_out();
        let _status = self
          .compress
          .compress_vec( &payload[ consumed.. ], &mut out, FlushCompress::Sync )
          .map_err( | _err | NetworkError::Unknown )?;
        consumed += ( self.compress.total_in() - before_in ) as usize;
        let produced = self.compress.total_out() - before_out;
        if consumed >= payload.len() && produced == 0
        {
          break;
        }
      }

      if out.ends_with( &DEFLATE_TAIL )
      {
        out.truncate( out.len() - DEFLATE_TAIL.len() );
      }
      if self.reset_each_message
      {
        self.compress.reset();
      }
      Ok( out )
    }
  }

  /// Decompresses incoming message payloads.
  pub struct MessageInflater
  {
    decompress : Decompress,
    reset_each_message : bool,
  }

  impl core::fmt::Debug for MessageInflater
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "MessageInflater" )
        .field( "reset_each_message", &self.reset_each_message )
        .finish_non_exhaustive()
    }
  }

  impl MessageInflater
  {
    /// Create an inflater for the negotiated configuration.
    #[ must_use ]
    pub fn new( config : &WsCompressionConfig ) -> Self
    {
      Self
      {
        decompress : Decompress::new( false ),
        reset_each_message : config.server_no_context_takeover,
      }
    }

    /// Inflate one message, re-appending the Sync-flush trailer first.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the inflate stream errors.
    pub fn decompress( &mut self, payload : &[ u8 ] ) -> NetworkResult< Vec< u8 > >
    {
      let mut input = payload.to_vec();
      input.extend_from_slice( &DEFLATE_TAIL );

      let mut out : Vec< u8 > = Vec::with_capacity( input.len() * 4 + 64 );
      let mut consumed : usize = 0;
      loop
      {
        if out.len() == out.capacity()
        {
          out.reserve( 4096 );
        }
        let before_in = self.decompress.total_in();
        let before_out = self.decompress.total_out();
        let status = self
          .decompress
          .decompress_vec( &input[ consumed.. ], &mut out, FlushDecompress::Sync )
          .map_err( | _err | NetworkError::Unknown )?;
        consumed += ( self.decompress.total_in() - before_in ) as usize;
        let produced = self.decompress.total_out() - before_out;
        if matches!( status, Status::StreamEnd )
        {
          break;
        }
        if consumed >= input.len() && produced == 0
        {
          break;
        }
      }

      if self.reset_each_message
      {
        self.decompress.reset( false );
      }
      Ok( out )
    }
  }

  /// Byte counters for both directions, raw and on-the-wire.
  #[ derive( Debug, Clone, Copy, Default, PartialEq, Eq ) ]
  pub struct WsCompressionStats
  {
    /// Payload bytes handed to `send_*` before compression.
    pub sent_bytes_raw : u64,
    /// Payload bytes actually framed and sent.
    pub sent_bytes_compressed : u64,
    /// Payload bytes delivered to the application after decompression.
    pub received_bytes_raw : u64,
    /// Payload bytes received off the wire.
    pub received_bytes_compressed : u64,
  }

  impl WsCompressionStats
  {
    /// Fraction of outbound bytes saved by compression, in `[0, 1]`.
    #[ must_use ]
    pub fn sent_savings( &self ) -> f64
    {
      if self.sent_bytes_raw == 0
      {
        0.0
      }
      else
      {
        1.0 - self.sent_bytes_compressed as f64 / self.sent_bytes_raw as f64
      }
    }

    /// Formatted one-line summary.
    #[ must_use ]
    pub fn summary( &self ) -> String
    {
      format!
      (
        "sent {} -> {} bytes ({:.1}% saved), received {} <- {} bytes",
        self.sent_bytes_raw,
        self.sent_bytes_compressed,
        self.sent_savings() * 100.0,
        self.received_bytes_raw,
        self.received_bytes_compressed,
      )
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
crate::mod_interface!
{
  exposed use WsCompressionConfig;
  exposed use MessageDeflater;
  exposed use MessageInflater;
  exposed use WsCompressionStats;
}
