//! RFC 6455 frame encoding and incremental decoding.

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
mod private
{
  use crate::error::{ NetworkError, NetworkResult };

  /// Maximum payload of a control frame.
  pub const MAX_CONTROL_PAYLOAD : usize = 125;

  /// Close code sent when no code was present in the close frame.
  pub const CLOSE_CODE_NO_STATUS : u16 = 1005;

  /// Close code reported for abnormal closure (no close frame at all).
  pub const CLOSE_CODE_ABNORMAL : u16 = 1006;

  // Frames larger than this are treated as a protocol violation rather than
  // buffered indefinitely.
  const MAX_FRAME_PAYLOAD : u64 = 64 * 1024 * 1024;

  /// Frame opcode.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq ) ]
  pub enum WsOpcode
  {
    /// Continuation of a fragmented message.
    Continuation,
    /// Text data frame.
    Text,
    /// Binary data frame.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
  }

  impl WsOpcode
  {
    /// Parse the low nibble of the first frame byte.
    #[ must_use ]
    pub fn from_bits( bits : u8 ) -> Option< Self >
    {
      match bits
      {
        0x0 => Some( Self::Continuation ),
        0x1 => Some( Self::Text ),
        0x2 => Some( Self::Binary ),
        0x8 => Some( Self::Close ),
        0x9 => Some( Self::Ping ),
        0xA => Some( Self::Pong ),
        _ => None,
      }
    }

    /// Wire representation.
    #[ inline ]
    #[ must_use ]
    pub fn bits( self ) -> u8
    {
      match self
      {
        Self::Continuation => 0x0,
        Self::Text => 0x1,
        Self::Binary => 0x2,
        Self::Close => 0x8,
        Self::Ping => 0x9,
        Self::Pong => 0xA,
      }
    }

    /// True for close, ping and pong.
    #[ inline ]
    #[ must_use ]
    pub fn is_control( self ) -> bool
    {
      matches!( self, Self::Close | Self::Ping | Self::Pong )
    }
  }

  /// One decoded or to-be-encoded frame.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct WsFrame
  {
    /// Final frame of a message.
    pub fin : bool,
    /// RSV1 bit; marks a permessage-deflate compressed message.
    pub rsv1 : bool,
    /// Opcode.
    pub opcode : WsOpcode,
    /// Unmasked payload.
    pub payload : Vec< u8 >,
  }

  impl WsFrame
  {
    /// A final data or control frame without the compression bit.
    #[ must_use ]
    pub fn new( opcode : WsOpcode, payload : Vec< u8 > ) -> Self
    {
      Self
      {
        fin : true,
        rsv1 : false,
        opcode,
        payload,
      }
    }

    /// Build the payload of a close frame: code followed by a UTF-8 reason.
    #[ must_use ]
    pub fn close_payload( code : u16, reason : &str ) -> Vec< u8 >
    {
      let mut payload = code.to_be_bytes().to_vec();
      payload.extend_from_slice( reason.as_bytes() );
      payload.truncate( MAX_CONTROL_PAYLOAD );
      payload
    }

    /// Parse a close-frame payload into `( code, reason )`. An empty payload
    /// yields [`CLOSE_CODE_NO_STATUS`].
    #[ must_use ]
    pub fn parse_close_payload( payload : &[ u8 ] ) -> ( u16, String )
    {
      if payload.len() < 2
      {
        return ( CLOSE_CODE_NO_STATUS, String::new() );
      }
      let code = u16::from_be_bytes( [ payload[ 0 ], payload[ 1 ] ] );
      let reason = String::from_utf8_lossy( &payload[ 2.. ] ).into_owned();
      ( code, reason )
    }
  }

  /// Encode a frame for the wire. Client frames are masked with a fresh
  /// random key.
  #[ must_use ]
  pub fn encode_frame( frame : &WsFrame, mask : bool ) -> Vec< u8 >
  {
    let mut out = Vec::with_capacity( frame.payload.len() + 14 );
    let mut first = frame.opcode.bits();
    if frame.fin
    {
      first |= 0x80;
    }
    if frame.rsv1
    {
      first |= 0x40;
    }
    out.push( first );

    let mask_bit = if mask { 0x80 } else { 0x00 };
    let len = frame.payload.len();
    if len <= 125
    {
      out.push( mask_bit | len as u8 );
    }
    else if len <= usize::from( u16::MAX )
    {
      out.push( mask_bit | 126 );
      out.extend_from_slice( &( len as u16 ).to_be_bytes() );
    }
    else
    {
      out.push( mask_bit | 127 );
      out.extend_from_slice( &( len as u64 ).to_be_bytes() );
    }

    if mask
    {
      let key : [ u8; 4 ] = rand::random();
      out.extend_from_slice( &key );
      out.extend( frame
        .payload
        .iter()
        .enumerate()
        .map( | ( index, byte ) | byte ^ key[ index % 4 ] ) );
    }
    else
    {
      out.extend_from_slice( &frame.payload );
    }
    out
  }

  /// Incremental frame decoder fed from the socket.
  #[ derive( Debug, Default ) ]
  pub struct WsFrameDecoder
  {
    buffer : Vec< u8 >,
  }

  impl WsFrameDecoder
  {
    /// Create an empty decoder.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Append raw socket bytes.
    pub fn feed( &mut self, data : &[ u8 ] )
    {
      self.buffer.extend_from_slice( data );
    }

    /// Bytes buffered but not yet consumed.
    #[ inline ]
    #[ must_use ]
    pub fn buffered( &self ) -> usize
    {
      self.buffer.len()
    }

    /// Try to decode the next complete frame.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] for protocol violations: reserved
    /// bits RSV2/RSV3, unknown opcodes, oversized control frames or frames
    /// beyond the payload bound.
    pub fn next_frame( &mut self ) -> NetworkResult< Option< WsFrame > >
    {
      if self.buffer.len() < 2
      {
        return Ok( None );
      }

      let first = self.buffer[ 0 ];
      let second = self.buffer[ 1 ];
      if first & 0x30 != 0
      {
        return Err( NetworkError::Unknown );
      }
      let Some( opcode ) = WsOpcode::from_bits( first & 0x0F ) else
      {
        return Err( NetworkError::Unknown );
      };

      let masked = second & 0x80 != 0;
      let mut offset : usize = 2;
      let payload_len : u64 = match second & 0x7F
      {
        126 =>
        {
          if self.buffer.len() < offset + 2
          {
            return Ok( None );
          }
          let len = u64::from( u16::from_be_bytes( [ self.buffer[ 2 ], self.buffer[ 3 ] ] ) );
          offset += 2;
          len
        },
        127 =>
        {
          if self.buffer.len() < offset + 8
          {
            return Ok( None );
          }
          let mut bytes = [ 0u8; 8 ];
          bytes.copy_from_slice( &self.buffer[ 2..10 ] );
          offset += 8;
          u64::from_be_bytes( bytes )
        },
        len => u64::from( len ),
      };

      if payload_len > MAX_FRAME_PAYLOAD
      {
        return Err( NetworkError::Unknown );
      }
      if opcode.is_control() && payload_len > MAX_CONTROL_PAYLOAD as u64
      {
        return Err( NetworkError::Unknown );
      }

      let mask_key = if masked
      {
        if self.buffer.len() < offset + 4
        {
          return Ok( None );
        }
        let key = [
          self.buffer[ offset ],
          self.buffer[ offset + 1 ],
          self.buffer[ offset + 2 ],
          self.buffer[ offset + 3 ],
        ];
        offset += 4;
        Some( key )
      }
      else
      {
        None
      };

      let payload_len = payload_len as usize;
      if self.buffer.len() < offset + payload_len
      {
        return Ok( None );
      }

      let mut payload : Vec< u8 > = self.buffer[ offset..offset + payload_len ].to_vec();
      if let Some( key ) = mask_key
      {
        for ( index, byte ) in payload.iter_mut().enumerate()
        {
          *byte ^= key[ index % 4 ];
        }
      }
      self.buffer.drain( ..offset + payload_len );

      Ok( Some( WsFrame
      {
        fin : first & 0x80 != 0,
        rsv1 : first & 0x40 != 0,
        opcode,
        payload,
      } ) )
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "websocket" ) ) ]
crate::mod_interface!
{
  exposed use WsOpcode;
  exposed use WsFrame;
  exposed use WsFrameDecoder;
  exposed use encode_frame;
  exposed use MAX_CONTROL_PAYLOAD;
  exposed use CLOSE_CODE_NO_STATUS;
  exposed use CLOSE_CODE_ABNORMAL;
}
