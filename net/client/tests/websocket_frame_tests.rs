//! Tests for RFC 6455 frame encoding and decoding.

#![ cfg( feature = "websocket" ) ]

use net_client::{ encode_frame, WsFrame, WsFrameDecoder, WsOpcode, MAX_CONTROL_PAYLOAD };

fn decode_all( bytes : &[ u8 ] ) -> Vec< WsFrame >
{
  let mut decoder = WsFrameDecoder::new();
  decoder.feed( bytes );
  let mut frames = Vec::new();
  while let Some( frame ) = decoder.next_frame().unwrap()
  {
    frames.push( frame );
  }
  frames
}

#[ test ]
fn masked_text_frame_round_trips()
{
  let frame = WsFrame::new( WsOpcode::Text, b"hello websocket".to_vec() );
  let encoded = encode_frame( &frame, true );
  // Mask bit set on the second byte.
  assert_eq!( encoded[ 1 ] & 0x80, 0x80 );

  let decoded = decode_all( &encoded );
  assert_eq!( decoded.len(), 1 );
  assert_eq!( decoded[ 0 ], frame );
}

#[ test ]
fn unmasked_frame_round_trips()
{
  let frame = WsFrame::new( WsOpcode::Binary, vec![ 0, 1, 2, 254, 255 ] );
  let encoded = encode_frame( &frame, false );
  assert_eq!( encoded[ 1 ] & 0x80, 0x00 );
  assert_eq!( decode_all( &encoded ), vec![ frame ] );
}

#[ test ]
fn extended_16_bit_length_round_trips()
{
  let payload = vec![ 7u8; 300 ];
  let frame = WsFrame::new( WsOpcode::Binary, payload );
  let encoded = encode_frame( &frame, true );
  assert_eq!( encoded[ 1 ] & 0x7F, 126 );
  assert_eq!( decode_all( &encoded ), vec![ frame ] );
}

#[ test ]
fn extended_64_bit_length_round_trips()
{
  let payload = vec![ 9u8; 70_000 ];
  let frame = WsFrame::new( WsOpcode::Binary, payload );
  let encoded = encode_frame( &frame, true );
  assert_eq!( encoded[ 1 ] & 0x7F, 127 );
  assert_eq!( decode_all( &encoded ), vec![ frame ] );
}

#[ test ]
fn decoder_handles_byte_by_byte_delivery()
{
  let frame = WsFrame::new( WsOpcode::Text, b"fragmented delivery".to_vec() );
  let encoded = encode_frame( &frame, true );

  let mut decoder = WsFrameDecoder::new();
  for byte in &encoded[ ..encoded.len() - 1 ]
  {
    decoder.feed( &[ *byte ] );
    assert!( decoder.next_frame().unwrap().is_none() );
  }
  decoder.feed( &[ encoded[ encoded.len() - 1 ] ] );
  assert_eq!( decoder.next_frame().unwrap(), Some( frame ) );
}

#[ test ]
fn decoder_yields_multiple_frames_from_one_feed()
{
  let first = WsFrame::new( WsOpcode::Text, b"one".to_vec() );
  let second = WsFrame::new( WsOpcode::Ping, b"two".to_vec() );
  let mut bytes = encode_frame( &first, false );
  bytes.extend( encode_frame( &second, false ) );

  let frames = decode_all( &bytes );
  assert_eq!( frames, vec![ first, second ] );
}

#[ test ]
fn rsv1_bit_survives_the_round_trip()
{
  let frame = WsFrame
  {
    fin : true,
    rsv1 : true,
    opcode : WsOpcode::Text,
    payload : b"compressed-ish".to_vec(),
  };
  let encoded = encode_frame( &frame, true );
  assert_eq!( encoded[ 0 ] & 0x40, 0x40 );
  assert_eq!( decode_all( &encoded ), vec![ frame ] );
}

#[ test ]
fn continuation_frames_carry_fin_false()
{
  let frame = WsFrame
  {
    fin : false,
    rsv1 : false,
    opcode : WsOpcode::Continuation,
    payload : b"middle".to_vec(),
  };
  let encoded = encode_frame( &frame, false );
  assert_eq!( encoded[ 0 ] & 0x80, 0 );
  assert_eq!( decode_all( &encoded ), vec![ frame ] );
}

#[ test ]
fn reserved_bits_rsv2_rsv3_are_a_protocol_error()
{
  let mut decoder = WsFrameDecoder::new();
  decoder.feed( &[ 0x80 | 0x20 | 0x01, 0x00 ] );
  assert!( decoder.next_frame().is_err() );

  let mut decoder = WsFrameDecoder::new();
  decoder.feed( &[ 0x80 | 0x10 | 0x01, 0x00 ] );
  assert!( decoder.next_frame().is_err() );
}

#[ test ]
fn unknown_opcodes_are_a_protocol_error()
{
  let mut decoder = WsFrameDecoder::new();
  decoder.feed( &[ 0x83, 0x00 ] );
  assert!( decoder.next_frame().is_err() );
}

#[ test ]
fn oversized_control_frames_are_a_protocol_error()
{
  let mut decoder = WsFrameDecoder::new();
  // A ping declaring a 16-bit length of 200.
  decoder.feed( &[ 0x89, 126, 0x00, 200 ] );
  assert!( decoder.next_frame().is_err() );
}

#[ test ]
fn control_payload_limit_is_125()
{
  assert_eq!( MAX_CONTROL_PAYLOAD, 125 );
}

#[ test ]
fn close_payload_round_trips_code_and_reason()
{
  let payload = WsFrame::close_payload( 1001, "going away" );
  let ( code, reason ) = WsFrame::parse_close_payload( &payload );
  assert_eq!( code, 1001 );
  assert_eq!( reason, "going away" );
}

#[ test ]
fn empty_close_payload_yields_no_status_code()
{
  let ( code, reason ) = WsFrame::parse_close_payload( &[] );
  assert_eq!( code, 1005 );
  assert!( reason.is_empty() );
}

#[ test ]
fn close_payload_is_truncated_to_the_control_limit()
{
  let long_reason = "x".repeat( 300 );
  let payload = WsFrame::close_payload( 1000, &long_reason );
  assert!( payload.len() <= MAX_CONTROL_PAYLOAD );
}
