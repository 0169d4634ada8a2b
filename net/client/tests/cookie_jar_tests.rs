//! Tests for the Netscape cookie jar.

use net_client::{ CookieFileMode, CookieJar, CookieStore };

#[ test ]
fn mode_flags_decompose_into_read_and_write_bits()
{
  assert!( !CookieFileMode::NotOpen.can_read() );
  assert!( !CookieFileMode::NotOpen.can_write() );
  assert!( CookieFileMode::ReadOnly.can_read() );
  assert!( !CookieFileMode::ReadOnly.can_write() );
  assert!( !CookieFileMode::WriteOnly.can_read() );
  assert!( CookieFileMode::WriteOnly.can_write() );
  assert!( CookieFileMode::ReadWrite.can_read() );
  assert!( CookieFileMode::ReadWrite.can_write() );
}

#[ test ]
fn jar_parses_the_netscape_format()
{
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "cookies.txt" );
  std::fs::write
  (
    &path,
    "# Netscape HTTP Cookie File\n\
     .example.com\tTRUE\t/\tFALSE\t0\tsession\tabc123\n\
     #HttpOnly_.example.com\tTRUE\t/\tTRUE\t4102444800\tsecure_token\txyz\n\
     malformed line without tabs\n",
  )
  .unwrap();

  let jar = CookieJar::load( &path ).unwrap();
  assert_eq!( jar.len(), 2 );

  let header = jar.header_for_url( "http://www.example.com/index.html" ).unwrap();
  assert!( header.contains( "session=abc123" ) );
  // The secure cookie is withheld from plain http.
  assert!( !header.contains( "secure_token" ) );

  let secure_header = jar.header_for_url( "https://www.example.com/" ).unwrap();
  assert!( secure_header.contains( "secure_token=xyz" ) );
}

#[ test ]
fn jar_save_round_trips()
{
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "cookies.txt" );

  let mut jar = CookieJar::new();
  jar.store_from_set_cookie( "https://shop.example.com/cart", "cart_id=42; Path=/; Secure; HttpOnly" );
  jar.store_from_set_cookie( "https://shop.example.com/", "lang=en; Domain=example.com; Max-Age=3600" );
  jar.save( &path ).unwrap();

  let reloaded = CookieJar::load( &path ).unwrap();
  assert_eq!( reloaded.len(), 2 );
  let header = reloaded.header_for_url( "https://shop.example.com/cart" ).unwrap();
  assert!( header.contains( "cart_id=42" ) );
  assert!( header.contains( "lang=en" ) );
}

#[ test ]
fn domain_attribute_extends_to_subdomains()
{
  let mut jar = CookieJar::new();
  jar.store_from_set_cookie( "https://a.example.com/", "shared=1; Domain=example.com" );
  jar.store_from_set_cookie( "https://a.example.com/", "local=1" );

  let sibling = jar.header_for_url( "https://b.example.com/" ).unwrap();
  assert!( sibling.contains( "shared=1" ) );
  assert!( !sibling.contains( "local=1" ) );

  let origin = jar.header_for_url( "https://a.example.com/" ).unwrap();
  assert!( origin.contains( "shared=1" ) );
  assert!( origin.contains( "local=1" ) );
}

#[ test ]
fn expired_cookies_are_not_sent()
{
  let mut jar = CookieJar::new();
  jar.store_from_set_cookie( "https://x.test/", "gone=1; Max-Age=-10" );
  jar.store_from_set_cookie( "https://x.test/", "kept=1; Max-Age=3600" );

  let header = jar.header_for_url( "https://x.test/" ).unwrap();
  assert!( !header.contains( "gone=1" ) );
  assert!( header.contains( "kept=1" ) );
}

#[ test ]
fn path_prefix_limits_cookie_scope()
{
  let mut jar = CookieJar::new();
  jar.store_from_set_cookie( "https://x.test/app", "scoped=1; Path=/app" );

  assert!( jar.header_for_url( "https://x.test/app/page" ).is_some() );
  assert!( jar.header_for_url( "https://x.test/other" ).is_none() );
}

#[ test ]
fn replacing_a_cookie_keeps_one_entry()
{
  let mut jar = CookieJar::new();
  jar.store_from_set_cookie( "https://x.test/", "token=old" );
  jar.store_from_set_cookie( "https://x.test/", "token=new" );
  assert_eq!( jar.len(), 1 );
  assert!( jar.header_for_url( "https://x.test/" ).unwrap().contains( "token=new" ) );
}

#[ test ]
fn store_honors_the_access_mode()
{
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join( "cookies.txt" );
  std::fs::write
  (
    &path,
    "x.test\tFALSE\t/\tFALSE\t0\tpreset\t1\n",
  )
  .unwrap();

  let read_only = CookieStore::open( &path, CookieFileMode::ReadOnly ).unwrap();
  assert!( read_only.header_for_url( "https://x.test/" ).is_some() );
  let mut read_only = read_only;
  read_only.capture_set_cookie( "https://x.test/", "ignored=1" );
  assert!( !read_only.header_for_url( "https://x.test/" ).unwrap().contains( "ignored" ) );

  let mut write_only = CookieStore::open( &path, CookieFileMode::WriteOnly ).unwrap();
  assert!( write_only.header_for_url( "https://x.test/" ).is_none() );
  write_only.capture_set_cookie( "https://x.test/", "written=1" );

  let reloaded = CookieJar::load( &path ).unwrap();
  assert!( reloaded.header_for_url( "https://x.test/" ).unwrap().contains( "written=1" ) );
}
