//! Abstract HTTP cache interface, entry metadata and freshness parsing.
//!
//! Freshness rules, shared by every implementation:
//! - `Cache-Control` tokens `no-store` / `no-cache` make a response
//!   uncacheable; `max-age=N` sets the expiry to now + N seconds.
//! - Otherwise an `Expires` header (RFC 2822 date) sets the expiry.
//! - Otherwise the entry never expires.
//! - `Pragma: no-cache` (HTTP/1.0) makes a response uncacheable.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::collections::BTreeMap;

  use chrono::{ DateTime, Utc };

  use crate::error::{ NetworkError, NetworkResult };

  fn header_value< 'a >( headers : &'a BTreeMap< String, String >, name : &str ) -> Option< &'a str >
  {
    headers
      .iter()
      .find( | ( key, _ ) | key.eq_ignore_ascii_case( name ) )
      .map( | ( _, value ) | value.as_str() )
  }

  /// Decide whether a response with these headers may be stored.
  #[ must_use ]
  pub fn is_cacheable( headers : &BTreeMap< String, String > ) -> bool
  {
    if let Some( pragma ) = header_value( headers, "Pragma" )
    {
      if pragma.to_ascii_lowercase().contains( "no-cache" )
      {
        return false;
      }
    }
    if let Some( cache_control ) = header_value( headers, "Cache-Control" )
    {
      for token in cache_control.split( ',' )
      {
        let token = token.trim().to_ascii_lowercase();
        if token == "no-store" || token == "no-cache"
        {
          return false;
        }
      }
    }
    true
  }

  /// Derive the expiration instant from response headers, relative to `now`.
  ///
  /// `None` means the entry never expires.
  #[ must_use ]
  pub fn parse_expiration( headers : &BTreeMap< String, String >, now : DateTime< Utc > ) -> Option< DateTime< Utc > >
  {
    if let Some( cache_control ) = header_value( headers, "Cache-Control" )
    {
      for token in cache_control.split( ',' )
      {
        let token = token.trim().to_ascii_lowercase();
        if let Some( seconds ) = token.strip_prefix( "max-age=" )
        {
          if let Ok( seconds ) = seconds.trim().parse::< i64 >()
          {
            return Some( now + chrono::Duration::seconds( seconds ) );
          }
        }
      }
    }
    if let Some( expires ) = header_value( headers, "Expires" )
    {
      if let Ok( at ) = DateTime::parse_from_rfc2822( expires )
      {
        return Some( at.with_timezone( &Utc ) );
      }
    }
    None
  }

  /// Metadata stored beside every cache entry.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct CacheMetadata
  {
    /// Request URL the entry was stored under.
    pub url : String,
    /// Size of the stored body in bytes.
    pub size : u64,
    /// When the entry was stored.
    pub creation_date : DateTime< Utc >,
    /// When the entry stops being fresh; `None` means never.
    pub expiration_date : Option< DateTime< Utc > >,
    /// `Last-Modified` response header, when present.
    pub last_modified : Option< DateTime< Utc > >,
    /// Response headers relevant to caching.
    pub headers : BTreeMap< String, String >,
  }

  impl CacheMetadata
  {
    /// Build metadata from response headers, deriving expiry and
    /// last-modified through the freshness rules.
    #[ must_use ]
    pub fn from_response_headers
    (
      url : &str,
      size : u64,
      headers : BTreeMap< String, String >,
    ) -> Self
    {
      let now = Utc::now();
      let expiration_date = parse_expiration( &headers, now );
      let last_modified = header_value( &headers, "Last-Modified" )
        .and_then( | value | DateTime::parse_from_rfc2822( value ).ok() )
        .map( | at | at.with_timezone( &Utc ) );
      Self
      {
        url : url.to_owned(),
        size,
        creation_date : now,
        expiration_date,
        last_modified,
        headers,
      }
    }

    /// True while the entry is fresh. Entries without an expiry are always
    /// fresh.
    #[ inline ]
    #[ must_use ]
    pub fn is_valid( &self ) -> bool
    {
      self.expiration_date.is_none_or( | at | at > Utc::now() )
    }

    /// Serialize to the on-disk JSON layout.
    #[ must_use ]
    pub fn to_json( &self ) -> String
    {
      let headers : serde_json::Map< String, serde_json::Value > = self
        .headers
        .iter()
        .map( | ( name, value ) | ( name.clone(), serde_json::Value::String( value.clone() ) ) )
        .collect();
      serde_json::json!
      ( {
        "url" : self.url,
        "size" : self.size,
        "creationDate" : self.creation_date.to_rfc3339(),
        "expirationDate" : self.expiration_date.map( | at | at.to_rfc3339() ),
        "lastModified" : self.last_modified.map( | at | at.to_rfc3339() ),
        "headers" : headers,
      } )
      .to_string()
    }

    /// Parse the on-disk JSON layout.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] for malformed documents.
    pub fn from_json( text : &str ) -> NetworkResult< Self >
    {
      let value : serde_json::Value = serde_json::from_str( text ).map_err( | _err | NetworkError::Unknown )?;
      let object = value.as_object().ok_or( NetworkError::Unknown )?;

      let url = object.get( "url" ).and_then( serde_json::Value::as_str ).ok_or( NetworkError::Unknown )?;
      let size = object.get( "size" ).and_then( serde_json::Value::as_u64 ).ok_or( NetworkError::Unknown )?;
      let parse_date = | key : &str | -> Option< DateTime< Utc > >
      {
        object
          .get( key )
          .and_then( serde_json::Value::as_str )
          .and_then( | text | DateTime::parse_from_rfc3339( text ).ok() )
          .map( | at | at.with_timezone( &Utc ) )
      };
      let creation_date = parse_date( "creationDate" ).ok_or( NetworkError::Unknown )?;

      let mut headers = BTreeMap::new();
      if let Some( map ) = object.get( "headers" ).and_then( serde_json::Value::as_object )
      {
        for ( name, value ) in map
        {
          if let Some( value ) = value.as_str()
          {
            headers.insert( name.clone(), value.to_owned() );
          }
        }
      }

      Ok( Self
      {
        url : url.to_owned(),
        size,
        creation_date,
        expiration_date : parse_date( "expirationDate" ),
        last_modified : parse_date( "lastModified" ),
        headers,
      } )
    }
  }

  /// Storage backend consulted and filled by replies.
  ///
  /// Implementations are mutex-guarded at the API boundary; every method is
  /// callable from any thread.
  pub trait NetworkCache : Send + Sync
  {
    /// Stored body bytes for a URL.
    fn data( &self, url : &str ) -> Option< Vec< u8 > >;

    /// Stored metadata for a URL.
    fn metadata( &self, url : &str ) -> Option< CacheMetadata >;

    /// Store an entry. Returns false when the entry cannot be stored
    /// (for example when it alone exceeds the size bound).
    fn insert( &self, url : &str, data : &[ u8 ], metadata : CacheMetadata ) -> bool;

    /// Remove one entry. Returns true when an entry existed.
    fn remove( &self, url : &str ) -> bool;

    /// Drop every entry.
    fn clear( &self );

    /// Total size of all stored entries in bytes.
    fn cache_size( &self ) -> u64;

    /// Configured size bound in bytes.
    fn max_cache_size( &self ) -> u64;

    /// Change the size bound. Implementations may evict immediately.
    fn set_max_cache_size( &self, max : u64 );
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use CacheMetadata;
  exposed use NetworkCache;
  exposed use is_cacheable;
  exposed use parse_expiration;
}
