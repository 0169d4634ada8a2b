//! Netscape-format cookie jar.
//!
//! The jar reads and writes the classic `cookies.txt` layout: one cookie per
//! line, seven tab-separated fields (domain, include-subdomains, path,
//! secure, expiry epoch, name, value), `#` starting a comment and the
//! `#HttpOnly_` domain prefix marking HTTP-only cookies.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::path::Path;

  use crate::error::{ NetworkError, NetworkResult };

  /// Access mode of the cookie file configured on the access manager.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, Default ) ]
  pub enum CookieFileMode
  {
    /// Cookies are neither read nor written.
    #[ default ]
    NotOpen,
    /// Stored cookies are sent with requests; responses do not update the file.
    ReadOnly,
    /// Responses update the file; stored cookies are not sent.
    WriteOnly,
    /// Cookies are sent and the file is updated.
    ReadWrite,
  }

  impl CookieFileMode
  {
    /// True when stored cookies should be attached to requests.
    #[ inline ]
    #[ must_use ]
    pub fn can_read( self ) -> bool
    {
      matches!( self, Self::ReadOnly | Self::ReadWrite )
    }

    /// True when response cookies should be persisted.
    #[ inline ]
    #[ must_use ]
    pub fn can_write( self ) -> bool
    {
      matches!( self, Self::WriteOnly | Self::ReadWrite )
    }
  }

  /// A single stored cookie.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  pub struct Cookie
  {
    /// Cookie domain, with a leading dot when subdomains are included.
    pub domain : String,
    /// Whether subdomains of `domain` match.
    pub include_subdomains : bool,
    /// Path prefix the cookie applies to.
    pub path : String,
    /// Whether the cookie is restricted to TLS connections.
    pub secure : bool,
    /// Expiry as a Unix timestamp; zero marks a session cookie.
    pub expires : i64,
    /// Cookie name.
    pub name : String,
    /// Cookie value.
    pub value : String,
    /// Whether the cookie carries the `#HttpOnly_` marker.
    pub http_only : bool,
  }

  impl Cookie
  {
    fn matches( &self, host : &str, path : &str, secure : bool, now : i64 ) -> bool
    {
      if self.expires != 0 && self.expires < now
      {
        return false;
      }
      if self.secure && !secure
      {
        return false;
      }
      let domain = self.domain.trim_start_matches( '.' );
      let host_ok = if self.include_subdomains
      {
        host == domain || host.ends_with( &format!( ".{domain}" ) )
      }
      else
      {
        host == domain
      };
      host_ok && path.starts_with( &self.path )
    }
  }

  /// In-memory cookie jar with Netscape-format persistence.
  #[ derive( Debug, Clone, Default ) ]
  pub struct CookieJar
  {
    cookies : Vec< Cookie >,
  }

  impl CookieJar
  {
    /// Create an empty jar.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Number of stored cookies.
    #[ inline ]
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.cookies.len()
    }

    /// True when the jar holds no cookies.
    #[ inline ]
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.cookies.is_empty()
    }

    /// Load a jar from a `cookies.txt` file. A missing file yields an empty jar.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the file exists but cannot be read.
    pub fn load( path : &Path ) -> NetworkResult< Self >
    {
      if !path.exists()
      {
        return Ok( Self::new() );
      }
      let content = std::fs::read_to_string( path ).map_err( | _err | NetworkError::Unknown )?;
      let mut jar = Self::new();
      for line in content.lines()
      {
        if let Some( cookie ) = Self::parse_line( line )
        {
          jar.cookies.push( cookie );
        }
      }
      Ok( jar )
    }

    fn parse_line( line : &str ) -> Option< Cookie >
    {
      let ( line, http_only ) = match line.strip_prefix( "#HttpOnly_" )
      {
        Some( rest ) => ( rest, true ),
        None => ( line, false ),
      };
      if line.starts_with( '#' ) || line.trim().is_empty()
      {
        return None;
      }
      let fields : Vec< &str > = line.split( '\t' ).collect();
      if fields.len() != 7
      {
        return None;
      }
      Some( Cookie
      {
        domain : fields[ 0 ].to_owned(),
        include_subdomains : fields[ 1 ].eq_ignore_ascii_case( "true" ),
        path : fields[ 2 ].to_owned(),
        secure : fields[ 3 ].eq_ignore_ascii_case( "true" ),
        expires : fields[ 4 ].parse().unwrap_or( 0 ),
        name : fields[ 5 ].to_owned(),
        value : fields[ 6 ].to_owned(),
        http_only,
      } )
    }

    /// Persist the jar in Netscape format.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when the file cannot be written.
    pub fn save( &self, path : &Path ) -> NetworkResult< () >
    {
      let mut out = String::from( "# Netscape HTTP Cookie File\n" );
      for cookie in &self.cookies
      {
        if cookie.http_only
        {
          out.push_str( "#HttpOnly_" );
        }
        out.push_str( &format!
        (
          "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
          cookie.domain,
          if cookie.include_subdomains { "TRUE" } else { "FALSE" },
          cookie.path,
          if cookie.secure { "TRUE" } else { "FALSE" },
          cookie.expires,
          cookie.name,
          cookie.value,
        ) );
      }
      std::fs::write( path, out ).map_err( | _err | NetworkError::Unknown )
    }

    /// Render the `Cookie` header value for a request URL, or `None` when no
    /// stored cookie matches.
    #[ must_use ]
    pub fn header_for_url( &self, url : &str ) -> Option< String >
    {
      let parsed = url::Url::parse( url ).ok()?;
      let host = parsed.host_str()?;
      let path = parsed.path();
      let secure = parsed.scheme() == "https" || parsed.scheme() == "wss";
      let now = chrono::Utc::now().timestamp();

      let pairs : Vec< String > = self
        .cookies
        .iter()
        .filter( | cookie | cookie.matches( host, path, secure, now ) )
        .map( | cookie | format!( "{}={}", cookie.name, cookie.value ) )
        .collect();
      if pairs.is_empty()
      {
        None
      }
      else
      {
        Some( pairs.join( "; " ) )
      }
    }

    /// Store a cookie from a `Set-Cookie` response header. Unparseable
    /// headers are ignored; a matching existing cookie is replaced.
    pub fn store_from_set_cookie( &mut self, url : &str, header : &str )
    {
      let Ok( parsed ) = url::Url::parse( url ) else { return };
      let Some( host ) = parsed.host_str() else { return };

      let mut parts = header.split( ';' ).map( str::trim );
      let Some( pair ) = parts.next() else { return };
      let Some( ( name, value ) ) = pair.split_once( '=' ) else { return };
      if name.is_empty()
      {
        return;
      }

      let mut cookie = Cookie
      {
        domain : host.to_owned(),
        include_subdomains : false,
        path : "/".to_owned(),
        secure : false,
        expires : 0,
        name : name.trim().to_owned(),
        value : value.trim().to_owned(),
        http_only : false,
      };
      for attribute in parts
      {
        let ( key, val ) = attribute.split_once( '=' ).unwrap_or( ( attribute, "" ) );
        match key.to_ascii_lowercase().as_str()
        {
          "domain" =>
          {
            cookie.domain = val.trim_start_matches( '.' ).to_owned();
            cookie.include_subdomains = true;
          },
          "path" if !val.is_empty() => cookie.path = val.to_owned(),
          "secure" => cookie.secure = true,
          "httponly" => cookie.http_only = true,
          "max-age" =>
          {
            if let Ok( seconds ) = val.parse::< i64 >()
            {
              cookie.expires = chrono::Utc::now().timestamp() + seconds;
            }
          },
          "expires" =>
          {
            if let Ok( at ) = chrono::DateTime::parse_from_rfc2822( val )
            {
              cookie.expires = at.timestamp();
            }
          },
          _ => {},
        }
      }

      self.cookies.retain( | existing |
      {
        !( existing.name == cookie.name && existing.domain == cookie.domain && existing.path == cookie.path )
      } );
      self.cookies.push( cookie );
    }
  }

  /// A cookie jar bound to its backing file and access mode, shared by every
  /// reply of a manager.
  #[ derive( Debug, Clone ) ]
  pub struct CookieStore
  {
    path : std::path::PathBuf,
    mode : CookieFileMode,
    jar : CookieJar,
  }

  impl CookieStore
  {
    /// Open the store, loading the file when the mode allows reading.
    ///
    /// # Errors
    /// Returns [`NetworkError::Unknown`] when an existing file cannot be read.
    pub fn open< P : Into< std::path::PathBuf > >( path : P, mode : CookieFileMode ) -> NetworkResult< Self >
    {
      let path = path.into();
      let jar = if mode.can_read()
      {
        CookieJar::load( &path )?
      }
      else
      {
        CookieJar::new()
      };
      Ok( Self { path, mode, jar } )
    }

    /// Path of the backing file.
    #[ inline ]
    #[ must_use ]
    pub fn path( &self ) -> &std::path::Path
    {
      &self.path
    }

    /// Configured access mode.
    #[ inline ]
    #[ must_use ]
    pub fn mode( &self ) -> CookieFileMode
    {
      self.mode
    }

    /// `Cookie` header value for a request, honoring the read bit.
    #[ must_use ]
    pub fn header_for_url( &self, url : &str ) -> Option< String >
    {
      if !self.mode.can_read()
      {
        return None;
      }
      self.jar.header_for_url( url )
    }

    /// Capture a `Set-Cookie` header and persist the jar, honoring the write
    /// bit. Persistence failures are ignored; the in-memory jar stays current.
    pub fn capture_set_cookie( &mut self, url : &str, header : &str )
    {
      if !self.mode.can_write()
      {
        return;
      }
      self.jar.store_from_set_cookie( url, header );
      let _ = self.jar.save( &self.path );
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use CookieFileMode;
  exposed use Cookie;
  exposed use CookieJar;
  exposed use CookieStore;
}
