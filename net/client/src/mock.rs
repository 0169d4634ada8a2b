//! Mock handler intercepting requests before the transport path.

#[ cfg( all( feature = "enabled", feature = "mock_handler" ) ) ]
mod private
{
  use core::time::Duration;
  use std::collections::HashMap;

  use parking_lot::Mutex;

  use crate::error::NetworkError;

  /// Outcome synthesized for a mocked URL.
  #[ derive( Debug, Clone ) ]
  pub enum MockOutcome
  {
    /// A synthesized HTTP response.
    Response
    {
      /// HTTP status code.
      status_code : u16,
      /// Response body bytes.
      body : Vec< u8 >,
      /// Response headers.
      headers : Vec< ( String, String ) >,
    },
    /// A synthesized failure.
    Error( NetworkError ),
  }

  #[ derive( Debug, Default ) ]
  struct MockState
  {
    mocks : HashMap< String, MockOutcome >,
    global_delay : Duration,
  }

  /// URL-keyed registry of synthesized outcomes.
  ///
  /// When a manager holds a mock handler, every submitted URL is looked up
  /// here first; a hit short-circuits cache, middleware and network, and the
  /// reply synthesizes the outcome after the global delay with the usual
  /// signal order.
  #[ derive( Debug, Default ) ]
  pub struct MockHandler
  {
    state : Mutex< MockState >,
  }

  impl MockHandler
  {
    /// Create an empty handler.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Register a 200 response with the given body.
    pub fn mock_response< S : Into< String > >( &self, url : S, body : &[ u8 ] )
    {
      self.mock_response_with_status( url, body, 200 );
    }

    /// Register a response with an explicit status code.
    pub fn mock_response_with_status< S : Into< String > >( &self, url : S, body : &[ u8 ], status_code : u16 )
    {
      self.state.lock().mocks.insert
      (
        url.into(),
        MockOutcome::Response
        {
          status_code,
          body : body.to_vec(),
          headers : Vec::new(),
        },
      );
    }

    /// Register a response including headers.
    pub fn mock_response_with_headers< S : Into< String > >
    (
      &self,
      url : S,
      body : &[ u8 ],
      status_code : u16,
      headers : Vec< ( String, String ) >,
    )
    {
      self.state.lock().mocks.insert
      (
        url.into(),
        MockOutcome::Response
        {
          status_code,
          body : body.to_vec(),
          headers,
        },
      );
    }

    /// Register a failure outcome.
    pub fn mock_error< S : Into< String > >( &self, url : S, error : NetworkError )
    {
      self.state.lock().mocks.insert( url.into(), MockOutcome::Error( error ) );
    }

    /// Delay applied before every synthesized outcome.
    pub fn set_global_delay( &self, delay : Duration )
    {
      self.state.lock().global_delay = delay;
    }

    /// Current global delay.
    #[ must_use ]
    pub fn global_delay( &self ) -> Duration
    {
      self.state.lock().global_delay
    }

    /// True when a mock is registered for the URL.
    #[ must_use ]
    pub fn has_mock( &self, url : &str ) -> bool
    {
      self.state.lock().mocks.contains_key( url )
    }

    /// Outcome registered for the URL, if any.
    #[ must_use ]
    pub fn mock_for( &self, url : &str ) -> Option< MockOutcome >
    {
      self.state.lock().mocks.get( url ).cloned()
    }

    /// Remove every registered mock.
    pub fn clear( &self )
    {
      self.state.lock().mocks.clear();
    }
  }
}

#[ cfg( all( feature = "enabled", feature = "mock_handler" ) ) ]
crate::mod_interface!
{
  exposed use MockOutcome;
  exposed use MockHandler;
}
