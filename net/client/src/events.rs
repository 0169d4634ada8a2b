//! Typed callback channels used by replies, sessions and the scheduler.
//!
//! A [`Signal`] is a mutex-guarded list of callbacks. Emission snapshots the
//! list first so no lock is held while user code runs.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::sync::Arc;

  use parking_lot::Mutex;

  type Handler< T > = Arc< dyn Fn( &T ) + Send + Sync >;

  /// A typed event channel with multiple subscribers.
  ///
  /// Callbacks are invoked in connection order, on whichever task emits the
  /// signal. There is no unsubscribe; channels live exactly as long as their
  /// owner.
  pub struct Signal< T >
  {
    handlers : Mutex< Vec< Handler< T > > >,
  }

  impl< T > Default for Signal< T >
  {
    #[ inline ]
    fn default() -> Self
    {
      Self { handlers : Mutex::new( Vec::new() ) }
    }
  }

  impl< T > core::fmt::Debug for Signal< T >
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "Signal" )
        .field( "handlers", &self.handlers.lock().len() )
        .finish()
    }
  }

  impl< T > Signal< T >
  {
    /// Create an empty channel.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Subscribe a callback.
    pub fn connect< F >( &self, handler : F )
    where
      F : Fn( &T ) + Send + Sync + 'static,
    {
      self.handlers.lock().push( Arc::new( handler ) );
    }

    /// Invoke every subscriber with `payload`.
    ///
    /// The handler list is cloned before invocation so subscribers may
    /// connect further handlers or emit signals themselves.
    pub fn emit( &self, payload : &T )
    {
      let snapshot : Vec< Handler< T > > = self.handlers.lock().clone();
      for handler in snapshot
      {
        handler( payload );
      }
    }

    /// Number of connected callbacks.
    #[ inline ]
    #[ must_use ]
    pub fn len( &self ) -> usize
    {
      self.handlers.lock().len()
    }

    /// True when nothing is connected.
    #[ inline ]
    #[ must_use ]
    pub fn is_empty( &self ) -> bool
    {
      self.handlers.lock().is_empty()
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use Signal;
}
