//! Cancel token fanning out aborts to many replies.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::sync::atomic::{ AtomicBool, Ordering };
  use std::sync::Arc;

  use parking_lot::Mutex;

  use crate::reply::Reply;

  #[ derive( Debug, Default ) ]
  struct TokenInner
  {
    replies : Mutex< Vec< Reply > >,
    cancelled : AtomicBool,
  }

  /// Aggregates replies so one call aborts them all.
  ///
  /// Attached replies detach themselves on completion; attaching to an
  /// already-cancelled token cancels the reply immediately. The token is
  /// cloneable and clones share state.
  #[ derive( Debug, Clone, Default ) ]
  pub struct CancelToken
  {
    inner : Arc< TokenInner >,
  }

  impl CancelToken
  {
    /// Create a live token.
    #[ inline ]
    #[ must_use ]
    pub fn new() -> Self
    {
      Self::default()
    }

    /// Attach a reply. The reply is cancelled right away when the token has
    /// already fired.
    pub fn attach( &self, reply : &Reply )
    {
      if self.is_cancelled()
      {
        reply.cancel();
        return;
      }
      self.inner.replies.lock().push( reply.clone() );

      let inner = Arc::downgrade( &self.inner );
      let reply_id = reply.id();
      reply.on_finished( move ||
      {
        if let Some( inner ) = inner.upgrade()
        {
          inner.replies.lock().retain( | attached | attached.id() != reply_id );
        }
      } );
    }

    /// Cancel every live attached reply, then mark the token cancelled.
    pub fn cancel( &self )
    {
      if self.inner.cancelled.swap( true, Ordering::SeqCst )
      {
        return;
      }
      let replies : Vec< Reply > = core::mem::take( &mut *self.inner.replies.lock() );
      for reply in replies
      {
        reply.cancel();
      }
    }

    /// Arm an auto-timeout that fires `cancel` after `delay`.
    pub fn cancel_after( &self, delay : Duration )
    {
      let token = self.clone();
      tokio::spawn( async move
      {
        tokio::time::sleep( delay ).await;
        token.cancel();
      } );
    }

    /// True once `cancel` ran.
    #[ inline ]
    #[ must_use ]
    pub fn is_cancelled( &self ) -> bool
    {
      self.inner.cancelled.load( Ordering::SeqCst )
    }

    /// Number of currently attached replies.
    #[ must_use ]
    pub fn attached_count( &self ) -> usize
    {
      self.inner.replies.lock().len()
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use CancelToken;
}
