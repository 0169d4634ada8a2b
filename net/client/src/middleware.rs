//! Middleware hooks on the reply lifecycle.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use crate::reply::Reply;
  use crate::request::Request;

  /// Cross-cutting hook invoked around every request of a manager.
  ///
  /// `on_request_pre_send` runs before the transfer is configured and may
  /// mutate the request copy; `on_response_received` runs after completion,
  /// before `finished` is emitted. Hooks run in registration order and must
  /// not block; no lock of the runtime is held while they execute.
  pub trait Middleware : Send + Sync
  {
    /// Inspect or mutate the outgoing request.
    #[ inline ]
    fn on_request_pre_send( &self, request : &mut Request )
    {
      let _ = request;
    }

    /// Inspect the completed reply.
    #[ inline ]
    fn on_response_received( &self, reply : &Reply )
    {
      let _ = reply;
    }

    /// Middleware name used in diagnostics.
    #[ inline ]
    fn name( &self ) -> &str
    {
      "middleware"
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use Middleware;
}
