//! Multi-transfer driver.
//!
//! One driver runs per access manager. It drains a command channel (the
//! cross-thread marshalling point), keeps the registry of active transfers,
//! and dispatches engine events to the owning replies in FIFO order, which
//! yields the per-reply ordering guarantees: body and progress callbacks
//! strictly precede completion. A shutdown flag suppresses dispatch during
//! teardown.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::collections::HashMap;
  use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };
  use std::sync::Arc;

  use tokio::sync::mpsc;

  use crate::engine::{ TransferEvent, TransportEngine };
  use crate::handle::{ TransferControl, TransferId, TransferSpec };
  use crate::reply::Reply;

  enum DriverCommand
  {
    Submit
    {
      reply : Reply,
      spec : TransferSpec,
      control : TransferControl,
    },
    Shutdown,
  }

  /// Cloneable handle submitting work to a driver from any thread.
  #[ derive( Clone ) ]
  pub struct MultiDriverHandle
  {
    commands : mpsc::UnboundedSender< DriverCommand >,
    running : Arc< AtomicUsize >,
    shutdown : Arc< AtomicBool >,
  }

  impl core::fmt::Debug for MultiDriverHandle
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      f.debug_struct( "MultiDriverHandle" )
        .field( "running", &self.running_count() )
        .field( "shutdown", &self.is_shutdown() )
        .finish_non_exhaustive()
    }
  }

  impl MultiDriverHandle
  {
    /// Hand a configured attempt to the driver. Returns false when the driver
    /// is already shut down.
    pub fn submit( &self, reply : Reply, spec : TransferSpec, control : TransferControl ) -> bool
    {
      if self.is_shutdown()
      {
        return false;
      }
      self.commands.send( DriverCommand::Submit { reply, spec, control } ).is_ok()
    }

    /// Stop the driver. Active engine tasks notice through their cancel
    /// tokens or when their event channel closes.
    pub fn shutdown( &self )
    {
      self.shutdown.store( true, Ordering::SeqCst );
      let _ = self.commands.send( DriverCommand::Shutdown );
    }

    /// Number of transfers currently registered.
    #[ inline ]
    #[ must_use ]
    pub fn running_count( &self ) -> usize
    {
      self.running.load( Ordering::SeqCst )
    }

    /// True once `shutdown` was called.
    #[ inline ]
    #[ must_use ]
    pub fn is_shutdown( &self ) -> bool
    {
      self.shutdown.load( Ordering::SeqCst )
    }
  }

  /// Spawn a driver task over the given engine. Must run inside a tokio
  /// runtime.
  #[ must_use ]
  pub fn spawn_multi_driver( engine : Arc< TransportEngine > ) -> MultiDriverHandle
  {
    let ( command_tx, command_rx ) = mpsc::unbounded_channel();
    let running = Arc::new( AtomicUsize::new( 0 ) );
    let shutdown = Arc::new( AtomicBool::new( false ) );

    let handle = MultiDriverHandle
    {
      commands : command_tx,
      running : Arc::clone( &running ),
      shutdown : Arc::clone( &shutdown ),
    };

    tokio::spawn( driver_loop( engine, command_rx, running, shutdown ) );
    handle
  }

  async fn driver_loop
  (
    engine : Arc< TransportEngine >,
    mut commands : mpsc::UnboundedReceiver< DriverCommand >,
    running : Arc< AtomicUsize >,
    shutdown : Arc< AtomicBool >,
  )
  {
    let ( event_tx, mut events ) = mpsc::unbounded_channel::< TransferEvent >();
    let mut active : HashMap< TransferId, Reply > = HashMap::new();
    let mut next_id : TransferId = 1;

    loop
    {
      tokio::select!
      {
        command = commands.recv() => match command
        {
          Some( DriverCommand::Submit { reply, spec, control } ) =>
          {
            if shutdown.load( Ordering::SeqCst )
            {
              continue;
            }
            let id = next_id;
            next_id += 1;
            active.insert( id, reply );
            running.store( active.len(), Ordering::SeqCst );
            engine.spawn_transfer( id, spec, event_tx.clone(), control );
          },
          Some( DriverCommand::Shutdown ) | None => break,
        },
        event = events.recv() => match event
        {
          Some( event ) =>
          {
            if shutdown.load( Ordering::SeqCst )
            {
              continue;
            }
            dispatch_event( event, &mut active, &running );
          },
          None => break,
        },
      }
    }
  }

  fn dispatch_event
  (
    event : TransferEvent,
    active : &mut HashMap< TransferId, Reply >,
    running : &Arc< AtomicUsize >,
  )
  {
    match event
    {
      TransferEvent::Status { id, status_code, header_pairs, raw_headers } =>
      {
        if let Some( reply ) = active.get( &id )
        {
          reply.on_transfer_status( status_code, header_pairs, raw_headers );
        }
      },
      TransferEvent::Chunk { id, data } =>
      {
        if let Some( reply ) = active.get( &id )
        {
          reply.on_transfer_chunk( &data );
        }
      },
      TransferEvent::DownloadProgress { id, received, total } =>
      {
        if let Some( reply ) = active.get( &id )
        {
          reply.on_download_progress( received, total );
        }
      },
      TransferEvent::UploadProgress { id, sent, total } =>
      {
        if let Some( reply ) = active.get( &id )
        {
          reply.on_upload_progress( sent, total );
        }
      },
      TransferEvent::Done { id, error, status_code } =>
      {
        if let Some( reply ) = active.remove( &id )
        {
          running.store( active.len(), Ordering::SeqCst );
          reply.on_transfer_done( error, status_code );
        }
      },
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use MultiDriverHandle;
  own use spawn_multi_driver;
}
