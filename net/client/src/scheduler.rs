//! Priority-queue request scheduler.
//!
//! Six FIFO queues keyed by priority feed an admission loop gated on the
//! global concurrency limit, a per-host limit and an optional bandwidth
//! window. `Critical` requests bypass the queues and the gates entirely.
//! Admission re-runs after every enqueue, completion and defer, and once per
//! second when the bandwidth window resets.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use core::time::Duration;
  use std::collections::{ HashMap, VecDeque };
  use std::sync::Arc;
  use std::time::Instant;

  use parking_lot::Mutex;

  use crate::events::Signal;
  use crate::priority::RequestPriority;
  use crate::reply::{ Reply, ReplyState };

  const RESPONSE_TIME_EMA_ALPHA : f64 = 0.2;

  /// Scheduler limits.
  #[ derive( Debug, Clone, PartialEq, Eq ) ]
  #[ must_use ]
  pub struct SchedulerConfig
  {
    /// Global cap on simultaneously running requests.
    pub max_concurrent_requests : usize,
    /// Cap on simultaneously running requests per host.
    pub max_requests_per_host : usize,
    /// Bandwidth budget per second; zero means unlimited.
    pub max_bandwidth_bytes_per_sec : u64,
    /// Whether the bandwidth gate is consulted at all.
    pub enable_throttling : bool,
  }

  impl Default for SchedulerConfig
  {
    #[ inline ]
    fn default() -> Self
    {
      Self
      {
        max_concurrent_requests : 6,
        max_requests_per_host : 2,
        max_bandwidth_bytes_per_sec : 0,
        enable_throttling : true,
      }
    }
  }

  impl SchedulerConfig
  {
    /// Default limits.
    #[ inline ]
    pub fn new() -> Self
    {
      Self::default()
    }
  }

  /// Point-in-time scheduler counters.
  #[ derive( Debug, Clone, Copy, Default, PartialEq ) ]
  pub struct SchedulerStatistics
  {
    /// Requests waiting in a queue.
    pub pending_requests : usize,
    /// Requests currently admitted.
    pub running_requests : usize,
    /// Requests that reached `Finished`.
    pub completed_requests : u64,
    /// Requests that ended cancelled.
    pub cancelled_requests : u64,
    /// Bytes received across all scheduled requests.
    pub total_bytes_received : u64,
    /// Bytes sent across all scheduled requests.
    pub total_bytes_sent : u64,
    /// Exponential moving average of response time in milliseconds.
    pub avg_response_time_ms : f64,
  }

  struct QueuedRequest
  {
    reply : Reply,
    priority : RequestPriority,
    enqueued_at : Instant,
    host : String,
  }

  struct RunningRequest
  {
    reply : Reply,
    host : String,
    started_at : Instant,
  }

  struct SchedulerState
  {
    config : SchedulerConfig,
    queues : [ VecDeque< QueuedRequest >; 5 ],
    running : Vec< RunningRequest >,
    deferred : Vec< Reply >,
    per_host : HashMap< String, usize >,
    bytes_this_second : u64,
    received_per_reply : HashMap< u64, u64 >,
    sent_per_reply : HashMap< u64, u64 >,
    stats : SchedulerStatistics,
    timer_started : bool,
  }

  impl SchedulerState
  {
    fn new( config : SchedulerConfig ) -> Self
    {
      Self
      {
        config,
        queues : Default::default(),
        running : Vec::new(),
        deferred : Vec::new(),
        per_host : HashMap::new(),
        bytes_this_second : 0,
        received_per_reply : HashMap::new(),
        sent_per_reply : HashMap::new(),
        stats : SchedulerStatistics::default(),
        timer_started : false,
      }
    }

    fn pending_count( &self ) -> usize
    {
      self.queues.iter().map( VecDeque::len ).sum()
    }

    fn queue_of( &mut self, priority : RequestPriority ) -> &mut VecDeque< QueuedRequest >
    {
      &mut self.queues[ priority.index().min( 4 ) ]
    }

    fn remove_running( &mut self, reply_id : u64 ) -> Option< RunningRequest >
    {
      let position = self.running.iter().position( | entry | entry.reply.id() == reply_id )?;
      let entry = self.running.remove( position );
      if let Some( count ) = self.per_host.get_mut( &entry.host )
      {
        *count = count.saturating_sub( 1 );
        if *count == 0
        {
          self.per_host.remove( &entry.host );
        }
      }
      Some( entry )
    }
  }

  #[ derive( Default ) ]
  struct SchedulerSignals
  {
    request_queued : Signal< Reply >,
    request_started : Signal< Reply >,
    request_finished : Signal< Reply >,
    request_cancelled : Signal< Reply >,
    queue_empty : Signal< () >,
    bandwidth_throttled : Signal< u64 >,
  }

  /// Admission controller multiplexing replies through priority queues.
  ///
  /// Cloneable; all clones share one state.
  #[ derive( Clone ) ]
  pub struct RequestScheduler
  {
    state : Arc< Mutex< SchedulerState > >,
    signals : Arc< SchedulerSignals >,
  }

  impl core::fmt::Debug for RequestScheduler
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      let state = self.state.lock();
      f.debug_struct( "RequestScheduler" )
        .field( "pending", &state.pending_count() )
        .field( "running", &state.running.len() )
        .finish_non_exhaustive()
    }
  }

  impl Default for RequestScheduler
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::new( SchedulerConfig::default() )
    }
  }

  impl RequestScheduler
  {
    /// Create a scheduler with the given limits.
    #[ must_use ]
    pub fn new( config : SchedulerConfig ) -> Self
    {
      Self
      {
        state : Arc::new( Mutex::new( SchedulerState::new( config ) ) ),
        signals : Arc::new( SchedulerSignals::default() ),
      }
    }

    /// Current limits.
    #[ must_use ]
    pub fn config( &self ) -> SchedulerConfig
    {
      self.state.lock().config.clone()
    }

    /// Replace the limits and re-run admission.
    pub fn set_config( &self, config : SchedulerConfig )
    {
      self.state.lock().config = config;
      self.process_queue();
    }

    /// Current counters.
    #[ must_use ]
    pub fn statistics( &self ) -> SchedulerStatistics
    {
      let state = self.state.lock();
      let mut stats = state.stats;
      stats.pending_requests = state.pending_count();
      stats.running_requests = state.running.len();
      stats
    }

    /// Replies waiting in the queues, highest priority first.
    #[ must_use ]
    pub fn pending_requests( &self ) -> Vec< Reply >
    {
      let state = self.state.lock();
      RequestPriority::queued_levels_descending()
        .iter()
        .flat_map( | priority | state.queues[ priority.index() ].iter().map( | queued | queued.reply.clone() ) )
        .collect()
    }

    /// Replies currently admitted.
    #[ must_use ]
    pub fn running_requests( &self ) -> Vec< Reply >
    {
      self.state.lock().running.iter().map( | entry | entry.reply.clone() ).collect()
    }

    /// Subscribe to a reply entering a queue.
    pub fn on_request_queued< F : Fn( &Reply ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.request_queued.connect( handler );
    }

    /// Subscribe to a reply being admitted.
    pub fn on_request_started< F : Fn( &Reply ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.request_started.connect( handler );
    }

    /// Subscribe to a scheduled reply completing.
    pub fn on_request_finished< F : Fn( &Reply ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.request_finished.connect( handler );
    }

    /// Subscribe to a scheduled reply being cancelled.
    pub fn on_request_cancelled< F : Fn( &Reply ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.request_cancelled.connect( handler );
    }

    /// Subscribe to the queues draining empty.
    pub fn on_queue_empty< F : Fn() + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.queue_empty.connect( move | () | handler() );
    }

    /// Subscribe to the bandwidth gate closing: payload is the bytes
    /// transferred in the current second.
    pub fn on_bandwidth_throttled< F : Fn( u64 ) + Send + Sync + 'static >( &self, handler : F )
    {
      self.signals.bandwidth_throttled.connect( move | bytes | handler( *bytes ) );
    }

    /// Hand a reply to the scheduler.
    ///
    /// `Critical` bypasses the queues and every admission gate and starts
    /// immediately. Other priorities enter their FIFO queue and wait for
    /// admission.
    pub fn enqueue( &self, reply : &Reply )
    {
      self.ensure_timer();
      self.hook_reply( reply );
      let priority = reply.priority();

      if priority == RequestPriority::Critical
      {
        {
          let mut state = self.state.lock();
          let host = reply.host();
          state.running.push( RunningRequest
          {
            reply : reply.clone(),
            host : host.clone(),
            started_at : Instant::now(),
          } );
          *state.per_host.entry( host ).or_insert( 0 ) += 1;
        }
        self.signals.request_started.emit( reply );
        reply.execute();
        return;
      }

      {
        let mut state = self.state.lock();
        let host = reply.host();
        state.queue_of( priority ).push_back( QueuedRequest
        {
          reply : reply.clone(),
          priority,
          enqueued_at : Instant::now(),
          host,
        } );
      }
      self.signals.request_queued.emit( reply );
      self.process_queue();
    }

    /// Abort a running reply and park it. Its admission slot is freed; the
    /// reply can be re-admitted later with `undefer_request`.
    pub fn defer_request( &self, reply : &Reply )
    {
      let was_running =
      {
        let mut state = self.state.lock();
        let removed = state.remove_running( reply.id() );
        if removed.is_some()
        {
          state.deferred.push( reply.clone() );
        }
        removed.is_some()
      };
      if was_running
      {
        reply.defer_abort();
        self.process_queue();
      }
    }

    /// Re-enqueue a deferred reply. It re-enters at `Normal` priority; the
    /// original priority is not recovered.
    pub fn undefer_request( &self, reply : &Reply )
    {
      let found =
      {
        let mut state = self.state.lock();
        let position = state.deferred.iter().position( | deferred | deferred.id() == reply.id() );
        if let Some( position ) = position
        {
          state.deferred.remove( position );
          let host = reply.host();
          state.queue_of( RequestPriority::Normal ).push_back( QueuedRequest
          {
            reply : reply.clone(),
            priority : RequestPriority::Normal,
            enqueued_at : Instant::now(),
            host,
          } );
          true
        }
        else
        {
          false
        }
      };
      if found
      {
        self.signals.request_queued.emit( reply );
        self.process_queue();
      }
    }

    /// Change the priority of a reply still waiting in a queue. Once
    /// admitted, priority is frozen and the call is ignored.
    pub fn change_priority( &self, reply : &Reply, new_priority : RequestPriority )
    {
      let mut state = self.state.lock();
      let mut moved = None;
      for queue in &mut state.queues
      {
        if let Some( position ) = queue.iter().position( | queued | queued.reply.id() == reply.id() )
        {
          let mut queued = match queue.remove( position )
          {
            Some( queued ) => queued,
            None => continue,
          };
          queued.priority = new_priority;
          moved = Some( queued );
          break;
        }
      }
      if let Some( queued ) = moved
      {
        if new_priority == RequestPriority::Critical
        {
          // The reply is already hooked from its original enqueue; start it
          // directly the way the critical bypass does.
          let host = queued.reply.host();
          state.running.push( RunningRequest
          {
            reply : queued.reply.clone(),
            host : host.clone(),
            started_at : Instant::now(),
          } );
          *state.per_host.entry( host ).or_insert( 0 ) += 1;
          drop( state );
          self.signals.request_started.emit( &queued.reply );
          queued.reply.execute();
          return;
        }
        state.queue_of( new_priority ).push_back( queued );
        drop( state );
        self.process_queue();
      }
    }

    /// Cancel one scheduled reply, wherever it currently sits.
    pub fn cancel_request( &self, reply : &Reply )
    {
      {
        let mut state = self.state.lock();
        for queue in &mut state.queues
        {
          if let Some( position ) = queue.iter().position( | queued | queued.reply.id() == reply.id() )
          {
            queue.remove( position );
            break;
          }
        }
        let position = state.deferred.iter().position( | deferred | deferred.id() == reply.id() );
        if let Some( position ) = position
        {
          state.deferred.remove( position );
        }
      }
      reply.cancel();
      self.process_queue();
    }

    /// Cancel everything: queued, deferred and running replies.
    pub fn cancel_all_requests( &self )
    {
      let victims : Vec< Reply > =
      {
        let mut state = self.state.lock();
        let mut victims = Vec::new();
        for queue in &mut state.queues
        {
          victims.extend( queue.drain( .. ).map( | queued | queued.reply ) );
        }
        victims.extend( state.deferred.drain( .. ) );
        victims.extend( state.running.iter().map( | entry | entry.reply.clone() ) );
        victims
      };
      for reply in victims
      {
        reply.cancel();
      }
    }

    /// Record received bytes into the bandwidth window.
    fn record_received_bytes( &self, reply_id : u64, received_now : u64 )
    {
      let mut state = self.state.lock();
      let previous = state.received_per_reply.insert( reply_id, received_now ).unwrap_or( 0 );
      let delta = received_now.saturating_sub( previous );
      state.bytes_this_second += delta;
      state.stats.total_bytes_received += delta;
    }

    fn record_sent_bytes( &self, reply_id : u64, sent_now : u64 )
    {
      let mut state = self.state.lock();
      let previous = state.sent_per_reply.insert( reply_id, sent_now ).unwrap_or( 0 );
      state.stats.total_bytes_sent += sent_now.saturating_sub( previous );
    }

    fn ensure_timer( &self )
    {
      let mut state = self.state.lock();
      if state.timer_started
      {
        return;
      }
      state.timer_started = true;
      drop( state );

      // The tick task holds weak references so dropping the last scheduler
      // handle also stops the timer.
      let state_weak = Arc::downgrade( &self.state );
      let signals_weak = Arc::downgrade( &self.signals );
      tokio::spawn( async move
      {
        let mut ticker = tokio::time::interval( Duration::from_secs( 1 ) );
        ticker.set_missed_tick_behavior( tokio::time::MissedTickBehavior::Delay );
        loop
        {
          ticker.tick().await;
          let Some( state ) = state_weak.upgrade() else { break };
          let Some( signals ) = signals_weak.upgrade() else { break };
          let scheduler = RequestScheduler { state, signals };
          scheduler.state.lock().bytes_this_second = 0;
          scheduler.process_queue();
        }
      } );
    }

    fn hook_reply( &self, reply : &Reply )
    {
      let scheduler = self.clone();
      let reply_id = reply.id();
      reply.on_download_progress_signal( move | received, _total |
      {
        scheduler.record_received_bytes( reply_id, received );
      } );

      let scheduler = self.clone();
      reply.on_upload_progress_signal( move | sent, _total |
      {
        scheduler.record_sent_bytes( reply_id, sent );
      } );

      let scheduler = self.clone();
      let finished = reply.clone();
      reply.on_finished( move ||
      {
        scheduler.handle_finished( &finished );
      } );
    }

    fn handle_finished( &self, reply : &Reply )
    {
      let ( was_running, pending_left ) =
      {
        let mut state = self.state.lock();
        let removed = state.remove_running( reply.id() );
        let elapsed = removed
          .as_ref()
          .map( | entry | entry.started_at.elapsed().as_secs_f64() * 1000.0 );
        state.received_per_reply.remove( &reply.id() );
        state.sent_per_reply.remove( &reply.id() );

        if reply.state() == ReplyState::Cancelled
        {
          state.stats.cancelled_requests += 1;
        }
        else
        {
          state.stats.completed_requests += 1;
        }
        if let Some( sample ) = elapsed
        {
          state.stats.avg_response_time_ms = if state.stats.avg_response_time_ms == 0.0
          {
            sample
          }
          else
          {
            state.stats.avg_response_time_ms.mul_add( 1.0 - RESPONSE_TIME_EMA_ALPHA, sample * RESPONSE_TIME_EMA_ALPHA )
          };
        }
        ( removed.is_some(), state.pending_count() + state.running.len() )
      };

      if reply.state() == ReplyState::Cancelled
      {
        self.signals.request_cancelled.emit( reply );
      }
      if was_running
      {
        self.signals.request_finished.emit( reply );
      }
      self.process_queue();
      if pending_left == 0
      {
        self.signals.queue_empty.emit( &() );
      }
    }

    /// Run the admission loop: highest priority first, stopping entirely at
    /// the global or bandwidth gate and skipping to lower levels at the
    /// per-host gate.
    fn process_queue( &self )
    {
      let mut admitted : Vec< Reply > = Vec::new();
      let mut throttled_at : Option< u64 > = None;

      {
        let mut state = self.state.lock();
        'levels : for priority in RequestPriority::queued_levels_descending()
        {
          loop
          {
            let Some( head ) = state.queues[ priority.index() ].front() else { break };

            if head.reply.state().is_terminal()
            {
              state.queues[ priority.index() ].pop_front();
              continue;
            }
            if state.running.len() >= state.config.max_concurrent_requests
            {
              break 'levels;
            }
            let host_running = state.per_host.get( &head.host ).copied().unwrap_or( 0 );
            if host_running >= state.config.max_requests_per_host
            {
              break;
            }
            if state.config.enable_throttling
              && state.config.max_bandwidth_bytes_per_sec > 0
              && state.bytes_this_second >= state.config.max_bandwidth_bytes_per_sec
            {
              throttled_at = Some( state.bytes_this_second );
              break 'levels;
            }

            let Some( queued ) = state.queues[ priority.index() ].pop_front() else { break };
            tracing::trace!
            (
              waited_ms = queued.enqueued_at.elapsed().as_millis() as u64,
              priority = ?queued.priority,
              "request admitted"
            );
            *state.per_host.entry( queued.host.clone() ).or_insert( 0 ) += 1;
            state.running.push( RunningRequest
            {
              reply : queued.reply.clone(),
              host : queued.host,
              started_at : Instant::now(),
            } );
            admitted.push( queued.reply );
          }
        }
      }

      if let Some( bytes ) = throttled_at
      {
        self.signals.bandwidth_throttled.emit( &bytes );
        tracing::debug!( bytes_this_second = bytes, "scheduler bandwidth gate closed" );
      }
      for reply in admitted
      {
        self.signals.request_started.emit( &reply );
        reply.execute();
      }
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use SchedulerConfig;
  exposed use SchedulerStatistics;
  exposed use RequestScheduler;
}
