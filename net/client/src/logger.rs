//! User-facing network logger with pluggable sinks.
//!
//! Distinct from the crate's internal `tracing` diagnostics: the logger is a
//! capability applications attach to a manager to observe request traffic.
//! The default logger is thread-safe and may be shared between managers.

#[ cfg( feature = "enabled" ) ]
mod private
{
  use std::io::Write;
  use std::path::PathBuf;
  use std::sync::Arc;

  use chrono::{ DateTime, Utc };
  use parking_lot::Mutex;

  const ENTRY_RING_CAPACITY : usize = 1000;
  const DEFAULT_FORMAT : &str = "{timestamp} [{level}] {category} : {message}";

  /// Severity of a log entry.
  #[ derive( Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord ) ]
  pub enum NetworkLogLevel
  {
    /// Verbose diagnostics.
    Debug,
    /// Normal operational events.
    Info,
    /// Unexpected but recoverable conditions.
    Warning,
    /// Failures.
    Error,
  }

  impl NetworkLogLevel
  {
    /// Upper-case level name.
    #[ inline ]
    #[ must_use ]
    pub fn as_str( self ) -> &'static str
    {
      match self
      {
        Self::Debug => "DEBUG",
        Self::Info => "INFO",
        Self::Warning => "WARNING",
        Self::Error => "ERROR",
      }
    }

    /// Parse a level name, case-insensitively.
    #[ must_use ]
    pub fn parse( text : &str ) -> Option< Self >
    {
      match text.to_ascii_lowercase().as_str()
      {
        "debug" => Some( Self::Debug ),
        "info" => Some( Self::Info ),
        "warning" | "warn" => Some( Self::Warning ),
        "error" => Some( Self::Error ),
        _ => None,
      }
    }
  }

  /// One logged event.
  #[ derive( Debug, Clone ) ]
  pub struct NetworkLogEntry
  {
    /// Severity.
    pub level : NetworkLogLevel,
    /// Event category, such as `Request` or `Response`.
    pub category : String,
    /// Message text.
    pub message : String,
    /// When the event was logged.
    pub timestamp : DateTime< Utc >,
  }

  impl NetworkLogEntry
  {
    /// Render with the given format string. Recognized placeholders:
    /// `{timestamp}`, `{level}`, `{category}`, `{message}`.
    #[ must_use ]
    pub fn render( &self, format : &str ) -> String
    {
      format
        .replace( "{timestamp}", &self.timestamp.to_rfc3339() )
        .replace( "{level}", self.level.as_str() )
        .replace( "{category}", &self.category )
        .replace( "{message}", &self.message )
    }
  }

  type LogCallback = Arc< dyn Fn( &NetworkLogEntry ) + Send + Sync >;

  struct FileSink
  {
    path : PathBuf,
    max_size : u64,
    backup_count : u32,
  }

  impl FileSink
  {
    fn rotate( &self )
    {
      if self.backup_count == 0
      {
        let _ = std::fs::remove_file( &self.path );
        return;
      }
      let backup = | index : u32 | PathBuf::from( format!( "{}.{index}", self.path.display() ) );
      let _ = std::fs::remove_file( backup( self.backup_count ) );
      for index in ( 1..self.backup_count ).rev()
      {
        let _ = std::fs::rename( backup( index ), backup( index + 1 ) );
      }
      let _ = std::fs::rename( &self.path, backup( 1 ) );
    }

    fn write_line( &self, line : &str )
    {
      if self.max_size > 0
      {
        let current = std::fs::metadata( &self.path ).map_or( 0, | meta | meta.len() );
        if current + line.len() as u64 + 1 > self.max_size
        {
          self.rotate();
        }
      }
      let opened = std::fs::OpenOptions::new().create( true ).append( true ).open( &self.path );
      if let Ok( mut file ) = opened
      {
        let _ = writeln!( file, "{line}" );
      }
    }
  }

  struct LoggerState
  {
    min_level : NetworkLogLevel,
    console : bool,
    file : Option< FileSink >,
    callback : Option< LogCallback >,
    format : String,
    entries : std::collections::VecDeque< NetworkLogEntry >,
  }

  /// Thread-safe logger with console, rotating-file and callback sinks.
  ///
  /// Recent entries are kept in a bounded ring for inspection.
  pub struct NetworkLogger
  {
    state : Mutex< LoggerState >,
  }

  impl core::fmt::Debug for NetworkLogger
  {
    fn fmt( &self, f : &mut core::fmt::Formatter< '_ > ) -> core::fmt::Result
    {
      let state = self.state.lock();
      f.debug_struct( "NetworkLogger" )
        .field( "min_level", &state.min_level )
        .field( "console", &state.console )
        .field( "entries", &state.entries.len() )
        .finish_non_exhaustive()
    }
  }

  impl Default for NetworkLogger
  {
    #[ inline ]
    fn default() -> Self
    {
      Self::new()
    }
  }

  impl NetworkLogger
  {
    /// Create a logger with console output enabled at `Info` level.
    #[ must_use ]
    pub fn new() -> Self
    {
      Self
      {
        state : Mutex::new( LoggerState
        {
          min_level : NetworkLogLevel::Info,
          console : true,
          file : None,
          callback : None,
          format : DEFAULT_FORMAT.to_owned(),
          entries : std::collections::VecDeque::new(),
        } ),
      }
    }

    /// Set the minimum level below which entries are dropped.
    pub fn set_min_log_level( &self, level : NetworkLogLevel )
    {
      self.state.lock().min_level = level;
    }

    /// Current minimum level.
    #[ must_use ]
    pub fn min_log_level( &self ) -> NetworkLogLevel
    {
      self.state.lock().min_level
    }

    /// Enable or disable the console sink.
    pub fn enable_console_output( &self, enable : bool )
    {
      self.state.lock().console = enable;
    }

    /// Enable the rotating file sink. `max_size` of zero disables rotation;
    /// otherwise the file is rotated into `path.1` .. `path.<backup_count>`
    /// before it would exceed `max_size` bytes.
    pub fn enable_file_output< P : Into< PathBuf > >( &self, path : P, max_size : u64, backup_count : u32 )
    {
      self.state.lock().file = Some( FileSink
      {
        path : path.into(),
        max_size,
        backup_count,
      } );
    }

    /// Disable the file sink.
    pub fn disable_file_output( &self )
    {
      self.state.lock().file = None;
    }

    /// Install a custom callback sink.
    pub fn set_custom_callback< F >( &self, callback : F )
    where
      F : Fn( &NetworkLogEntry ) + Send + Sync + 'static,
    {
      self.state.lock().callback = Some( Arc::new( callback ) );
    }

    /// Replace the output format. See [`NetworkLogEntry::render`] for the
    /// recognized placeholders.
    pub fn set_log_format< S : Into< String > >( &self, format : S )
    {
      self.state.lock().format = format.into();
    }

    /// Log one event.
    pub fn log( &self, level : NetworkLogLevel, category : &str, message : &str )
    {
      let entry = NetworkLogEntry
      {
        level,
        category : category.to_owned(),
        message : message.to_owned(),
        timestamp : Utc::now(),
      };

      // The file sink writes under the instance lock; console and callback
      // sinks run after it is released.
      let ( console, format, callback ) =
      {
        let mut state = self.state.lock();
        if level < state.min_level
        {
          return;
        }
        if state.entries.len() == ENTRY_RING_CAPACITY
        {
          state.entries.pop_front();
        }
        state.entries.push_back( entry.clone() );
        if let Some( sink ) = &state.file
        {
          let line = entry.render( &state.format );
          sink.write_line( &line );
        }
        ( state.console, state.format.clone(), state.callback.clone() )
      };

      if console
      {
        println!( "{}", entry.render( &format ) );
      }
      if let Some( callback ) = callback
      {
        callback( &entry );
      }
    }

    /// Log at `Debug` level.
    #[ inline ]
    pub fn debug( &self, category : &str, message : &str )
    {
      self.log( NetworkLogLevel::Debug, category, message );
    }

    /// Log at `Info` level.
    #[ inline ]
    pub fn info( &self, category : &str, message : &str )
    {
      self.log( NetworkLogLevel::Info, category, message );
    }

    /// Log at `Warning` level.
    #[ inline ]
    pub fn warning( &self, category : &str, message : &str )
    {
      self.log( NetworkLogLevel::Warning, category, message );
    }

    /// Log at `Error` level.
    #[ inline ]
    pub fn error( &self, category : &str, message : &str )
    {
      self.log( NetworkLogLevel::Error, category, message );
    }

    /// Snapshot of the retained entries, oldest first.
    #[ must_use ]
    pub fn entries( &self ) -> Vec< NetworkLogEntry >
    {
      self.state.lock().entries.iter().cloned().collect()
    }

    /// Drop the retained entries.
    pub fn clear( &self )
    {
      self.state.lock().entries.clear();
    }
  }
}

#[ cfg( feature = "enabled" ) ]
crate::mod_interface!
{
  exposed use NetworkLogLevel;
  exposed use NetworkLogEntry;
  exposed use NetworkLogger;
}
