//! TCP server for handling gopher connections.
//!
//! Each accepted connection carries exactly one request: the selector
//! line is read, resolved against the serve root, answered with a
//! listing or file contents, and the connection is closed.

use crate::config::Config;
use crate::protocol::{parse_line, ParseResult, Request, Response, MAX_SELECTOR_LENGTH};
use crate::storage::{LookupError, ServeRoot};
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 4 * 1024;

/// Response bytes written per deadline window
const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Read-only state shared by all connection handlers
struct Context {
    root: ServeRoot,
    host: String,
    port: u16,
    /// Deadline for receiving the selector and for each response write
    timeout: Option<Duration>,
}

/// Server instance
pub struct Server {
    config: Config,
    context: Arc<Context>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance, resolving the serve directory.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let root = ServeRoot::new(&config.directory).map_err(ServerError::ServeRoot)?;

        let timeout = match config.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let context = Arc::new(Context {
            root,
            host: config.host.clone(),
            port: config.port,
            timeout,
        });
        let connection_limit = Arc::new(Semaphore::new(config.max_connections.max(1)));

        Ok(Server {
            config,
            context,
            connection_limit,
        })
    }

    /// Bind the configured address and serve until accepting fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::Bind(address.clone(), e))?;
        info!(%address, root = %self.context.root.path().display(), "Server listening");

        self.serve(listener).await
    }

    /// Accept connections on `listener`, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            // Wait for a connection slot
            let permit = self
                .connection_limit
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ServerError::LimiterClosed)?;

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let context = Arc::clone(&self.context);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, context).await {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    mut stream: TcpStream,
    context: Arc<Context>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let selector = match with_deadline(context.timeout, read_selector(&mut stream)).await? {
        Some(selector) => selector,
        None => {
            trace!("Connection closed before a selector was sent");
            return Ok(());
        }
    };
    let selector_display = String::from_utf8_lossy(&selector);

    let request = Request::from_selector(&selector);
    trace!(selector = %selector_display, "Processing request");

    let response = match execute_request(&request, &context).await {
        Ok(response) => response,
        Err(e) => {
            warn!(selector = %selector_display, error = %e, "Lookup failed");
            return Ok(());
        }
    };

    // Each chunk gets its own deadline so large bodies on slow links still finish.
    for chunk in response.chunks(WRITE_CHUNK_SIZE) {
        with_deadline(context.timeout, stream.write_all(chunk)).await?;
    }
    stream.shutdown().await?;
    Ok(())
}

/// Run `operation`, failing with `TimedOut` if `limit` elapses first.
async fn with_deadline<T, F>(limit: Option<Duration>, operation: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection deadline elapsed"))?,
        None => operation.await,
    }
}

/// Read bytes until one selector line is framed.
///
/// Returns `None` if the peer closed without sending anything. The
/// selector is returned as raw bytes; filenames need not be UTF-8.
async fn read_selector<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        let n = reader.read_buf(&mut buffer).await?;

        match parse_line(&buffer, n == 0) {
            ParseResult::Complete(line, _) => return Ok(Some(line.to_vec())),
            ParseResult::Closed => return Ok(None),
            ParseResult::Incomplete => {
                if buffer.len() > MAX_SELECTOR_LENGTH {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "selector line too long",
                    ));
                }
            }
        }
    }
}

/// Resolve a request against the serve root and build the response body
async fn execute_request(request: &Request, context: &Context) -> Result<Bytes, LookupError> {
    match request {
        Request::Listing {
            path,
            selector_base,
        } => {
            let entries = context.root.list(path).await?;
            let listing = Response::listing(&entries, selector_base, &context.host, context.port);
            Ok(listing.freeze())
        }
        Request::File { path } => {
            let data = context.root.read_all(path).await?;
            Ok(Bytes::from(data))
        }
    }
}

/// Server-level errors
#[derive(Debug)]
pub enum ServerError {
    /// The serve directory could not be resolved
    ServeRoot(LookupError),
    /// The listener could not be bound
    Bind(String, io::Error),
    /// Accepting a connection failed
    Accept(io::Error),
    /// The connection limiter was closed
    LimiterClosed,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::ServeRoot(e) => write!(f, "Invalid serve directory: {}", e),
            ServerError::Bind(address, e) => write!(f, "Failed to listen at {}: {}", address, e),
            ServerError::Accept(e) => write!(f, "Failed to accept connection: {}", e),
            ServerError::LimiterClosed => write!(f, "Connection limiter closed"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::ServeRoot(e) => Some(e),
            ServerError::Bind(_, e) | ServerError::Accept(e) => Some(e),
            ServerError::LimiterClosed => None,
        }
    }
}
