//! TCP server for memdb connections.
//!
//! Listens on a TCP port and spawns an OS thread per client connection. Each
//! connection gets its own [`Session`], and therefore its own lock ledger.
//!
//! Protocol: every input line is one SQL batch. The reply is the rendered
//! result (or `ERROR: <message>`) followed by a line holding a single `.`.
//! Reply lines that start with `.` are sent with an extra leading `.`.
//! A line longer than the server's line limit gets an error reply and the
//! connection is closed.

use memdb_core::{Database, MemDbError, MemDbResult, Session};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;

/// Reply terminator line.
pub const END_OF_REPLY: &str = ".";

/// Default cap on one input line, newline included (1 MiB).
pub const MAX_LINE_BYTES: u64 = 1 << 20;

pub struct Server {
    db: Arc<Database>,
    listener: TcpListener,
    max_line_bytes: u64,
}

impl Server {
    pub fn bind(addr: &str, db: Arc<Database>) -> MemDbResult<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            db,
            listener,
            max_line_bytes: MAX_LINE_BYTES,
        })
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: u64) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    pub fn local_addr(&self) -> MemDbResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener fails.
    pub fn serve(&self) -> MemDbResult<()> {
        tracing::info!(addr = %self.local_addr()?, "memdb server listening");

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = match stream.peer_addr() {
                        Ok(peer) => peer,
                        Err(e) => {
                            tracing::warn!(error = %e, "connection dropped before setup");
                            continue;
                        }
                    };
                    tracing::info!(peer = %peer, "connection accepted");
                    let db = Arc::clone(&self.db);
                    let max_line_bytes = self.max_line_bytes;
                    std::thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, peer, db, max_line_bytes) {
                            tracing::error!(peer = %peer, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
        Ok(())
    }
}

/// Handle a single client connection.
fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    db: Arc<Database>,
    max_line_bytes: u64,
) -> MemDbResult<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);
    let mut session = db.connect();
    let mut line = String::new();

    loop {
        line.clear();
        // One byte past the cap tells an oversized line from one that fits.
        if (&mut reader).take(max_line_bytes + 1).read_line(&mut line)? == 0 {
            tracing::info!(peer = %peer, context = session.context_id(), "connection closed");
            return Ok(());
        }
        if line.len() as u64 > max_line_bytes && !line.ends_with('\n') {
            tracing::warn!(
                peer = %peer,
                limit = max_line_bytes,
                "input line too long, closing connection"
            );
            write_reply(
                &mut writer,
                &format!("ERROR: input line exceeds {max_line_bytes} bytes"),
            )?;
            return Ok(());
        }

        let sql = line.trim();
        let outcome = if sql.is_empty() {
            Ok(String::new())
        } else {
            tracing::debug!(peer = %peer, sql = %sql, "statement received");
            run_batch(&mut session, sql)
        };

        match outcome {
            Ok(text) => write_reply(&mut writer, &text)?,
            Err(e) => {
                write_reply(&mut writer, &format!("ERROR: {e}"))?;
                if e.is_fatal() {
                    tracing::error!(
                        peer = %peer,
                        context = session.context_id(),
                        error = %e,
                        "fatal error, closing connection"
                    );
                    return Err(e);
                }
            }
        }
    }
}

fn run_batch(session: &mut Session, sql: &str) -> Result<String, MemDbError> {
    let results = session.execute_batch(sql)?;
    Ok(results
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn write_reply(writer: &mut impl Write, text: &str) -> MemDbResult<()> {
    for line in text.lines() {
        if line.starts_with('.') {
            writer.write_all(b".")?;
        }
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.write_all(END_OF_REPLY.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
