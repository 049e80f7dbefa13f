//! Read and write pumps for one length-prefixed message stream

use crate::error::ProtocolError;
use crate::header::{encode_header, Header, HEADER_SIZE};
use crate::message::Message;
use crate::queue::OutgoingQueue;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Work posted to a connection's write pump
#[derive(Debug)]
pub enum WriteJob {
    Send(Message),
    /// Drop anything still queued and shut the write half down
    Close,
}

/// Reads exactly one header, then exactly the body it declares.
///
/// A peer closing the stream on a message boundary yields
/// [`ProtocolError::ConnectionClosed`]; closing mid-message is a framing
/// error and surfaces as an I/O `UnexpectedEof`.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_body: usize,
) -> Result<Message, ProtocolError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        filled += n;
    }

    let header = Header::decode(&header_buf)?;
    if header.body_len > max_body {
        return Err(ProtocolError::MessageTooLarge {
            size: header.body_len,
            max_size: max_body,
        });
    }

    let mut body = vec![0u8; header.body_len];
    reader.read_exact(&mut body).await?;

    trace!(
        "Read {:?} from {} to {} ({} bytes)",
        header.message_type,
        header.sender,
        header.receiver,
        header.body_len
    );
    Ok(header.into_message(body))
}

/// Writes header and body as one buffer so frames never interleave.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), ProtocolError> {
    let header = encode_header(message)?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + message.size());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&message.body);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads messages until the stream fails, handing each to `on_message` and
/// re-arming immediately. Stops cleanly when `on_message` returns false.
pub async fn run_read_pump<R, F>(
    mut reader: R,
    max_body: usize,
    mut on_message: F,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
    F: FnMut(Message) -> bool,
{
    loop {
        let message = read_message(&mut reader, max_body).await?;
        if !on_message(message) {
            debug!("Read pump sink closed, stopping");
            return Ok(());
        }
    }
}

/// The single writer for one connection.
///
/// Jobs are drained into an [`OutgoingQueue`]; the front message is written,
/// popped once the write completes, and the next one started while any
/// remain. Only this task ever writes to `writer`, so at most one write is in
/// flight. `on_busy` observes transitions between idle and writing.
pub async fn run_write_pump<W, F>(
    mut writer: W,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    mut on_busy: F,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    F: FnMut(bool),
{
    let mut queue = OutgoingQueue::new();

    loop {
        loop {
            let job = if queue.is_empty() {
                on_busy(false);
                jobs.recv().await
            } else {
                match jobs.try_recv() {
                    Ok(job) => Some(job),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => None,
                }
            };

            match job {
                Some(WriteJob::Send(message)) => {
                    if queue.push(message) {
                        on_busy(true);
                    }
                }
                Some(WriteJob::Close) | None => {
                    if !queue.is_empty() {
                        debug!("Discarding {} unsent messages on close", queue.len());
                    }
                    queue.clear();
                    if let Err(e) = writer.shutdown().await {
                        debug!("Error shutting down write half: {}", e);
                    }
                    return Ok(());
                }
            }
        }

        if let Some(message) = queue.front() {
            write_message(&mut writer, message).await?;
        }
        queue.pop_front();
    }
}
