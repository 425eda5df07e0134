use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use super::{
    message::{Request, Response},
    MAX_LINE_LEN,
};

/// A line oriented wrapper around a terminal's byte stream
pub struct Connection<S> {
    stream: BufReader<S>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionErr {
    #[error("{0}")]
    Io(#[from] tokio::io::Error),

    #[error("The line is too long")]
    LineTooLong,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Reads a single request from the connection
    ///
    /// returns None once the peer has closed its side of the stream.
    /// a final line that isn't terminated by a newline is still returned.
    pub async fn read_request(&mut self) -> Result<Option<Request>, ConnectionErr> {
        let mut line = Vec::with_capacity(64);

        // allow one extra byte for the newline itself
        let rcount = (&mut self.stream)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if rcount == 0 {
            return Ok(None);
        }

        if line.last() != Some(&b'\n') && line.len() > MAX_LINE_LEN {
            return Err(ConnectionErr::LineTooLong);
        }

        // non utf-8 content can never match a keyword, it will parse as malformed
        let line = String::from_utf8_lossy(&line);
        tracing::trace!("received raw: {:?}", line);

        Ok(Some(Request::from_line(
            line.trim_matches(|c: char| c.is_ascii_whitespace()),
        )))
    }

    /// Writes the given response to the terminal, followed by a newline
    pub async fn send_response(&mut self, response: Response) -> Result<(), ConnectionErr> {
        let stream = self.stream.get_mut();
        stream
            .write_all(format!("{}\n", response).as_bytes())
            .await?;
        stream.flush().await?;

        Ok(())
    }

    /// Closes the write side of the stream
    pub async fn shutdown(&mut self) -> Result<(), ConnectionErr> {
        self.stream.get_mut().shutdown().await?;
        Ok(())
    }
}
