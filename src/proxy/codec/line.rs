use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads one LF-terminated line and strips the trailing CRLF/LF. Returns
/// `None` when the stream ends before any byte of a line arrives.
pub(crate) async fn read_trimmed_line<S>(
    reader: &mut BufReader<S>,
) -> std::io::Result<Option<String>>
where
    S: AsyncRead + Unpin,
{
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Some(line))
}
