use color_eyre::Result;
use keybridge_core::{
    channel::{MethodChannel, Reply},
    error::BridgeError,
    storage::CredentialStore,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

/// Answer newline-delimited JSON method calls until `input` closes.
/// Each call gets exactly one JSON reply line. Returns the number of calls handled.
pub async fn run<S, R, W>(channel: &MethodChannel<S>, mut input: R, mut output: W) -> Result<usize>
where
    S: CredentialStore,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(channel = channel.name(), "serving method calls");
    let mut buf = Vec::new();
    let mut handled = 0;
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let reply = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => channel.handle_json(line).await,
            Err(err) => Reply::from(BridgeError::MalformedRequest {
                method: "<undecodable>".to_string(),
                reason: err.to_string(),
            }),
        };
        let mut encoded = serde_json::to_vec(&reply)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
        handled += 1;
    }
    info!(handled, "input closed");
    Ok(handled)
}
