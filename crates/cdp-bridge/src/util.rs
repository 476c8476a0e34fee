use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};

/// Extract the DevTools websocket URL from a freshly launched Chromium's
/// stderr. Chromium prints a line of the form
/// `DevTools listening on ws://127.0.0.1:PORT/devtools/browser/UUID`.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();

    let reader = async {
        let mut preview = Vec::new();
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(idx) = line.find("ws://") {
                let ws = line[idx..].trim();
                if ws.contains("devtools/browser") {
                    return Ok(ws.to_string());
                }
            }
            if preview.len() < 8 {
                preview.push(line);
            }
        }
        Err(anyhow!(
            "chromium exited before exposing a devtools websocket url. stderr preview: {}",
            preview.join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools websocket url"))?
}
