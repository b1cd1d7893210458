//! Mock KATCP server for integration tests.
//!
//! Accepts any number of connections. Each connection gets the greeting
//! lines, then every request is answered with its scripted informs followed
//! by `!name ok`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Default)]
pub struct Script {
    pub greeting: Vec<String>,
    /// Request name to informs sent before the reply.
    pub informs: HashMap<String, Vec<String>>,
}

impl Script {
    pub fn greet(mut self, line: impl Into<String>) -> Self {
        self.greeting.push(line.into());
        self
    }

    pub fn on(mut self, request: &str, inform: impl Into<String>) -> Self {
        self.informs
            .entry(request.to_string())
            .or_default()
            .push(inform.into());
        self
    }
}

pub struct MockKatcpServer {
    pub port: u16,
    requests: mpsc::UnboundedReceiver<String>,
}

impl MockKatcpServer {
    pub async fn start(script: Script) -> Self {
        Self::start_on(0, script).await
    }

    pub async fn start_on(port: u16, script: Script) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let script = Arc::new(script);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&script), requests_tx.clone()));
            }
        });

        Self { port, requests }
    }

    /// Every request line received so far, on any connection.
    pub fn received(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.requests.try_recv() {
            lines.push(line);
        }
        lines
    }
}

async fn serve(stream: TcpStream, script: Arc<Script>, requests: mpsc::UnboundedSender<String>) {
    let (read_half, mut write_half) = stream.into_split();
    for line in &script.greeting {
        if write_half.write_all(format!("{line}\n").as_bytes()).await.is_err() {
            return;
        }
    }

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let name = line
            .split(' ')
            .next()
            .unwrap_or_default()
            .trim_start_matches('?')
            .to_string();
        let _ = requests.send(line);

        let mut out = String::new();
        for inform in script.informs.get(&name).into_iter().flatten() {
            out.push_str(inform);
            out.push('\n');
        }
        out.push_str(&format!("!{name} ok\n"));
        if write_half.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}
