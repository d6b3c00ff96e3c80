//! A minimal HTTP endpoint for testing scrapes without a running agent.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Behaviour {
    Respond { status: u16, body: String },
    /// Accept connections and never answer.
    Hang,
}

/// Serves every request on a background thread with a fixed response.
///
/// The thread lives for the rest of the test process.
#[derive(Debug)]
pub struct MetricsStub {
    port: u16,
    requests: Arc<AtomicUsize>,
}

impl MetricsStub {
    /// Respond `200 OK` with `body` to every request.
    pub fn serve(body: impl Into<String>) -> std::io::Result<Self> {
        Self::start(Behaviour::Respond {
            status: 200,
            body: body.into(),
        })
    }

    pub fn respond(status: u16, body: impl Into<String>) -> std::io::Result<Self> {
        Self::start(Behaviour::Respond {
            status,
            body: body.into(),
        })
    }

    /// Accept connections but never send a response.
    pub fn hang() -> std::io::Result<Self> {
        Self::start(Behaviour::Hang)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn start(behaviour: Behaviour) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        std::thread::Builder::new()
            .name(format!("metrics-stub-{port}"))
            .spawn(move || {
                let mut held = Vec::new();
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else {
                        continue;
                    };
                    if read_request_head(&mut stream).is_err() {
                        continue;
                    }
                    counter.fetch_add(1, Ordering::SeqCst);

                    match &behaviour {
                        Behaviour::Respond { status, body } => {
                            let response = format!(
                                "HTTP/1.1 {status} {}\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                                reason_phrase(*status),
                                body.len()
                            );
                            let _ = stream.write_all(response.as_bytes());
                            let _ = stream.flush();
                        }
                        Behaviour::Hang => held.push(stream),
                    }
                }
            })?;

        Ok(Self { port, requests })
    }
}

/// A port nothing is listening on, at least at the time of the call.
pub fn unused_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn read_request_head(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.extend_from_slice(&buf[..n]);
    }

    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
