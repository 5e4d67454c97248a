//! TCP listener for the controller.
//!
//! One controller at a time. The listener thread frames incoming bytes into
//! lines and hands them to the UI thread over a channel; replies are written
//! back from the UI thread through a [`ReplyWriter`].

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use parking_lot::Mutex;
use serde_json::Value;

use crate::protocol::{LineFramer, encode_reply};
use crate::workspace::ReplySink;

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Connected(SocketAddr),
    Line(String),
    Disconnected,
}

/// Writes replies to whichever controller is connected. Replies sent while
/// nobody is connected are dropped.
#[derive(Debug, Clone, Default)]
pub struct ReplyWriter {
    stream: Arc<Mutex<Option<TcpStream>>>,
}

impl ReplyWriter {
    fn attach(&self, stream: TcpStream) {
        *self.stream.lock() = Some(stream);
    }

    fn detach(&self) {
        *self.stream.lock() = None;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.lock().is_some()
    }
}

impl ReplySink for ReplyWriter {
    fn send(&self, values: &[Value]) {
        let mut guard = self.stream.lock();
        let Some(stream) = guard.as_mut() else {
            log::warn!("No controller connected, reply dropped");
            return;
        };
        let payload = encode_reply(values);
        if let Err(err) = stream.write_all(payload.as_bytes()).and_then(|()| stream.flush()) {
            log::warn!("Failed to send reply: {}", err);
            *guard = None;
        }
    }
}

pub struct Server {
    pub address: SocketAddr,
    pub events: Receiver<ServerEvent>,
    pub replies: ReplyWriter,
}

impl Server {
    /// Binds `address` and starts the listener thread. `notify` runs after
    /// every event so the UI can wake up.
    pub fn spawn<F>(address: &str, notify: F) -> io::Result<Server>
    where
        F: Fn() + Send + 'static,
    {
        let listener = TcpListener::bind(address)?;
        let local = listener.local_addr()?;
        let (sender, events) = mpsc::channel();
        let replies = ReplyWriter::default();
        let writer = replies.clone();
        thread::Builder::new()
            .name("controller-listener".to_owned())
            .spawn(move || accept_loop(listener, sender, writer, notify))?;
        log::info!("Listening for a controller on {}", local);
        Ok(Server {
            address: local,
            events,
            replies,
        })
    }
}

fn accept_loop<F: Fn()>(listener: TcpListener, sender: Sender<ServerEvent>, writer: ReplyWriter, notify: F) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("Failed to accept connection: {}", err);
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
        match stream.try_clone() {
            Ok(clone) => writer.attach(clone),
            Err(err) => {
                log::error!("Cannot reply to {}: {}", peer, err);
                continue;
            }
        }
        log::info!("Controller connected from {}", peer);
        let delivered = sender.send(ServerEvent::Connected(peer)).is_ok();
        notify();
        if !delivered {
            return;
        }

        let open = serve(stream, &sender, &notify);
        writer.detach();
        log::info!("Controller {} disconnected", peer);
        if !open || sender.send(ServerEvent::Disconnected).is_err() {
            return;
        }
        notify();
    }
}

/// Reads one connection until it closes. Returns `false` once the UI side
/// has gone away.
fn serve<F: Fn()>(mut stream: TcpStream, sender: &Sender<ServerEvent>, notify: &F) -> bool {
    let mut framer = LineFramer::new();
    let mut undecoded = Vec::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                log::warn!("Controller read failed: {}", err);
                break;
            }
        };
        undecoded.extend_from_slice(&buffer[..read]);
        let text = take_utf8(&mut undecoded);
        let lines = framer.push(&text);
        if !lines.is_empty() {
            for line in lines {
                if sender.send(ServerEvent::Line(line)).is_err() {
                    return false;
                }
            }
            notify();
        }
    }
    if let Some(rest) = framer.finish() {
        if sender.send(ServerEvent::Line(rest)).is_err() {
            return false;
        }
    }
    true
}

/// Decodes the valid UTF-8 prefix of `bytes`, keeping a trailing incomplete
/// sequence for the next read. Invalid bytes are replaced.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => {
            let text = text.to_owned();
            bytes.clear();
            text
        }
        Err(err) if err.error_len().is_none() => {
            let tail = bytes.split_off(err.valid_up_to());
            let text = String::from_utf8_lossy(bytes).into_owned();
            *bytes = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            bytes.clear();
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn split_utf8_is_carried_over() {
        let mut bytes = "é".as_bytes()[..1].to_vec();
        assert_eq!(take_utf8(&mut bytes), "");
        bytes.extend_from_slice(&"é".as_bytes()[1..]);
        assert_eq!(take_utf8(&mut bytes), "é");
        assert!(bytes.is_empty());
    }

    #[test]
    fn lines_in_replies_out() {
        let server = Server::spawn("127.0.0.1:0", || {}).unwrap();
        let mut client = TcpStream::connect(server.address).unwrap();
        let timeout = Duration::from_secs(5);

        assert!(matches!(
            server.events.recv_timeout(timeout).unwrap(),
            ServerEvent::Connected(_)
        ));
        client.write_all(b"{\"command\":\"clear\"}\n{\"comm").unwrap();
        client.write_all(b"and\":\"setLightMode\"}\n").unwrap();
        assert_eq!(
            server.events.recv_timeout(timeout).unwrap(),
            ServerEvent::Line("{\"command\":\"clear\"}".to_owned())
        );
        assert_eq!(
            server.events.recv_timeout(timeout).unwrap(),
            ServerEvent::Line("{\"command\":\"setLightMode\"}".to_owned())
        );

        assert!(server.replies.is_connected());
        server.replies.send(&[json!(1), json!("two")]);
        let mut reader = BufReader::new(client.try_clone().unwrap());
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        assert_eq!(reply, "[1,\"two\"]\n");

        drop(reader);
        drop(client);
        assert_eq!(
            server.events.recv_timeout(timeout).unwrap(),
            ServerEvent::Disconnected
        );
    }
}
