//! `guppy:` transport: a receive-window protocol over UDP, driven by a
//! 100ms retry timer rather than TCP's own retransmission.

use std::time::Duration;

use gem_core::status::GmStatusCode;
use regex::Regex;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::error::{NetError, NetResult};
use crate::request::GmRequest;

const TICK: Duration = Duration::from_millis(100);
const REQUEST_RESEND: Duration = Duration::from_millis(1000);
const ACK_RESEND: Duration = Duration::from_millis(500);
const TOTAL_TIMEOUT: Duration = Duration::from_millis(6000);
const RING_SLOTS: usize = 16;

fn meta_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+)(.*)").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    InProgress,
    InvalidResponse,
    InputRequired,
    Redirect,
    Error,
    Finished,
}

/// One open Guppy session: a UDP socket, the request line it keeps
/// resending until the first reply arrives, and the 16-slot chunk ring
/// used to reassemble a response that may arrive out of order.
struct GuppySession {
    socket: UdpSocket,
    url: String,
    meta: String,
    first_sent: Instant,
    last_sent: Instant,
    first_seq: Option<u32>,
    last_seq: Option<u32>,
    current_seq: Option<u32>,
    chunks: [Option<(u32, Vec<u8>)>; RING_SLOTS],
    body: Vec<u8>,
}

impl GuppySession {
    async fn open(host: &str, port: u16, url: &str) -> NetResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
        socket
            .connect((host, port))
            .await
            .map_err(|e| NetError::Dns(e.to_string()))?;
        let now = Instant::now();
        let mut session = Self {
            socket,
            url: url.to_string(),
            meta: String::new(),
            first_sent: now,
            last_sent: now,
            first_seq: None,
            last_seq: None,
            current_seq: None,
            chunks: Default::default(),
            body: Vec::new(),
        };
        session.send_request().await?;
        Ok(session)
    }

    async fn send_request(&mut self) -> NetResult<()> {
        self.socket
            .send(format!("{}\r\n", self.url).as_bytes())
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
        self.last_sent = Instant::now();
        Ok(())
    }

    async fn send_ack(&mut self, seq: u32) -> NetResult<()> {
        self.socket
            .send(format!("{seq}\r\n").as_bytes())
            .await
            .map_err(|e| NetError::Connection(e.to_string()))?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// One retry-timer tick: resend the request or the last ack if
    /// we're overdue, or report a total-session timeout.
    async fn tick(&mut self) -> NetResult<()> {
        let now = Instant::now();
        if now.duration_since(self.first_sent) >= TOTAL_TIMEOUT {
            return Err(NetError::GuppyTimeout);
        }
        if self.first_seq.is_none() && now.duration_since(self.last_sent) >= REQUEST_RESEND {
            self.send_request().await?;
        } else if let Some(seq) = self.current_seq {
            if now.duration_since(self.last_sent) >= ACK_RESEND {
                self.send_ack(seq).await?;
            }
        }
        Ok(())
    }

    /// Process one inbound datagram, updating session state and
    /// returning the terminal outcome once one is reached.
    async fn handle_datagram(&mut self, data: &[u8]) -> NetResult<Outcome> {
        if data.is_empty() {
            return Ok(Outcome::InProgress);
        }
        let Some(crlf) = find_crlf(data) else {
            return Ok(Outcome::InvalidResponse);
        };
        let header = String::from_utf8_lossy(&data[..crlf]).into_owned();
        let Some(caps) = meta_pattern().captures(&header) else {
            return Ok(Outcome::InvalidResponse);
        };
        let seq: u32 = caps[1].parse().unwrap_or(0);
        let payload = &data[crlf + 2..];

        let mut outcome = Outcome::InProgress;
        if self.first_seq.is_none() {
            let meta = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let meta = meta.strip_prefix(' ').unwrap_or(meta).to_string();
            match seq {
                0 | 5 => return Ok(Outcome::InvalidResponse),
                1 => {
                    self.meta = meta;
                    return Ok(Outcome::InputRequired);
                }
                3 => {
                    self.meta = meta;
                    return Ok(Outcome::Redirect);
                }
                4 => return Ok(Outcome::Error),
                _ => {
                    if !meta.is_empty() {
                        self.meta = meta;
                    }
                }
            }
        }

        if seq >= 6 {
            self.send_ack(seq).await?;
            self.store_chunk(seq, payload.to_vec());
            if self.process_chunks() {
                outcome = Outcome::Finished;
            }
        }
        Ok(outcome)
    }

    fn store_chunk(&mut self, seq: u32, data: Vec<u8>) {
        if self.first_seq.is_none() {
            self.first_seq = Some(seq);
        }
        if self.last_seq.is_none() && data.is_empty() {
            self.last_seq = Some(seq);
            return;
        }
        if self.current_seq.is_some_and(|c| seq <= c)
            || self.first_seq.is_some_and(|f| seq < f)
            || self.last_seq.is_some_and(|l| seq > l)
        {
            return;
        }

        let mut slot: Option<usize> = None;
        let mut max_seq_slot: Option<(u32, usize)> = None;
        let mut found = false;
        for (i, chunk) in self.chunks.iter().enumerate() {
            if let Some((s, _)) = chunk {
                if *s == seq {
                    found = true;
                    break;
                }
            }
            if slot.is_none() {
                let usable = match chunk {
                    None => true,
                    Some((s, _)) => {
                        self.first_seq.is_some_and(|f| *s < f) || self.last_seq.is_some_and(|l| *s > l)
                    }
                };
                if usable {
                    slot = Some(i);
                }
            }
            if let Some((s, _)) = chunk {
                if max_seq_slot.map_or(true, |(m, _)| *s > m) {
                    max_seq_slot = Some((*s, i));
                }
            }
        }

        if !found {
            if Some(seq) == self.first_seq && slot.is_none() {
                slot = max_seq_slot.map(|(_, i)| i);
            }
            if let Some(i) = slot {
                self.chunks[i] = Some((seq, data));
            }
        }
    }

    /// Splice in every chunk whose seq immediately follows what we've
    /// already assembled. Returns true once the chunk right before the
    /// empty EOF packet has been appended.
    fn process_chunks(&mut self) -> bool {
        loop {
            let mut progressed = false;
            for i in 0..self.chunks.len() {
                let matches = match self.current_seq {
                    Some(c) => self.chunks[i].as_ref().is_some_and(|(s, _)| *s == c + 1),
                    None => self.first_seq.is_some_and(|f| self.chunks[i].as_ref().is_some_and(|(s, _)| *s == f)),
                };
                if matches {
                    if let Some((seq, data)) = self.chunks[i].take() {
                        self.body.extend_from_slice(&data);
                        self.current_seq = Some(seq);
                        progressed = true;
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        matches!((self.current_seq, self.last_seq), (Some(c), Some(l)) if l > 0 && c == l - 1)
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Drive a full Guppy session to completion against `req`, resending
/// the request/ack on the 100ms tick schedule until a terminal outcome
/// or the 6 second total timeout is reached.
pub async fn run(req: &GmRequest, host: &str, port: u16, url: &str) -> NetResult<()> {
    let mut session = GuppySession::open(host, port, url).await?;
    req.begin_body(GmStatusCode::Success, String::new());

    let mut ticker = tokio::time::interval(TICK);
    let mut buf = [0u8; 65536];
    loop {
        if req.is_finished() {
            return Ok(());
        }
        tokio::select! {
            _ = ticker.tick() => {
                session.tick().await?;
            }
            result = session.socket.recv(&mut buf) => {
                let n = result.map_err(|e| NetError::Connection(e.to_string()))?;
                match session.handle_datagram(&buf[..n]).await? {
                    Outcome::InProgress => {}
                    Outcome::InvalidResponse => {
                        req.finish_with(GmStatusCode::InvalidHeader, String::new());
                        return Ok(());
                    }
                    Outcome::InputRequired => {
                        req.finish_with(GmStatusCode::Input, session.meta.clone());
                        return Ok(());
                    }
                    Outcome::Redirect => {
                        req.finish_with(GmStatusCode::RedirectTemporary, session.meta.clone());
                        return Ok(());
                    }
                    Outcome::Error => {
                        req.finish_with(GmStatusCode::PermanentFailure, String::new());
                        return Ok(());
                    }
                    Outcome::Finished => {
                        req.append_body(&std::mem::take(&mut session.body));
                        req.finish_success();
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GuppySession {
        GuppySession {
            socket: unreachable_socket(),
            url: String::new(),
            meta: String::new(),
            first_sent: Instant::now(),
            last_sent: Instant::now(),
            first_seq: None,
            last_seq: None,
            current_seq: None,
            chunks: Default::default(),
            body: Vec::new(),
        }
    }

    fn unreachable_socket() -> UdpSocket {
        // Only used for unit tests that exercise pure state machine
        // logic and never actually send/receive.
        tokio_test::block_on(UdpSocket::bind("127.0.0.1:0")).unwrap()
    }

    #[test]
    fn stores_and_splices_in_order_chunks() {
        let mut s = session();
        s.store_chunk(6, b"hello".to_vec());
        assert!(!s.process_chunks());
        s.store_chunk(7, b"".to_vec());
        assert!(s.process_chunks());
        assert_eq!(s.body, b"hello");
    }

    #[test]
    fn splices_out_of_order_chunks_once_gap_fills() {
        let mut s = session();
        s.store_chunk(7, b"world".to_vec());
        assert!(!s.process_chunks());
        s.store_chunk(6, b"hello".to_vec());
        s.store_chunk(8, b"".to_vec());
        assert!(s.process_chunks());
        assert_eq!(s.body, b"helloworld");
    }

    #[test]
    fn evicts_highest_seq_when_ring_is_full() {
        let mut s = session();
        s.first_seq = Some(6);
        for i in 0..RING_SLOTS {
            s.chunks[i] = Some((100 + i as u32, vec![0]));
        }
        s.store_chunk(6, b"x".to_vec());
        assert!(s.chunks.iter().any(|c| matches!(c, Some((6, _)))));
    }

    #[test]
    fn discards_chunk_before_first_seq() {
        let mut s = session();
        s.first_seq = Some(10);
        s.store_chunk(6, b"late".to_vec());
        assert!(s.chunks.iter().all(|c| c.is_none()));
    }
}
