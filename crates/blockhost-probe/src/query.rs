//! UDP query sessions.
//!
//! Every request starts with the magic `FE FD`, a type byte and a session id.
//! A session first performs the challenge handshake (type `09`): the server
//! answers with a decimal token as NUL-terminated ASCII, which is echoed back
//! as a big-endian `i32` in the full-stat request (type `00`, padded with four
//! zero bytes).
//!
//! The full-stat reply is:
//!
//! ```text
//! 00 <session> "splitnum\0\x80\0" (key \0 value \0)* \0 "\x01player_\0\0" (name \0)* \0
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{ProbeError, Result};
use crate::types::FullStat;

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
const SESSION_MASK: i32 = 0x0F0F_0F0F;
const STAT_PADDING: usize = 11;
const PLAYER_PADDING: usize = 10;
const MAX_DATAGRAM: usize = 65_535;

/// An open query session against one server.
#[derive(Debug)]
pub struct QuerySession {
    socket: UdpSocket,
    session_id: i32,
    token: Option<i32>,
    timeout: Duration,
}

impl QuerySession {
    /// Bind a local socket and associate it with `addr`.
    ///
    /// `timeout` bounds every round trip of the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or connected.
    pub async fn open(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let local: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;

        Ok(Self {
            socket,
            session_id: new_session_id(),
            token: None,
            timeout,
        })
    }

    /// The masked session id sent with every request.
    #[must_use]
    pub const fn session_id(&self) -> i32 {
        self.session_id
    }

    /// Perform the challenge handshake and remember the token.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the server does not answer, or
    /// `ProtocolMismatch` if the answer carries no usable token.
    pub async fn handshake(&mut self) -> Result<i32> {
        let reply = self.round_trip(&self.request(TYPE_HANDSHAKE)).await?;
        let body = self.strip_reply_header(&reply, TYPE_HANDSHAKE)?;

        let text = read_cstr(body, &mut 0)
            .ok_or_else(|| ProbeError::ProtocolMismatch("unterminated challenge".into()))?;
        let token: i32 = text.trim().parse().map_err(|_| {
            ProbeError::ProtocolMismatch(format!("challenge token {text:?} is not a number"))
        })?;

        debug!(session = self.session_id, token, "Query handshake complete");
        self.token = Some(token);
        Ok(token)
    }

    /// Fetch the full statistics block, handshaking first if needed.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the server does not answer, or
    /// `ProtocolMismatch` if the reply is malformed.
    pub async fn full_stat(&mut self) -> Result<FullStat> {
        let token = match self.token {
            Some(token) => token,
            None => self.handshake().await?,
        };

        let mut request = self.request(TYPE_STAT);
        request.extend_from_slice(&token.to_be_bytes());
        request.extend_from_slice(&[0, 0, 0, 0]);

        let reply = self.round_trip(&request).await?;
        let body = self.strip_reply_header(&reply, TYPE_STAT)?;
        parse_full_stat(body)
    }

    /// End the session.
    pub fn close(self) {
        debug!(session = self.session_id, "Query session closed");
    }

    fn request(&self, kind: u8) -> Vec<u8> {
        let mut request = Vec::with_capacity(15);
        request.extend_from_slice(&MAGIC);
        request.push(kind);
        request.extend_from_slice(&self.session_id.to_be_bytes());
        request
    }

    async fn round_trip(&self, request: &[u8]) -> Result<Vec<u8>> {
        self.socket.send(request).await?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let len = tokio::time::timeout(self.timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;
        buf.truncate(len);
        Ok(buf)
    }

    fn strip_reply_header<'a>(&self, reply: &'a [u8], kind: u8) -> Result<&'a [u8]> {
        match reply {
            [k, a, b, c, d, rest @ ..]
                if *k == kind && i32::from_be_bytes([*a, *b, *c, *d]) == self.session_id =>
            {
                Ok(rest)
            }
            _ => Err(ProbeError::ProtocolMismatch(format!(
                "unexpected reply header for type {kind:#04x}"
            ))),
        }
    }
}

/// Open a session, fetch full statistics and close it again, whatever the
/// outcome.
///
/// # Errors
///
/// Returns any error from the handshake or the stat exchange.
pub async fn full_query(addr: SocketAddr, timeout: Duration) -> Result<FullStat> {
    let mut session = QuerySession::open(addr, timeout).await?;
    let result = session.full_stat().await;
    session.close();
    result
}

/// Parse the body of a full-stat reply (after type byte and session id).
///
/// # Errors
///
/// Returns `ProtocolMismatch` if the body is truncated.
pub fn parse_full_stat(body: &[u8]) -> Result<FullStat> {
    let truncated = || ProbeError::ProtocolMismatch("truncated full stat".into());
    let mut pos = STAT_PADDING;
    if body.len() < pos {
        return Err(truncated());
    }

    let mut fields = BTreeMap::new();
    loop {
        let key = read_cstr(body, &mut pos).ok_or_else(truncated)?;
        if key.is_empty() {
            break;
        }
        let value = read_cstr(body, &mut pos).ok_or_else(truncated)?;
        fields.insert(key, value);
    }

    pos += PLAYER_PADDING;
    let mut players = Vec::new();
    while pos < body.len() {
        match read_cstr(body, &mut pos) {
            Some(name) if !name.is_empty() => players.push(name),
            _ => break,
        }
    }

    Ok(FullStat { fields, players })
}

/// Read a NUL-terminated string starting at `*pos`, advancing past the NUL.
fn read_cstr(buf: &[u8], pos: &mut usize) -> Option<String> {
    let rest = buf.get(*pos..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    *pos += end + 1;
    Some(String::from_utf8_lossy(&rest[..end]).into_owned())
}

fn new_session_id() -> i32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    let seed = nanos ^ std::process::id().rotate_left(16);
    i32::from_ne_bytes(seed.to_ne_bytes()) & SESSION_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: i32 = 9_513_307;

    fn stat_body() -> Vec<u8> {
        let mut body = b"splitnum\x00\x80\x00".to_vec();
        for (k, v) in [
            ("hostname", "A Minecraft Server"),
            ("gametype", "SMP"),
            ("version", "1.12.2"),
            ("numplayers", "2"),
            ("maxplayers", "20"),
            ("hostport", "25565"),
        ] {
            body.extend_from_slice(k.as_bytes());
            body.push(0);
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        body.push(0);
        body.extend_from_slice(b"\x01player_\x00\x00");
        for name in ["alice", "bob"] {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
        }
        body.push(0);
        body
    }

    async fn fake_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 64];

            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 7);
            assert_eq!(&buf[..3], &[0xFE, 0xFD, TYPE_HANDSHAKE]);
            let session = [buf[3], buf[4], buf[5], buf[6]];
            assert_eq!(i32::from_be_bytes(session) & !SESSION_MASK, 0);

            let mut reply = vec![TYPE_HANDSHAKE];
            reply.extend_from_slice(&session);
            reply.extend_from_slice(format!("{TOKEN}\0").as_bytes());
            socket.send_to(&reply, peer).await.unwrap();

            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            assert_eq!(len, 15);
            assert_eq!(&buf[..3], &[0xFE, 0xFD, TYPE_STAT]);
            assert_eq!(&buf[3..7], &session);
            assert_eq!(&buf[7..11], &TOKEN.to_be_bytes());
            assert_eq!(&buf[11..15], &[0, 0, 0, 0]);

            let mut reply = vec![TYPE_STAT];
            reply.extend_from_slice(&session);
            reply.extend_from_slice(&stat_body());
            socket.send_to(&reply, peer).await.unwrap();
        });

        (addr, handle)
    }

    #[test]
    fn parses_full_stat_body() {
        let stat = parse_full_stat(&stat_body()).unwrap();
        assert_eq!(stat.get("hostname"), Some("A Minecraft Server"));
        assert_eq!(stat.get("maxplayers"), Some("20"));
        assert_eq!(stat.fields.len(), 6);
        assert_eq!(stat.players, vec!["alice", "bob"]);
    }

    #[test]
    fn truncated_body_is_mismatch() {
        assert!(matches!(
            parse_full_stat(b"splitnum"),
            Err(ProbeError::ProtocolMismatch(_))
        ));
        let mut body = stat_body();
        body.truncate(20);
        assert!(matches!(
            parse_full_stat(&body),
            Err(ProbeError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn session_ids_are_masked() {
        for _ in 0..16 {
            assert_eq!(new_session_id() & !SESSION_MASK, 0);
        }
    }

    #[tokio::test]
    async fn full_query_against_fake_server() {
        let (addr, server) = fake_server().await;

        let stat = full_query(addr, Duration::from_millis(2500)).await.unwrap();
        assert_eq!(stat.get("version"), Some("1.12.2"));
        assert_eq!(stat.players.len(), 2);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        let err = full_query(addr, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout(_)));
        drop(socket);
    }
}
