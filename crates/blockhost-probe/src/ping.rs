//! Server list ping.
//!
//! The client sends `FE 01`. Servers answer with a kick frame:
//!
//! ```text
//! FF <u16 BE character count> <count UTF-16BE code units>
//! ```
//!
//! Two payload shapes exist. Modern servers (1.4 to 1.6) send
//! `§1 \0 protocol \0 version \0 motd \0 online \0 max`; legacy servers send
//! `motd § online § max`. The decoder tries the modern shape first.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ProbeError, Result};
use crate::types::PingResult;

/// The request bytes.
pub const PING_REQUEST: [u8; 2] = [0xFE, 0x01];

/// Packet id of the reply frame.
pub const KICK_PACKET: u8 = 0xFF;

/// The section sign as it appears in the low byte of a UTF-16BE unit.
const SECTION_SIGN: u8 = 0xA7;

const HEADER_LEN: usize = 3;

/// Decode a complete reply frame, header included.
///
/// # Errors
///
/// Returns `ProbeError::ProtocolMismatch` if the frame fits neither shape.
pub fn decode(frame: &[u8]) -> Result<PingResult> {
    if frame.len() < HEADER_LEN || frame[0] != KICK_PACKET {
        return Err(ProbeError::ProtocolMismatch(format!(
            "not a kick frame ({} bytes)",
            frame.len()
        )));
    }

    decode_modern(frame)
        .or_else(|| decode_legacy(frame))
        .ok_or_else(|| ProbeError::ProtocolMismatch("unrecognised ping payload".into()))
}

/// Modern branch: UTF-16BE text after the header, NUL-separated, with the
/// leading `§1` marker field dropped. Exactly five fields remain.
#[must_use]
pub fn decode_modern(frame: &[u8]) -> Option<PingResult> {
    let body = frame.get(HEADER_LEN..)?;
    if body.len() % 2 != 0 {
        return None;
    }

    let units = body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
    let text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();

    let fields: Vec<&str> = text.split('\0').skip(1).collect();
    let [protocol, version, motd, online, max] = fields.as_slice() else {
        return None;
    };

    Some(PingResult {
        protocol: protocol.trim().parse().ok(),
        server_version: (*version).to_string(),
        motd: (*motd).to_string(),
        players_online: online.trim().parse().ok()?,
        players_max: max.trim().parse().ok()?,
    })
}

/// Legacy branch: the raw frame split on the section-sign byte into exactly
/// three sections. Zero bytes are dropped and the rest read as Latin-1.
#[must_use]
pub fn decode_legacy(frame: &[u8]) -> Option<PingResult> {
    let sections = split_sections(frame, SECTION_SIGN);
    let [motd, online, max] = sections.as_slice() else {
        return None;
    };

    // The motd section still carries the frame header, and ends with the
    // high byte of the first section sign.
    let motd = motd.get(HEADER_LEN..motd.len().checked_sub(1)?)?;

    Some(PingResult {
        protocol: None,
        server_version: String::new(),
        motd: latin1_without_zeros(motd),
        players_online: latin1_without_zeros(online).trim().parse().ok()?,
        players_max: latin1_without_zeros(max).trim().parse().ok()?,
    })
}

/// Split on `delimiter`. A delimiter at offset 0 is skipped and a trailing
/// delimiter does not produce an empty last section.
fn split_sections(buf: &[u8], delimiter: u8) -> Vec<&[u8]> {
    let mut sections = Vec::new();
    let mut start = 0;

    for (i, &b) in buf.iter().enumerate() {
        if b != delimiter {
            continue;
        }
        if i == 0 {
            start = 1;
            continue;
        }
        sections.push(&buf[start..i]);
        start = i + 1;
    }
    if start < buf.len() {
        sections.push(&buf[start..]);
    }

    sections
}

fn latin1_without_zeros(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Ping the server listening at `addr`, bounding the whole exchange by
/// `timeout`. No retries.
///
/// # Errors
///
/// Returns `Timeout` if the bound is hit, `Io` on socket failure, and
/// `ProtocolMismatch` if the reply cannot be decoded.
pub async fn ping(addr: SocketAddr, timeout: Duration) -> Result<PingResult> {
    let frame = tokio::time::timeout(timeout, exchange(addr))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;
    debug!(%addr, bytes = frame.len(), "Received ping reply");
    decode(&frame)
}

async fn exchange(addr: SocketAddr) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(&PING_REQUEST).await?;

    // A reply cut short is still handed to the decoder, which rejects it.
    let mut frame = Vec::with_capacity(HEADER_LEN);
    (&mut stream)
        .take(HEADER_LEN as u64)
        .read_to_end(&mut frame)
        .await?;
    if frame.len() < HEADER_LEN {
        return Ok(frame);
    }
    let units = u16::from_be_bytes([frame[1], frame[2]]);

    let mut body = Vec::with_capacity(usize::from(units) * 2);
    (&mut stream)
        .take(u64::from(units) * 2)
        .read_to_end(&mut body)
        .await?;
    frame.extend_from_slice(&body);

    let _ = stream.shutdown().await;
    Ok(frame)
}
