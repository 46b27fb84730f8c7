//! QUIC transport.
//!
//! Per connection:
//! - one bidirectional control stream: the client's `Hello`, the server's
//!   `Welcome`/`Rejected`, then length-prefixed command frames;
//! - one long-lived unidirectional stream of reliable, ordered events;
//! - one short unidirectional stream per snapshot, so snapshots are
//!   delivered independently and the client drops stale ticks.

use std::net::SocketAddr;

use quinn::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use quinn::{Connection, Endpoint, Incoming, RecvStream, SendStream, VarInt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use skirmish_core::components::PlayerId;
use skirmish_core::protocol::{
    decode, encode_frame, frame_len, ClientMessage, ServerMessage, FRAME_HEADER_LEN,
};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::game_loop::{EventFeed, MatchHandle, SnapshotFeed};

/// Build a QUIC server config from a DER certificate and PKCS#8 key.
///
/// # Errors
///
/// Returns [`ServerError::Tls`] if rustls rejects the pair.
pub fn server_config(cert_der: Vec<u8>, key_der: Vec<u8>) -> Result<quinn::ServerConfig> {
    let certs = vec![CertificateDer::from(cert_der)];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der));
    quinn::ServerConfig::with_single_cert(certs, key).map_err(|e| ServerError::Tls(e.to_string()))
}

/// Bind the server endpoint on all interfaces.
///
/// # Errors
///
/// Returns an error if the certificate files are missing or invalid, or
/// the socket cannot be bound.
pub fn bind(config: &ServerConfig) -> Result<Endpoint> {
    for path in [&config.cert_path, &config.key_path] {
        if !path.exists() {
            return Err(ServerError::FileNotFound(path.display().to_string()));
        }
    }
    let cert = std::fs::read(&config.cert_path)?;
    let key = std::fs::read(&config.key_path)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let endpoint = Endpoint::server(server_config(cert, key)?, addr)?;
    info!("Listening on {}", endpoint.local_addr()?);
    Ok(endpoint)
}

/// Write one length-prefixed frame.
///
/// # Errors
///
/// Returns an error if encoding or the stream write fails.
pub async fn write_frame<T: Serialize>(send: &mut SendStream, message: &T) -> Result<()> {
    let frame = encode_frame(message)?;
    send.write_all(&frame).await?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// # Errors
///
/// Returns an error if the stream ends early, the header is oversized or
/// the payload does not decode.
pub async fn read_frame<T: DeserializeOwned>(recv: &mut RecvStream) -> Result<T> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    recv.read_exact(&mut header).await?;
    let mut payload = vec![0u8; frame_len(header)?];
    recv.read_exact(&mut payload).await?;
    Ok(decode(&payload)?)
}

/// Accept connections until the endpoint closes.
pub async fn serve(endpoint: Endpoint, handle: MatchHandle) {
    while let Some(incoming) = endpoint.accept().await {
        let handle = handle.clone();
        tokio::spawn(async move {
            let remote = incoming.remote_address();
            if let Err(e) = handle_connection(incoming, handle).await {
                warn!("Connection from {remote} ended: {e}");
            }
        });
    }
}

async fn handle_connection(incoming: Incoming, handle: MatchHandle) -> Result<()> {
    let connection = incoming.await?;
    let (mut control_send, mut control_recv) = connection.accept_bi().await?;

    let ClientMessage::Hello { player_id } = read_frame(&mut control_recv).await? else {
        return Err(ServerError::Protocol("first message must be Hello".to_string()));
    };
    let (team_id, events) = match handle.join(player_id).await {
        Ok(joined) => joined,
        Err(e) => {
            let reason = e.to_string();
            write_frame(&mut control_send, &ServerMessage::Rejected { reason }).await?;
            control_send.finish()?;
            let _ = control_send.stopped().await;
            return Err(e);
        }
    };
    write_frame(&mut control_send, &ServerMessage::Welcome { player_id, team_id }).await?;
    info!(
        "Player {player_id} (team {team_id}) connected from {}",
        connection.remote_address()
    );

    let outbound = async {
        tokio::try_join!(
            forward_events(&connection, events),
            forward_snapshots(&connection, handle.snapshots()),
        )
        .map(|_| ())
    };
    let result = tokio::select! {
        r = forward_commands(&mut control_recv, &handle, player_id) => r,
        r = outbound => r,
    };

    handle.leave(player_id).await;
    if result.is_ok() {
        connection.close(VarInt::from_u32(0), b"match complete");
    }
    result
}

async fn forward_commands(
    recv: &mut RecvStream,
    handle: &MatchHandle,
    player_id: PlayerId,
) -> Result<()> {
    loop {
        match read_frame(recv).await? {
            ClientMessage::Command(command) => handle.command(player_id, command).await?,
            ClientMessage::Hello { .. } => {
                return Err(ServerError::Protocol("duplicate Hello".to_string()));
            }
        }
    }
}

async fn forward_events(connection: &Connection, mut events: EventFeed) -> Result<()> {
    let mut stream = connection.open_uni().await?;
    while let Some(event) = events.recv().await {
        write_frame(&mut stream, &ServerMessage::Event(event)).await?;
    }
    stream.finish()?;
    let _ = stream.stopped().await;
    Ok(())
}

async fn forward_snapshots(connection: &Connection, mut feed: SnapshotFeed) -> Result<()> {
    while feed.changed().await.is_ok() {
        let Some(snapshot) = feed.borrow_and_update().clone() else {
            continue;
        };
        let mut stream = connection.open_uni().await?;
        write_frame(&mut stream, &ServerMessage::Snapshot((*snapshot).clone())).await?;
        stream.finish()?;
    }
    debug!("Snapshot feed closed");
    Ok(())
}
