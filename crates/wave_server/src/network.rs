//! Framed TCP relay between remote participants and the session.
//!
//! Every message is a big-endian `u32` length followed by that many bytes.
//! The server speaks first with a 4-byte frame carrying the participant's
//! player ID. After that, participants send one encoded
//! [`Action`](wave_core::protocol::Action) per frame and receive one encoded
//! event batch per closed step.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, info_span, warn, Instrument};

use wave_core::entity::EntityId;
use wave_core::protocol::Action;

use crate::error::{Result, ServerError};
use crate::session::{SessionCommand, SessionHandle};

/// Largest payload accepted in one frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Write one length-prefixed frame.
///
/// # Errors
///
/// Returns [`ServerError::FrameTooLarge`] for oversized payloads and
/// propagates socket errors.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(ServerError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. `None` means the peer closed the
/// connection between frames.
///
/// # Errors
///
/// Returns [`ServerError::FrameTooLarge`] when the announced length is over
/// the limit and propagates socket errors, including EOF inside a frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(ServerError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Accept remote participants and hand each a player ID in arrival order,
/// starting at 1. Connections beyond `remote_slots` are refused.
///
/// # Errors
///
/// Propagates errors of the listening socket.
pub async fn serve(listener: TcpListener, session: SessionHandle, remote_slots: u32) -> Result<()> {
    info!(address = ?listener.local_addr()?, remote_slots, "Relay listening");
    let mut next_player: EntityId = 1;
    loop {
        let (stream, peer) = listener.accept().await?;
        if next_player > remote_slots {
            warn!(%peer, "Refused connection, match is full");
            continue;
        }
        let player = next_player;
        next_player += 1;

        let session = session.clone();
        tokio::spawn(
            async move {
                info!(%peer, "Participant joined");
                if let Err(e) = handle_connection(stream, player, session).await {
                    warn!(%e, "Connection closed with error");
                }
            }
            .instrument(info_span!("conn", player)),
        );
    }
}

/// Relay one participant until either side stops. The session is told
/// about the connection and its end.
///
/// # Errors
///
/// Returns the first socket, framing or decoding error.
pub async fn handle_connection(stream: TcpStream, player: EntityId, session: SessionHandle) -> Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    let mut batches = session.subscribe();

    write_frame(&mut writer, &player.to_be_bytes()).await?;
    session.send(SessionCommand::Connected { player }).await?;

    let inbound = async {
        while let Some(frame) = read_frame(&mut reader).await? {
            let action = Action::decode(&frame)?;
            session.send(SessionCommand::Action { player, action }).await?;
        }
        Ok::<(), ServerError>(())
    };
    let outbound = async {
        loop {
            match batches.recv().await {
                Ok(batch) => write_frame(&mut writer, &batch).await?,
                Err(RecvError::Lagged(missed)) => {
                    // A participant that missed steps can never catch up.
                    warn!(missed, "Participant fell behind");
                    return Err(ServerError::ParticipantLagged { missed });
                }
                Err(RecvError::Closed) => return Ok::<(), ServerError>(()),
            }
        }
    };

    let result = tokio::select! {
        r = inbound => r,
        r = outbound => r,
    };
    // The session may already be gone; nothing to tell it then.
    let _ = session.send(SessionCommand::Disconnected { player }).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Host;
    use crate::session::spawn_session;
    use wave_core::protocol::{decode_batch, Event};
    use wave_test_utils::fixtures::party_match;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        write_frame(&mut a, &[]).await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut b).await.unwrap(), Some(Vec::new()));
        drop(a);
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(MAX_FRAME_LEN as u32 + 1).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(ServerError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_u32(10).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(ServerError::Io(_))));
    }

    #[tokio::test]
    async fn test_relay_roundtrip_over_tcp() {
        let (handle, task) = spawn_session(Host::new(party_match(6)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let relay = tokio::spawn(serve(listener, handle.clone(), 3));

        let mut client = TcpStream::connect(address).await.unwrap();
        let welcome = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(welcome, 1u32.to_be_bytes().to_vec());

        let action = Action::MovementKeys {
            keys: [false, true, false, false],
        };
        write_frame(&mut client, &action.encode()).await.unwrap();

        let stamped = loop {
            let batch = read_frame(&mut client).await.unwrap().unwrap();
            let events = decode_batch(&batch).unwrap();
            assert!(events.last().unwrap().is_terminator());
            if let Some(event) = events.into_iter().find(|e| !e.is_terminator()) {
                break event;
            }
        };
        assert!(matches!(stamped, Event::PlayerAction { player: 1, .. }));

        handle.send(SessionCommand::Shutdown).await.unwrap();
        let host = task.await.unwrap().unwrap();
        assert!(host.game().step() > 0);
        relay.abort();
    }
}
