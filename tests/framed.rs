//! The codec over an in-memory duplex stream.

use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio_util::codec::Framed;
use wsgate::{
    close::CloseCode,
    codec::{Codec, Decoder, Encoder},
    Frame, FrameParser, OpCode, Options, WebSocketError,
};

/// Codec for the client end: decodes unmasked server frames.
fn client_codec() -> Codec {
    Codec::from((Decoder::new(FrameParser::new(1 << 20, false)), Encoder))
}

#[tokio::test]
async fn request_reply() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut server = Framed::new(server, Codec::new(&Options::default()));
    let mut client = Framed::new(client, client_codec());

    let reply = tokio::spawn(async move {
        while let Some(frame) = server.next().await {
            let frame = frame?;
            match frame.opcode() {
                OpCode::Close => {
                    server.send(Frame::close(CloseCode::Normal, "")).await?;
                    break;
                }
                OpCode::Ping => server.send(Frame::pong(frame.into_payload())).await?,
                // decoded frames still carry the client's mask
                opcode => {
                    let fin = frame.is_fin();
                    server.send(Frame::new(fin, opcode, frame.into_payload())).await?
                }
            }
        }
        Ok::<_, WebSocketError>(())
    });

    let mut rng = rand::thread_rng();
    let payload: Vec<u8> = (0..4096).map(|_| rng.gen()).collect();

    client
        .send(Frame::text("hello").with_mask(rng.gen()))
        .await
        .unwrap();
    client
        .send(Frame::binary(payload.clone()).with_mask(rng.gen()))
        .await
        .unwrap();
    client
        .send(Frame::ping("p").with_mask(rng.gen()))
        .await
        .unwrap();
    client
        .send(Frame::close(CloseCode::Away, "bye").with_mask(rng.gen()))
        .await
        .unwrap();

    let text = client.next().await.unwrap().unwrap();
    assert_eq!(text.as_str(), Some("hello"));
    assert!(text.header().mask.is_none());

    let binary = client.next().await.unwrap().unwrap();
    assert_eq!(binary.payload().as_ref(), &payload[..]);

    let pong = client.next().await.unwrap().unwrap();
    assert_eq!(pong.opcode(), OpCode::Pong);
    assert_eq!(pong.payload().as_ref(), b"p");

    let close = client.next().await.unwrap().unwrap();
    assert_eq!(close.close_code(), Some(CloseCode::Normal));

    reply.await.unwrap().unwrap();
}

#[tokio::test]
async fn server_rejects_unmasked_client() {
    let (client, server) = tokio::io::duplex(64);
    let mut server = Framed::new(server, Codec::new(&Options::default()));
    let mut client = Framed::new(client, client_codec());

    client.send(Frame::text("unmasked")).await.unwrap();

    let result = server.next().await.unwrap();
    assert!(matches!(result, Err(WebSocketError::UnmaskedFrame)));
}
