use std::io;

use anyhow::Result;
use bytes::Bytes;
use bytes::BytesMut;
use futures::StreamExt;
use tokio_util::codec::Decoder;

use super::FrameDecoder;
use super::MAX_LINE_LENGTH;
use crate::domain::models::ByteStream;

fn decode_chunks<T: AsRef<[u8]>>(chunks: &[T]) -> Vec<String> {
    let mut decoder = FrameDecoder::default();
    let mut buf = BytesMut::new();
    let mut lines = vec![];

    for chunk in chunks {
        buf.extend_from_slice(chunk.as_ref());
        while let Some(line) = decoder.decode(&mut buf).unwrap() {
            lines.push(line);
        }
    }
    while let Some(line) = decoder.decode_eof(&mut buf).unwrap() {
        lines.push(line);
    }

    return lines;
}

fn body() -> &'static str {
    return "data: {\"content\":\"Hé\"}\n\n: keep-alive\n\ndata: {\"content\":\"世界\"}\n\ndata: [DONE]\n\n";
}

fn expected_lines() -> Vec<String> {
    return vec![
        "data: {\"content\":\"Hé\"}",
        "",
        ": keep-alive",
        "",
        "data: {\"content\":\"世界\"}",
        "",
        "data: [DONE]",
        "",
    ]
    .into_iter()
    .map(|line| return line.to_string())
    .collect();
}

#[test]
fn it_decodes_whole_body() {
    assert_eq!(decode_chunks(&[body().as_bytes()]), expected_lines());
}

#[test]
fn it_is_split_invariant_for_two_cuts() {
    let bytes = body().as_bytes();
    for first in 0..=bytes.len() {
        for second in first..=bytes.len() {
            let chunks = [&bytes[..first], &bytes[first..second], &bytes[second..]];
            assert_eq!(
                decode_chunks(&chunks),
                expected_lines(),
                "cuts at {first} and {second}"
            );
        }
    }
}

#[test]
fn it_is_split_invariant_for_single_bytes() {
    let chunks = body()
        .as_bytes()
        .chunks(1)
        .collect::<Vec<&[u8]>>();
    assert_eq!(decode_chunks(&chunks[..]), expected_lines());
}

#[test]
fn it_holds_partial_lines_until_newline() {
    let mut decoder = FrameDecoder::default();
    let mut buf = BytesMut::from("data: {\"content\":\"Hel");
    assert_eq!(decoder.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"lo\"}\n");
    assert_eq!(
        decoder.decode(&mut buf).unwrap(),
        Some("data: {\"content\":\"Hello\"}".to_string())
    );
    assert!(buf.is_empty());
}

#[test]
fn it_flushes_final_carry_over() {
    assert_eq!(
        decode_chunks(&[b"data: {\"content\":\"A\"}\n\ndata: [DONE]"]),
        vec!["data: {\"content\":\"A\"}", "", "data: [DONE]"]
    );
}

#[test]
fn it_drops_blank_final_carry_over() {
    assert_eq!(decode_chunks(&[b"data: [DONE]\n  "]), vec!["data: [DONE]"]);
}

#[test]
fn it_strips_carriage_returns() {
    assert_eq!(
        decode_chunks(&[b"data: [DONE]\r\n\r\n"]),
        vec!["data: [DONE]", ""]
    );
}

#[test]
fn it_replaces_invalid_utf8() {
    let lines = decode_chunks(&[b"data: \xff\n"]);
    assert_eq!(lines, vec!["data: \u{fffd}"]);
}

#[test]
fn it_accepts_lines_up_to_the_maximum_length() {
    let mut decoder = FrameDecoder::with_max_length(8);
    let mut buf = BytesMut::from("12345678\n");
    assert_eq!(decoder.decode(&mut buf).unwrap(), Some("12345678".to_string()));
    assert!(buf.is_empty());
}

#[test]
fn it_rejects_carry_over_past_the_maximum_length() {
    let mut decoder = FrameDecoder::with_max_length(8);
    let mut buf = BytesMut::from("data: ");
    assert_eq!(decoder.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"{\"con");
    let err = decoder.decode(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn it_rejects_complete_lines_past_the_maximum_length() {
    let mut decoder = FrameDecoder::with_max_length(8);
    let mut buf = BytesMut::from("data: [DONE]\n");
    let err = decoder.decode(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn it_fails_streams_that_never_send_a_newline() {
    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from(vec![b'a'; MAX_LINE_LENGTH])),
        Ok(Bytes::from_static(b"a")),
    ];
    let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
    let mut lines = FrameDecoder::lines(stream);

    let err = lines.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[tokio::test]
async fn it_streams_lines_from_a_transport() -> Result<()> {
    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"data: {\"content\":\"Hel\"}\n")),
        Ok(Bytes::from_static(b"\ndata: {\"content\"")),
        Ok(Bytes::from_static(b":\"lo\"}\n\ndata: [DONE]\n\n")),
    ];
    let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

    let lines = FrameDecoder::lines(stream)
        .collect::<Vec<io::Result<String>>>()
        .await
        .into_iter()
        .collect::<io::Result<Vec<String>>>()?;

    assert_eq!(
        lines,
        vec![
            "data: {\"content\":\"Hel\"}",
            "",
            "data: {\"content\":\"lo\"}",
            "",
            "data: [DONE]",
            "",
        ]
    );

    return Ok(());
}

#[tokio::test]
async fn it_surfaces_transport_errors() {
    let chunks: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"data: [DONE]\n")),
        Err(io::Error::new(io::ErrorKind::Interrupted, "connection reset")),
    ];
    let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
    let mut lines = FrameDecoder::lines(stream);

    assert_eq!(lines.next().await.unwrap().unwrap(), "data: [DONE]");
    assert!(lines.next().await.unwrap().is_err());
}
