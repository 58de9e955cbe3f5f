/*
 *  control/server.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  TCP listener and per-connection JSON-RPC framing
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::io;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::rpc::{ControlCall, RpcError, RpcRequest, RpcResponse};
use super::{call, ControlRequest};

/// Unparsed input a connection may buffer before it is dropped
pub const MAX_PENDING_BYTES: usize = 1 << 20;

/// Accept control connections forever
pub async fn serve(listener: TcpListener, requests: mpsc::Sender<ControlRequest>) -> io::Result<()> {
    info!("Control plane listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("Control connection from {}", peer);

        let requests = requests.clone();
        tokio::spawn(async move {
            match handle_connection(stream, requests).await {
                Ok(()) => debug!("Control connection {} closed", peer),
                Err(e) => warn!("Control connection {} failed: {}", peer, e),
            }
        });
    }
}

/// Answer one decoded value; `None` for notifications
async fn respond(requests: &mpsc::Sender<ControlRequest>, value: Value) -> Option<RpcResponse> {
    let request = match RpcRequest::from_value(value) {
        Ok(request) => request,
        Err((id, error)) => return Some(RpcResponse::failure(id, error)),
    };

    debug!("Control call {}", request.method);

    let result = match ControlCall::parse(&request.method, request.params) {
        Ok(control_call) => call(requests, control_call).await.map_err(|e| RpcError::from(&e)),
        Err(error) => Err(error),
    };

    let id = request.id?;
    Some(match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(error) => RpcResponse::failure(id, error),
    })
}

async fn write_response<S>(stream: &mut S, response: &RpcResponse) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut bytes = serde_json::to_vec(response)?;
    bytes.push(b'\n');
    stream.write_all(&bytes).await?;
    stream.flush().await
}

/// Serve one connection: decode back-to-back JSON values as they arrive,
/// answer each in order. A value that is not JSON gets a parse error and
/// the connection is closed.
pub async fn handle_connection<S>(mut stream: S, requests: mpsc::Sender<ControlRequest>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut pending: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&chunk[..n]);

        let mut values = Vec::new();
        let mut consumed = 0;
        let mut fault = None;
        {
            let mut decoder = serde_json::Deserializer::from_slice(&pending).into_iter::<Value>();
            loop {
                match decoder.next() {
                    Some(Ok(value)) => {
                        values.push(value);
                        consumed = decoder.byte_offset();
                    }
                    // incomplete value, wait for more bytes
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        fault = Some(RpcError::parse_error(e));
                        break;
                    }
                    None => {
                        consumed = decoder.byte_offset();
                        break;
                    }
                }
            }
        }
        pending.drain(..consumed);

        for value in values {
            if let Some(response) = respond(&requests, value).await {
                write_response(&mut stream, &response).await?;
            }
        }

        if fault.is_none() && pending.len() > MAX_PENDING_BYTES {
            fault = Some(RpcError::parse_error("request too large"));
        }

        if let Some(error) = fault {
            write_response(&mut stream, &RpcResponse::failure(Value::Null, error)).await?;
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream};

    use crate::control::channel;
    use crate::error::KioskError;

    /// Stand-in host: answers Hello, fails everything else with TypeNotFound
    fn fake_host() -> mpsc::Sender<ControlRequest> {
        let (tx, mut rx) = channel();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = match request.call {
                    ControlCall::Hello => Ok(json!("Hello!")),
                    _ => Err(KioskError::TypeNotFound("video".into())),
                };
                let _ = request.reply.send(result);
            }
        });
        tx
    }

    fn connect() -> (DuplexStream, tokio::task::JoinHandle<io::Result<()>>) {
        let (client, server) = duplex(64 * 1024);
        let handle = tokio::spawn(handle_connection(server, fake_host()));
        (client, handle)
    }

    async fn read_line(reader: &mut BufReader<DuplexStream>) -> Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let (mut client, _handle) = connect();
        client
            .write_all(br#"{"jsonrpc":"2.0","id":1,"method":"Hello"}{"jsonrpc":"2.0","id":2,"method":"Update","params":{"name":"a","type":"video"}}"#)
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        assert_eq!(read_line(&mut reader).await, json!({"jsonrpc": "2.0", "result": "Hello!", "id": 1}));

        let second = read_line(&mut reader).await;
        assert_eq!(second["id"], json!(2));
        assert_eq!(second["error"]["code"], json!(-46));
    }

    #[tokio::test]
    async fn test_request_split_across_writes() {
        let (mut client, _handle) = connect();
        client.write_all(br#"{"jsonrpc":"2.0","id":"a","met"#).await.unwrap();
        client.flush().await.unwrap();
        tokio::task::yield_now().await;
        client.write_all(br#"hod":"Hello"}"#).await.unwrap();

        let mut reader = BufReader::new(client);
        assert_eq!(read_line(&mut reader).await["result"], json!("Hello!"));
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (mut client, _handle) = connect();
        client
            .write_all(br#"{"jsonrpc":"2.0","method":"Hello"} {"jsonrpc":"2.0","id":9,"method":"Hello"}"#)
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        assert_eq!(read_line(&mut reader).await["id"], json!(9));
    }

    #[tokio::test]
    async fn test_envelope_errors_keep_connection() {
        let (mut client, _handle) = connect();
        client
            .write_all(br#"{"id":3,"method":"Reboot"} {"id":4,"method":"Update","params":[]} [1] {"id":5,"method":"Hello"}"#)
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        assert_eq!(read_line(&mut reader).await["error"]["code"], json!(-32601));
        assert_eq!(read_line(&mut reader).await["error"]["code"], json!(-43));
        assert_eq!(read_line(&mut reader).await["error"]["code"], json!(-32600));
        assert_eq!(read_line(&mut reader).await["result"], json!("Hello!"));
    }

    #[tokio::test]
    async fn test_garbage_closes_connection() {
        let (mut client, handle) = connect();
        client.write_all(b"{\"id\":1,\"method\":\"Hello\"} not json").await.unwrap();

        let mut reader = BufReader::new(client);
        assert_eq!(read_line(&mut reader).await["result"], json!("Hello!"));

        let error = read_line(&mut reader).await;
        assert_eq!(error["error"]["code"], json!(-32700));
        assert_eq!(error["id"], Value::Null);

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_host_gone_reports_shutting_down() {
        let (tx, rx) = channel();
        drop(rx);

        let response = respond(&tx, json!({"id": 1, "method": "Hello"})).await.unwrap();
        assert_eq!(response.error.map(|e| e.code), Some(-32000));
    }
}
