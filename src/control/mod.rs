/*
 *  control/mod.rs
 *
 *  kioskd - the show must go on
 *  (c) 2020-26 Stuart Hunter
 *
 *  Control plane: JSON-RPC over TCP, forwarded to the host task
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

//! Control plane
//!
//! Connection tasks never touch host state. Each decoded call is sent to
//! the host task with a one-shot reply channel, so calls and render ticks
//! are serialised by the host loop.
//!
//! ```json
//! {"jsonrpc": "2.0", "id": 1, "method": "Update",
//!  "params": {"type": "text", "name": "clock", "x": 10, "y": 20, "text": "Hi"}}
//! ```

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::KioskError;

pub mod rpc;
pub mod server;

pub use rpc::{ControlCall, RpcError, RpcRequest, RpcResponse, UpdateRequest};
pub use server::{handle_connection, serve};

/// Default TCP port
pub const DEFAULT_PORT: u16 = 24054;

/// Requests queued for the host before senders wait
pub const REQUEST_QUEUE_DEPTH: usize = 32;

/// One call on its way to the host task
pub struct ControlRequest {
    pub call: ControlCall,
    pub reply: oneshot::Sender<Result<Value, KioskError>>,
}

pub fn channel() -> (mpsc::Sender<ControlRequest>, mpsc::Receiver<ControlRequest>) {
    mpsc::channel(REQUEST_QUEUE_DEPTH)
}

/// Send a call to the host task and wait for its answer
pub async fn call(requests: &mpsc::Sender<ControlRequest>, call: ControlCall) -> Result<Value, KioskError> {
    let (reply, answer) = oneshot::channel();

    requests
        .send(ControlRequest { call, reply })
        .await
        .map_err(|_| KioskError::ShuttingDown)?;

    answer.await.map_err(|_| KioskError::ShuttingDown)?
}
