// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::time::timeout;

use crate::forward::Forwarder;
use crate::query::{IamOptions, QueryHandle};
use crate::request::{cancel_request, OutboundRequest};

/// Where a query stands from the proxy's point of view.
///
/// Only the first move out of `Active` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryState {
    /// Being forwarded or streamed.
    Active = 0,
    /// The response reached its end.
    Completed = 1,
    /// The client went away first.
    ClientCancelled = 2,
    /// The upstream side failed or the proxy gave up on it.
    UpstreamCancelled = 3,
}

impl QueryState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => QueryState::Active,
            1 => QueryState::Completed,
            2 => QueryState::ClientCancelled,
            _ => QueryState::UpstreamCancelled,
        }
    }
}

/// Tracks one inbound query and cancels it upstream when the client leaves
/// early.
///
/// The cancel call is detached, made once, never retried, and its failures
/// are only logged.
#[derive(Debug)]
pub struct QueryLifecycle {
    handle: Arc<QueryHandle>,
    forwarder: Forwarder,
    state: AtomicU8,
}

impl QueryLifecycle {
    /// Start tracking `handle`. Cancel calls go through `forwarder`.
    pub fn new(handle: Arc<QueryHandle>, forwarder: Forwarder) -> Arc<Self> {
        Arc::new(Self {
            handle,
            forwarder,
            state: AtomicU8::new(QueryState::Active as u8),
        })
    }

    /// Current state.
    pub fn state(&self) -> QueryState {
        QueryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Mark the response as fully delivered.
    pub fn complete(&self) -> bool {
        self.transition(QueryState::Completed)
    }

    /// Mark the query as ended by the upstream side. No cancel call is made.
    pub fn fail(&self) -> bool {
        self.transition(QueryState::UpstreamCancelled)
    }

    /// The inbound connection closed.
    ///
    /// Fires the cancel call if the query was still active and can be
    /// cancelled. Returns whether this call moved the state.
    pub fn on_close(&self) -> bool {
        if !self.transition(QueryState::ClientCancelled) {
            return false;
        }
        info!(
            "client closed {} before completion (query id: {:?})",
            self.handle.endpoint, self.handle.query_id
        );
        self.spawn_cancel();
        true
    }

    /// A guard that reports a close when dropped while still armed.
    pub fn guard(self: &Arc<Self>) -> RequestGuard {
        RequestGuard {
            lifecycle: Some(self.clone()),
        }
    }

    fn transition(&self, to: QueryState) -> bool {
        self.state
            .compare_exchange(
                QueryState::Active as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn spawn_cancel(&self) {
        let Some(req) = cancel_request(&self.handle) else {
            debug!("no cancellation target for {}", self.handle.endpoint);
            return;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!("no runtime to cancel query {:?}", self.handle.query_id);
            return;
        };

        runtime.spawn(send_cancel(
            self.forwarder.clone(),
            req,
            self.handle.iam.clone(),
        ));
    }
}

/// Upper bound on a single cancel call, so that a stalled upstream cannot
/// keep the detached task alive.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Send one cancel call. Returns whether the upstream accepted it.
async fn send_cancel(forwarder: Forwarder, req: OutboundRequest, iam: Option<IamOptions>) -> bool {
    let sent = timeout(CANCEL_TIMEOUT, forwarder.send_once(&req, iam.as_ref())).await;
    match sent {
        Ok(Ok(Ok(resp))) if resp.status().is_success() => {
            info!("cancelled upstream query via {}", req.url);
            true
        }
        Ok(Ok(Ok(resp))) => {
            warn!("cancel request to {} answered {}", req.url, resp.status());
            false
        }
        Ok(Ok(Err(err))) => {
            error!("cancel request to {} failed: {err:#}", req.url);
            false
        }
        Ok(Err(err)) => {
            error!("cancel request to {} failed: {err}", req.url);
            false
        }
        Err(_) => {
            error!("cancel request to {} timed out after {CANCEL_TIMEOUT:?}", req.url);
            false
        }
    }
}

/// Held by a request handler while the upstream call is in flight.
///
/// If the handler future is dropped, as happens when the client disconnects,
/// the lifecycle learns about the close.
#[derive(Debug)]
pub struct RequestGuard {
    lifecycle: Option<Arc<QueryLifecycle>>,
}

impl RequestGuard {
    /// Stop watching. The response side takes over from here.
    pub fn disarm(mut self) {
        self.lifecycle.take();
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if let Some(lifecycle) = self.lifecycle.take() {
            lifecycle.on_close();
        }
    }
}
