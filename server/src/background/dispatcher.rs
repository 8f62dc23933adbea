// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background task driving multicast dispatch.
//!
//! Every process runs one of these; instances sharing a database divide
//! the dispatchable groups between themselves through the skip-locked
//! claim in the datastore, so no coordination beyond the database is
//! needed.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::json;
use slog::{error, warn};

use crate::app::Core;
use crate::background::BackgroundTask;

pub struct MulticastDispatcher {
    core: Arc<Core>,
}

impl MulticastDispatcher {
    pub fn new(core: Arc<Core>) -> MulticastDispatcher {
        MulticastDispatcher { core }
    }
}

impl BackgroundTask for MulticastDispatcher {
    fn activate<'a>(&'a mut self) -> BoxFuture<'a, serde_json::Value> {
        async {
            match self.core.dispatch_batch().await {
                Ok(emitted) => json!({ "groups_emitted": emitted }),
                Err(e) if e.retryable() => {
                    // The tick's transaction rolled back; the claimed
                    // groups are free again and the next tick retries.
                    warn!(
                        self.core.log,
                        "multicast dispatch tick failed; will retry";
                        "error" => %e,
                    );
                    json!({ "error": e.to_string() })
                }
                Err(e) => {
                    error!(
                        self.core.log,
                        "multicast dispatch tick failed";
                        "error" => %e,
                    );
                    json!({ "error": e.to_string() })
                }
            }
        }
        .boxed()
    }
}
