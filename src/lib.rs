// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # AutoGLM Client
//!
//! Client for a remote AutoGLM API server, which drives Android phones on
//! behalf of natural-language tasks.
//!
//! The client submits a task, polls the server's status while it runs and
//! reconciles the reported progress into a stable list of steps. Consumers
//! read a [`ClientState`], watch it for changes, or follow [`ClientEvent`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use autoglm_client::{ClientConfig, ClientEvent, ExecutionClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::default().with_base_url("http://127.0.0.1:8765");
//!     let client = ExecutionClient::start(config)?;
//!
//!     let health = client.check_health().await?;
//!     println!("Server status: {}", health.status);
//!
//!     let mut events = client.events();
//!     client.execute_task("在淘宝搜索无线耳机", None).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             ClientEvent::StepsUpdated { steps } => println!("{} steps", steps.len()),
//!             ClientEvent::TaskFinished { outcome, .. } => {
//!                 println!("Finished: {:?}", outcome);
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod device;
pub mod settings;
pub mod transport;

pub use api::{
    Device, ExecuteReply, ProgressEntry, ServerHealth, StatusSnapshot, TaskRejection, TaskRequest,
    TaskResult,
};
pub use client::{
    ClientConfig, ClientError, ClientEvent, ClientState, ExecutionClient, ExecutionStep,
    ProgressReconciler, TaskOutcome,
};
pub use device::DeviceAddress;
pub use settings::ClientSettings;
pub use transport::{HttpTransport, TransportError};
