// Copyright 2022 Ryan Seipp
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

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports
)]
// Disallow warnings in examples.
#![doc(test(attr(deny(warnings))))]

//! restive is an embeddable HTTP/1.x REST server engine.
//!
//! The engine accepts TCP (optionally TLS) connections, parses HTTP/1.0 and
//! HTTP/1.1 requests, dispatches them to registered URI handlers and streams
//! responses back, with both `Content-Length` and chunked framing in each
//! direction plus keep-alive. Handlers run synchronously on a fixed pool of
//! worker threads and pull request bodies / push response bodies through the
//! [`Exchange`] passed to them.
//!
//! ```no_run
//! use restive::{Engine, EngineConfig, MethodHandlers};
//!
//! # fn main() -> restive::Result<()> {
//! let mut config = EngineConfig::default();
//! config.port = 8080;
//!
//! let mut engine = Engine::init(config)?;
//! engine.register_endpoint(
//!     "/v1/pkg",
//!     MethodHandlers::new().on_get(|exchange| {
//!         exchange.response_mut().set_content_length(2);
//!         exchange.send_payload(b"ok")?;
//!         Ok(())
//!     }),
//! )?;
//! engine.start()?;
//! // ... serve traffic ...
//! engine.stop(10)?;
//! engine.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod connection;
mod event;
mod listener;
mod tls;
mod worker;

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod limits;
pub mod parser;
pub mod registry;
pub mod request;
pub mod response;
pub mod status;

pub use config::EngineConfig;
pub use engine::{Engine, LifecycleState};
pub use error::{EngineError, Result};
pub use exchange::{Exchange, PayloadChunk};
pub use headers::Headers;
pub use parser::{Method, Version};
pub use registry::{HandlerFn, MethodHandlers};
pub use request::Request;
pub use response::Response;
pub use status::Status;
