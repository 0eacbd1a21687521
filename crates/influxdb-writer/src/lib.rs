// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered writer for the InfluxDB v2 write API.
//!
//! Producers hand line-protocol entries to a [`writer::Writer`]. A single worker task appends
//! them to a bounded [`batch::Batch`] and periodically, or when the batch is full, sends the
//! whole batch as one `POST /api/v2/write` through a [`client::Transport`]. Outcomes are
//! reported through an injected [`logger::Logger`]; producers never see delivery errors.
//!
//! ```rust,ignore
//! use influxdb_writer::{config::Config, writer::Writer};
//!
//! let writer = Writer::new(&Config::from_env()?, None)?;
//! writer.write_line("cpu,host=a usage=0.5").await;
//! writer.close().await;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logger;
pub mod writer;
