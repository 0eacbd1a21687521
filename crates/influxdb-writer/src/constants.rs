// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const WRITE_PATH: &str = "/api/v2/write";

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub const USER_AGENT: &str = concat!("influxdb-writer/", env!("CARGO_PKG_VERSION"));

/// Only this much of a response body is kept, whatever the server declares.
pub const MAX_RESPONSE_BODY_BYTES: usize = 1024;

pub const ENTRY_SEPARATOR: u8 = b'\n';

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8086";
pub const DEFAULT_AUTH_TOKEN: &str = "admin:password";
pub const DEFAULT_BUCKET: &str = "test";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(8);
// 3 MiB
pub const DEFAULT_BATCH_SIZE: usize = 3 * 1024 * 1024;
pub const DEFAULT_ENTRIES_LIMIT: usize = 5000;
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(9);
