// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Sink for the writer's outcome messages.
///
/// The writer never returns delivery errors to producers; everything it has to say goes
/// through this trait.
pub trait Logger: Send + Sync {
    fn info(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Default sink, forwarding to `tracing` events under the `influxdb_writer` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "influxdb_writer", "{args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(target: "influxdb_writer", "{args}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_tracing_logger_info() {
        TracingLogger.info(format_args!("flush: sent {} bytes, {} entries", 12, 2));
        assert!(logs_contain("flush: sent 12 bytes, 2 entries"));
        assert!(logs_contain("INFO"));
    }

    #[test]
    #[traced_test]
    fn test_tracing_logger_error() {
        TracingLogger.error(format_args!("client.send: {}", "status_code: 500"));
        assert!(logs_contain("client.send: status_code: 500"));
        assert!(logs_contain("ERROR"));
    }
}
