// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded accumulation buffer for line-protocol entries.
//!
//! A [`Batch`] holds entries back to back, each terminated by a `\n`, and enforces two limits:
//! the total byte size and the number of entries. Admission is checked against the
//! *prospective* size and count with `>=`, so the usable capacity of each limit is
//! `limit - 1`. A rejected write never mutates the batch.

use std::sync::{PoisonError, RwLock};

use crate::constants::{DEFAULT_BATCH_SIZE, DEFAULT_ENTRIES_LIMIT, ENTRY_SEPARATOR};
use crate::errors::BatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Byte limit, separators included.
    pub size_limit: usize,
    pub entries_limit: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_BATCH_SIZE,
            entries_limit: DEFAULT_ENTRIES_LIMIT,
        }
    }
}

/// Copy of a batch's content at the time [`Batch::snapshot`] was called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub data: Vec<u8>,
    pub size: usize,
    pub entries: usize,
}

impl Snapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0 && self.entries == 0
    }
}

#[derive(Debug)]
struct Inner {
    buffer: Vec<u8>,
    entries: usize,
}

#[derive(Debug)]
pub struct Batch {
    inner: RwLock<Inner>,
    options: BatchOptions,
}

impl Batch {
    #[must_use]
    pub fn new(options: BatchOptions) -> Self {
        Self {
            inner: RwLock::new(Inner {
                // larger limits grow on demand
                buffer: Vec::with_capacity(options.size_limit.min(DEFAULT_BATCH_SIZE)),
                entries: 0,
            }),
            options,
        }
    }

    #[must_use]
    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Appends `entry` followed by a separator.
    ///
    /// The size limit is checked before the entries limit.
    pub fn write(&self, entry: &[u8]) -> Result<(), BatchError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.buffer.len() + entry.len() + 1 >= self.options.size_limit {
            return Err(BatchError::SizeExceeded);
        }

        if inner.entries + 1 >= self.options.entries_limit {
            return Err(BatchError::CountExceeded);
        }

        inner.buffer.extend_from_slice(entry);
        inner.buffer.push(ENTRY_SEPARATOR);
        inner.entries += 1;

        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        Snapshot {
            data: inner.buffer.clone(),
            size: inner.buffer.len(),
            entries: inner.entries,
        }
    }

    /// Clears the content, keeping the allocated capacity.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        inner.buffer.clear();
        inner.entries = 0;
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new(BatchOptions::default())
    }
}
