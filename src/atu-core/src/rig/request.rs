// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use tokio::sync::oneshot;

use crate::RigResult;

/// One command line handed to the link task.
#[derive(Debug)]
pub struct LinkRequest {
    pub line: String,
    /// Non-empty reply lines to consume; the first one is returned.
    pub reply_lines: usize,
    pub timeout: Duration,
    pub respond_to: oneshot::Sender<RigResult<String>>,
}
