// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A stack of functions invoked, in registration order, against every event
//! immediately before target dispatch. Any middleware that calls
//! `event.stop()` short-circuits the rest of the stack and suppresses
//! dispatch.

use crate::event::Event;
use std::sync::Arc;

pub type Middleware = Arc<dyn Fn(&mut Event) + Send + Sync>;

pub fn run_pipeline(pipeline: &[Middleware], event: &mut Event) {
    for middleware in pipeline {
        middleware(event);
        if event.stopped {
            break;
        }
    }
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
