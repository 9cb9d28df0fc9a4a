// src/cancel.rs

//! Cooperative cancellation
//!
//! The resolution loop checks the token before each attempt and the
//! sandbox polls it while a subprocess runs. The CLI points a token at a
//! static flag set from its SIGINT handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
enum Flag {
    Shared(Arc<AtomicBool>),
    Static(&'static AtomicBool),
}

/// Cancellation token shared between the caller and the engine
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Flag,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            flag: Flag::Shared(Arc::new(AtomicBool::new(false))),
        }
    }

    /// Token backed by a static flag (settable from a signal handler)
    pub fn from_static(flag: &'static AtomicBool) -> Self {
        Self {
            flag: Flag::Static(flag),
        }
    }

    fn flag(&self) -> &AtomicBool {
        match &self.flag {
            Flag::Shared(arc) => arc,
            Flag::Static(flag) => flag,
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag().store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag().load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
