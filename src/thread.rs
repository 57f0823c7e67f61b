// Copyright 2015 Ted Mielczarek. See the COPYRIGHT
// file at the top-level directory of this distribution.

//! The `ThreadList` and `ThreadNames` streams.

use minidump_common::format as md;

use crate::context::MinidumpContext;
use crate::memory::MinidumpMemory;

/// A single thread, with its stack memory and context if present.
#[derive(Debug)]
pub struct MinidumpThread<'a> {
    pub raw: md::MDRawThread,
    pub context: Option<MinidumpContext>,
    pub stack: Option<MinidumpMemory<'a>>,
    pub name: Option<String>,
}

#[derive(Debug)]
pub struct MinidumpThreadList<'a> {
    pub threads: Vec<MinidumpThread<'a>>,
}

impl<'a> MinidumpThreadList<'a> {
    pub fn new(threads: Vec<MinidumpThread<'a>>) -> MinidumpThreadList<'a> {
        MinidumpThreadList { threads }
    }

    pub fn get_thread(&self, thread_id: u32) -> Option<&MinidumpThread<'a>> {
        self.threads.iter().find(|t| t.raw.thread_id == thread_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MinidumpThread<'a>> {
        self.threads.iter()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
